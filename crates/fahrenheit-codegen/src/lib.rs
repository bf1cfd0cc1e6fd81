//! fahrenheit-codegen - JIT backends for the Fahrenheit IR
//!
//! Supports two backends:
//! - **Cranelift Backend**: pure Rust JIT (default feature `cranelift`)
//! - **LLVM Backend**: MCJIT through inkwell (feature `llvm`, requires LLVM 17)
//!
//! Backends expect a module that passed [`fahrenheit_ir::verify_module`].
//! Compiling unverified IR is unsupported: it may be rejected with a
//! [`CodegenError`] or make the backend itself fail.
//!
//! # Example
//!
//! ```rust,ignore
//! use fahrenheit_codegen::{Backend, CraneliftBackend, Engine};
//! use fahrenheit_ir::{verify_module, Module};
//!
//! let module: Module = /* ... */;
//! verify_module(&module)?;
//! let engine = CraneliftBackend::new().compile(&module)?;
//! let inc: extern "C" fn(i32) -> i32 = unsafe { engine.get(inc_id) }.unwrap();
//! assert_eq!(inc(41), 42);
//! ```

#[cfg(feature = "cranelift")]
pub mod cranelift_backend;

#[cfg(feature = "llvm")]
pub mod llvm_backend;

#[cfg(feature = "cranelift")]
pub use cranelift_backend::{CraneliftBackend, CraneliftEngine};

#[cfg(feature = "llvm")]
pub use llvm_backend::{LlvmBackend, LlvmContext, LlvmEngine};

pub use fahrenheit_error::{CodegenError, Result};

use fahrenheit_ir::{FuncId, Module};

/// Entry point of a compiled function, or the address of an external one
pub type RawFunction = *const u8;

/// Trait for code generation backends
pub trait Backend {
    /// Owner of the compiled code
    type Engine: Engine;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Compiles every function of the module
    fn compile(&self, module: &Module) -> Result<Self::Engine>;
}

/// Compiled code, one entry per module function in module order
///
/// Dropping the engine releases the generated code; pointers obtained
/// from it must not be called afterwards.
pub trait Engine {
    fn functions(&self) -> &[RawFunction];

    fn function(&self, id: FuncId) -> Option<RawFunction> {
        self.functions().get(id.0).copied()
    }

    /// Reinterprets the entry of `id` as a function pointer type
    ///
    /// Returns `None` if `id` is out of range or `F` is not pointer sized.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C" fn` type matching the function's IR
    /// signature, and it must not be called after the engine is dropped.
    unsafe fn get<F: Copy>(&self, id: FuncId) -> Option<F>
    where
        Self: Sized,
    {
        if std::mem::size_of::<F>() != std::mem::size_of::<RawFunction>() {
            return None;
        }
        let raw = self.function(id)?;
        Some(std::mem::transmute_copy::<RawFunction, F>(&raw))
    }
}

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Optimization level (0-3)
    pub opt_level: u8,
    /// Log the backend's own IR at debug level
    pub dump_ir: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: 0,
            dump_ir: false,
        }
    }
}

impl CompileOptions {
    pub fn with_opt_level(mut self, opt_level: u8) -> Self {
        self.opt_level = opt_level.min(3);
        self
    }

    pub fn with_dump_ir(mut self, dump_ir: bool) -> Self {
        self.dump_ir = dump_ir;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<RawFunction>);

    impl Engine for Fixed {
        fn functions(&self) -> &[RawFunction] {
            &self.0
        }
    }

    extern "C" fn seven() -> i32 {
        7
    }

    #[test]
    fn test_engine_lookup() {
        let engine = Fixed(vec![seven as extern "C" fn() -> i32 as RawFunction]);
        assert!(engine.function(FuncId(0)).is_some());
        assert!(engine.function(FuncId(1)).is_none());

        let f: extern "C" fn() -> i32 = unsafe { engine.get(FuncId(0)) }.expect("pointer");
        assert_eq!(f(), 7);

        let wide: Option<[usize; 2]> = unsafe { engine.get(FuncId(0)) };
        assert!(wide.is_none());
    }

    #[test]
    fn test_opt_level_is_clamped() {
        let options = CompileOptions::default().with_opt_level(9);
        assert_eq!(options.opt_level, 3);
        assert!(!options.dump_ir);
    }
}
