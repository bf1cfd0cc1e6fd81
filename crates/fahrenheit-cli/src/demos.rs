//! Demo programs built with the IR builder

use clap::ValueEnum;
use std::ffi::{c_char, c_int, c_void};

use fahrenheit_codegen::Engine;
use fahrenheit_ir::{BinopOp, FuncId, FunctionType, IntCmpOp, Module, Type};

extern "C" {
    fn printf(format: *const c_char, ...) -> c_int;
    fn fflush(stream: *mut c_void) -> c_int;
}

static HELLO: &[u8] = b"Hello world!\n\0";

/// Called by the `count` demo once per iteration
extern "C" fn report(i: i32) {
    println!("{}", i);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// i32 -> i32 returning n + 1
    Add,
    /// Prints through the host printf
    Hello,
    /// Counts down from n, reporting each step to a host callback
    Count,
    /// Sums an i32 array
    Sum,
}

/// A demo module and the function to run
pub struct DemoModule {
    pub module: Module,
    pub entry: FuncId,
}

impl Demo {
    pub fn name(&self) -> &'static str {
        match self {
            Demo::Add => "add",
            Demo::Hello => "hello",
            Demo::Count => "count",
            Demo::Sum => "sum",
        }
    }

    pub fn build(&self) -> DemoModule {
        match self {
            Demo::Add => build_add(),
            Demo::Hello => build_hello(),
            Demo::Count => build_count(),
            Demo::Sum => build_sum(),
        }
    }

    /// Runs the entry point of `demo`, returning the text to report
    ///
    /// `engine` must hold the compiled `demo` module.
    pub fn run(&self, engine: &impl Engine, demo: &DemoModule, args: &[i32]) -> Option<String> {
        match self {
            Demo::Add => {
                let f: extern "C" fn(i32) -> i32 = unsafe { engine.get(demo.entry) }?;
                let n = args.first().copied().unwrap_or(41);
                Some(format!("add({}) = {}", n, f(n)))
            }
            Demo::Hello => {
                let f: extern "C" fn() = unsafe { engine.get(demo.entry) }?;
                f();
                // SAFETY: flushing every C stream
                unsafe { fflush(std::ptr::null_mut()) };
                Some(String::new())
            }
            Demo::Count => {
                let f: extern "C" fn(i32) = unsafe { engine.get(demo.entry) }?;
                f(args.first().copied().unwrap_or(3));
                Some(String::new())
            }
            Demo::Sum => {
                let f: extern "C" fn(*const i32, i32) -> i32 = unsafe { engine.get(demo.entry) }?;
                let values: Vec<i32> = if args.is_empty() {
                    vec![1, 2, 3, 4, 5, 6]
                } else {
                    args.to_vec()
                };
                let total = f(values.as_ptr(), values.len() as i32);
                Some(format!("sum({:?}) = {}", values, total))
            }
        }
    }
}

fn build_add() -> DemoModule {
    let mut module = Module::new();
    let ty = module.add_function_type(FunctionType::new(Type::Int32, vec![Type::Int32]));
    let add = module.add_function(ty);
    let entry = module.add_block(add);

    let mut b = module.builder(add, entry);
    let n = b.getarg(0);
    let one = b.const_int(1, Type::Int32);
    let sum = b.binop(BinopOp::Add, n, one);
    b.ret(sum);

    DemoModule { module, entry: add }
}

fn build_hello() -> DemoModule {
    let mut module = Module::new();
    let printf_ty = module.add_function_type(
        FunctionType::new(Type::Int32, vec![Type::Pointer]).with_variadic(true),
    );
    let printf_fn = module.add_external_function(
        printf_ty,
        printf as unsafe extern "C" fn(*const c_char, ...) -> c_int as usize,
    );

    let hello_ty = module.add_function_type(FunctionType::new(Type::Void, vec![]));
    let hello = module.add_function(hello_ty);
    let entry = module.add_block(hello);

    let mut b = module.builder(hello, entry);
    let text = b.const_ptr(HELLO.as_ptr() as usize);
    b.call(printf_fn, &[text]);
    b.ret_void();

    DemoModule { module, entry: hello }
}

fn build_count() -> DemoModule {
    let mut module = Module::new();
    let report_ty = module.add_function_type(FunctionType::new(Type::Void, vec![Type::Int32]));
    let report_fn = module.add_external_function(report_ty, report as extern "C" fn(i32) as usize);

    let count = module.add_function(report_ty);
    let init = module.add_block(count);
    let header = module.add_block(count);
    let body = module.add_block(count);
    let exit = module.add_block(count);

    let mut b = module.builder(count, init);
    let start = b.getarg(0);
    b.jmp(header);

    b.set_block(header);
    let i = b.phi(Type::Int32);
    let zero = b.const_int(0, Type::Int32);
    let more = b.intcmp(IntCmpOp::SGt, i, zero);
    b.jmpif(more, body, exit);

    b.set_block(body);
    b.call(report_fn, &[i]);
    let one = b.const_int(1, Type::Int32);
    let next = b.binop(BinopOp::Sub, i, one);
    b.jmp(header);

    b.set_block(exit);
    b.ret_void();

    b.add_incoming(i, init, start);
    b.add_incoming(i, body, next);

    DemoModule { module, entry: count }
}

fn build_sum() -> DemoModule {
    let mut module = Module::new();
    let ty = module.add_function_type(FunctionType::new(
        Type::Int32,
        vec![Type::Pointer, Type::Int32],
    ));
    let sum = module.add_function(ty);
    let init = module.add_block(sum);
    let header = module.add_block(sum);
    let body = module.add_block(sum);
    let exit = module.add_block(sum);

    let mut b = module.builder(sum, init);
    let array = b.getarg(0);
    let size = b.getarg(1);
    let zero = b.const_int(0, Type::Int32);
    b.jmp(header);

    b.set_block(header);
    let i = b.phi(Type::Int32);
    let total = b.phi(Type::Int32);
    let more = b.intcmp(IntCmpOp::SLt, i, size);
    b.jmpif(more, body, exit);

    b.set_block(body);
    let elem = b.array_get(array, i, Type::Int32.size_bytes() as u64, Type::Int32);
    let total_next = b.binop(BinopOp::Add, total, elem);
    let one = b.const_int(1, Type::Int32);
    let i_next = b.binop(BinopOp::Add, i, one);
    b.jmp(header);

    b.set_block(exit);
    b.ret(total);

    b.add_incoming(i, init, zero);
    b.add_incoming(i, body, i_next);
    b.add_incoming(total, init, zero);
    b.add_incoming(total, body, total_next);

    DemoModule { module, entry: sum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fahrenheit_codegen::{Backend, CraneliftBackend};
    use fahrenheit_ir::verify_module;

    const ALL: [Demo; 4] = [Demo::Add, Demo::Hello, Demo::Count, Demo::Sum];

    #[test]
    fn test_demos_verify() {
        for demo in ALL {
            let built = demo.build();
            assert!(verify_module(&built.module).is_ok(), "{} should verify", demo.name());
        }
    }

    #[test]
    fn test_run_add_and_sum() {
        let add = Demo::Add.build();
        let engine = CraneliftBackend::new().compile(&add.module).expect("compile");
        assert_eq!(Demo::Add.run(&engine, &add, &[1]).as_deref(), Some("add(1) = 2"));

        let sum = Demo::Sum.build();
        let engine = CraneliftBackend::new().compile(&sum.module).expect("compile");
        assert_eq!(
            Demo::Sum.run(&engine, &sum, &[]).as_deref(),
            Some("sum([1, 2, 3, 4, 5, 6]) = 21")
        );
        assert_eq!(
            Demo::Sum.run(&engine, &sum, &[10, -4]).as_deref(),
            Some("sum([10, -4]) = 6")
        );
    }

    #[test]
    fn test_print_count() {
        let text = Demo::Count.build().module.to_string();
        assert!(text.contains("external function @01 : i32 -> void"));
        assert!(text.contains("phi [bb1 (i32 $001)], [bb3 (i32 $004)]"));
        assert!(text.contains("call @01 (i32 $002)"));
    }
}
