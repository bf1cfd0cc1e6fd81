//! End-to-end tests for the Fahrenheit JIT
//!
//! This crate drives the complete pipeline:
//! Builder → IR Module → Verifier → Cranelift backend → native call

use fahrenheit_codegen::{Backend, CraneliftBackend, CraneliftEngine};
use fahrenheit_error::{Diagnostic, VerifyError};
use fahrenheit_ir::{verify_module, Builder, FuncId, FunctionType, Module, Type};

/// Builds a module with one defined function and hands its entry block to `body`
pub fn build(params: Vec<Type>, ret: Type, body: impl FnOnce(&mut Builder<'_>)) -> (Module, FuncId) {
    let mut module = Module::new();
    let ty = module.add_function_type(FunctionType::new(ret, params));
    let func = module.add_function(ty);
    let entry = module.add_block(func);
    body(&mut module.builder(func, entry));
    (module, func)
}

/// Verifies a module, returning the composed message on failure
pub fn verify(module: &Module) -> Result<(), String> {
    verify_module(module).map_err(|err| err.to_string())
}

/// Verifies and compiles a module, panicking with the rendered diagnostic
pub fn compile(module: &Module) -> CraneliftEngine {
    if let Err(err) = verify_module(module) {
        panic!("{}", render(&err));
    }
    match CraneliftBackend::new().compile(module) {
        Ok(engine) => engine,
        Err(err) => panic!("{}", Diagnostic::from(&err).render(false)),
    }
}

fn render(err: &VerifyError) -> String {
    Diagnostic::from(err).render(false)
}

/// Asserts that verification fails with exactly `expected`
pub fn assert_verify_fails(module: &Module, expected: &str) {
    match verify(module) {
        Ok(()) => panic!("expected verification to fail with: {}", expected),
        Err(message) => assert_eq!(message, expected),
    }
}

/// Asserts that the printed module contains `expected`
pub fn assert_ir_contains(module: &Module, expected: &str) {
    let text = module.to_string();
    if !text.contains(expected) {
        panic!("expected IR to contain:\n{}\n\nGot:\n{}", expected, text);
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use fahrenheit_codegen::Engine;
    use fahrenheit_error::{VerifyErrorKind, VERIFY_BUFFER_SIZE};
    use fahrenheit_ir::{BinopOp, BlockId, CastOp, IntCmpOp};
    use pretty_assertions::assert_eq;

    // ==================== Scenarios ====================

    #[test]
    fn test_add_one_runs() {
        let (module, func) = build(vec![Type::Int32], Type::Int32, |b| {
            let n = b.getarg(0);
            let one = b.const_int(1, Type::Int32);
            let sum = b.binop(BinopOp::Add, n, one);
            b.ret(sum);
        });
        assert_eq!(verify(&module), Ok(()));

        let engine = compile(&module);
        let f: extern "C" fn(i32) -> i32 = unsafe { engine.get(func) }.expect("pointer");
        for n in [-1000, -1, 0, 1, 41, i32::MAX - 1] {
            assert_eq!(f(n), n + 1);
        }
    }

    #[test]
    fn test_store_without_terminator() {
        let (module, _) = build(vec![Type::Pointer], Type::Void, |b| {
            let p = b.getarg(0);
            let v = b.const_int(3, Type::Int32);
            b.store(p, v);
        });
        assert_verify_fails(
            &module,
            "function 1, basic block 1, instruction 2: basic block not terminated",
        );
    }

    #[test]
    fn test_call_to_later_function() {
        let mut module = Module::new();
        let ty = module.add_function_type(FunctionType::new(Type::Void, vec![]));
        let caller = module.add_function(ty);
        let callee = module.add_function(ty);

        let entry = module.add_block(caller);
        let mut b = module.builder(caller, entry);
        b.call(callee, &[]);
        b.ret_void();

        let entry = module.add_block(callee);
        module.builder(callee, entry).ret_void();

        assert_verify_fails(
            &module,
            "function 1, basic block 1, instruction 1: calling function not declared",
        );
    }

    #[test]
    fn test_phi_in_entry_block() {
        let (module, _) = build(vec![], Type::Int32, |b| {
            let phi = b.phi(Type::Int32);
            b.ret(phi);
        });
        assert_verify_fails(
            &module,
            "function 1, basic block 1, instruction 1: phi instruction in the first block",
        );
    }

    // ==================== Verifier properties ====================

    #[test]
    fn test_type_mismatches() {
        let (module, _) = build(vec![Type::Int32, Type::Int16], Type::Bool, |b| {
            let x = b.getarg(0);
            let y = b.getarg(1);
            let c = b.intcmp(IntCmpOp::Eq, x, y);
            b.ret(c);
        });
        assert_verify_fails(&module, "function 1, basic block 1, instruction 3: type mismatch in cmp");

        let (module, _) = build(vec![Type::Int32], Type::Void, |b| {
            let x = b.getarg(0);
            b.ret(x);
        });
        assert_verify_fails(&module, "function 1, basic block 1, instruction 2: return type missmatch");

        let (module, _) = build(vec![], Type::Int64, |b| {
            b.ret_void();
        });
        assert_verify_fails(&module, "function 1, basic block 1, instruction 1: return type missmatch");
    }

    #[test]
    fn test_functions_and_blocks_by_index() {
        let mut module = Module::new();
        let mut expected = Vec::new();
        for n in 0..5 {
            let params = vec![Type::Int64; n];
            let ty = module.add_function_type(FunctionType::new(Type::Int64, params));
            let func = module.add_function(ty);
            let blocks: Vec<BlockId> = (0..=n).map(|_| module.add_block(func)).collect();
            expected.push((func, ty, blocks));
        }

        assert_eq!(module.functions().len(), 5);
        for (n, (func, ty, blocks)) in expected.into_iter().enumerate() {
            assert_eq!(func, FuncId(n));
            let function = module.function(func).expect("function");
            assert_eq!(function.ty, ty);
            assert_eq!(function.blocks().len(), n + 1);
            assert_eq!(blocks, (0..=n).map(BlockId).collect::<Vec<_>>());
            assert_eq!(module.signature(func).map(|sig| sig.params.len()), Some(n));
        }
    }

    #[test]
    fn test_verification_is_repeatable() {
        let (module, _) = build(vec![Type::Double, Type::Float], Type::Double, |b| {
            let x = b.getarg(0);
            let y = b.getarg(1);
            let sum = b.binop(BinopOp::Add, x, y);
            b.ret(sum);
        });
        let printed = module.to_string();

        let first = verify_module(&module).expect_err("float width mismatch");
        let second = verify_module(&module).expect_err("float width mismatch");
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first.kind, VerifyErrorKind::BinopTypeMismatch);
        assert_eq!(module.to_string(), printed);
    }

    #[test]
    fn test_message_fits_buffer() {
        let (module, _) = build(vec![], Type::Void, |b| {
            b.const_int(0, Type::Int8);
        });
        let err = verify_module(&module).expect_err("unterminated");
        assert!(err.message().len() < VERIFY_BUFFER_SIZE);
        assert_eq!(err.to_string(), "function 1, basic block 1: basic block not terminated");
        assert!(render(&err).starts_with("error[EV025]: basic block not terminated\n"));
    }

    // ==================== Compiled programs ====================

    #[test]
    fn test_array_sum() {
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
        let elem = b.array_get(array, i, 4, Type::Int32);
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

        let engine = compile(&module);
        let f: extern "C" fn(*const i32, i32) -> i32 = unsafe { engine.get(sum) }.expect("pointer");
        let data = [1, 2, 3, 4, 5, 6];
        assert_eq!(f(data.as_ptr(), data.len() as i32), 21);
        assert_eq!(f(data.as_ptr(), 0), 0);
    }

    #[test]
    fn test_array_set_and_fields() {
        // p[i] = v; return the i16 field at byte offset 2 of the first element
        let (module, func) = build(
            vec![Type::Pointer, Type::Int64, Type::Int32],
            Type::Int16,
            |b| {
                let p = b.getarg(0);
                let i = b.getarg(1);
                let v = b.getarg(2);
                b.array_set(p, i, 4, v);
                let field = b.field_get(p, 2, Type::Int16);
                b.ret(field);
            },
        );
        let engine = compile(&module);
        let f: extern "C" fn(*mut i32, i64, i32) -> i16 = unsafe { engine.get(func) }.expect("pointer");

        let mut data = [0i32; 3];
        assert_eq!(f(data.as_mut_ptr(), 2, 99), 0);
        assert_eq!(data, [0, 0, 99]);

        data[0] = 0x0005_0000;
        assert_eq!(f(data.as_mut_ptr(), 1, 7), 5);
        assert_eq!(data, [0x0005_0000, 7, 99]);
    }

    #[test]
    fn test_parallel_phi_swap() {
        // (a, b) = (b, a) on every iteration of a do-while loop
        let mut module = Module::new();
        let ty = module.add_function_type(FunctionType::new(
            Type::Int64,
            vec![Type::Int64, Type::Int64, Type::Int64],
        ));
        let func = module.add_function(ty);
        let entry = module.add_block(func);
        let body = module.add_block(func);
        let exit = module.add_block(func);

        let mut b = module.builder(func, entry);
        let a0 = b.getarg(0);
        let b0 = b.getarg(1);
        let n = b.getarg(2);
        let zero = b.const_int(0, Type::Int64);
        b.jmp(body);

        b.set_block(body);
        let x = b.phi(Type::Int64);
        let y = b.phi(Type::Int64);
        let k = b.phi(Type::Int64);
        let one = b.const_int(1, Type::Int64);
        let k_next = b.binop(BinopOp::Add, k, one);
        let more = b.intcmp(IntCmpOp::SLt, k_next, n);
        b.jmpif(more, body, exit);
        b.add_incoming(x, entry, a0);
        b.add_incoming(x, body, y);
        b.add_incoming(y, entry, b0);
        b.add_incoming(y, body, x);
        b.add_incoming(k, entry, zero);
        b.add_incoming(k, body, k_next);

        b.set_block(exit);
        let ten = b.const_int(10, Type::Int64);
        let shifted = b.binop(BinopOp::Mul, x, ten);
        let packed = b.binop(BinopOp::Add, shifted, y);
        b.ret(packed);

        let engine = compile(&module);
        let f: extern "C" fn(i64, i64, i64) -> i64 = unsafe { engine.get(func) }.expect("pointer");
        // the body swaps the pair once per taken back edge, n - 1 times
        assert_eq!(f(1, 2, 1), 12);
        assert_eq!(f(1, 2, 2), 21);
        assert_eq!(f(1, 2, 3), 12);
    }

    extern "C" fn scale(x: f64, factor: i32) -> f64 {
        x * factor as f64
    }

    #[test]
    fn test_external_with_mixed_arguments() {
        let mut module = Module::new();
        let scale_ty = module.add_function_type(FunctionType::new(
            Type::Double,
            vec![Type::Double, Type::Int32],
        ));
        let ext = module.add_external_function(scale_ty, scale as extern "C" fn(f64, i32) -> f64 as usize);

        let main_ty = module.add_function_type(FunctionType::new(Type::Int32, vec![Type::Int32]));
        let main = module.add_function(main_ty);
        let entry = module.add_block(main);
        let mut b = module.builder(main, entry);
        let n = b.getarg(0);
        let half = b.const_float(0.5, Type::Double);
        let scaled = b.call(ext, &[half, n]);
        let truncated = b.cast(CastOp::FloatToSInt, scaled, Type::Int32);
        b.ret(truncated);

        let engine = compile(&module);
        let f: extern "C" fn(i32) -> i32 = unsafe { engine.get(main) }.expect("pointer");
        assert_eq!(f(9), 4);
        assert_eq!(f(-9), -4);
    }

    #[cfg(all(target_arch = "x86_64", unix))]
    #[test]
    fn test_variadic_external() {
        use std::ffi::{c_char, c_int, CStr};

        extern "C" {
            fn snprintf(buf: *mut c_char, size: usize, format: *const c_char, ...) -> c_int;
        }
        static FORMAT: &[u8] = b"%d-%ld\0";

        let mut module = Module::new();
        let snprintf_ty = module.add_function_type(
            FunctionType::new(Type::Int32, vec![Type::Pointer, Type::Int64, Type::Pointer])
                .with_variadic(true),
        );
        let ext = module.add_external_function(
            snprintf_ty,
            snprintf as unsafe extern "C" fn(*mut c_char, usize, *const c_char, ...) -> c_int
                as usize,
        );
        let main_ty = module.add_function_type(FunctionType::new(
            Type::Int32,
            vec![Type::Pointer, Type::Int32, Type::Int64],
        ));
        let main = module.add_function(main_ty);
        let entry = module.add_block(main);
        let mut b = module.builder(main, entry);
        let buf = b.getarg(0);
        let x = b.getarg(1);
        let y = b.getarg(2);
        let size = b.const_int(32, Type::Int64);
        let format = b.const_ptr(FORMAT.as_ptr() as usize);
        let written = b.call(ext, &[buf, size, format, x, y]);
        b.ret(written);

        assert_ir_contains(&module, "external function @01 : ptr, i64, ptr, ... -> i32");

        let engine = compile(&module);
        let f: extern "C" fn(*mut c_char, i32, i64) -> i32 = unsafe { engine.get(main) }.expect("pointer");
        let mut buffer = [0 as c_char; 32];
        assert_eq!(f(buffer.as_mut_ptr(), 12, -3), 5);
        let text = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        assert_eq!(text.to_str(), Ok("12--3"));
    }

    #[test]
    fn test_engine_outlives_module() {
        let (module, func) = build(vec![Type::Int64], Type::Int64, |b| {
            let n = b.getarg(0);
            let two = b.const_int(2, Type::Int64);
            let r = b.binop(BinopOp::Shl, n, two);
            b.ret(r);
        });
        let engine = compile(&module);
        drop(module);

        let f: extern "C" fn(i64) -> i64 = unsafe { engine.get(func) }.expect("pointer");
        assert_eq!(f(5), 20);
        assert!(engine.function(FuncId(1)).is_none());
    }

    #[test]
    fn test_printed_pipeline_module() {
        let (module, _) = build(vec![Type::Pointer, Type::Int64], Type::Int8, |b| {
            let p = b.getarg(0);
            let i = b.getarg(1);
            let v = b.array_get(p, i, 1, Type::Int8);
            b.ret(v);
        });
        assert_eq!(
            module.to_string(),
            "Fahrenheit module\n\
             function @01 : ptr, i64 -> i8\n \
             bb1\n  \
             $001 = getarg 0\n  \
             $002 = getarg 1\n  \
             $003 = binop (i64 $002) * (const i64 1)\n  \
             $004 = offset (ptr $001) + (i64 $003)\n  \
             $005 = load i8 from (ptr $004)\n         \
             ret (i8 $005)\n\
             \n\
             .\n"
        );
    }
}
