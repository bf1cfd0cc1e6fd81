//! LLVM Backend for the Fahrenheit IR
//!
//! Builds an LLVM module through inkwell and runs it on the MCJIT
//! execution engine. Requires LLVM 17 to be installed on the system.
//!
//! # Setup
//!
//! 1. Install LLVM 17 from https://llvm.org/releases/
//! 2. Set environment variable: LLVM_SYS_170_PREFIX=/path/to/llvm
//! 3. Build with: cargo build --features llvm
//!
//! # Example
//!
//! ```rust,ignore
//! use fahrenheit_codegen::{Backend, Engine, LlvmBackend, LlvmContext};
//!
//! let context = LlvmContext::create();
//! let engine = LlvmBackend::new(&context).compile(&module)?;
//! let inc: extern "C" fn(i32) -> i32 = unsafe { engine.get(inc_id) }.unwrap();
//! ```

use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FloatType, FunctionType as LlvmFunctionType, IntType, PointerType};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FloatValue, FunctionValue, IntValue, PhiValue, PointerValue};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate, OptimizationLevel};
use parking_lot::{const_mutex, Mutex, Once};
use tracing::{debug, info};

use fahrenheit_ir::{
    BinopOp, BlockId, CastOp, Constant, FpCmpOp, FuncId, Function, FunctionType, Instruction,
    IntCmpOp, Module as IrModule, Type, Value,
};

use crate::{Backend, CodegenError, CompileOptions, Engine, RawFunction, Result};

pub use inkwell::context::Context as LlvmContext;

static INIT: Once = Once::new();
static INIT_ERROR: Mutex<Option<String>> = const_mutex(None);

/// Initializes the native LLVM target once per process
pub fn initialize() -> Result<()> {
    INIT.call_once(|| {
        if let Err(err) = Target::initialize_native(&InitializationConfig::default()) {
            *INIT_ERROR.lock() = Some(err);
        }
    });
    match INIT_ERROR.lock().as_ref() {
        Some(err) => Err(CodegenError::Init(err.clone())),
        None => Ok(()),
    }
}

fn llvm(err: BuilderError) -> CodegenError {
    CodegenError::Llvm(err.to_string())
}

fn optimization_level(level: u8) -> OptimizationLevel {
    match level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        2 => OptimizationLevel::Default,
        _ => OptimizationLevel::Aggressive,
    }
}

/// LLVM MCJIT backend
pub struct LlvmBackend<'ctx> {
    context: &'ctx Context,
    options: CompileOptions,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self::with_options(context, CompileOptions::default())
    }

    pub fn with_options(context: &'ctx Context, options: CompileOptions) -> Self {
        Self { context, options }
    }

    fn fn_type(&self, ty: &FunctionType) -> LlvmFunctionType<'ctx> {
        let params: Vec<BasicMetadataTypeEnum<'ctx>> = ty
            .params
            .iter()
            .filter_map(|p| basic_type(self.context, *p))
            .map(Into::into)
            .collect();
        match basic_type(self.context, ty.ret) {
            Some(ret) => ret.fn_type(&params, ty.variadic),
            None => self.context.void_type().fn_type(&params, ty.variadic),
        }
    }
}

impl<'ctx> Backend for LlvmBackend<'ctx> {
    type Engine = LlvmEngine<'ctx>;

    fn name(&self) -> &'static str {
        "llvm"
    }

    fn compile(&self, module: &IrModule) -> Result<LlvmEngine<'ctx>> {
        initialize()?;

        let llvm_module = self.context.create_module("fahrenheit");
        let builder = self.context.create_builder();

        let mut functions = Vec::with_capacity(module.functions().len());
        for (index, function) in module.functions().iter().enumerate() {
            let ty = module
                .function_type(function.ty)
                .ok_or_else(|| CodegenError::invalid_ir(index, "invalid function type"))?;
            functions.push(llvm_module.add_function(&format!("f{}", index), self.fn_type(ty), None));
        }

        for (index, function) in module.functions().iter().enumerate() {
            if function.is_external() {
                continue;
            }
            debug!(function = index, backend = "llvm", "lowering function");
            FunctionLowering {
                context: self.context,
                id: FuncId(index),
                function,
                builder: &builder,
                llvm_fn: functions[index],
                functions: &functions,
                blocks: Vec::new(),
                values: Vec::new(),
                phis: Vec::new(),
            }
            .lower()?;
        }

        if self.options.dump_ir {
            debug!("llvm IR:\n{}", llvm_module.print_to_string().to_string());
        }

        llvm_module
            .verify()
            .map_err(|err| CodegenError::Verification(err.to_string()))?;

        let engine = llvm_module
            .create_jit_execution_engine(optimization_level(self.options.opt_level))
            .map_err(|err| CodegenError::Llvm(err.to_string()))?;

        let mut pointers = Vec::with_capacity(functions.len());
        for (index, (function, value)) in module.functions().iter().zip(&functions).enumerate() {
            match function.address() {
                Some(address) => {
                    engine.add_global_mapping(value, address);
                    pointers.push(address as RawFunction);
                }
                None => {
                    let address = engine
                        .get_function_address(&format!("f{}", index))
                        .map_err(|err| CodegenError::Llvm(err.to_string()))?;
                    pointers.push(address as RawFunction);
                }
            }
        }

        info!(
            functions = pointers.len(),
            opt_level = self.options.opt_level,
            "compiled module with llvm"
        );
        Ok(LlvmEngine {
            engine,
            functions: pointers,
        })
    }
}

/// Code compiled by [`LlvmBackend`], freed with the execution engine
pub struct LlvmEngine<'ctx> {
    engine: ExecutionEngine<'ctx>,
    functions: Vec<RawFunction>,
}

impl<'ctx> LlvmEngine<'ctx> {
    pub fn execution_engine(&self) -> &ExecutionEngine<'ctx> {
        &self.engine
    }
}

impl Engine for LlvmEngine<'_> {
    fn functions(&self) -> &[RawFunction] {
        &self.functions
    }
}

#[allow(deprecated)]
fn pointer_type(context: &Context) -> PointerType<'_> {
    context.i8_type().ptr_type(AddressSpace::default())
}

fn basic_type(context: &Context, ty: Type) -> Option<BasicTypeEnum<'_>> {
    Some(match ty {
        Type::Bool => context.bool_type().into(),
        Type::Int8 => context.i8_type().into(),
        Type::Int16 => context.i16_type().into(),
        Type::Int32 => context.i32_type().into(),
        Type::Int64 => context.i64_type().into(),
        Type::Float => context.f32_type().into(),
        Type::Double => context.f64_type().into(),
        Type::Pointer => pointer_type(context).into(),
        Type::Void => return None,
    })
}

fn int_predicate(op: IntCmpOp) -> IntPredicate {
    match op {
        IntCmpOp::Eq => IntPredicate::EQ,
        IntCmpOp::Ne => IntPredicate::NE,
        IntCmpOp::ULe => IntPredicate::ULE,
        IntCmpOp::ULt => IntPredicate::ULT,
        IntCmpOp::UGe => IntPredicate::UGE,
        IntCmpOp::UGt => IntPredicate::UGT,
        IntCmpOp::SLe => IntPredicate::SLE,
        IntCmpOp::SLt => IntPredicate::SLT,
        IntCmpOp::SGe => IntPredicate::SGE,
        IntCmpOp::SGt => IntPredicate::SGT,
    }
}

fn float_predicate(op: FpCmpOp) -> FloatPredicate {
    match op {
        FpCmpOp::OEq => FloatPredicate::OEQ,
        FpCmpOp::ONe => FloatPredicate::ONE,
        FpCmpOp::OLe => FloatPredicate::OLE,
        FpCmpOp::OLt => FloatPredicate::OLT,
        FpCmpOp::OGe => FloatPredicate::OGE,
        FpCmpOp::OGt => FloatPredicate::OGT,
        FpCmpOp::UEq => FloatPredicate::UEQ,
        FpCmpOp::UNe => FloatPredicate::UNE,
        FpCmpOp::ULe => FloatPredicate::ULE,
        FpCmpOp::ULt => FloatPredicate::ULT,
        FpCmpOp::UGe => FloatPredicate::UGE,
        FpCmpOp::UGt => FloatPredicate::UGT,
    }
}

/// Lowering state of one defined function
struct FunctionLowering<'a, 'ctx> {
    context: &'ctx Context,
    id: FuncId,
    function: &'a Function,
    builder: &'a Builder<'ctx>,
    llvm_fn: FunctionValue<'ctx>,
    functions: &'a [FunctionValue<'ctx>],
    blocks: Vec<BasicBlock<'ctx>>,
    values: Vec<Vec<Option<BasicValueEnum<'ctx>>>>,
    /// Phis waiting for their incoming edges
    phis: Vec<(BlockId, Value, PhiValue<'ctx>)>,
}

impl<'a, 'ctx> FunctionLowering<'a, 'ctx> {
    fn lower(mut self) -> Result<()> {
        let function = self.function;
        let ir_blocks = function.blocks();
        if ir_blocks.is_empty() {
            return Err(self.invalid("function without basic blocks"));
        }
        for (index, bb) in ir_blocks.iter().enumerate() {
            if bb.terminator().is_none() {
                return Err(self.invalid(format!("basic block {} not terminated", index + 1)));
            }
        }

        for (index, bb) in ir_blocks.iter().enumerate() {
            let block = self.context.append_basic_block(self.llvm_fn, &format!("bb{}", index + 1));
            self.blocks.push(block);
            self.values.push(vec![None; bb.len()]);
        }

        // definitions come before their uses in reverse postorder,
        // except along back edges which only phis may cross
        let order = function.reverse_postorder();
        let mut reached = vec![false; ir_blocks.len()];
        for block in &order {
            reached[block.0] = true;
        }

        for block in order {
            self.builder.position_at_end(self.blocks[block.0]);
            for (index, instr) in ir_blocks[block.0].instructions().iter().enumerate() {
                if self.instruction(block, index, instr)? {
                    break;
                }
            }
        }
        for (index, reached) in reached.iter().enumerate() {
            if !reached {
                self.builder.position_at_end(self.blocks[index]);
                self.builder.build_unreachable().map_err(llvm)?;
            }
        }

        let phis = std::mem::take(&mut self.phis);
        for (block, at, phi) in phis {
            let Some(Instruction::Phi { incoming, .. }) = function.instruction(at) else {
                continue;
            };
            for edge in incoming {
                let Some(pred) = ir_blocks.get(edge.block.0) else {
                    return Err(self.invalid(format!("invalid basic block {}", edge.block.0)));
                };
                if !reached[edge.block.0] {
                    continue;
                }
                let value = self.operand(edge.value)?;
                // one entry per CFG edge, jmpif may target the same block twice
                let edges = pred.successors().iter().filter(|s| **s == block).count();
                for _ in 0..edges {
                    phi.add_incoming(&[(&value, self.blocks[edge.block.0])]);
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, detail: impl Into<String>) -> CodegenError {
        CodegenError::invalid_ir(self.id.0, detail)
    }

    fn block(&self, block: BlockId) -> Result<BasicBlock<'ctx>> {
        self.blocks
            .get(block.0)
            .copied()
            .ok_or_else(|| self.invalid(format!("invalid basic block {}", block.0)))
    }

    fn basic_type(&self, ty: Type) -> Result<BasicTypeEnum<'ctx>> {
        basic_type(self.context, ty).ok_or_else(|| self.invalid("void has no machine type"))
    }

    fn int_type(&self, ty: Type) -> Result<IntType<'ctx>> {
        match self.basic_type(ty)? {
            BasicTypeEnum::IntType(ty) => Ok(ty),
            _ => Err(self.invalid(format!("{} is not an integer type", ty))),
        }
    }

    fn float_type(&self, ty: Type) -> Result<FloatType<'ctx>> {
        match self.basic_type(ty)? {
            BasicTypeEnum::FloatType(ty) => Ok(ty),
            _ => Err(self.invalid(format!("{} is not a float type", ty))),
        }
    }

    fn operand(&self, value: Value) -> Result<BasicValueEnum<'ctx>> {
        let function = self.function;
        let instr = function
            .instruction(value)
            .ok_or_else(|| self.invalid("operand does not refer to an instruction"))?;
        match instr {
            Instruction::Const { ty, value: payload } => self.constant(*ty, payload),
            _ => self
                .values
                .get(value.block)
                .and_then(|block| block.get(value.instr))
                .copied()
                .flatten()
                .ok_or_else(|| self.invalid(format!("{} used without a value", instr.mnemonic()))),
        }
    }

    fn int(&self, value: Value) -> Result<IntValue<'ctx>> {
        match self.operand(value)? {
            BasicValueEnum::IntValue(v) => Ok(v),
            _ => Err(self.invalid("expected an integer operand")),
        }
    }

    fn float(&self, value: Value) -> Result<FloatValue<'ctx>> {
        match self.operand(value)? {
            BasicValueEnum::FloatValue(v) => Ok(v),
            _ => Err(self.invalid("expected a float operand")),
        }
    }

    fn pointer(&self, value: Value) -> Result<PointerValue<'ctx>> {
        match self.operand(value)? {
            BasicValueEnum::PointerValue(v) => Ok(v),
            _ => Err(self.invalid("expected a pointer operand")),
        }
    }

    fn constant(&self, ty: Type, payload: &Constant) -> Result<BasicValueEnum<'ctx>> {
        match payload {
            Constant::Int(v) if ty.is_int() => {
                let bits = ty.bits();
                let v = if bits >= 64 { *v } else { *v & ((1u64 << bits) - 1) };
                Ok(self.int_type(ty)?.const_int(v, false).into())
            }
            Constant::Float(v) if ty.is_float() => Ok(self.float_type(ty)?.const_float(*v).into()),
            Constant::Ptr(p) if ty.is_pointer() => Ok(self
                .context
                .i64_type()
                .const_int(*p as u64, false)
                .const_to_pointer(pointer_type(self.context))
                .into()),
            _ => Err(self.invalid(format!("invalid {} constant", ty))),
        }
    }

    /// Lowers one instruction, returns true for terminators
    fn instruction(&mut self, block: BlockId, index: usize, instr: &Instruction) -> Result<bool> {
        let builder = self.builder;
        let function = self.function;

        let value: Option<BasicValueEnum<'ctx>> = match instr {
            Instruction::Const { .. } => None,

            Instruction::GetArg { n, .. } => Some(
                self.llvm_fn
                    .get_nth_param(*n as u32)
                    .ok_or_else(|| self.invalid(format!("argument {} out of range", n)))?,
            ),

            Instruction::Load { ty, addr } => {
                let ptr = self.pointer(*addr)?;
                let ty = self.basic_type(*ty)?;
                Some(builder.build_load(ty, ptr, "").map_err(llvm)?)
            }

            Instruction::Store { addr, val } => {
                let ptr = self.pointer(*addr)?;
                let v = self.operand(*val)?;
                builder.build_store(ptr, v).map_err(llvm)?;
                None
            }

            Instruction::Offset {
                addr,
                offset,
                negative,
            } => {
                let ptr = self.pointer(*addr)?;
                let signed = function.value_type(*offset) != Type::Bool;
                let bytes = builder
                    .build_int_cast_sign_flag(self.int(*offset)?, self.context.i64_type(), signed, "")
                    .map_err(llvm)?;
                let bytes = if *negative {
                    builder.build_int_neg(bytes, "").map_err(llvm)?
                } else {
                    bytes
                };
                // SAFETY: byte offsets on i8 need no inbounds guarantee
                let gep = unsafe { builder.build_gep(self.context.i8_type(), ptr, &[bytes], "") };
                Some(gep.map_err(llvm)?.into())
            }

            Instruction::Cast { ty, op, val } => Some(self.cast(*op, *val, *ty)?),

            Instruction::Binop { ty, op, lhs, rhs } => Some(self.binop(*ty, *op, *lhs, *rhs)?),

            Instruction::IntCmp { op, lhs, rhs } => {
                let (l, r) = match (self.operand(*lhs)?, self.operand(*rhs)?) {
                    (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => (l, r),
                    (BasicValueEnum::PointerValue(l), BasicValueEnum::PointerValue(r)) => {
                        let int = self.context.i64_type();
                        (
                            builder.build_ptr_to_int(l, int, "").map_err(llvm)?,
                            builder.build_ptr_to_int(r, int, "").map_err(llvm)?,
                        )
                    }
                    _ => return Err(self.invalid("type mismatch in intcmp")),
                };
                Some(builder.build_int_compare(int_predicate(*op), l, r, "").map_err(llvm)?.into())
            }

            Instruction::FpCmp { op, lhs, rhs } => {
                let l = self.float(*lhs)?;
                let r = self.float(*rhs)?;
                Some(builder.build_float_compare(float_predicate(*op), l, r, "").map_err(llvm)?.into())
            }

            Instruction::JmpIf {
                cond,
                true_block,
                false_block,
            } => {
                let c = self.int(*cond)?;
                builder
                    .build_conditional_branch(c, self.block(*true_block)?, self.block(*false_block)?)
                    .map_err(llvm)?;
                return Ok(true);
            }

            Instruction::Jmp { dest } => {
                builder.build_unconditional_branch(self.block(*dest)?).map_err(llvm)?;
                return Ok(true);
            }

            Instruction::Select {
                cond,
                true_val,
                false_val,
                ..
            } => {
                let c = self.int(*cond)?;
                let t = self.operand(*true_val)?;
                let f = self.operand(*false_val)?;
                Some(builder.build_select(c, t, f, "").map_err(llvm)?)
            }

            Instruction::Ret { val } => {
                if val.is_null() {
                    builder.build_return(None).map_err(llvm)?;
                } else {
                    let v = self.operand(*val)?;
                    builder.build_return(Some(&v)).map_err(llvm)?;
                }
                return Ok(true);
            }

            Instruction::Call {
                function: callee,
                args,
                ..
            } => {
                let target = self.functions.get(callee.0).copied().ok_or_else(|| {
                    self.invalid(format!("call to undeclared function @{:02}", callee.0 + 1))
                })?;
                let args = args
                    .iter()
                    .map(|a| self.operand(*a).map(BasicMetadataValueEnum::from))
                    .collect::<Result<Vec<_>>>()?;
                let call = builder.build_call(target, &args, "").map_err(llvm)?;
                call.try_as_basic_value().left()
            }

            Instruction::Phi { ty, .. } => {
                let ty = self.basic_type(*ty)?;
                let phi = builder.build_phi(ty, "").map_err(llvm)?;
                self.phis.push((block, Value::new(block, index), phi));
                Some(phi.as_basic_value())
            }
        };

        self.values[block.0][index] = value;
        Ok(false)
    }

    fn cast(&self, op: CastOp, val: Value, to: Type) -> Result<BasicValueEnum<'ctx>> {
        let builder = self.builder;
        let from = self.function.value_type(val);
        if !op.accepts(from, to) {
            return Err(self.invalid("invalid cast"));
        }
        // bool sources are zero-extended whatever the cast's signedness
        let signed = from != Type::Bool;

        Ok(match op {
            CastOp::UIntCast | CastOp::SIntCast => builder
                .build_int_cast_sign_flag(
                    self.int(val)?,
                    self.int_type(to)?,
                    op == CastOp::SIntCast && signed,
                    "",
                )
                .map_err(llvm)?
                .into(),
            CastOp::FloatCast => builder
                .build_float_cast(self.float(val)?, self.float_type(to)?, "")
                .map_err(llvm)?
                .into(),
            CastOp::FloatToUInt => builder
                .build_float_to_unsigned_int(self.float(val)?, self.int_type(to)?, "")
                .map_err(llvm)?
                .into(),
            CastOp::FloatToSInt => builder
                .build_float_to_signed_int(self.float(val)?, self.int_type(to)?, "")
                .map_err(llvm)?
                .into(),
            CastOp::UIntToFloat => builder
                .build_unsigned_int_to_float(self.int(val)?, self.float_type(to)?, "")
                .map_err(llvm)?
                .into(),
            CastOp::SIntToFloat if signed => builder
                .build_signed_int_to_float(self.int(val)?, self.float_type(to)?, "")
                .map_err(llvm)?
                .into(),
            CastOp::SIntToFloat => builder
                .build_unsigned_int_to_float(self.int(val)?, self.float_type(to)?, "")
                .map_err(llvm)?
                .into(),
        })
    }

    fn binop(&self, ty: Type, op: BinopOp, lhs: Value, rhs: Value) -> Result<BasicValueEnum<'ctx>> {
        let builder = self.builder;
        if ty.is_float() {
            let l = self.float(lhs)?;
            let r = self.float(rhs)?;
            let v = match op {
                BinopOp::Add => builder.build_float_add(l, r, ""),
                BinopOp::Sub => builder.build_float_sub(l, r, ""),
                BinopOp::Mul => builder.build_float_mul(l, r, ""),
                BinopOp::Div => builder.build_float_div(l, r, ""),
                _ => return Err(self.invalid(format!("binop {} on {}", op, ty))),
            };
            return Ok(v.map_err(llvm)?.into());
        }

        let l = self.int(lhs)?;
        let r = self.int(rhs)?;
        let v = match op {
            BinopOp::Add => builder.build_int_add(l, r, ""),
            BinopOp::Sub => builder.build_int_sub(l, r, ""),
            BinopOp::Mul => builder.build_int_mul(l, r, ""),
            BinopOp::Div => builder.build_int_signed_div(l, r, ""),
            BinopOp::Rem => builder.build_int_signed_rem(l, r, ""),
            BinopOp::Shl => builder.build_left_shift(l, r, ""),
            BinopOp::Shr => builder.build_right_shift(l, r, true, ""),
            BinopOp::And => builder.build_and(l, r, ""),
            BinopOp::Or => builder.build_or(l, r, ""),
            BinopOp::Xor => builder.build_xor(l, r, ""),
        };
        Ok(v.map_err(llvm)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fahrenheit_ir::verify_module;
    use std::ffi::{c_char, c_int, CStr};

    #[test]
    fn test_add_one() {
        let mut module = IrModule::new();
        let ty = module.add_function_type(FunctionType::new(Type::Int32, vec![Type::Int32]));
        let func = module.add_function(ty);
        let entry = module.add_block(func);
        let mut b = module.builder(func, entry);
        let n = b.getarg(0);
        let one = b.const_int(1, Type::Int32);
        let sum = b.binop(BinopOp::Add, n, one);
        b.ret(sum);
        verify_module(&module).expect("verify");

        let context = LlvmContext::create();
        let engine = LlvmBackend::new(&context).compile(&module).expect("compile");
        let inc: extern "C" fn(i32) -> i32 = unsafe { engine.get(func) }.expect("pointer");
        assert_eq!(inc(41), 42);
    }

    #[test]
    fn test_loop_and_unreachable_block() {
        // sum of 0..n, plus one block nothing jumps to
        let mut module = IrModule::new();
        let ty = module.add_function_type(FunctionType::new(Type::Int64, vec![Type::Int64]));
        let func = module.add_function(ty);
        let entry = module.add_block(func);
        let header = module.add_block(func);
        let body = module.add_block(func);
        let exit = module.add_block(func);
        let dead = module.add_block(func);

        let mut b = module.builder(func, entry);
        let n = b.getarg(0);
        let zero = b.const_int(0, Type::Int64);
        b.jmp(header);

        b.set_block(header);
        let i = b.phi(Type::Int64);
        let acc = b.phi(Type::Int64);
        let more = b.intcmp(IntCmpOp::SLt, i, n);
        b.jmpif(more, body, exit);

        b.set_block(body);
        let acc_next = b.binop(BinopOp::Add, acc, i);
        let one = b.const_int(1, Type::Int64);
        let i_next = b.binop(BinopOp::Add, i, one);
        b.jmp(header);

        b.set_block(exit);
        b.ret(acc);

        b.set_block(dead);
        b.jmp(header);

        b.add_incoming(i, entry, zero);
        b.add_incoming(i, body, i_next);
        b.add_incoming(i, dead, zero);
        b.add_incoming(acc, entry, zero);
        b.add_incoming(acc, body, acc_next);
        b.add_incoming(acc, dead, zero);
        verify_module(&module).expect("verify");

        let context = LlvmContext::create();
        let backend = LlvmBackend::with_options(&context, CompileOptions::default().with_opt_level(2));
        let engine = backend.compile(&module).expect("compile");
        let f: extern "C" fn(i64) -> i64 = unsafe { engine.get(func) }.expect("pointer");
        assert_eq!(f(10), 45);
    }

    extern "C" {
        fn snprintf(buf: *mut c_char, size: usize, format: *const c_char, ...) -> c_int;
    }

    #[test]
    fn test_variadic_external_with_double() {
        let mut module = IrModule::new();
        let snprintf_ty = module.add_function_type(
            FunctionType::new(Type::Int32, vec![Type::Pointer, Type::Int64, Type::Pointer])
                .with_variadic(true),
        );
        let ext = module.add_external_function(
            snprintf_ty,
            snprintf as unsafe extern "C" fn(*mut c_char, usize, *const c_char, ...) -> c_int
                as usize,
        );
        let format = b"%d %.2f\0";

        let main_ty = module.add_function_type(FunctionType::new(Type::Int32, vec![Type::Pointer]));
        let main = module.add_function(main_ty);
        let entry = module.add_block(main);
        let mut b = module.builder(main, entry);
        let buf = b.getarg(0);
        let size = b.const_int(32, Type::Int64);
        let fmt = b.const_ptr(format.as_ptr() as usize);
        let x = b.const_int(7, Type::Int32);
        let y = b.const_float(1.5, Type::Double);
        let written = b.call(ext, &[buf, size, fmt, x, y]);
        b.ret(written);
        verify_module(&module).expect("verify");

        let context = LlvmContext::create();
        let engine = LlvmBackend::new(&context).compile(&module).expect("compile");
        let f: extern "C" fn(*mut c_char) -> i32 = unsafe { engine.get(main) }.expect("pointer");

        let mut buffer = [0 as c_char; 32];
        assert_eq!(f(buffer.as_mut_ptr()), 6);
        let text = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        assert_eq!(text.to_str(), Ok("7 1.50"));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        assert!(initialize().is_ok());
        assert!(initialize().is_ok());
    }
}
