//! Cranelift Backend for the Fahrenheit IR
//!
//! Lowers every function with `cranelift-frontend` and JIT-compiles the
//! whole module for the host ISA.
//!
//! Every IR value with a result becomes a frontend [`Variable`]. Phis are
//! block parameters: each branch passes the incoming values of its target's
//! phis, so all of them are read before any is written. External
//! functions are called indirectly through their host address with a
//! signature built from the actual arguments, which also covers variadic
//! callees that take their extra arguments in registers.

use cranelift::codegen::{self as clif, isa};
use cranelift::prelude::{
    settings, types, AbiParam, Block, Configurable, FloatCC, FunctionBuilder,
    FunctionBuilderContext, InstBuilder, IntCC, MemFlags, Signature, Type as ClifType,
    Value as ClifValue, Variable,
};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId as ClifFuncId, Linkage, Module as _, ModuleError};
use std::cmp::Ordering;
use tracing::{debug, info};

use fahrenheit_ir::{
    BinopOp, BlockId, CastOp, Constant, FpCmpOp, FuncId, Function, FunctionType, Instruction,
    IntCmpOp, Module as IrModule, Type, Value,
};

use crate::{Backend, CodegenError, CompileOptions, Engine, RawFunction, Result};

/// Cranelift JIT backend
#[derive(Debug, Clone, Default)]
pub struct CraneliftBackend {
    options: CompileOptions,
}

impl CraneliftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    fn build_isa(&self) -> Result<isa::OwnedTargetIsa> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", opt_level_setting(self.options.opt_level))
            .map_err(|detail| CodegenError::Module(detail.to_string()))?;

        let isa_builder = cranelift_native::builder()
            .map_err(|detail| CodegenError::UnsupportedTarget(format!("host ISA: {detail}")))?;
        isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|detail| CodegenError::Module(detail.to_string()))
    }

    /// Declares, defines and finalizes every function of `module`
    fn compile_into(&self, jit: &mut JITModule, module: &IrModule) -> Result<Vec<RawFunction>> {
        let ptr_ty = jit.target_config().pointer_type();

        let mut func_ids: Vec<Option<ClifFuncId>> = Vec::with_capacity(module.functions().len());
        for (index, function) in module.functions().iter().enumerate() {
            if function.is_external() {
                func_ids.push(None);
                continue;
            }
            let ty = function_type(module, index, function)?;
            let signature = make_signature(jit, ty, ptr_ty);
            let id = jit
                .declare_function(&format!("f{}", index), Linkage::Export, &signature)
                .map_err(|detail| CodegenError::Module(detail.to_string()))?;
            func_ids.push(Some(id));
        }

        let mut context = jit.make_context();
        let mut builder_context = FunctionBuilderContext::new();

        for (index, function) in module.functions().iter().enumerate() {
            let Some(id) = func_ids[index] else {
                continue;
            };
            let ty = function_type(module, index, function)?;
            context.func.signature = make_signature(jit, ty, ptr_ty);

            debug!(function = index, backend = "cranelift", "lowering function");
            FunctionLowering {
                module,
                id: FuncId(index),
                function,
                builder: FunctionBuilder::new(&mut context.func, &mut builder_context),
                jit: &mut *jit,
                func_ids: &func_ids,
                blocks: Vec::new(),
                var_base: Vec::new(),
                ptr_ty,
            }
            .lower()?;

            if self.options.dump_ir {
                debug!("cranelift IR for @{:02}:\n{}", index + 1, context.func.display());
            }

            jit.define_function(id, &mut context)
                .map_err(|err| define_error(index, err))?;
            jit.clear_context(&mut context);
        }

        jit.finalize_definitions()
            .map_err(|detail| CodegenError::Module(detail.to_string()))?;

        Ok(module
            .functions()
            .iter()
            .zip(&func_ids)
            .map(|(function, id)| match (function.address(), id) {
                (Some(address), _) => address as RawFunction,
                (None, Some(id)) => jit.get_finalized_function(*id),
                (None, None) => std::ptr::null(),
            })
            .collect())
    }
}

impl Backend for CraneliftBackend {
    type Engine = CraneliftEngine;

    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn compile(&self, module: &IrModule) -> Result<CraneliftEngine> {
        let isa = self.build_isa()?;
        let mut jit = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));

        match self.compile_into(&mut jit, module) {
            Ok(functions) => {
                info!(
                    functions = functions.len(),
                    opt_level = self.options.opt_level,
                    "compiled module with cranelift"
                );
                Ok(CraneliftEngine {
                    module: Some(jit),
                    functions,
                })
            }
            Err(err) => {
                // SAFETY: nothing from this module was handed out yet
                unsafe { jit.free_memory() };
                Err(err)
            }
        }
    }
}

/// Code compiled by [`CraneliftBackend`]
pub struct CraneliftEngine {
    module: Option<JITModule>,
    functions: Vec<RawFunction>,
}

impl Engine for CraneliftEngine {
    fn functions(&self) -> &[RawFunction] {
        &self.functions
    }
}

impl Drop for CraneliftEngine {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: pointers handed out by `functions` must not outlive the engine
            unsafe { module.free_memory() };
        }
    }
}

fn opt_level_setting(level: u8) -> &'static str {
    match level {
        0 => "none",
        1 | 2 => "speed",
        _ => "speed_and_size",
    }
}

fn function_type<'m>(module: &'m IrModule, index: usize, function: &Function) -> Result<&'m FunctionType> {
    module
        .function_type(function.ty)
        .ok_or_else(|| CodegenError::invalid_ir(index, "invalid function type"))
}

fn make_signature(jit: &JITModule, ty: &FunctionType, ptr_ty: ClifType) -> Signature {
    let mut signature = jit.make_signature();
    signature
        .params
        .extend(ty.params.iter().filter_map(|param| abi_param(*param, ptr_ty)));
    signature.returns.extend(abi_param(ty.ret, ptr_ty));
    signature
}

/// ABI parameter of an IR type; narrow integers are extended to the register width
fn abi_param(ty: Type, ptr_ty: ClifType) -> Option<AbiParam> {
    let param = AbiParam::new(clif_type(ty, ptr_ty)?);
    Some(match ty {
        Type::Bool => param.uext(),
        Type::Int8 | Type::Int16 => param.sext(),
        _ => param,
    })
}

fn define_error(function: usize, err: ModuleError) -> CodegenError {
    match err {
        ModuleError::Compilation(clif::CodegenError::Verifier(errors)) => {
            CodegenError::Verification(format!("function @{:02}: {}", function + 1, errors))
        }
        other => CodegenError::Module(other.to_string()),
    }
}

/// Machine type of an IR type, `None` for `Void`
fn clif_type(ty: Type, ptr_ty: ClifType) -> Option<ClifType> {
    match ty {
        Type::Bool | Type::Int8 => Some(types::I8),
        Type::Int16 => Some(types::I16),
        Type::Int32 => Some(types::I32),
        Type::Int64 => Some(types::I64),
        Type::Float => Some(types::F32),
        Type::Double => Some(types::F64),
        Type::Pointer => Some(ptr_ty),
        Type::Void => None,
    }
}

/// Keeps the low `bits` of an integer constant
fn mask(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

fn int_cc(op: IntCmpOp) -> IntCC {
    match op {
        IntCmpOp::Eq => IntCC::Equal,
        IntCmpOp::Ne => IntCC::NotEqual,
        IntCmpOp::ULe => IntCC::UnsignedLessThanOrEqual,
        IntCmpOp::ULt => IntCC::UnsignedLessThan,
        IntCmpOp::UGe => IntCC::UnsignedGreaterThanOrEqual,
        IntCmpOp::UGt => IntCC::UnsignedGreaterThan,
        IntCmpOp::SLe => IntCC::SignedLessThanOrEqual,
        IntCmpOp::SLt => IntCC::SignedLessThan,
        IntCmpOp::SGe => IntCC::SignedGreaterThanOrEqual,
        IntCmpOp::SGt => IntCC::SignedGreaterThan,
    }
}

fn float_cc(op: FpCmpOp) -> FloatCC {
    match op {
        FpCmpOp::OEq => FloatCC::Equal,
        FpCmpOp::ONe => FloatCC::OrderedNotEqual,
        FpCmpOp::OLe => FloatCC::LessThanOrEqual,
        FpCmpOp::OLt => FloatCC::LessThan,
        FpCmpOp::OGe => FloatCC::GreaterThanOrEqual,
        FpCmpOp::OGt => FloatCC::GreaterThan,
        FpCmpOp::UEq => FloatCC::UnorderedOrEqual,
        FpCmpOp::UNe => FloatCC::NotEqual,
        FpCmpOp::ULe => FloatCC::UnorderedOrLessThanOrEqual,
        FpCmpOp::ULt => FloatCC::UnorderedOrLessThan,
        FpCmpOp::UGe => FloatCC::UnorderedOrGreaterThanOrEqual,
        FpCmpOp::UGt => FloatCC::UnorderedOrGreaterThan,
    }
}

/// Lowering state of one defined function
struct FunctionLowering<'a> {
    module: &'a IrModule,
    id: FuncId,
    function: &'a Function,
    builder: FunctionBuilder<'a>,
    jit: &'a mut JITModule,
    func_ids: &'a [Option<ClifFuncId>],
    blocks: Vec<Block>,
    /// Variable index of the first instruction of each block
    var_base: Vec<usize>,
    ptr_ty: ClifType,
}

impl<'a> FunctionLowering<'a> {
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

        let mut next = 0;
        for bb in ir_blocks {
            self.var_base.push(next);
            next += bb.len();
        }
        for (b, bb) in ir_blocks.iter().enumerate() {
            for (i, instr) in bb.instructions().iter().enumerate() {
                if instr.is_const() {
                    continue;
                }
                if let Some(ty) = clif_type(instr.ty(), self.ptr_ty) {
                    let var = self.var(b, i);
                    self.builder.declare_var(var, ty);
                }
            }
        }

        for _ in ir_blocks {
            let block = self.builder.create_block();
            self.blocks.push(block);
        }
        let entry = self.blocks[0];
        self.builder.append_block_params_for_function_params(entry);

        // phis lead their block, so phi `i` is block parameter `i`
        for (b, bb) in ir_blocks.iter().enumerate().skip(1) {
            let block = self.blocks[b];
            for phi in bb.instructions().iter().take_while(|i| i.is_phi()) {
                let ty = self.clif_type(phi.ty())?;
                self.builder.append_block_param(block, ty);
            }
        }

        for (b, bb) in ir_blocks.iter().enumerate() {
            let block = self.blocks[b];
            self.builder.switch_to_block(block);
            if b != 0 {
                let params = self.builder.block_params(block).to_vec();
                for (i, param) in params.into_iter().enumerate() {
                    let var = self.var(b, i);
                    self.builder.def_var(var, param);
                }
            }
            for (i, instr) in bb.instructions().iter().enumerate() {
                if self.instruction(b, i, instr)? {
                    break;
                }
            }
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn invalid(&self, detail: impl Into<String>) -> CodegenError {
        CodegenError::invalid_ir(self.id.0, detail)
    }

    fn var(&self, block: usize, instr: usize) -> Variable {
        Variable::from_u32((self.var_base[block] + instr) as u32)
    }

    fn clif_type(&self, ty: Type) -> Result<ClifType> {
        clif_type(ty, self.ptr_ty).ok_or_else(|| self.invalid("void has no machine type"))
    }

    fn target(&self, block: BlockId) -> Result<Block> {
        self.blocks
            .get(block.0)
            .copied()
            .ok_or_else(|| self.invalid(format!("invalid basic block {}", block.0)))
    }

    /// Lowers one instruction, returns true for terminators
    fn instruction(&mut self, b: usize, i: usize, instr: &'a Instruction) -> Result<bool> {
        let function = self.function;
        let result = match instr {
            Instruction::Const { .. } | Instruction::Phi { .. } => None,

            Instruction::GetArg { n, .. } => {
                let entry = self.blocks[0];
                let arg = self.builder.block_params(entry).get(*n).copied();
                Some(arg.ok_or_else(|| self.invalid(format!("argument {} out of range", n)))?)
            }

            Instruction::Load { ty, addr } => {
                let addr = self.value(*addr)?;
                let ty = self.clif_type(*ty)?;
                Some(self.builder.ins().load(ty, MemFlags::new(), addr, 0))
            }

            Instruction::Store { addr, val } => {
                let addr = self.value(*addr)?;
                let val = self.value(*val)?;
                self.builder.ins().store(MemFlags::new(), val, addr, 0);
                None
            }

            Instruction::Offset {
                addr,
                offset,
                negative,
            } => {
                let base = self.value(*addr)?;
                let from = self.clif_type(function.value_type(*offset))?;
                let raw = self.value(*offset)?;
                let bytes = self.resize_int(raw, from, self.ptr_ty, true);
                Some(if *negative {
                    self.builder.ins().isub(base, bytes)
                } else {
                    self.builder.ins().iadd(base, bytes)
                })
            }

            Instruction::Cast { ty, op, val } => {
                let from = function.value_type(*val);
                let v = self.value(*val)?;
                Some(self.cast(*op, from, *ty, v)?)
            }

            Instruction::Binop { ty, op, lhs, rhs } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                Some(self.binop(*ty, *op, l, r)?)
            }

            Instruction::IntCmp { op, lhs, rhs } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                Some(self.builder.ins().icmp(int_cc(*op), l, r))
            }

            Instruction::FpCmp { op, lhs, rhs } => {
                let l = self.value(*lhs)?;
                let r = self.value(*rhs)?;
                Some(self.builder.ins().fcmp(float_cc(*op), l, r))
            }

            Instruction::JmpIf {
                cond,
                true_block,
                false_block,
            } => {
                let cond = self.value(*cond)?;
                let then_args = self.edge_args(b, *true_block)?;
                let else_args = self.edge_args(b, *false_block)?;
                let then_block = self.target(*true_block)?;
                let else_block = self.target(*false_block)?;
                self.builder
                    .ins()
                    .brif(cond, then_block, &then_args, else_block, &else_args);
                return Ok(true);
            }

            Instruction::Jmp { dest } => {
                let args = self.edge_args(b, *dest)?;
                let block = self.target(*dest)?;
                self.builder.ins().jump(block, &args);
                return Ok(true);
            }

            Instruction::Select {
                cond,
                true_val,
                false_val,
                ..
            } => {
                let c = self.value(*cond)?;
                let t = self.value(*true_val)?;
                let f = self.value(*false_val)?;
                Some(self.builder.ins().select(c, t, f))
            }

            Instruction::Ret { val } => {
                if val.is_null() {
                    self.builder.ins().return_(&[]);
                } else {
                    let v = self.value(*val)?;
                    self.builder.ins().return_(&[v]);
                }
                return Ok(true);
            }

            Instruction::Call { function, args, .. } => self.call(*function, args)?,
        };

        if let Some(mut value) = result {
            let ty = instr.ty();
            // bool lives in an i8, only compares and casts already yield 0 or 1
            if ty == Type::Bool
                && !matches!(
                    instr,
                    Instruction::IntCmp { .. } | Instruction::FpCmp { .. } | Instruction::Cast { .. }
                )
            {
                value = self.builder.ins().band_imm(value, 1);
            }
            if clif_type(ty, self.ptr_ty).is_some() {
                let var = self.var(b, i);
                self.builder.def_var(var, value);
            }
        }
        Ok(false)
    }

    /// Current value of an operand, constants are rematerialized at each use
    fn value(&mut self, value: Value) -> Result<ClifValue> {
        let function = self.function;
        let instr = function
            .instruction(value)
            .ok_or_else(|| self.invalid("operand does not refer to an instruction"))?;
        match instr {
            Instruction::Const { ty, value: payload } => self.constant(*ty, payload),
            other if other.ty().is_void() => {
                Err(self.invalid(format!("{} has no value", other.mnemonic())))
            }
            _ => {
                let var = self.var(value.block, value.instr);
                Ok(self.builder.use_var(var))
            }
        }
    }

    fn constant(&mut self, ty: Type, payload: &Constant) -> Result<ClifValue> {
        let clif_ty = self.clif_type(ty)?;
        match payload {
            Constant::Int(v) if ty.is_int() => {
                Ok(self.builder.ins().iconst(clif_ty, mask(*v, ty.bits()) as i64))
            }
            Constant::Float(v) if ty == Type::Float => Ok(self.builder.ins().f32const(*v as f32)),
            Constant::Float(v) if ty == Type::Double => Ok(self.builder.ins().f64const(*v)),
            Constant::Ptr(p) if ty.is_pointer() => Ok(self.builder.ins().iconst(clif_ty, *p as i64)),
            _ => Err(self.invalid(format!("invalid {} constant", ty))),
        }
    }

    /// Values the branch from `from` passes to the phis of `to`
    fn edge_args(&mut self, from: usize, to: BlockId) -> Result<Vec<ClifValue>> {
        let function = self.function;
        let target = function
            .block(to)
            .ok_or_else(|| self.invalid(format!("invalid basic block {}", to.0)))?;

        let mut args = Vec::new();
        for phi in target.instructions().iter().take_while(|i| i.is_phi()) {
            let Instruction::Phi { incoming, .. } = phi else {
                continue;
            };
            let edge = incoming.iter().find(|e| e.block.0 == from).ok_or_else(|| {
                self.invalid(format!(
                    "phi in bb{} has no value for bb{}",
                    to.0 + 1,
                    from + 1
                ))
            })?;
            args.push(self.value(edge.value)?);
        }
        Ok(args)
    }

    fn resize_int(&mut self, v: ClifValue, from: ClifType, to: ClifType, signed: bool) -> ClifValue {
        match from.bits().cmp(&to.bits()) {
            Ordering::Less if signed => self.builder.ins().sextend(to, v),
            Ordering::Less => self.builder.ins().uextend(to, v),
            Ordering::Greater => self.builder.ins().ireduce(to, v),
            Ordering::Equal => v,
        }
    }

    fn cast(&mut self, op: CastOp, from: Type, to: Type, v: ClifValue) -> Result<ClifValue> {
        if !op.accepts(from, to) {
            return Err(self.invalid("invalid cast"));
        }
        let from_ty = self.clif_type(from)?;
        let to_ty = self.clif_type(to)?;

        let result = match op {
            CastOp::UIntCast => self.resize_int(v, from_ty, to_ty, false),
            CastOp::SIntCast => self.resize_int(v, from_ty, to_ty, true),
            CastOp::FloatCast => match from_ty.bits().cmp(&to_ty.bits()) {
                Ordering::Less => self.builder.ins().fpromote(to_ty, v),
                Ordering::Greater => self.builder.ins().fdemote(to_ty, v),
                Ordering::Equal => v,
            },
            CastOp::FloatToUInt => {
                let wide = self.builder.ins().fcvt_to_uint_sat(types::I64, v);
                self.resize_int(wide, types::I64, to_ty, false)
            }
            CastOp::FloatToSInt => {
                let wide = self.builder.ins().fcvt_to_sint_sat(types::I64, v);
                self.resize_int(wide, types::I64, to_ty, true)
            }
            CastOp::UIntToFloat => {
                let wide = self.resize_int(v, from_ty, types::I64, false);
                self.builder.ins().fcvt_from_uint(to_ty, wide)
            }
            CastOp::SIntToFloat => {
                let wide = self.resize_int(v, from_ty, types::I64, true);
                self.builder.ins().fcvt_from_sint(to_ty, wide)
            }
        };

        // bool keeps only its low bit
        if to == Type::Bool {
            Ok(self.builder.ins().band_imm(result, 1))
        } else {
            Ok(result)
        }
    }

    fn binop(&mut self, ty: Type, op: BinopOp, l: ClifValue, r: ClifValue) -> Result<ClifValue> {
        let float = ty.is_float();
        if float && !op.is_arithmetic() {
            return Err(self.invalid(format!("binop {} on {}", op, ty)));
        }
        let ins = self.builder.ins();
        Ok(match (op, float) {
            (BinopOp::Add, true) => ins.fadd(l, r),
            (BinopOp::Sub, true) => ins.fsub(l, r),
            (BinopOp::Mul, true) => ins.fmul(l, r),
            (BinopOp::Div, true) => ins.fdiv(l, r),
            (BinopOp::Add, false) => ins.iadd(l, r),
            (BinopOp::Sub, false) => ins.isub(l, r),
            (BinopOp::Mul, false) => ins.imul(l, r),
            (BinopOp::Div, false) => ins.sdiv(l, r),
            (BinopOp::Rem, _) => ins.srem(l, r),
            (BinopOp::Shl, _) => ins.ishl(l, r),
            (BinopOp::Shr, _) => ins.sshr(l, r),
            (BinopOp::And, _) => ins.band(l, r),
            (BinopOp::Or, _) => ins.bor(l, r),
            (BinopOp::Xor, _) => ins.bxor(l, r),
        })
    }

    fn call(&mut self, callee: FuncId, args: &[Value]) -> Result<Option<ClifValue>> {
        let module = self.module;
        let function = self.function;
        let target = module.function(callee).ok_or_else(|| {
            self.invalid(format!("call to undeclared function @{:02}", callee.0 + 1))
        })?;
        let signature = module
            .signature(callee)
            .ok_or_else(|| self.invalid("callee has an invalid function type"))?;

        let mut values = Vec::with_capacity(args.len());
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            let ty = function.value_type(*arg);
            params.push(abi_param(ty, self.ptr_ty).ok_or_else(|| self.invalid("void argument"))?);
            values.push(self.value(*arg)?);
        }

        let inst = match target.address() {
            Some(address) => {
                let mut sig = self.jit.make_signature();
                sig.params.extend(params);
                sig.returns.extend(abi_param(signature.ret, self.ptr_ty));
                let sig_ref = self.builder.import_signature(sig);
                let callee_addr = self.builder.ins().iconst(self.ptr_ty, address as i64);
                self.builder.ins().call_indirect(sig_ref, callee_addr, &values)
            }
            None => {
                if args.len() != signature.params.len() {
                    return Err(CodegenError::unsupported(
                        self.id.0,
                        "extra arguments in a call to a module function",
                    ));
                }
                let id = self
                    .func_ids
                    .get(callee.0)
                    .copied()
                    .flatten()
                    .ok_or_else(|| self.invalid(format!("@{:02} was not declared", callee.0 + 1)))?;
                let func_ref = self.jit.declare_func_in_func(id, self.builder.func);
                self.builder.ins().call(func_ref, &values)
            }
        };
        Ok(self.builder.inst_results(inst).first().copied())
    }
}
