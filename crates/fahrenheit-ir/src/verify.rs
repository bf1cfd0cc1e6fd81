//! IR verifier
//!
//! Walks functions, blocks and instructions in declaration order and checks
//! the typing and control-flow rules every backend relies on. The first
//! violation aborts the walk and is returned as a [`VerifyError`].

use crate::instruction::{BlockId, Constant, FuncId, Instruction, Value};
use crate::module::{BasicBlock, FunctionBody, FunctionType, Module};
use crate::types::Type;
use fahrenheit_error::{Location, VerifyError, VerifyErrorKind, VerifyResult};
use tracing::{debug, warn};

/// Verifies every function of the module, stopping at the first failure
pub fn verify_module(module: &Module) -> VerifyResult<()> {
    if module.functions().is_empty() {
        let err = VerifyError::module(VerifyErrorKind::NoFunctions);
        warn!(error = %err, "module verification failed");
        return Err(err);
    }

    for function in module.function_ids() {
        if let Err(err) = verify_function(module, function) {
            warn!(error = %err, "module verification failed");
            return Err(err);
        }
    }

    debug!(functions = module.functions().len(), "module verified");
    Ok(())
}

/// Verifies a single function
pub fn verify_function(module: &Module, function: FuncId) -> VerifyResult<()> {
    let func = module.function(function).ok_or_else(|| {
        VerifyError::at(
            Location::function(function.0),
            VerifyErrorKind::FunctionNotFound,
        )
    })?;
    debug!(function = function.0, "verifying function");

    let fail = |kind| VerifyError::at(Location::function(function.0), kind);
    let signature = module
        .function_type(func.ty)
        .ok_or_else(|| fail(VerifyErrorKind::InvalidFunctionType))?;
    if signature.params.iter().any(Type::is_void) {
        return Err(fail(VerifyErrorKind::VoidParameter));
    }

    let blocks = match &func.body {
        FunctionBody::External { .. } => return Ok(()),
        FunctionBody::Defined { blocks } => blocks,
    };
    if blocks.is_empty() {
        return Err(fail(VerifyErrorKind::NoBasicBlocks));
    }

    let mut verifier = Verifier {
        module,
        function,
        signature,
        blocks,
        block: 0,
        index: 0,
        ordinal: 0,
        terminated: false,
    };
    verifier.run()
}

/// Walk state of one function
struct Verifier<'m> {
    module: &'m Module,
    function: FuncId,
    signature: &'m FunctionType,
    blocks: &'m [BasicBlock],
    /// Current block
    block: usize,
    /// Position of the current instruction in the block
    index: usize,
    /// Non-constant instructions seen so far in the block
    ordinal: usize,
    terminated: bool,
}

impl<'m> Verifier<'m> {
    fn run(&mut self) -> VerifyResult<()> {
        let blocks = self.blocks;
        for (block, bb) in blocks.iter().enumerate() {
            self.block = block;
            self.ordinal = 0;
            self.terminated = false;

            for (index, instr) in bb.instructions().iter().enumerate() {
                self.index = index;
                if !instr.is_const() {
                    self.ordinal += 1;
                }
                self.instruction(instr)?;
            }

            self.check(self.terminated, VerifyErrorKind::NotTerminated)?;
        }
        Ok(())
    }

    fn error(&self, kind: VerifyErrorKind) -> VerifyError {
        let location = match self.ordinal {
            0 => Location::block(self.function.0, self.block),
            ordinal => Location::instruction(self.function.0, self.block, ordinal),
        };
        VerifyError::at(location, kind)
    }

    fn check(&self, cond: bool, kind: VerifyErrorKind) -> VerifyResult<()> {
        if cond {
            Ok(())
        } else {
            Err(self.error(kind))
        }
    }

    /// Resolves an operand to its instruction
    fn operand(&self, value: Value) -> VerifyResult<&'m Instruction> {
        if value.is_null() {
            return Err(self.error(VerifyErrorKind::NullValue));
        }
        self.blocks
            .get(value.block)
            .and_then(|bb| bb.get(value.instr))
            .ok_or_else(|| self.error(VerifyErrorKind::InvalidValue))
    }

    fn operand_type(&self, value: Value) -> VerifyResult<Type> {
        self.operand(value).map(Instruction::ty)
    }

    /// Jump targets must exist and never be the entry block
    fn target(&self, block: BlockId) -> VerifyResult<()> {
        self.check(
            block.0 >= 1 && block.0 < self.blocks.len(),
            VerifyErrorKind::InvalidBasicBlock(block.0),
        )
    }

    /// Terminators must be the last instruction of their block
    fn end(&mut self) -> VerifyResult<()> {
        let last = self.blocks[self.block].len() - 1;
        self.check(self.index == last, VerifyErrorKind::InstructionAfterEnd)?;
        self.terminated = true;
        Ok(())
    }

    fn instruction(&mut self, instr: &'m Instruction) -> VerifyResult<()> {
        use VerifyErrorKind::*;

        match instr {
            Instruction::Const { ty, value } => {
                let valid = match value {
                    Constant::Int(v) if *ty == Type::Bool => *v <= 1,
                    Constant::Int(_) => ty.is_int(),
                    Constant::Float(_) => ty.is_float(),
                    Constant::Ptr(_) => ty.is_pointer(),
                };
                self.check(valid, InvalidConstant)
            }

            Instruction::GetArg { n, .. } => {
                self.check(*n < self.signature.params.len(), InvalidArgument)
            }

            Instruction::Load { ty, addr } => {
                let addr = self.operand_type(*addr)?;
                self.check(addr.is_pointer(), LoadFromNonPointer)?;
                self.check(!ty.is_void(), LoadVoid)
            }

            Instruction::Store { addr, val } => {
                let addr = self.operand_type(*addr)?;
                let val = self.operand_type(*val)?;
                self.check(addr.is_pointer(), StoreInNonPointer)?;
                self.check(!val.is_void(), StoreVoid)
            }

            Instruction::Offset { addr, offset, .. } => {
                let addr = self.operand_type(*addr)?;
                let offset = self.operand_type(*offset)?;
                self.check(addr.is_pointer(), OffsetFromNonPointer)?;
                self.check(offset.is_int(), OffsetNotInteger)
            }

            Instruction::Cast { ty, op, val } => {
                let from = self.operand_type(*val)?;
                self.check(op.accepts(from, *ty), InvalidCast)
            }

            Instruction::Binop { op, lhs, rhs, .. } => {
                let lhs = self.operand_type(*lhs)?;
                let rhs = self.operand_type(*rhs)?;
                self.check(lhs == rhs, BinopTypeMismatch)?;
                if op.is_arithmetic() {
                    self.check(lhs.is_numeric(), InvalidBinopType)
                } else {
                    self.check(lhs.is_int(), InvalidBinopType)
                }
            }

            Instruction::IntCmp { op, lhs, rhs } => {
                let lhs = self.operand_type(*lhs)?;
                let rhs = self.operand_type(*rhs)?;
                self.check(lhs == rhs, CmpTypeMismatch)?;
                if op.is_equality() {
                    self.check(lhs.is_int() || lhs.is_pointer(), InvalidIntComparison)
                } else {
                    self.check(lhs.is_int(), InvalidIntComparison)
                }
            }

            Instruction::FpCmp { lhs, rhs, .. } => {
                let lhs = self.operand_type(*lhs)?;
                let rhs = self.operand_type(*rhs)?;
                self.check(lhs == rhs, CmpTypeMismatch)?;
                self.check(lhs.is_float(), InvalidFloatComparison)
            }

            Instruction::JmpIf {
                cond,
                true_block,
                false_block,
            } => {
                let cond = self.operand_type(*cond)?;
                self.check(cond == Type::Bool, ConditionNotBool)?;
                self.target(*true_block)?;
                self.target(*false_block)?;
                self.end()
            }

            Instruction::Jmp { dest } => {
                self.target(*dest)?;
                self.end()
            }

            Instruction::Select {
                cond,
                true_val,
                false_val,
                ..
            } => {
                let cond = self.operand_type(*cond)?;
                let true_ty = self.operand_type(*true_val)?;
                let false_ty = self.operand_type(*false_val)?;
                self.check(cond == Type::Bool, SelectConditionNotBool)?;
                self.check(true_ty == false_ty, SelectTypeMismatch)
            }

            Instruction::Ret { val } => {
                if self.signature.ret.is_void() {
                    self.check(val.is_null(), ReturnTypeMismatch)?;
                } else {
                    self.check(!val.is_null(), ReturnTypeMismatch)?;
                    let ty = self.operand_type(*val)?;
                    self.check(ty == self.signature.ret, ReturnTypeMismatch)?;
                }
                self.end()
            }

            Instruction::Call { function, args, .. } => self.call(*function, args),

            Instruction::Phi { ty, incoming } => {
                self.check(self.block != 0, PhiInFirstBlock)?;
                let before = &self.blocks[self.block].instructions()[..self.index];
                self.check(before.iter().all(Instruction::is_phi), PhiNotAtStart)?;
                self.check(!ty.is_void(), PhiVoid)?;
                for edge in incoming {
                    self.check(
                        edge.block.0 < self.blocks.len(),
                        InvalidBasicBlock(edge.block.0),
                    )?;
                    let value = self.operand_type(edge.value)?;
                    self.check(value == *ty, PhiTypeMismatch)?;
                }
                Ok(())
            }
        }
    }

    /// Callees must be declared no later than the caller
    fn call(&self, callee: FuncId, args: &[Value]) -> VerifyResult<()> {
        use VerifyErrorKind::*;

        self.check(
            callee <= self.function && self.module.function(callee).is_some(),
            CallNotDeclared,
        )?;
        let signature = self
            .module
            .signature(callee)
            .ok_or_else(|| self.error(InvalidFunctionType))?;

        let fixed = signature.params.len();
        let arity_ok = if signature.variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        self.check(arity_ok, CallArityMismatch)?;

        for (position, arg) in args.iter().enumerate() {
            let ty = self.operand_type(*arg)?;
            match signature.params.get(position) {
                Some(param) => self.check(ty == *param, CallArgumentMismatch)?,
                None => self.check(!ty.is_void(), VoidCallArgument)?,
            }
        }
        Ok(())
    }
}
