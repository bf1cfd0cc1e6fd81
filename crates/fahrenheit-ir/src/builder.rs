//! Instruction builder
//!
//! A cursor over one function and block of a module. Every constructor
//! appends a single instruction at the end of the current block and
//! returns the [`Value`] referring to it. Building never fails: operands
//! that do not resolve simply derive `Void`, and the verifier rejects them.

use crate::instruction::{
    BinopOp, BlockId, CastOp, Constant, FpCmpOp, FuncId, Instruction, IntCmpOp, PhiIncoming,
    Value,
};
use crate::module::Module;
use crate::types::Type;

/// Appends instructions to a basic block
pub struct Builder<'m> {
    module: &'m mut Module,
    function: FuncId,
    block: BlockId,
}

impl<'m> Builder<'m> {
    pub(crate) fn new(module: &'m mut Module, function: FuncId, block: BlockId) -> Self {
        Self {
            module,
            function,
            block,
        }
    }

    pub fn function(&self) -> FuncId {
        self.function
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Moves the cursor to another block of the same function
    pub fn set_block(&mut self, block: BlockId) {
        self.block = block;
    }

    /// Appends a new block to the current function without moving the cursor
    pub fn add_block(&mut self) -> BlockId {
        self.module.add_block(self.function)
    }

    /// Read access to the module being built
    pub fn module(&self) -> &Module {
        &*self.module
    }

    /// Type of a value of the current function, `Void` if it does not resolve
    pub fn type_of(&self, value: Value) -> Type {
        self.module
            .function(self.function)
            .map(|f| f.value_type(value))
            .unwrap_or(Type::Void)
    }

    /// # Panics
    ///
    /// If the cursor does not point at a block of a defined function.
    fn push(&mut self, instruction: Instruction) -> Value {
        self.module
            .push_instruction(self.function, self.block, instruction)
    }

    // Constants

    pub fn const_bool(&mut self, value: bool) -> Value {
        self.const_int(value as u64, Type::Bool)
    }

    pub fn const_int(&mut self, value: u64, ty: Type) -> Value {
        self.push(Instruction::Const {
            ty,
            value: Constant::Int(value),
        })
    }

    pub fn const_float(&mut self, value: f64, ty: Type) -> Value {
        self.push(Instruction::Const {
            ty,
            value: Constant::Float(value),
        })
    }

    pub fn const_ptr(&mut self, address: usize) -> Value {
        self.push(Instruction::Const {
            ty: Type::Pointer,
            value: Constant::Ptr(address),
        })
    }

    pub fn null_ptr(&mut self) -> Value {
        self.const_ptr(0)
    }

    // Memory

    /// The n-th parameter; typed `Void` when `n` is out of range
    pub fn getarg(&mut self, n: usize) -> Value {
        let ty = self
            .module
            .signature(self.function)
            .and_then(|sig| sig.params.get(n).copied())
            .unwrap_or(Type::Void);
        self.push(Instruction::GetArg { ty, n })
    }

    pub fn load(&mut self, addr: Value, ty: Type) -> Value {
        self.push(Instruction::Load { ty, addr })
    }

    pub fn store(&mut self, addr: Value, val: Value) -> Value {
        self.push(Instruction::Store { addr, val })
    }

    pub fn offset(&mut self, addr: Value, offset: Value, negative: bool) -> Value {
        self.push(Instruction::Offset {
            addr,
            offset,
            negative,
        })
    }

    // Arithmetic

    pub fn cast(&mut self, op: CastOp, val: Value, ty: Type) -> Value {
        self.push(Instruction::Cast { ty, op, val })
    }

    /// Result type is the type of `lhs`
    pub fn binop(&mut self, op: BinopOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.type_of(lhs);
        self.push(Instruction::Binop { ty, op, lhs, rhs })
    }

    pub fn intcmp(&mut self, op: IntCmpOp, lhs: Value, rhs: Value) -> Value {
        self.push(Instruction::IntCmp { op, lhs, rhs })
    }

    pub fn fpcmp(&mut self, op: FpCmpOp, lhs: Value, rhs: Value) -> Value {
        self.push(Instruction::FpCmp { op, lhs, rhs })
    }

    /// Result type is the type of `true_val`
    pub fn select(&mut self, cond: Value, true_val: Value, false_val: Value) -> Value {
        let ty = self.type_of(true_val);
        self.push(Instruction::Select {
            ty,
            cond,
            true_val,
            false_val,
        })
    }

    // Control flow

    pub fn jmpif(&mut self, cond: Value, true_block: BlockId, false_block: BlockId) -> Value {
        self.push(Instruction::JmpIf {
            cond,
            true_block,
            false_block,
        })
    }

    pub fn jmp(&mut self, dest: BlockId) -> Value {
        self.push(Instruction::Jmp { dest })
    }

    pub fn ret(&mut self, val: Value) -> Value {
        self.push(Instruction::Ret { val })
    }

    pub fn ret_void(&mut self) -> Value {
        self.ret(Value::NULL)
    }

    /// Result type is the callee's return type, `Void` if it does not exist
    pub fn call(&mut self, function: FuncId, args: &[Value]) -> Value {
        let ty = self
            .module
            .signature(function)
            .map(|sig| sig.ret)
            .unwrap_or(Type::Void);
        self.push(Instruction::Call {
            ty,
            function,
            args: args.to_vec(),
        })
    }

    /// Empty phi; edges are added with [`Builder::add_incoming`]
    pub fn phi(&mut self, ty: Type) -> Value {
        self.push(Instruction::Phi {
            ty,
            incoming: Vec::new(),
        })
    }

    /// # Panics
    ///
    /// If `phi` is not a phi of the current function.
    pub fn add_incoming(&mut self, phi: Value, block: BlockId, value: Value) {
        match self.module.instruction_mut(self.function, phi) {
            Some(Instruction::Phi { incoming, .. }) => {
                incoming.push(PhiIncoming { block, value });
            }
            _ => panic!("value {:?} is not a phi instruction", phi),
        }
    }

    // Addressing helpers

    /// `arr + index * elem_size`, the constant takes the type of `index`
    pub fn array_offset(&mut self, arr: Value, index: Value, elem_size: u64) -> Value {
        let ty = self.type_of(index);
        let size = self.const_int(elem_size, ty);
        let bytes = self.binop(BinopOp::Mul, index, size);
        self.offset(arr, bytes, false)
    }

    pub fn array_get(&mut self, arr: Value, index: Value, elem_size: u64, ty: Type) -> Value {
        let addr = self.array_offset(arr, index, elem_size);
        self.load(addr, ty)
    }

    pub fn array_set(&mut self, arr: Value, index: Value, elem_size: u64, val: Value) -> Value {
        let addr = self.array_offset(arr, index, elem_size);
        self.store(addr, val)
    }

    /// Address of a field `offset` bytes into a struct
    pub fn field_offset(&mut self, addr: Value, offset: u64) -> Value {
        let offset = self.const_int(offset, Type::Int64);
        self.offset(addr, offset, false)
    }

    pub fn field_get(&mut self, addr: Value, offset: u64, ty: Type) -> Value {
        let field = self.field_offset(addr, offset);
        self.load(field, ty)
    }

    pub fn field_set(&mut self, addr: Value, offset: u64, val: Value) -> Value {
        let field = self.field_offset(addr, offset);
        self.store(field, val)
    }
}
