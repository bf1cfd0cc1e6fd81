//! IR Module
//!
//! Append-only containers: a module owns function types and functions,
//! a defined function owns basic blocks, a block owns instructions.

use crate::builder::Builder;
use crate::instruction::{BlockId, FuncId, Instruction, TypeId, Value};
use crate::types::Type;

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    /// Accepts extra trailing arguments
    pub variadic: bool,
}

impl FunctionType {
    pub fn new(ret: Type, params: impl Into<Vec<Type>>) -> Self {
        Self {
            ret,
            params: params.into(),
            variadic: false,
        }
    }

    pub fn with_variadic(mut self, variadic: bool) -> Self {
        self.variadic = variadic;
        self
    }
}

/// Straight-line sequence of instructions
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The last instruction, if it ends the block
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator()
            .map(|t| t.successors())
            .unwrap_or_default()
    }
}

/// External functions live in the host, defined ones have a body
#[derive(Debug, Clone)]
pub enum FunctionBody {
    External { address: usize },
    Defined { blocks: Vec<BasicBlock> },
}

/// Function declaration
#[derive(Debug, Clone)]
pub struct Function {
    pub ty: TypeId,
    pub body: FunctionBody,
}

impl Function {
    pub fn is_external(&self) -> bool {
        matches!(self.body, FunctionBody::External { .. })
    }

    /// Host address of an external function
    pub fn address(&self) -> Option<usize> {
        match self.body {
            FunctionBody::External { address } => Some(address),
            FunctionBody::Defined { .. } => None,
        }
    }

    /// Basic blocks, empty for external functions
    pub fn blocks(&self) -> &[BasicBlock] {
        match &self.body {
            FunctionBody::Defined { blocks } => blocks,
            FunctionBody::External { .. } => &[],
        }
    }

    pub fn block(&self, block: BlockId) -> Option<&BasicBlock> {
        self.blocks().get(block.0)
    }

    pub fn instruction(&self, value: Value) -> Option<&Instruction> {
        if value.is_null() {
            return None;
        }
        self.blocks().get(value.block)?.get(value.instr)
    }

    /// Type of the instruction `value` refers to, `Void` if there is none
    pub fn value_type(&self, value: Value) -> Type {
        self.instruction(value)
            .map(Instruction::ty)
            .unwrap_or(Type::Void)
    }

    /// Blocks reachable from the entry, in reverse post-order
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let blocks = self.blocks();
        if blocks.is_empty() {
            return Vec::new();
        }

        let mut visited = vec![false; blocks.len()];
        let mut order = Vec::with_capacity(blocks.len());
        // (block, next successor to visit)
        let mut stack = vec![(BlockId::ENTRY, 0usize)];
        visited[0] = true;

        while let Some((block, next)) = stack.pop() {
            let successors = blocks[block.0].successors();
            match successors.get(next) {
                Some(&succ) => {
                    stack.push((block, next + 1));
                    if succ.0 < blocks.len() && !visited[succ.0] {
                        visited[succ.0] = true;
                        stack.push((succ, 0));
                    }
                }
                None => order.push(block),
            }
        }

        order.reverse();
        order
    }

    fn blocks_mut(&mut self) -> Option<&mut Vec<BasicBlock>> {
        match &mut self.body {
            FunctionBody::Defined { blocks } => Some(blocks),
            FunctionBody::External { .. } => None,
        }
    }
}

/// Root of the IR
#[derive(Debug, Clone, Default)]
pub struct Module {
    types: Vec<FunctionType>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function type and returns its index
    pub fn add_function_type(&mut self, ty: FunctionType) -> TypeId {
        self.types.push(ty);
        TypeId(self.types.len() - 1)
    }

    /// Adds a function with a body; blocks are appended with [`Module::add_block`]
    pub fn add_function(&mut self, ty: TypeId) -> FuncId {
        self.functions.push(Function {
            ty,
            body: FunctionBody::Defined { blocks: Vec::new() },
        });
        FuncId(self.functions.len() - 1)
    }

    /// Adds a host function living at `address`
    pub fn add_external_function(&mut self, ty: TypeId, address: usize) -> FuncId {
        self.functions.push(Function {
            ty,
            body: FunctionBody::External { address },
        });
        FuncId(self.functions.len() - 1)
    }

    /// Appends an empty basic block to a defined function
    ///
    /// # Panics
    ///
    /// If `function` does not exist or is external.
    pub fn add_block(&mut self, function: FuncId) -> BlockId {
        let blocks = self
            .functions
            .get_mut(function.0)
            .and_then(Function::blocks_mut)
            .unwrap_or_else(|| panic!("function {} has no body", function.0));
        blocks.push(BasicBlock::default());
        BlockId(blocks.len() - 1)
    }

    /// Creates a builder positioned at the end of `block`
    pub fn builder(&mut self, function: FuncId, block: BlockId) -> Builder<'_> {
        Builder::new(self, function, block)
    }

    pub fn function_type(&self, ty: TypeId) -> Option<&FunctionType> {
        self.types.get(ty.0)
    }

    pub fn function_types(&self) -> &[FunctionType] {
        &self.types
    }

    pub fn function(&self, function: FuncId) -> Option<&Function> {
        self.functions.get(function.0)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len()).map(FuncId)
    }

    /// Signature of a function, through its declared type
    pub fn signature(&self, function: FuncId) -> Option<&FunctionType> {
        self.function(function)
            .and_then(|f| self.function_type(f.ty))
    }

    pub fn block(&self, function: FuncId, block: BlockId) -> Option<&BasicBlock> {
        self.function(function)?.block(block)
    }

    pub fn instruction(&self, function: FuncId, value: Value) -> Option<&Instruction> {
        self.function(function)?.instruction(value)
    }

    pub(crate) fn push_instruction(
        &mut self,
        function: FuncId,
        block: BlockId,
        instruction: Instruction,
    ) -> Value {
        let block_ref = self
            .functions
            .get_mut(function.0)
            .and_then(Function::blocks_mut)
            .and_then(|blocks| blocks.get_mut(block.0))
            .unwrap_or_else(|| {
                panic!("basic block {} of function {} does not exist", block.0, function.0)
            });
        block_ref.instructions.push(instruction);
        Value::new(block, block_ref.instructions.len() - 1)
    }

    pub(crate) fn instruction_mut(
        &mut self,
        function: FuncId,
        value: Value,
    ) -> Option<&mut Instruction> {
        if value.is_null() {
            return None;
        }
        self.functions
            .get_mut(function.0)?
            .blocks_mut()?
            .get_mut(value.block)?
            .instructions
            .get_mut(value.instr)
    }
}
