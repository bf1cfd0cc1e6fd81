//! IR Instructions
//!
//! SSA instructions addressed by [`Value`] coordinates.

use crate::types::Type;
use std::fmt;

/// Function index inside a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub usize);

/// Basic block index inside a function, 0 is the entry block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// Function type index inside a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub usize);

impl FuncId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Reference to an instruction of the enclosing function
///
/// Only meaningful together with the function it was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    pub block: usize,
    pub instr: usize,
}

impl Value {
    /// No value (void return, absent operand)
    pub const NULL: Value = Value {
        block: usize::MAX,
        instr: usize::MAX,
    };

    pub fn new(block: BlockId, instr: usize) -> Self {
        Self {
            block: block.0,
            instr,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Value::NULL
    }

    pub fn block_id(&self) -> BlockId {
        BlockId(self.block)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NULL
    }
}

/// Payload of a constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(u64),
    Float(f64),
    Ptr(usize),
}

/// Cast kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Integer resize, zero-extending
    UIntCast,
    /// Integer resize, sign-extending
    SIntCast,
    FloatCast,
    FloatToUInt,
    FloatToSInt,
    UIntToFloat,
    SIntToFloat,
}

impl CastOp {
    /// Whether a cast from `from` to `to` is well-typed
    pub fn accepts(&self, from: Type, to: Type) -> bool {
        match self {
            CastOp::UIntCast | CastOp::SIntCast => from.is_int() && to.is_int(),
            CastOp::FloatCast => from.is_float() && to.is_float(),
            CastOp::FloatToUInt | CastOp::FloatToSInt => from.is_float() && to.is_int(),
            CastOp::UIntToFloat | CastOp::SIntToFloat => from.is_int() && to.is_float(),
        }
    }
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinopOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Integer only
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinopOp {
    /// Add, Sub, Mul and Div also accept floats
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinopOp::Add | BinopOp::Sub | BinopOp::Mul | BinopOp::Div)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinopOp::Add => "+",
            BinopOp::Sub => "-",
            BinopOp::Mul => "*",
            BinopOp::Div => "/",
            BinopOp::Rem => "%",
            BinopOp::Shl => "<<",
            BinopOp::Shr => ">>",
            BinopOp::And => "&",
            BinopOp::Or => "|",
            BinopOp::Xor => "^",
        }
    }
}

impl fmt::Display for BinopOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Integer comparison, U = unsigned, S = signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntCmpOp {
    Eq,
    Ne,
    ULe,
    ULt,
    UGe,
    UGt,
    SLe,
    SLt,
    SGe,
    SGt,
}

impl IntCmpOp {
    /// Eq and Ne may also compare pointers
    pub fn is_equality(&self) -> bool {
        matches!(self, IntCmpOp::Eq | IntCmpOp::Ne)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            IntCmpOp::Eq => "==",
            IntCmpOp::Ne => "~=",
            IntCmpOp::ULe => "U <=",
            IntCmpOp::ULt => "U <",
            IntCmpOp::UGe => "U >=",
            IntCmpOp::UGt => "U >",
            IntCmpOp::SLe => "S <=",
            IntCmpOp::SLt => "S <",
            IntCmpOp::SGe => "S >=",
            IntCmpOp::SGt => "S >",
        }
    }
}

impl fmt::Display for IntCmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Float comparison, O = ordered, U = unordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpCmpOp {
    OEq,
    ONe,
    OLe,
    OLt,
    OGe,
    OGt,
    UEq,
    UNe,
    ULe,
    ULt,
    UGe,
    UGt,
}

impl FpCmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            FpCmpOp::OEq => "O ==",
            FpCmpOp::ONe => "O ~=",
            FpCmpOp::OLe => "O <=",
            FpCmpOp::OLt => "O <",
            FpCmpOp::OGe => "O >=",
            FpCmpOp::OGt => "O >",
            FpCmpOp::UEq => "U ==",
            FpCmpOp::UNe => "U ~=",
            FpCmpOp::ULe => "U <=",
            FpCmpOp::ULt => "U <",
            FpCmpOp::UGe => "U >=",
            FpCmpOp::UGt => "U >",
        }
    }
}

impl fmt::Display for FpCmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(predecessor, value)` edge of a phi
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiIncoming {
    pub block: BlockId,
    pub value: Value,
}

/// IR Instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Literal of the given type
    Const { ty: Type, value: Constant },

    /// The n-th parameter of the enclosing function
    GetArg { ty: Type, n: usize },

    /// ty = load addr
    Load { ty: Type, addr: Value },

    /// store val at addr
    Store { addr: Value, val: Value },

    /// addr +/- offset, in bytes
    Offset {
        addr: Value,
        offset: Value,
        negative: bool,
    },

    Cast { ty: Type, op: CastOp, val: Value },

    Binop {
        ty: Type,
        op: BinopOp,
        lhs: Value,
        rhs: Value,
    },

    IntCmp { op: IntCmpOp, lhs: Value, rhs: Value },

    FpCmp { op: FpCmpOp, lhs: Value, rhs: Value },

    /// Conditional branch (terminator)
    JmpIf {
        cond: Value,
        true_block: BlockId,
        false_block: BlockId,
    },

    /// Unconditional branch (terminator)
    Jmp { dest: BlockId },

    Select {
        ty: Type,
        cond: Value,
        true_val: Value,
        false_val: Value,
    },

    /// Return, `val` is null for void functions (terminator)
    Ret { val: Value },

    Call {
        ty: Type,
        function: FuncId,
        args: Vec<Value>,
    },

    Phi { ty: Type, incoming: Vec<PhiIncoming> },
}

impl Instruction {
    /// Result type
    pub fn ty(&self) -> Type {
        match self {
            Instruction::Const { ty, .. }
            | Instruction::GetArg { ty, .. }
            | Instruction::Load { ty, .. }
            | Instruction::Cast { ty, .. }
            | Instruction::Binop { ty, .. }
            | Instruction::Select { ty, .. }
            | Instruction::Call { ty, .. }
            | Instruction::Phi { ty, .. } => *ty,
            Instruction::Offset { .. } => Type::Pointer,
            Instruction::IntCmp { .. } | Instruction::FpCmp { .. } => Type::Bool,
            Instruction::Store { .. }
            | Instruction::JmpIf { .. }
            | Instruction::Jmp { .. }
            | Instruction::Ret { .. } => Type::Void,
        }
    }

    /// Checks if it is a block terminator instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Ret { .. } | Instruction::Jmp { .. } | Instruction::JmpIf { .. }
        )
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Instruction::Const { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    /// Blocks this instruction may transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instruction::Jmp { dest } => vec![*dest],
            Instruction::JmpIf {
                true_block,
                false_block,
                ..
            } => vec![*true_block, *false_block],
            _ => Vec::new(),
        }
    }

    /// Opcode name as printed
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Const { .. } => "const",
            Instruction::GetArg { .. } => "getarg",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::Offset { .. } => "offset",
            Instruction::Cast { .. } => "cast",
            Instruction::Binop { .. } => "binop",
            Instruction::IntCmp { .. } => "intcmp",
            Instruction::FpCmp { .. } => "fpcmp",
            Instruction::JmpIf { .. } => "jmpif",
            Instruction::Jmp { .. } => "jmp",
            Instruction::Select { .. } => "select",
            Instruction::Ret { .. } => "ret",
            Instruction::Call { .. } => "call",
            Instruction::Phi { .. } => "phi",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_value() {
        assert!(Value::NULL.is_null());
        assert!(Value::default().is_null());
        assert!(!Value::new(BlockId(0), 0).is_null());
    }

    #[test]
    fn test_result_types() {
        let v = Value::new(BlockId(0), 0);
        let cmp = Instruction::IntCmp {
            op: IntCmpOp::SLt,
            lhs: v,
            rhs: v,
        };
        assert_eq!(cmp.ty(), Type::Bool);

        let off = Instruction::Offset {
            addr: v,
            offset: v,
            negative: true,
        };
        assert_eq!(off.ty(), Type::Pointer);

        let store = Instruction::Store { addr: v, val: v };
        assert_eq!(store.ty(), Type::Void);
        assert!(!store.is_terminator());

        let ret = Instruction::Ret { val: Value::NULL };
        assert!(ret.is_terminator());
    }

    #[test]
    fn test_successors() {
        let jmpif = Instruction::JmpIf {
            cond: Value::NULL,
            true_block: BlockId(2),
            false_block: BlockId(3),
        };
        assert_eq!(jmpif.successors(), vec![BlockId(2), BlockId(3)]);
        assert!(Instruction::Ret { val: Value::NULL }.successors().is_empty());
    }

    #[test]
    fn test_cast_rules() {
        assert!(CastOp::SIntCast.accepts(Type::Int8, Type::Int64));
        assert!(CastOp::UIntCast.accepts(Type::Bool, Type::Int32));
        assert!(!CastOp::UIntCast.accepts(Type::Float, Type::Int32));
        assert!(CastOp::FloatCast.accepts(Type::Float, Type::Double));
        assert!(CastOp::FloatToSInt.accepts(Type::Double, Type::Int32));
        assert!(!CastOp::SIntToFloat.accepts(Type::Double, Type::Int32));
        assert!(!CastOp::SIntCast.accepts(Type::Pointer, Type::Int64));
    }

    #[test]
    fn test_operator_symbols() {
        assert_eq!(BinopOp::Rem.to_string(), "%");
        assert_eq!(IntCmpOp::Ne.to_string(), "~=");
        assert_eq!(IntCmpOp::UGe.to_string(), "U >=");
        assert_eq!(FpCmpOp::UNe.to_string(), "U ~=");
        assert!(BinopOp::Div.is_arithmetic());
        assert!(!BinopOp::Shl.is_arithmetic());
    }
}
