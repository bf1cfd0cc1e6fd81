//! fahrenheit-ir - Intermediate Representation of the Fahrenheit JIT
//!
//! A small C-like IR built in memory at run time:
//! - Primitive machine types only (integers, floats, pointers)
//! - SSA instructions referenced by `(block, instruction)` coordinates
//! - Explicit phi nodes for values merging at control flow joins
//!
//! # Architecture
//!
//! ```text
//!   Host program
//!         ↓
//!    [Builder]
//!         ↓
//!   IR Module
//!   ├── Function types
//!   └── Functions
//!       ├── External (host address)
//!       └── Defined
//!           └── Basic Blocks
//!               └── Instructions
//!         ↓
//!    [Verifier]
//!         ↓
//!   Native code (fahrenheit-codegen)
//! ```
//!
//! # Example
//!
//! ```rust
//! use fahrenheit_ir::{verify_module, BinopOp, FunctionType, Module, Type};
//!
//! let mut module = Module::new();
//! let ty = module.add_function_type(FunctionType::new(Type::Int32, vec![Type::Int32]));
//! let inc = module.add_function(ty);
//! let entry = module.add_block(inc);
//!
//! let mut b = module.builder(inc, entry);
//! let n = b.getarg(0);
//! let one = b.const_int(1, Type::Int32);
//! let sum = b.binop(BinopOp::Add, n, one);
//! b.ret(sum);
//!
//! assert!(verify_module(&module).is_ok());
//! ```

pub mod builder;
pub mod instruction;
pub mod module;
pub mod printer;
pub mod types;
pub mod verify;

pub use builder::Builder;
pub use instruction::{
    BinopOp, BlockId, CastOp, Constant, FpCmpOp, FuncId, Instruction, IntCmpOp, PhiIncoming,
    TypeId, Value,
};
pub use module::{BasicBlock, Function, FunctionBody, FunctionType, Module};
pub use types::Type;
pub use verify::{verify_function, verify_module};
