//! Textual dump of a module
//!
//! ```text
//! Fahrenheit module
//! function @01 : i32 -> i32
//!  bb1
//!   $001 = getarg 0
//!   $002 = binop (i32 $001) + (const i32 1)
//!          ret (i32 $002)
//!
//! .
//! ```

use crate::instruction::{BlockId, Constant, FuncId, Instruction, Value};
use crate::module::{Function, FunctionType, Module};
use crate::types::Type;
use std::fmt;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fahrenheit module")?;
        for (index, function) in self.functions().iter().enumerate() {
            FunctionPrinter::new(self, FuncId(index), function).print(f)?;
        }
        writeln!(f, ".")
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() && !self.variadic {
            write!(f, "void")?;
        } else {
            let mut params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            if self.variadic {
                params.push("...".to_string());
            }
            write!(f, "{}", params.join(", "))?;
        }
        write!(f, " -> {}", self.ret)
    }
}

fn fname(function: FuncId) -> String {
    format!("@{:02}", function.0 + 1)
}

fn bbname(block: BlockId) -> String {
    format!("bb{}", block.0 + 1)
}

/// Prints one function, numbering its values
struct FunctionPrinter<'m> {
    module: &'m Module,
    id: FuncId,
    function: &'m Function,
    /// `$NNN` id per instruction, `None` for constants and void results
    ids: Vec<Vec<Option<usize>>>,
}

impl<'m> FunctionPrinter<'m> {
    fn new(module: &'m Module, id: FuncId, function: &'m Function) -> Self {
        let mut next = 1;
        let ids: Vec<Vec<Option<usize>>> = function
            .blocks()
            .iter()
            .map(|bb| {
                bb.instructions()
                    .iter()
                    .map(|i| {
                        if i.is_const() || i.ty().is_void() {
                            None
                        } else {
                            next += 1;
                            Some(next - 1)
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            module,
            id,
            function,
            ids,
        }
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function.is_external() {
            write!(f, "external ")?;
        }
        write!(f, "function {} : ", fname(self.id))?;
        match self.module.function_type(self.function.ty) {
            Some(ty) => writeln!(f, "{}", ty)?,
            None => writeln!(f, "?")?,
        }

        for (block, bb) in self.function.blocks().iter().enumerate() {
            writeln!(f, " {}", bbname(BlockId(block)))?;
            for (index, instr) in bb.instructions().iter().enumerate() {
                self.instruction(f, Value::new(BlockId(block), index), instr)?;
            }
        }
        writeln!(f)
    }

    fn value_id(&self, value: Value) -> Option<usize> {
        self.ids.get(value.block)?.get(value.instr).copied().flatten()
    }

    fn value(&self, value: Value) -> String {
        if value.is_null() {
            return "null".to_string();
        }
        match self.function.instruction(value) {
            Some(Instruction::Const { ty, value: payload }) => {
                format!("({})", constant(*ty, payload))
            }
            Some(instr) => match self.value_id(value) {
                Some(id) => format!("({} ${:03})", instr.ty(), id),
                None => format!("({} $xxx)", instr.ty()),
            },
            None => "(invalid)".to_string(),
        }
    }

    fn instruction(&self, f: &mut fmt::Formatter<'_>, at: Value, instr: &Instruction) -> fmt::Result {
        if instr.is_const() {
            return Ok(());
        }
        match self.value_id(at) {
            Some(id) => write!(f, "  ${:03} = ", id)?,
            None => write!(f, "         ")?,
        }

        match instr {
            Instruction::Const { .. } => {}
            Instruction::GetArg { n, .. } => write!(f, "getarg {}", n)?,
            Instruction::Load { ty, addr } => write!(f, "load {} from {}", ty, self.value(*addr))?,
            Instruction::Store { addr, val } => {
                write!(f, "store {} at {}", self.value(*val), self.value(*addr))?
            }
            Instruction::Offset {
                addr,
                offset,
                negative,
            } => write!(
                f,
                "offset {} {} {}",
                self.value(*addr),
                if *negative { '-' } else { '+' },
                self.value(*offset)
            )?,
            Instruction::Cast { ty, val, .. } => write!(f, "cast {} to {}", self.value(*val), ty)?,
            Instruction::Binop { op, lhs, rhs, .. } => {
                write!(f, "binop {} {} {}", self.value(*lhs), op, self.value(*rhs))?
            }
            Instruction::IntCmp { op, lhs, rhs } => {
                write!(f, "intcmp {} {} {}", self.value(*lhs), op, self.value(*rhs))?
            }
            Instruction::FpCmp { op, lhs, rhs } => {
                write!(f, "fpcmp {} {} {}", self.value(*lhs), op, self.value(*rhs))?
            }
            Instruction::JmpIf {
                cond,
                true_block,
                false_block,
            } => write!(
                f,
                "jmpif {} then {} else {}",
                self.value(*cond),
                bbname(*true_block),
                bbname(*false_block)
            )?,
            Instruction::Jmp { dest } => write!(f, "jmp {}", bbname(*dest))?,
            Instruction::Select {
                cond,
                true_val,
                false_val,
                ..
            } => write!(
                f,
                "select {} then {} else {}",
                self.value(*cond),
                self.value(*true_val),
                self.value(*false_val)
            )?,
            Instruction::Ret { val } if val.is_null() => write!(f, "ret void")?,
            Instruction::Ret { val } => write!(f, "ret {}", self.value(*val))?,
            Instruction::Call { function, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| self.value(*a)).collect();
                write!(f, "call {} {}", fname(*function), args.join(", "))?
            }
            Instruction::Phi { incoming, .. } => {
                let edges: Vec<String> = incoming
                    .iter()
                    .map(|e| format!("[{} {}]", bbname(e.block), self.value(e.value)))
                    .collect();
                write!(f, "phi {}", edges.join(", "))?
            }
        }
        writeln!(f)
    }
}

fn constant(ty: Type, value: &Constant) -> String {
    let literal = match (ty, value) {
        (Type::Bool, Constant::Int(v)) => (if *v != 0 { "true" } else { "false" }).to_string(),
        (_, Constant::Int(v)) => v.to_string(),
        (_, Constant::Float(v)) => format!("{:.6}", v),
        (_, Constant::Ptr(p)) => format!("{:#x}", p),
    };
    format!("const {} {}", ty, literal)
}
