//! Verifier errors
//!
//! The verifier is fail-fast: it stops on the first violated rule and
//! reports one [`VerifyError`] carrying the rule and where it was broken.

use crate::diagnostic::ErrorCode;
use std::fmt;
use thiserror::Error;

/// Capacity reserved for a composed verifier message, in bytes
pub const VERIFY_BUFFER_SIZE: usize = 1024;

/// Every rule the verifier can report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyErrorKind {
    #[error("module with no functions")]
    NoFunctions,
    #[error("function not found")]
    FunctionNotFound,
    #[error("invalid function type")]
    InvalidFunctionType,
    #[error("void parameter in function type")]
    VoidParameter,
    #[error("function without basic blocks")]
    NoBasicBlocks,

    // Operands
    #[error("null value")]
    NullValue,
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid constant")]
    InvalidConstant,

    // Memory
    #[error("load from non pointer")]
    LoadFromNonPointer,
    #[error("load void value")]
    LoadVoid,
    #[error("store in non pointer")]
    StoreInNonPointer,
    #[error("store void value")]
    StoreVoid,
    #[error("offset from non pointer")]
    OffsetFromNonPointer,
    #[error("offset must be an integer")]
    OffsetNotInteger,

    // Arithmetic
    #[error("invalid cast")]
    InvalidCast,
    #[error("type mismatch in binop")]
    BinopTypeMismatch,
    #[error("invalid binop type")]
    InvalidBinopType,
    #[error("type mismatch in cmp")]
    CmpTypeMismatch,
    #[error("invalid integer comparison")]
    InvalidIntComparison,
    #[error("invalid float comparison")]
    InvalidFloatComparison,

    // Control flow
    #[error("condition must be boolean")]
    ConditionNotBool,
    #[error("invalid basic block {0}")]
    InvalidBasicBlock(usize),
    #[error("instruction after basic block end")]
    InstructionAfterEnd,
    #[error("basic block not terminated")]
    NotTerminated,
    #[error("select condition must be boolean")]
    SelectConditionNotBool,
    #[error("type mismatch in select")]
    SelectTypeMismatch,
    #[error("return type missmatch")]
    ReturnTypeMismatch,

    // Calls
    #[error("calling function not declared")]
    CallNotDeclared,
    #[error("wrong number of arguments in call")]
    CallArityMismatch,
    #[error("argument type mismatch in call")]
    CallArgumentMismatch,
    #[error("void argument in call")]
    VoidCallArgument,

    // Phi
    #[error("phi instruction in the first block")]
    PhiInFirstBlock,
    #[error("phi instruction after non phi instruction")]
    PhiNotAtStart,
    #[error("type mismatch in phi")]
    PhiTypeMismatch,
    #[error("phi of void type")]
    PhiVoid,
}

impl VerifyErrorKind {
    /// Stable code for this rule
    pub fn code(&self) -> ErrorCode {
        use VerifyErrorKind::*;
        let number = match self {
            NoFunctions => 1,
            FunctionNotFound => 2,
            InvalidFunctionType => 3,
            VoidParameter => 4,
            NoBasicBlocks => 5,
            NullValue => 6,
            InvalidValue => 7,
            InvalidArgument => 8,
            InvalidConstant => 9,
            LoadFromNonPointer => 10,
            LoadVoid => 11,
            StoreInNonPointer => 12,
            StoreVoid => 13,
            OffsetFromNonPointer => 14,
            OffsetNotInteger => 15,
            InvalidCast => 16,
            BinopTypeMismatch => 17,
            InvalidBinopType => 18,
            CmpTypeMismatch => 19,
            InvalidIntComparison => 20,
            InvalidFloatComparison => 21,
            ConditionNotBool => 22,
            InvalidBasicBlock(_) => 23,
            InstructionAfterEnd => 24,
            NotTerminated => 25,
            SelectConditionNotBool => 26,
            SelectTypeMismatch => 27,
            ReturnTypeMismatch => 28,
            CallNotDeclared => 29,
            CallArityMismatch => 30,
            CallArgumentMismatch => 31,
            VoidCallArgument => 32,
            PhiInFirstBlock => 33,
            PhiNotAtStart => 34,
            PhiTypeMismatch => 35,
            PhiVoid => 36,
        };
        ErrorCode::new('V', number)
    }
}

/// Where a verifier error happened
///
/// `function` and `block` are 0-based indices, displayed 1-based.
/// `instruction` is already an ordinal: the count of non-constant
/// instructions seen so far in the block, `None` when there were none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub function: usize,
    pub block: Option<usize>,
    pub instruction: Option<usize>,
}

impl Location {
    pub fn function(function: usize) -> Self {
        Self {
            function,
            block: None,
            instruction: None,
        }
    }

    pub fn block(function: usize, block: usize) -> Self {
        Self {
            function,
            block: Some(block),
            instruction: None,
        }
    }

    pub fn instruction(function: usize, block: usize, ordinal: usize) -> Self {
        Self {
            function,
            block: Some(block),
            instruction: Some(ordinal),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}", self.function + 1)?;
        if let Some(block) = self.block {
            write!(f, ", basic block {}", block + 1)?;
            if let Some(ordinal) = self.instruction {
                write!(f, ", instruction {}", ordinal)?;
            }
        }
        Ok(())
    }
}

/// A verification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    /// `None` for module-level failures
    pub location: Option<Location>,
    pub kind: VerifyErrorKind,
}

impl VerifyError {
    pub fn module(kind: VerifyErrorKind) -> Self {
        Self {
            location: None,
            kind,
        }
    }

    pub fn at(location: Location, kind: VerifyErrorKind) -> Self {
        Self {
            location: Some(location),
            kind,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }

    /// The composed message, cut to fit [`VERIFY_BUFFER_SIZE`] including a
    /// terminating byte
    pub fn message(&self) -> String {
        let mut message = self.to_string();
        if message.len() >= VERIFY_BUFFER_SIZE {
            let mut end = VERIFY_BUFFER_SIZE - 1;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        message
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for VerifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_level_message() {
        let err = VerifyError::module(VerifyErrorKind::NoFunctions);
        assert_eq!(err.to_string(), "module with no functions");
    }

    #[test]
    fn test_location_formats() {
        let err = VerifyError::at(Location::function(2), VerifyErrorKind::VoidParameter);
        assert_eq!(err.to_string(), "function 3: void parameter in function type");

        let err = VerifyError::at(Location::block(0, 0), VerifyErrorKind::NotTerminated);
        assert_eq!(err.to_string(), "function 1, basic block 1: basic block not terminated");

        let err = VerifyError::at(
            Location::instruction(0, 1, 4),
            VerifyErrorKind::InvalidBasicBlock(7),
        );
        assert_eq!(
            err.to_string(),
            "function 1, basic block 2, instruction 4: invalid basic block 7"
        );
    }

    #[test]
    fn test_codes_are_unique() {
        let kinds = [
            VerifyErrorKind::NoFunctions,
            VerifyErrorKind::NotTerminated,
            VerifyErrorKind::InvalidBasicBlock(0),
            VerifyErrorKind::PhiVoid,
        ];
        let codes: Vec<_> = kinds.iter().map(|k| k.code().to_string()).collect();
        assert_eq!(codes, vec!["EV001", "EV025", "EV023", "EV036"]);
    }

    #[test]
    fn test_message_fits_buffer() {
        let err = VerifyError::at(
            Location::instruction(usize::MAX - 1, usize::MAX - 1, usize::MAX),
            VerifyErrorKind::PhiNotAtStart,
        );
        let message = err.message();
        assert!(message.len() < VERIFY_BUFFER_SIZE);
        assert_eq!(message, err.to_string());
    }
}
