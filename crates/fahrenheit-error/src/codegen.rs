//! Backend errors

use crate::diagnostic::ErrorCode;
use thiserror::Error;

/// Errors a backend may return while compiling a module
///
/// Function indices are 0-based and displayed like the printer's labels.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The backend's own IR checker rejected the lowered code
    #[error("backend verification failed: {0}")]
    Verification(String),

    /// Declaring, defining or finalizing a function failed
    #[error("module error: {0}")]
    Module(String),

    #[error("LLVM error: {0}")]
    Llvm(String),

    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("function @{:02}: unsupported {}", .function + 1, .detail)]
    Unsupported { function: usize, detail: String },

    /// Raised for IR that would never pass the verifier
    #[error("function @{:02}: invalid IR: {}", .function + 1, .detail)]
    InvalidIr { function: usize, detail: String },

    #[error("backend initialization failed: {0}")]
    Init(String),
}

impl CodegenError {
    pub fn code(&self) -> ErrorCode {
        let number = match self {
            CodegenError::Verification(_) => 1,
            CodegenError::Module(_) => 2,
            CodegenError::Llvm(_) => 3,
            CodegenError::UnsupportedTarget(_) => 4,
            CodegenError::Unsupported { .. } => 5,
            CodegenError::InvalidIr { .. } => 6,
            CodegenError::Init(_) => 7,
        };
        ErrorCode::new('B', number)
    }

    pub fn invalid_ir(function: usize, detail: impl Into<String>) -> Self {
        CodegenError::InvalidIr {
            function,
            detail: detail.into(),
        }
    }

    pub fn unsupported(function: usize, detail: impl Into<String>) -> Self {
        CodegenError::Unsupported {
            function,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_label_is_one_based() {
        let err = CodegenError::invalid_ir(0, "missing operand");
        assert_eq!(err.to_string(), "function @01: invalid IR: missing operand");

        let err = CodegenError::unsupported(11, "variadic call to a module function");
        assert_eq!(
            err.to_string(),
            "function @12: unsupported variadic call to a module function"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(CodegenError::Llvm("x".into()).code().to_string(), "EB003");
        assert_eq!(CodegenError::Init("x".into()).code().to_string(), "EB007");
    }
}
