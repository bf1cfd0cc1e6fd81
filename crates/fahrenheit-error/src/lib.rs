//! fahrenheit-error - Error types for the Fahrenheit JIT
//!
//! Two families of errors exist:
//! - [`VerifyError`]: produced by the IR verifier, localized to a
//!   function, basic block and instruction ordinal
//! - [`CodegenError`]: produced by a backend while lowering or compiling
//!
//! Both can be turned into a [`Diagnostic`] for rustc-style rendering.
//!
//! # Example
//!
//! ```rust
//! use fahrenheit_error::{Diagnostic, Location, VerifyError, VerifyErrorKind};
//!
//! let err = VerifyError::at(
//!     Location::instruction(0, 1, 3),
//!     VerifyErrorKind::BinopTypeMismatch,
//! );
//! assert_eq!(
//!     err.to_string(),
//!     "function 1, basic block 2, instruction 3: type mismatch in binop"
//! );
//!
//! let rendered = Diagnostic::from(&err).render(false);
//! assert!(rendered.starts_with("error[EV017]"));
//! ```

pub mod codegen;
pub mod diagnostic;
pub mod verify;

pub use codegen::CodegenError;
pub use diagnostic::{Diagnostic, ErrorCode, Level};
pub use verify::{Location, VerifyError, VerifyErrorKind, VERIFY_BUFFER_SIZE};

/// Result of a verification pass
pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

/// Result of a backend operation
pub type Result<T> = std::result::Result<T, CodegenError>;
