//! Diagnostic - Rust-style error reports
//!
//! Renders verifier and backend errors as:
//!
//! ```text
//! error[EV025]: basic block not terminated
//!   = note: function 1, basic block 1
//!   = help: end the block with ret, jmp or jmpif
//! ```

use crate::codegen::CodegenError;
use crate::verify::{VerifyError, VerifyErrorKind};
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Fatal error - prevents compilation
    Error,
    /// Warning - does not prevent compilation
    Warning,
    /// Note - additional information
    Note,
    /// Help - fix suggestion
    Help,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
            Level::Help => "help",
        }
    }

    /// Returns the ANSI code for coloring
    pub fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",   // Bold Red
            Level::Warning => "\x1b[1;33m", // Bold Yellow
            Level::Note => "\x1b[1;36m",    // Bold Cyan
            Level::Help => "\x1b[1;32m",    // Bold Green
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    /// Category (V = Verifier, B = Backend)
    pub category: char,
    /// Error number
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    /// Creates a new warning
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Sets the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Adds a fix suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Renders the diagnostic as a string
    pub fn render(&self, use_colors: bool) -> String {
        let reset = if use_colors { "\x1b[0m" } else { "" };
        let color = if use_colors { self.level.color_code() } else { "" };
        let bold = if use_colors { "\x1b[1m" } else { "" };
        let green = if use_colors { "\x1b[1;32m" } else { "" };

        let mut output = String::new();
        output.push_str(color);
        output.push_str(self.level.as_str());
        if let Some(code) = &self.code {
            output.push_str(&format!("[{}]", code));
        }
        output.push_str(reset);
        output.push_str(&format!("{}: {}{}\n", bold, self.message, reset));

        for note in &self.notes {
            output.push_str(&format!("  = {}note{}: {}\n", bold, reset, note));
        }
        for help in &self.help {
            output.push_str(&format!("  = {}help{}: {}\n", green, reset, help));
        }
        output
    }
}

impl From<&VerifyError> for Diagnostic {
    fn from(err: &VerifyError) -> Self {
        let mut diagnostic = Diagnostic::error(err.kind.to_string()).with_code(err.code());
        if let Some(location) = &err.location {
            diagnostic = diagnostic.with_note(location.to_string());
        }
        match err.kind {
            VerifyErrorKind::NotTerminated => {
                diagnostic.with_help("end the block with ret, jmp or jmpif")
            }
            VerifyErrorKind::InvalidBasicBlock(0) => {
                diagnostic.with_help("the entry block cannot be a jump target")
            }
            VerifyErrorKind::CallNotDeclared => {
                diagnostic.with_help("declare the callee before the caller")
            }
            VerifyErrorKind::PhiInFirstBlock => {
                diagnostic.with_help("move the phi to a block with predecessors")
            }
            _ => diagnostic,
        }
    }
}

impl From<&CodegenError> for Diagnostic {
    fn from(err: &CodegenError) -> Self {
        Diagnostic::error(err.to_string()).with_code(err.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Location;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_without_colors() {
        let err = VerifyError::at(Location::block(0, 0), VerifyErrorKind::NotTerminated);
        let rendered = Diagnostic::from(&err).render(false);

        assert_eq!(
            rendered,
            "error[EV025]: basic block not terminated\n\
             \x20 = note: function 1, basic block 1\n\
             \x20 = help: end the block with ret, jmp or jmpif\n"
        );
    }

    #[test]
    fn test_module_error_has_no_note() {
        let err = VerifyError::module(VerifyErrorKind::NoFunctions);
        let diagnostic = Diagnostic::from(&err);
        assert!(diagnostic.notes.is_empty());
        assert_eq!(diagnostic.render(false), "error[EV001]: module with no functions\n");
    }

    #[test]
    fn test_codegen_error_diagnostic() {
        let err = CodegenError::Init("no native target".into());
        let rendered = Diagnostic::from(&err).render(false);
        assert_eq!(
            rendered,
            "error[EB007]: backend initialization failed: no native target\n"
        );
    }

    #[test]
    fn test_colored_output_contains_level() {
        let rendered = Diagnostic::warning("slow path").render(true);
        assert!(rendered.contains("warning"));
        assert!(rendered.contains("\x1b[0m"));
    }
}
