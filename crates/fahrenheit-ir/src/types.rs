//! IR Type System
//!
//! A closed set of primitive machine types.

use std::fmt;

/// Primitive IR types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean, one byte in memory
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Untyped host pointer
    Pointer,
    /// No value
    Void,
}

impl Type {
    /// Bool and the sized integers
    pub fn is_int(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Returns the size in bytes on the host
    pub fn size_bytes(&self) -> usize {
        match self {
            Type::Bool | Type::Int8 => 1,
            Type::Int16 => 2,
            Type::Int32 | Type::Float => 4,
            Type::Int64 | Type::Double => 8,
            Type::Pointer => std::mem::size_of::<usize>(),
            Type::Void => 0,
        }
    }

    /// Width in bits of an integer type
    pub fn bits(&self) -> u32 {
        match self {
            Type::Bool => 1,
            other => other.size_bytes() as u32 * 8,
        }
    }

    /// Short name used by the printer
    pub fn name(&self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Int8 => "i8",
            Type::Int16 => "i16",
            Type::Int32 => "i32",
            Type::Int64 => "i64",
            Type::Float => "flt",
            Type::Double => "dbl",
            Type::Pointer => "ptr",
            Type::Void => "void",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_categories() {
        assert!(Type::Bool.is_int());
        assert!(Type::Int64.is_int());
        assert!(!Type::Pointer.is_int());
        assert!(Type::Double.is_float());
        assert!(Type::Float.is_numeric());
        assert!(!Type::Void.is_numeric());
        assert!(!Type::Pointer.is_numeric());
    }

    #[test]
    fn test_type_sizes() {
        assert_eq!(Type::Bool.size_bytes(), 1);
        assert_eq!(Type::Int16.size_bytes(), 2);
        assert_eq!(Type::Float.size_bytes(), 4);
        assert_eq!(Type::Pointer.size_bytes(), std::mem::size_of::<*const u8>());
        assert_eq!(Type::Bool.bits(), 1);
        assert_eq!(Type::Int32.bits(), 32);
    }

    #[test]
    fn test_type_display() {
        let names: Vec<String> = [
            Type::Bool,
            Type::Int8,
            Type::Int16,
            Type::Int32,
            Type::Int64,
            Type::Float,
            Type::Double,
            Type::Pointer,
            Type::Void,
        ]
        .iter()
        .map(|t| t.to_string())
        .collect();
        assert_eq!(
            names,
            vec!["bool", "i8", "i16", "i32", "i64", "flt", "dbl", "ptr", "void"]
        );
    }
}
