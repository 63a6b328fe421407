//! Script error types

use std::fmt;

use thiserror::Error;

use crate::object::Obj;

/// Script execution errors
///
/// Builtin kinds travel unmaterialized until something needs the exception
/// object (a traceback frame, `__cause__`, an `isinstance` check); then
/// [`Interp::materialize`](crate::Interp::materialize) turns them into
/// [`ScriptError::Raised`].
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Operation applied to an object of inappropriate type
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Right type, inappropriate value
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Mapping key not found; the payload is the key as text
    #[error("KeyError: '{0}'")]
    KeyError(String),

    /// Sequence index out of range
    #[error("IndexError: {0}")]
    IndexError(String),

    /// Attribute reference or assignment failed
    #[error("AttributeError: {0}")]
    AttributeError(String),

    /// Name not found
    #[error("NameError: {0}")]
    NameError(String),

    /// Arithmetic result too large
    #[error("OverflowError: {0}")]
    OverflowError(String),

    /// Division or modulo by zero
    #[error("ZeroDivisionError: {0}")]
    ZeroDivisionError(String),

    /// Iterator exhausted
    #[error("StopIteration")]
    StopIteration,

    /// Abstract operation not provided
    #[error("NotImplementedError: {0}")]
    NotImplementedError(String),

    /// Generic runtime failure
    #[error("RuntimeError: {0}")]
    RuntimeError(String),

    /// Call depth exceeded the recursion limit
    #[error("RecursionError: {0}")]
    RecursionError(String),

    /// Import failed
    #[error("ImportError: {0}")]
    ImportError(String),

    /// Source could not be parsed
    #[error("SyntaxError: {0}")]
    SyntaxError(Box<SyntaxErrorInfo>),

    /// Allocation failure
    #[error("MemoryError")]
    MemoryError,

    /// A materialized exception object
    #[error("{0}")]
    Raised(Box<RaisedException>),
}

/// Location details of a syntax error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxErrorInfo {
    /// Parser message
    pub message: String,
    /// Source file name
    pub filename: String,
    /// 1-based line
    pub lineno: usize,
    /// 1-based column
    pub offset: usize,
    /// Offending source line
    pub text: Option<String>,
}

impl fmt::Display for SyntaxErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, line {})", self.message, self.filename, self.lineno)
    }
}

/// A raised exception object with its rendered summary
#[derive(Debug, Clone)]
pub struct RaisedException {
    /// The exception instance
    pub exception: Obj,
    /// `Name: message`, computed when the exception was raised
    pub summary: String,
}

impl fmt::Display for RaisedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

impl ScriptError {
    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Create a value error
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::ValueError(message.into())
    }

    /// Create a key error for a string key
    pub fn key_error(key: impl Into<String>) -> Self {
        Self::KeyError(key.into())
    }

    /// Create an index error
    pub fn index_error(message: impl Into<String>) -> Self {
        Self::IndexError(message.into())
    }

    /// Create an attribute error
    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::AttributeError(message.into())
    }

    /// Create a name error
    pub fn name_error(message: impl Into<String>) -> Self {
        Self::NameError(message.into())
    }

    /// Create an overflow error
    pub fn overflow_error(message: impl Into<String>) -> Self {
        Self::OverflowError(message.into())
    }

    /// Create a not-implemented error
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplementedError(message.into())
    }

    /// Create a runtime error
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::RuntimeError(message.into())
    }

    /// Create an import error
    pub fn import_error(message: impl Into<String>) -> Self {
        Self::ImportError(message.into())
    }

    /// Create a syntax error
    pub fn syntax_error(
        message: impl Into<String>,
        filename: impl Into<String>,
        lineno: usize,
        offset: usize,
        text: Option<String>,
    ) -> Self {
        Self::SyntaxError(Box::new(SyntaxErrorInfo {
            message: message.into(),
            filename: filename.into(),
            lineno,
            offset,
            text,
        }))
    }

    /// Builtin class name this error materializes as, `None` for
    /// already materialized exceptions.
    pub fn builtin_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::TypeError(_) => "TypeError",
            Self::ValueError(_) => "ValueError",
            Self::KeyError(_) => "KeyError",
            Self::IndexError(_) => "IndexError",
            Self::AttributeError(_) => "AttributeError",
            Self::NameError(_) => "NameError",
            Self::OverflowError(_) => "OverflowError",
            Self::ZeroDivisionError(_) => "ZeroDivisionError",
            Self::StopIteration => "StopIteration",
            Self::NotImplementedError(_) => "NotImplementedError",
            Self::RuntimeError(_) => "RuntimeError",
            Self::RecursionError(_) => "RecursionError",
            Self::ImportError(_) => "ImportError",
            Self::SyntaxError(_) => "SyntaxError",
            Self::MemoryError => "MemoryError",
            Self::Raised(_) => return None,
        })
    }

    /// Message carried by an unmaterialized error.
    pub fn message(&self) -> String {
        match self {
            Self::TypeError(m)
            | Self::ValueError(m)
            | Self::KeyError(m)
            | Self::IndexError(m)
            | Self::AttributeError(m)
            | Self::NameError(m)
            | Self::OverflowError(m)
            | Self::ZeroDivisionError(m)
            | Self::NotImplementedError(m)
            | Self::RuntimeError(m)
            | Self::RecursionError(m)
            | Self::ImportError(m) => m.clone(),
            Self::SyntaxError(info) => info.message.clone(),
            Self::StopIteration | Self::MemoryError => String::new(),
            Self::Raised(raised) => raised.summary.clone(),
        }
    }
}

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_has_kind_prefix() {
        assert_eq!(ScriptError::type_error("bad").to_string(), "TypeError: bad");
        assert_eq!(ScriptError::StopIteration.to_string(), "StopIteration");
        let syntax = ScriptError::syntax_error("invalid syntax", "<string>", 3, 5, None);
        assert_eq!(syntax.to_string(), "SyntaxError: invalid syntax (<string>, line 3)");
    }

    #[test]
    fn test_builtin_name() {
        assert_eq!(ScriptError::key_error("x").builtin_name(), Some("KeyError"));
        assert_eq!(ScriptError::MemoryError.builtin_name(), Some("MemoryError"));
    }
}
