//! Host error types

use crate::value::Value;
use thiserror::Error;

/// Host execution errors
///
/// The string variants are not yet materialized as error objects; a
/// [`Context`](crate::Context) turns them into `Error` instances with
/// [`Context::error_to_value`](crate::Context::error_to_value) when host code
/// needs to observe them.
#[derive(Debug, Error)]
pub enum HostError {
    /// Type error (e.g., calling non-function)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (undefined variable)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (e.g., invalid array length)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Out of memory
    #[error("OutOfMemory")]
    OutOfMemory,

    /// Thrown host value
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),
}

/// A thrown host value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl HostError {
    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Create a range error
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::RangeError(message.into())
    }

    /// Create a reference error
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::ReferenceError(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Wrap an already materialized value
    pub fn exception(value: Value, message: impl Into<String>) -> Self {
        Self::Exception(Box::new(ThrownValue {
            value,
            message: message.into(),
        }))
    }

    /// Name of the error class this error materializes as.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::TypeError(_) => "TypeError",
            Self::ReferenceError(_) => "ReferenceError",
            Self::RangeError(_) => "RangeError",
            Self::InternalError(_) => "InternalError",
            Self::OutOfMemory => "InternalError",
            Self::Exception(_) => "Error",
        }
    }
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
