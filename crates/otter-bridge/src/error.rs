//! Bridge error types

use otter_host::HostError;
use otter_script::ScriptError;
use thiserror::Error;

/// Errors surfaced by the bridge entry points
///
/// Inside the proxies failures travel as the native error of whichever side
/// detected them. They only become a `BridgeError` when they leave the
/// outermost entry point.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A host-side failure
    #[error("{0}")]
    Host(#[from] HostError),

    /// A script-side failure
    #[error("{0}")]
    Script(#[from] ScriptError),

    /// The bridge was used before `initialize` or after `finalize`
    #[error("Bridge is not initialized")]
    NotInitialized,

    /// The script runtime already carries a bridge
    #[error("Bridge is already initialized")]
    AlreadyInitialized,

    /// A component module could not be loaded
    #[error("Module error: {path}: {message}")]
    ModuleLoad {
        /// Module location
        path: String,
        /// What went wrong
        message: String,
    },

    /// Internal bridge failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Create a module load error
    pub fn module_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The script error, when this is one.
    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            Self::Script(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for bridge entry points
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BridgeError::module_load("/tmp/a.py", "boom");
        assert_eq!(err.to_string(), "Module error: /tmp/a.py: boom");

        let err: BridgeError = ScriptError::type_error("bad").into();
        assert_eq!(err.to_string(), "TypeError: bad");
        assert!(err.as_script().is_some());

        let err: BridgeError = HostError::type_error("nope").into();
        assert!(err.as_script().is_none());
    }
}
