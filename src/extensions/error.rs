//! Error types for the extension system.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::codec::DecodeError;

/// Errors that can occur in the extension system.
///
/// Per-call failures (everything from `Unimplemented` down to `Cancelled`)
/// travel through the same [`PendingCall`](super::PendingCall) channel as
/// successful results.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid manifest in {origin}: {message}")]
    Configuration { origin: String, message: String },

    #[error("Failed to load extension '{extension}': {message}")]
    LoadFailed { extension: String, message: String },

    #[error("Extension '{0}' not found")]
    ExtensionNotFound(String),

    #[error("Extension '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("Too many extensions installed (max: {0})")]
    TooManyExtensions(usize),

    #[error("{function} is not a function or isn't defined")]
    Unimplemented {
        extension: String,
        function: &'static str,
    },

    #[error("Extension '{extension}' does not declare the {feature} feature")]
    FeatureNotDeclared { extension: String, feature: String },

    #[error("Host precondition failed: {0}")]
    HostPrecondition(String),

    #[error("JavaScript error: {message}")]
    Guest {
        message: String,
        stack: Option<String>,
    },

    #[error("Extension execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("Malformed {record} response: {source}")]
    Decode {
        record: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("{message}")]
    ZeroResults { message: String },

    #[error("Call was cancelled")]
    Cancelled,

    #[error("Call to extension '{0}' was abandoned before it settled")]
    Abandoned(String),

    #[error("Extension '{0}' has been uninstalled")]
    Uninstalled(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Script engine error: {0}")]
    Engine(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtensionError {
    /// Whether the error is a host programming error rather than something
    /// to show the end user.
    pub fn is_host_misuse(&self) -> bool {
        matches!(
            self,
            Self::FeatureNotDeclared { .. } | Self::HostPrecondition(_)
        )
    }

    /// Whether the call succeeded but produced nothing to show.
    pub fn is_zero_results(&self) -> bool {
        matches!(self, Self::ZeroResults { .. })
    }

    /// Whether the error was raised by guest code.
    pub fn is_guest_error(&self) -> bool {
        matches!(
            self,
            Self::Guest { .. } | Self::ExecutionTimeout(_) | Self::Unimplemented { .. }
        )
    }

    pub(crate) fn guest(message: impl Into<String>) -> Self {
        Self::Guest {
            message: message.into(),
            stack: None,
        }
    }
}

impl From<rquickjs::Error> for ExtensionError {
    fn from(err: rquickjs::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unimplemented_names_function() {
        let err = ExtensionError::Unimplemented {
            extension: "demo".to_string(),
            function: "awerySearchMedia",
        };
        assert_eq!(
            err.to_string(),
            "awerySearchMedia is not a function or isn't defined"
        );
        assert!(err.is_guest_error());
        assert!(!err.is_host_misuse());
    }

    #[test]
    fn test_classification() {
        let misuse = ExtensionError::FeatureNotDeclared {
            extension: "demo".to_string(),
            feature: "account_login".to_string(),
        };
        assert!(misuse.is_host_misuse());

        let empty = ExtensionError::ZeroResults {
            message: "No media found".to_string(),
        };
        assert!(empty.is_zero_results());
        assert_eq!(empty.to_string(), "No media found");
    }
}
