//! Error types for awery-bridge
//!
//! Crate-level errors wrap the extension system's errors together with
//! configuration and I/O failures.

use thiserror::Error;

use crate::extensions::ExtensionError;

/// Errors that can occur outside a single extension call
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extension loading or execution errors
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for crate-level operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_errors_pass_through() {
        let error = BridgeError::from(ExtensionError::ExtensionNotFound("demo".to_string()));
        assert!(matches!(error, BridgeError::Extension(ExtensionError::ExtensionNotFound(_))));
        assert_eq!(
            error.to_string(),
            ExtensionError::ExtensionNotFound("demo".to_string()).to_string()
        );
    }
}
