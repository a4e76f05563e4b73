//! Core error types for the Procura workspace.
//!
//! Subsystem crates keep their own error enums; this one covers
//! configuration loading and the shared newtypes.

use thiserror::Error;

/// Error type for the shared newtypes and configuration loading.
///
/// Browser, job and scrape failures have their own enums in their crates.
#[derive(Error, Debug)]
pub enum ProcuraError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A value that does not satisfy its format (job ids, timestamps)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `ProcuraError`.
pub type Result<T> = std::result::Result<T, ProcuraError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcuraError::Validation("invalid job id: 42".to_string());
        assert_eq!(err.to_string(), "validation error: invalid job id: 42");

        let err = ConfigError::InvalidValue {
            field: "waits.network_timeout_ms".to_string(),
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for waits.network_timeout_ms: must be greater than zero"
        );
    }

    #[test]
    fn test_error_from_config() {
        let config_err = ConfigError::NoConfigDir;
        let err: ProcuraError = config_err.into();
        assert!(matches!(err, ProcuraError::Config(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: ProcuraError = io_err.into();
        assert!(matches!(err, ProcuraError::Io(_)));
    }
}
