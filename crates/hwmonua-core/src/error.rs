//! Error types for the protocol server runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for server construction and transport setup.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while constructing or starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration values the server cannot run with
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),

    /// Certificate, private key or trust list could not be used
    #[error("Invalid security material: {0}")]
    Security(String),

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading configuration inputs from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to load file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File {0} is empty")]
    Empty(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ServerError::InvalidConfig("max_pending_requests must be > 0".to_string());
        assert!(error.to_string().contains("max_pending_requests"));

        let error = ConfigError::Empty(PathBuf::from("/tmp/cert.der"));
        assert_eq!(error.to_string(), "File /tmp/cert.der is empty");
    }
}
