//! Error types for the node
//!
//! This module provides the error handling system using `thiserror`
//! for automatic error trait implementations. Block and transaction
//! validation outcomes are deliberately *not* errors; see
//! [`crate::chain::ValidationOutcome`].

use thiserror::Error;

/// Main error type for the node
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol version mismatch during peer handshake
    #[error("API error: {0}")]
    Api(String),

    /// Malformed 256-bit hash value
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Malformed compact difficulty target
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Big-integer arithmetic overflow
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Mining worker or task-manager errors
    #[error("Miner error: {0}")]
    Miner(String),

    /// Chain synchronization errors
    #[error("Sync error: {0}")]
    Sync(String),

    /// Peer connection errors
    #[error("Peer error: {0}")]
    Peer(String),

    /// The awaited operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for the node
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error from a message
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an API handshake error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create an invalid hash error
    pub fn invalid_hash(msg: impl Into<String>) -> Self {
        Self::InvalidHash(msg.into())
    }

    /// Create an invalid target error
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Create an overflow error
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    /// Create a miner error
    pub fn miner(msg: impl Into<String>) -> Self {
        Self::Miner(msg.into())
    }

    /// Create a sync error
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create a peer error
    pub fn peer(msg: impl Into<String>) -> Self {
        Self::Peer(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether a transient retry of the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::BrokenPipe
            ),
            Error::Other(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout") || msg.contains("connection")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("missing field");
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = Error::miner("worker failed");
        assert_eq!(err.to_string(), "Miner error: worker failed");

        assert_eq!(Error::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_error_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::other("connection refused by peer").is_retryable());
        assert!(!Error::config("bad listen address").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
