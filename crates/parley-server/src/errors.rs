//! Server Errors
//!
//! Error types for the relay server.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every client identity has been issued
    #[error("Client identities exhausted, refusing {0}")]
    IdentitiesExhausted(std::net::SocketAddr),

    /// Handshake with a new client did not finish in time
    #[error("Handshake with {0} timed out")]
    HandshakeTimeout(std::net::SocketAddr),
}
