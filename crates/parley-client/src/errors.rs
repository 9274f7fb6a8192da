//! Client Errors
//!
//! Error types for the chat client.

use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection failed
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Identity handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] parley_protocol::ProtocolError),

    /// Invalid server address
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// DNS resolution failed
    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image attachment could not be loaded
    #[error("Image error: {0}")]
    Image(String),

    /// Discovery socket could not be set up
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

impl ClientError {
    /// Whether the session can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Image(_) => true,
            ClientError::Protocol(e) => e.is_frame_drop(),
            _ => false,
        }
    }
}
