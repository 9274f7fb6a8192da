//! Protocol Error Types

use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Decrypted body did not start with the canary (wrong key)
    #[error("Canary mismatch: frame encrypted under a different key")]
    CanaryMismatch,

    /// Header could not be parsed
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Name or group rejected at encode time
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Image dimensions do not match the pixel data
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Frame shorter than its fixed fields
    #[error("Frame too small: got {got} bytes, need at least {min}")]
    FrameTooSmall { got: usize, min: usize },

    /// Frame length exceeds the configured limit
    #[error("Frame too large: got {got} bytes, max is {max}")]
    FrameTooLarge { got: usize, max: usize },

    /// Peer stopped sending partway through a frame
    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// The frame should be discarded but the connection kept
    pub fn is_frame_drop(&self) -> bool {
        matches!(
            self,
            ProtocolError::CanaryMismatch
                | ProtocolError::MalformedHeader(_)
                | ProtocolError::InvalidImage(_)
        )
    }

    /// The connection can no longer be trusted to be in sync
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ShortRead { .. }
                | ProtocolError::Io(_)
                | ProtocolError::FrameTooSmall { .. }
                | ProtocolError::FrameTooLarge { .. }
        )
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
