//! Error types for parley-crypto

use thiserror::Error;

/// Errors that can occur in parley-crypto operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext is empty or not a whole number of blocks
    #[error("Invalid ciphertext length: {len} is not a positive multiple of {block}")]
    InvalidCiphertextLength { len: usize, block: usize },

    /// Recovered plaintext length does not fit the block count
    #[error("Corrupt length trailer: {claimed} bytes claimed, {capacity} available")]
    CorruptLength { claimed: u64, capacity: usize },

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

/// Result type for parley-crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
