//! Shared secret keys

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CryptoError, CryptoResult};
use crate::hashing::{constant_time_eq, ShaHash, WIDE_HASH_SIZE};

/// Secret key size (one SHA-512 digest)
pub const SECRET_KEY_SIZE: usize = WIDE_HASH_SIZE;

/// A 512-bit symmetric key shared by everyone in a conversation
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; SECRET_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Derive a key from a passphrase with SHA-512
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(ShaHash::hash_wide(passphrase.as_bytes()))
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }

    /// Short printable fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        hex::encode(&ShaHash::hash(&self.0)[..8])
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SecretKey {}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({})", self.fingerprint())
    }
}
