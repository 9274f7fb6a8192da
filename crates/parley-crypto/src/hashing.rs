//! SHA-2 Hashing
//!
//! Thin wrapper over SHA-256 and SHA-512. Every other primitive in this
//! crate is built from these two digests.

use sha2::{Digest, Sha256, Sha512};

/// SHA-256 output size
pub const HASH_SIZE: usize = 32;

/// SHA-512 output size
pub const WIDE_HASH_SIZE: usize = 64;

/// SHA-2 hash function wrapper
pub struct ShaHash;

impl ShaHash {
    /// Hash data with SHA-256
    pub fn hash(data: &[u8]) -> [u8; HASH_SIZE] {
        Sha256::digest(data).into()
    }

    /// Hash data with SHA-512
    pub fn hash_wide(data: &[u8]) -> [u8; WIDE_HASH_SIZE] {
        Sha512::digest(data).into()
    }

    /// Hash the concatenation of several pieces with SHA-256
    pub fn hash_many(data: &[&[u8]]) -> [u8; HASH_SIZE] {
        let mut hasher = Sha256::new();
        for d in data {
            hasher.update(d);
        }
        hasher.finalize().into()
    }

    /// Hash the concatenation of several pieces with SHA-512
    pub fn hash_wide_many(data: &[&[u8]]) -> [u8; WIDE_HASH_SIZE] {
        let mut hasher = Sha512::new();
        for d in data {
            hasher.update(d);
        }
        hasher.finalize().into()
    }
}

/// Constant-time comparison
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
