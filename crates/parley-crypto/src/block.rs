//! Feistel Block Cipher
//!
//! A 512-bit balanced Feistel network with SHA-256 as the round function.
//!
//! ```text
//!   left (32)          right (32)
//!      │                   │
//!      ├──► H(left ‖ k0) ──⊕      round 0: left active
//!      ⊕── H(right ‖ k1) ◄─┤      round 1: right active
//!      │        ...        │      16 rounds
//! ```
//!
//! The first two round keys are the two halves of the 64-byte key. Every
//! later round key is the hash of the whole round-key table as filled so far,
//! with the slots not yet computed still zero.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hashing::{ShaHash, HASH_SIZE};

/// Block size in bytes
pub const BLOCK_SIZE: usize = 64;

/// Size of one Feistel half
pub const HALF_SIZE: usize = BLOCK_SIZE / 2;

/// Block cipher key size
pub const BLOCK_KEY_SIZE: usize = 2 * HALF_SIZE;

/// Number of Feistel rounds (must be even)
pub const ROUNDS: usize = 16;

/// A single 64-byte block
pub type Block = [u8; BLOCK_SIZE];

/// Feistel block cipher with an expanded key schedule
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlockCipher {
    round_keys: [[u8; HASH_SIZE]; ROUNDS],
}

impl BlockCipher {
    /// Expand a 64-byte key into the round-key table
    pub fn new(key: &[u8; BLOCK_KEY_SIZE]) -> Self {
        let mut round_keys = [[0u8; HASH_SIZE]; ROUNDS];
        round_keys[0].copy_from_slice(&key[..HALF_SIZE]);
        round_keys[1].copy_from_slice(&key[HALF_SIZE..]);

        for i in 2..ROUNDS {
            let next = ShaHash::hash(round_keys.as_flattened());
            round_keys[i] = next;
        }

        Self { round_keys }
    }

    /// Encrypt one block in place
    pub fn encrypt_block(&self, block: &mut Block) {
        for round in 0..ROUNDS {
            self.round(round, block);
        }
    }

    /// Decrypt one block in place
    pub fn decrypt_block(&self, block: &mut Block) {
        for round in (0..ROUNDS).rev() {
            self.round(round, block);
        }
    }

    fn round(&self, round: usize, block: &mut Block) {
        let (left, right) = block.split_at_mut(HALF_SIZE);
        let (active, passive) = if round % 2 == 0 {
            (left, right)
        } else {
            (right, left)
        };

        let mix = ShaHash::hash_many(&[&*active, &self.round_keys[round][..]]);
        for (p, m) in passive.iter_mut().zip(mix.iter()) {
            *p ^= m;
        }
    }
}

impl std::fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCipher").finish_non_exhaustive()
    }
}
