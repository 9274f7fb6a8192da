//! Ratcheting Random Generator
//!
//! A hash-chain byte source. Seed material is XOR-absorbed into a 256-bit
//! state which is then hashed in place; every draw ratchets the state forward
//! by hashing it again. Because SHA-256 is preimage resistant, capturing the
//! state does not reveal earlier outputs.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::hashing::{ShaHash, HASH_SIZE};

/// Size of the generator state
pub const RANDOM_STATE_SIZE: usize = HASH_SIZE;

/// Hash-ratchet random generator
///
/// One generator is owned per process role and passed by `&mut` to whatever
/// needs fresh bytes (indicators, cipher padding). Tests build one with
/// [`RandomGenerator::from_seed`] for reproducible output.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RandomGenerator {
    state: [u8; RANDOM_STATE_SIZE],
}

impl RandomGenerator {
    /// Create an unseeded generator (all-zero state)
    pub fn new() -> Self {
        Self {
            state: [0u8; RANDOM_STATE_SIZE],
        }
    }

    /// Create a generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        let mut rng = Self::new();
        rng.seed_from_os();
        rng
    }

    /// Create a generator seeded only from caller material
    pub fn from_seed(material: &[u8]) -> Self {
        let mut rng = Self::new();
        rng.seed(material);
        rng
    }

    /// Absorb seed material into the state
    ///
    /// Material longer than the state wraps around and keeps XOR-ing.
    pub fn seed(&mut self, material: &[u8]) {
        for (i, byte) in material.iter().enumerate() {
            self.state[i % RANDOM_STATE_SIZE] ^= byte;
        }
        self.state = ShaHash::hash(&self.state);
    }

    /// Absorb OS entropy into the state
    ///
    /// If the OS source fails the generator keeps whatever it had absorbed.
    pub fn seed_from_os(&mut self) {
        let mut entropy = Zeroizing::new([0u8; RANDOM_STATE_SIZE]);
        if OsRng.try_fill_bytes(&mut entropy[..]).is_ok() {
            self.seed(&entropy[..]);
        }
    }

    /// Fill `out` with generator output, ratcheting once per 32 bytes
    pub fn fill(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(RANDOM_STATE_SIZE) {
            self.state = ShaHash::hash(&self.state);
            chunk.copy_from_slice(&self.state[..chunk.len()]);
        }
    }

    /// Draw `n` bytes
    pub fn draw(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.fill(&mut out);
        out
    }

    /// Draw a fixed-size array
    pub fn draw_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.fill(&mut out);
        out
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl std::fmt::Debug for RandomGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomGenerator").finish_non_exhaustive()
    }
}

impl RngCore for RandomGenerator {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.draw_array())
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.draw_array())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill(dest);
        Ok(())
    }
}

impl CryptoRng for RandomGenerator {}
