//! # Parley Crypto
//!
//! Symmetric primitives used by the Parley chat protocol.
//!
//! ## Components
//!
//! - **Hashing**: SHA-256 / SHA-512 wrapper, the only external primitive
//! - **RandomGenerator**: hash-ratchet byte source seeded from the OS
//! - **BlockCipher**: 16-round Feistel network over 64-byte blocks
//! - **StreamCipher**: chained, randomly padded construction for any length
//!
//! ## Security
//!
//! Confidentiality only. There is no MAC: a receiver learns that it holds
//! the wrong key from a short plaintext canary checked by the codec, not
//! from the cipher itself.

pub mod block;
pub mod errors;
pub mod hashing;
pub mod keys;
pub mod random;
pub mod stream;

pub use block::*;
pub use errors::*;
pub use hashing::*;
pub use keys::*;
pub use random::*;
pub use stream::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::block::*;
    pub use crate::errors::*;
    pub use crate::hashing::*;
    pub use crate::keys::*;
    pub use crate::random::*;
    pub use crate::stream::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_roundtrip() {
        let mut rng = RandomGenerator::from_entropy();

        // Message key from a shared passphrase
        let key = SecretKey::from_passphrase("hunter2");
        let cipher = StreamCipher::new(&key);

        // Fresh indicator per message
        let indicator: [u8; INDICATOR_SIZE] = rng.draw_array();

        let plaintext = b"Hello from Parley!";
        let ciphertext = cipher.encrypt(&indicator, plaintext, &mut rng);
        assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);

        let decrypted = cipher.decrypt(&indicator, &ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }
}
