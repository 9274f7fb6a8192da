//! Chained Stream Cipher
//!
//! Encrypts arbitrary-length data as a chain of 64-byte blocks. Each block
//! gets its own block-cipher key, derived by hashing four registers: the
//! previous block key, the indicator, the caller key and the previous
//! ciphertext block. Each block carries 48 bytes of data followed by 16 bytes
//! of fresh random padding, so equal plaintexts never encrypt the same way.
//!
//! ```text
//! block:  [ data (48) .................... | padding (16) ]
//! final:  [ data (≤40) | len u64 LE (8)    | padding (16) ]
//! ```

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::block::{Block, BlockCipher, BLOCK_SIZE};
use crate::errors::{CryptoError, CryptoResult};
use crate::hashing::{ShaHash, WIDE_HASH_SIZE};
use crate::keys::SecretKey;
use crate::random::RandomGenerator;

/// Indicator (per-message nonce) size
pub const INDICATOR_SIZE: usize = WIDE_HASH_SIZE;

/// Random padding at the tail of every block
pub const PADDING_LEN: usize = 16;

/// Data bytes carried per block
pub const BLOCK_CAPACITY: usize = BLOCK_SIZE - PADDING_LEN;

/// Size of the plaintext length trailer in the final block
pub const LENGTH_TRAILER: usize = 8;

/// Number of blocks needed for `len` plaintext bytes
pub fn block_count(len: usize) -> usize {
    (len + LENGTH_TRAILER).div_ceil(BLOCK_CAPACITY)
}

/// Ciphertext size for `len` plaintext bytes
pub fn ciphertext_len(len: usize) -> usize {
    block_count(len) * BLOCK_SIZE
}

/// The four chain registers
#[derive(Zeroize, ZeroizeOnDrop)]
struct ChainState {
    block_key: [u8; WIDE_HASH_SIZE],
    indicator: [u8; INDICATOR_SIZE],
    key: [u8; WIDE_HASH_SIZE],
    block: Block,
}

impl ChainState {
    fn new(indicator: &[u8; INDICATOR_SIZE], key: &SecretKey) -> Self {
        Self {
            block_key: [0u8; WIDE_HASH_SIZE],
            indicator: *indicator,
            key: *key.as_bytes(),
            block: [0u8; BLOCK_SIZE],
        }
    }

    /// Advance the block key and build the cipher for the next block
    fn next_cipher(&mut self) -> BlockCipher {
        self.block_key = ShaHash::hash_wide_many(&[
            &self.block_key,
            &self.indicator,
            &self.key,
            &self.block,
        ]);
        BlockCipher::new(&self.block_key)
    }
}

/// Variable-length cipher built on [`BlockCipher`]
#[derive(Debug, Clone)]
pub struct StreamCipher {
    key: SecretKey,
}

impl StreamCipher {
    /// Create a stream cipher for the given key
    pub fn new(key: &SecretKey) -> Self {
        Self { key: key.clone() }
    }

    /// Encrypt `plaintext` under `indicator`
    ///
    /// Output is always a whole number of blocks; see [`ciphertext_len`].
    pub fn encrypt(
        &self,
        indicator: &[u8; INDICATOR_SIZE],
        plaintext: &[u8],
        rng: &mut RandomGenerator,
    ) -> Vec<u8> {
        let blocks = block_count(plaintext.len());
        let mut out = Vec::with_capacity(blocks * BLOCK_SIZE);
        let mut chain = ChainState::new(indicator, &self.key);
        let mut chunks = plaintext.chunks(BLOCK_CAPACITY);
        let mut block = Zeroizing::new([0u8; BLOCK_SIZE]);

        for index in 0..blocks {
            let cipher = chain.next_cipher();

            rng.fill(&mut block[..]);
            if let Some(chunk) = chunks.next() {
                block[..chunk.len()].copy_from_slice(chunk);
            }
            if index + 1 == blocks {
                let trailer = BLOCK_CAPACITY - LENGTH_TRAILER;
                block[trailer..BLOCK_CAPACITY]
                    .copy_from_slice(&(plaintext.len() as u64).to_le_bytes());
            }

            cipher.encrypt_block(&mut block);
            chain.block = *block;
            out.extend_from_slice(&block[..]);
        }

        out
    }

    /// Decrypt `ciphertext` under `indicator`
    ///
    /// A wrong key or indicator usually yields garbage rather than an
    /// error; only structurally impossible input is rejected here.
    pub fn decrypt(
        &self,
        indicator: &[u8; INDICATOR_SIZE],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidCiphertextLength {
                len: ciphertext.len(),
                block: BLOCK_SIZE,
            });
        }

        let blocks = ciphertext.len() / BLOCK_SIZE;
        let mut out = Vec::with_capacity(blocks * BLOCK_CAPACITY);
        let mut chain = ChainState::new(indicator, &self.key);
        let mut block = Zeroizing::new([0u8; BLOCK_SIZE]);

        for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
            let cipher = chain.next_cipher();

            block.copy_from_slice(chunk);
            chain.block = *block;
            cipher.decrypt_block(&mut block);
            out.extend_from_slice(&block[..BLOCK_CAPACITY]);
        }

        let trailer = out.len() - LENGTH_TRAILER;
        let mut len_bytes = [0u8; LENGTH_TRAILER];
        len_bytes.copy_from_slice(&out[trailer..]);
        let claimed = u64::from_le_bytes(len_bytes);

        match usize::try_from(claimed) {
            Ok(len) if len <= trailer && block_count(len) == blocks => {
                out.truncate(len);
                Ok(out)
            }
            _ => Err(CryptoError::CorruptLength {
                claimed,
                capacity: trailer,
            }),
        }
    }

    /// Encrypt everything in `buf` from `offset` on, in place
    ///
    /// The tail is moved out before encrypting so input and output never
    /// share storage.
    pub fn encrypt_tail(
        &self,
        indicator: &[u8; INDICATOR_SIZE],
        buf: &mut Vec<u8>,
        offset: usize,
        rng: &mut RandomGenerator,
    ) {
        let tail = Zeroizing::new(buf.split_off(offset.min(buf.len())));
        let sealed = self.encrypt(indicator, &tail, rng);
        buf.extend_from_slice(&sealed);
    }

    /// Decrypt everything in `buf` from `offset` on, in place
    ///
    /// On error `buf` is left untouched.
    pub fn decrypt_tail(
        &self,
        indicator: &[u8; INDICATOR_SIZE],
        buf: &mut Vec<u8>,
        offset: usize,
    ) -> CryptoResult<()> {
        let offset = offset.min(buf.len());
        let opened = self.decrypt(indicator, &buf[offset..])?;
        buf.truncate(offset);
        buf.extend_from_slice(&opened);
        Ok(())
    }
}
