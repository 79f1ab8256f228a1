//! Read and follow keys
//!
//! The two symmetric layers of the event envelope:
//! - `ReadKey` — shared per thread, decrypts event bodies.
//! - `FollowKey` — per log, decrypts the metadata envelope (header and the
//!   record's reference pair).
//!
//! Both are 256-bit ChaCha20-Poly1305 keys. Sealed format:
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`. The nonce is random
//! and travels inside the sealed bytes, so identical stored blocks re-hash
//! to identical cids.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use crate::crypto::CryptoError;

/// Size of a read/follow key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// Size of a ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;

macro_rules! define_key {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[repr(transparent)]
        pub struct $name(#[serde(with = "serde_bytes")] [u8; KEY_SIZE]);

        impl $name {
            /// Generate a fresh random key.
            pub fn generate() -> Self {
                Self(crate::crypto::generate_secret())
            }

            /// Parse a key from raw bytes.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; KEY_SIZE] =
                    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                        expected: KEY_SIZE,
                        got: bytes.len(),
                    })?;
                Ok(Self(arr))
            }

            /// Raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
            pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
                let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
                    .map_err(|_| CryptoError::InvalidKeyLength {
                        expected: KEY_SIZE,
                        got: self.0.len(),
                    })?;
                let nonce_bytes: [u8; NONCE_SIZE] = {
                    use rand::RngCore;
                    let mut n = [0u8; NONCE_SIZE];
                    rand::rngs::OsRng.fill_bytes(&mut n);
                    n
                };
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| CryptoError::Encrypt)?;
                let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
                sealed.extend_from_slice(&nonce_bytes);
                sealed.extend_from_slice(&ciphertext);
                Ok(sealed)
            }

            /// Decrypt bytes produced by [`seal`](Self::seal).
            ///
            /// Fails with [`CryptoError::Decrypt`] on a tag mismatch, i.e.
            /// wrong key or tampered ciphertext.
            pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
                if sealed.len() < NONCE_SIZE {
                    return Err(CryptoError::Decrypt);
                }
                let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
                    .map_err(|_| CryptoError::InvalidKeyLength {
                        expected: KEY_SIZE,
                        got: self.0.len(),
                    })?;
                let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
                let nonce = Nonce::from_slice(nonce_bytes);
                cipher.decrypt(nonce, ciphertext).map_err(|_| CryptoError::Decrypt)
            }
        }

        // Key material never appears in logs or debug output.
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "(..)"))
            }
        }
    };
}

define_key!(ReadKey, "Symmetric key decrypting event bodies; shared among all thread members.");
define_key!(FollowKey, "Per-log symmetric key decrypting the envelope around event metadata.");
