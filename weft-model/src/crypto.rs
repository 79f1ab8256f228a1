//! Centralized cryptographic operations for weft.
//!
//! **All** Ed25519 signing, verification, BLAKE3 hashing, and secret
//! generation should go through this module. This provides a single audit
//! surface for cryptographic correctness.
//!
//! # Primitives
//!
//! | Primitive   | Algorithm          | Purpose                                  |
//! |-------------|--------------------|------------------------------------------|
//! | Cid         | BLAKE3 (32 B)      | Content addressing, `prev` linkage       |
//! | Signature   | Ed25519 (64 B)     | Record signing, push envelope signing    |
//! | Keys        | ChaCha20-Poly1305  | Read/follow envelopes (see [`crate::keys`]) |

use crate::types::{Cid, PubKey, Signature};

// ---------------------------------------------------------------------------
// Content addressing (BLAKE3)
// ---------------------------------------------------------------------------

/// Compute the content id of a block's serialized bytes.
///
/// Identical bytes always hash to the same cid; AEAD nonces live inside the
/// ciphertext, so stored blocks re-hash to the id they were stored under.
#[inline]
pub fn content_cid(data: &[u8]) -> Cid {
    Cid(*blake3::hash(data).as_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 signing
// ---------------------------------------------------------------------------

/// Sign arbitrary bytes with an Ed25519 signing key.
///
/// Used for record envelopes and for the push request signature, both of
/// which sign the full serialized payload rather than a digest.
pub fn sign(signing_key: &ed25519_dalek::SigningKey, message: &[u8]) -> Signature {
    use ed25519_dalek::Signer;
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify an Ed25519 signature over arbitrary bytes.
pub fn verify(pubkey: &PubKey, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    use ed25519_dalek::Verifier;
    let vk = verifying_key(pubkey)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Deserialize a `PubKey` into an Ed25519 `VerifyingKey`.
///
/// Fails if the 32 bytes are not a valid curve point.
pub fn verifying_key(pubkey: &PubKey) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0).map_err(|_| CryptoError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Secret generation (CSPRNG)
// ---------------------------------------------------------------------------

/// Generate 32 bytes of cryptographically secure randomness.
///
/// Used for: thread ids, read/follow key material, test fixtures.
pub fn generate_secret() -> [u8; 32] {
    use rand::RngCore;
    let mut secret = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    secret
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid Ed25519 signature")]
    InvalidSignature,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("AEAD decryption failed")]
    Decrypt,

    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}
