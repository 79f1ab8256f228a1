//! Log signing identity
//!
//! Each own log has an Ed25519 keypair:
//! - Private key: held locally (or persisted in the thread store), never
//!   replicated to peers.
//! - Public key: identifies the log; the log id is its BLAKE3 hash.
//!
//! The same type serves as the host identity signing push envelopes.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

use crate::types::{LogId, PubKey, Signature};

/// Errors that can occur during identity operations
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid signature")]
    InvalidSignature,
}

/// An Ed25519 keypair identifying a log (or a host).
#[derive(Clone)]
pub struct LogIdentity {
    signing_key: SigningKey,
}

impl LogIdentity {
    /// Generate a new identity with a random keypair.
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Create an identity from an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Load an identity from a key file, or generate and save if it doesn't exist.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            let identity = Self::generate();
            identity.save(path)?;
            Ok(identity)
        }
    }

    /// Load an identity from a key file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        use zeroize::Zeroizing;

        // Read into Zeroizing wrappers so both heap and stack copies are wiped
        let bytes = Zeroizing::new(fs::read(path)?);
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidKeyLength(bytes.len()));
        }
        let mut key_bytes = Zeroizing::new([0u8; 32]);
        key_bytes.copy_from_slice(&bytes);

        Ok(Self { signing_key: SigningKey::from_bytes(&key_bytes) })
    }

    /// Save the private key to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdentityError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(self.signing_key.as_bytes())?;
        Ok(())
    }

    /// Get the verification key (dalek type).
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Get the public key as a strong type.
    pub fn public_key(&self) -> PubKey {
        PubKey::from(self.signing_key.verifying_key().to_bytes())
    }

    /// Get the log id derived from this identity's public key.
    pub fn log_id(&self) -> LogId {
        LogId::for_pub_key(&self.public_key())
    }

    /// Get the signing key for transport integration.
    /// Use `.to_bytes()` when raw bytes are needed.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The private key as a serializable secret.
    pub fn secret(&self) -> LogSecret {
        LogSecret(self.signing_key.to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Verify a signature against this identity's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), IdentityError> {
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        self.verifying_key()
            .verify(message, &sig)
            .map_err(|_| IdentityError::InvalidSignature)
    }
}

impl std::fmt::Debug for LogIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIdentity")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Serializable private-key bytes for an own log.
///
/// Lives inside persisted [`LogInfo`](crate::info::LogInfo) records and is
/// stripped before any record crosses the wire.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct LogSecret(#[serde(with = "serde_bytes")] [u8; 32]);

impl LogSecret {
    /// Rehydrate the signing identity.
    pub fn identity(&self) -> LogIdentity {
        LogIdentity { signing_key: SigningKey::from_bytes(&self.0) }
    }
}

impl From<&LogIdentity> for LogSecret {
    fn from(identity: &LogIdentity) -> Self {
        identity.secret()
    }
}

// Private key material never appears in logs or debug output.
impl std::fmt::Debug for LogSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LogSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let identity = LogIdentity::generate();
        assert_eq!(identity.public_key().len(), 32);
        assert_eq!(identity.log_id(), LogId::for_pub_key(&identity.public_key()));
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = LogIdentity::generate();
        let signature = identity.sign(b"hello weft");
        assert!(identity.verify(b"hello weft", &signature).is_ok());
        assert!(identity.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_verify_with_different_key() {
        let a = LogIdentity::generate();
        let b = LogIdentity::generate();
        let signature = a.sign(b"message");
        assert!(b.verify(b"message", &signature).is_err());
    }

    #[test]
    fn test_secret_roundtrip() {
        let identity = LogIdentity::generate();
        let restored = identity.secret().identity();
        assert_eq!(identity.public_key(), restored.public_key());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identity.key");

        let first = LogIdentity::generate();
        first.save(&path).unwrap();
        let second = LogIdentity::load(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_load_or_generate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identity.key");

        let first = LogIdentity::load_or_generate(&path).unwrap();
        let second = LogIdentity::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }
}
