//! Weft Model
//!
//! Pure data types and cryptography for the weft thread protocol,
//! decoupled from storage engines, network stacks, and replication logic.

pub mod crypto;
pub mod identity;
pub mod info;
pub mod keys;
pub mod types;

pub use crypto::CryptoError;
pub use identity::{IdentityError, LogIdentity, LogSecret};
pub use info::{LogInfo, PeerAddr, ThreadInfo};
pub use keys::{FollowKey, ReadKey, KEY_SIZE, NONCE_SIZE};
pub use types::{Cid, LogId, PubKey, Signature, ThreadId};
