//! Thread and log metadata records
//!
//! A thread is a set of logs sharing a read key; a log is one peer's signed,
//! hash-linked chain. These records are what the thread store persists and
//! what invites carry (minus private keys).

use serde::{Deserialize, Serialize};

use crate::identity::{LogIdentity, LogSecret};
use crate::keys::{FollowKey, ReadKey};
use crate::types::{Cid, LogId, PubKey, ThreadId};

/// A transport address advertising a log: the public key of the peer
/// serving it. Dialing is the transport's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PeerAddr(pub PubKey);

impl PeerAddr {
    /// The peer public key this address dials.
    pub fn peer(&self) -> &PubKey {
        &self.0
    }
}

impl From<PubKey> for PeerAddr {
    fn from(pk: PubKey) -> Self {
        Self(pk)
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for one thread: identity, shared read key, member logs in
/// registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub read_key: ReadKey,
    pub logs: Vec<LogId>,
}

impl ThreadInfo {
    /// Create metadata for a brand-new thread with a fresh read key.
    pub fn generate() -> Self {
        Self {
            id: ThreadId::random(),
            read_key: ReadKey::generate(),
            logs: Vec::new(),
        }
    }
}

/// Metadata for one log within a thread.
///
/// At most one log per thread carries a private key locally (the own log);
/// every other entry is a replica of some remote peer's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogInfo {
    pub id: LogId,
    pub pub_key: PubKey,
    /// Signing key, present only for the own log. Stripped from invites.
    pub priv_key: Option<LogSecret>,
    /// Thread read key, duplicated here for locality.
    pub read_key: ReadKey,
    /// Per-log envelope key.
    pub follow_key: FollowKey,
    /// Current frontier. One entry in the base design; the structure admits
    /// more to tolerate future branching. `heads[0]` is the anchor.
    pub heads: Vec<Cid>,
    /// Known transport addresses advertising this log.
    pub addrs: Vec<PeerAddr>,
}

impl LogInfo {
    /// Generate a fresh own log: new signing keypair, new follow key,
    /// read key inherited from the thread.
    pub fn generate(read_key: ReadKey) -> Self {
        let identity = LogIdentity::generate();
        Self {
            id: identity.log_id(),
            pub_key: identity.public_key(),
            priv_key: Some(identity.secret()),
            read_key,
            follow_key: FollowKey::generate(),
            heads: Vec::new(),
            addrs: Vec::new(),
        }
    }

    /// Register a replica of a remote peer's log from its public material.
    pub fn replica(
        pub_key: PubKey,
        read_key: ReadKey,
        follow_key: FollowKey,
        addrs: Vec<PeerAddr>,
    ) -> Self {
        Self {
            id: LogId::for_pub_key(&pub_key),
            pub_key,
            priv_key: None,
            read_key,
            follow_key,
            heads: Vec::new(),
            addrs,
        }
    }

    /// Whether this log is writable locally.
    pub fn is_own(&self) -> bool {
        self.priv_key.is_some()
    }

    /// The signing identity, for own logs.
    pub fn identity(&self) -> Option<LogIdentity> {
        self.priv_key.as_ref().map(LogSecret::identity)
    }

    /// The head anchor: `heads[0]`, or None for an empty log.
    pub fn head(&self) -> Option<Cid> {
        self.heads.first().copied()
    }

    /// A copy safe to hand to other peers: private key stripped.
    pub fn without_priv_key(&self) -> Self {
        Self { priv_key: None, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_own_log() {
        let info = LogInfo::generate(ReadKey::generate());
        assert!(info.is_own());
        assert_eq!(info.id, LogId::for_pub_key(&info.pub_key));
        assert_eq!(info.head(), None);

        let identity = info.identity().unwrap();
        assert_eq!(identity.public_key(), info.pub_key);
    }

    #[test]
    fn test_replica_has_no_identity() {
        let own = LogInfo::generate(ReadKey::generate());
        let replica = LogInfo::replica(
            own.pub_key,
            own.read_key,
            own.follow_key,
            vec![PeerAddr(PubKey([9; 32]))],
        );
        assert!(!replica.is_own());
        assert_eq!(replica.id, own.id);
        assert!(replica.identity().is_none());
    }

    #[test]
    fn test_without_priv_key() {
        let own = LogInfo::generate(ReadKey::generate());
        let shared = own.without_priv_key();
        assert!(shared.priv_key.is_none());
        assert_eq!(shared.id, own.id);
        assert_eq!(shared.follow_key, own.follow_key);
    }

    #[test]
    fn test_head_is_first() {
        let mut info = LogInfo::generate(ReadKey::generate());
        info.heads = vec![Cid([1; 32]), Cid([2; 32])];
        assert_eq!(info.head(), Some(Cid([1; 32])));
    }
}
