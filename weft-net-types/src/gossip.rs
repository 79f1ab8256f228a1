//! Gossip layer abstraction for weft networking
//!
//! Pure transport-level gossip: subscribe to per-thread topics and exchange
//! raw bytes. Message encoding and head-announcement handling live in
//! `weft-net`. Gossip is an accelerator only; pushes over the authenticated
//! stream remain authoritative.

use tokio::sync::broadcast;
use weft_model::{PubKey, ThreadId};

/// Error type for gossip operations.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("gossip setup failed: {0}")]
    Setup(String),
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// Pure transport-level gossip interface.
///
/// Implementations deal only with raw bytes and peer connectivity.
#[async_trait::async_trait]
pub trait GossipLayer: Send + Sync + 'static {
    /// Subscribe to a thread's gossip topic.
    /// Returns a receiver of (sender_pubkey, raw_message_bytes).
    async fn subscribe(
        &self,
        thread: ThreadId,
        initial_peers: Vec<PubKey>,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, GossipError>;

    /// Broadcast raw bytes to all peers on a thread's topic.
    async fn broadcast(&self, thread: ThreadId, data: Vec<u8>) -> Result<(), GossipError>;

    /// Dynamically add peers to an existing topic subscription.
    async fn join_peers(&self, thread: ThreadId, peers: Vec<PubKey>) -> Result<(), GossipError>;

    /// Unsubscribe from a thread's topic.
    async fn unsubscribe(&self, thread: ThreadId);

    /// Shut down the entire gossip layer.
    async fn shutdown(&self);

    /// Get a stream of network connectivity events.
    fn network_events(&self) -> broadcast::Receiver<crate::NetworkEvent>;
}
