//! BroadcastGossip — in-memory GossipLayer implementation
//!
//! Uses `tokio::sync::broadcast` for per-thread raw-bytes propagation.
//! Mirrors the `ChannelNetwork` pattern: a shared `GossipNetwork` broker
//! connects multiple `BroadcastGossip` instances.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use weft_model::{PubKey, ThreadId};
use weft_net_types::{GossipError, GossipLayer, NetworkEvent};

/// Shared broadcast network — routes raw bytes between BroadcastGossip
/// instances. Each thread gets one channel shared by every subscriber,
/// simulating gossip propagation.
#[derive(Clone, Debug)]
pub struct GossipNetwork {
    channels: Arc<RwLock<HashMap<ThreadId, broadcast::Sender<(PubKey, Vec<u8>)>>>>,
}

impl GossipNetwork {
    pub fn new() -> Self {
        Self { channels: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Get or create the broadcast channel for a thread.
    pub async fn get_or_create(&self, thread: ThreadId) -> broadcast::Sender<(PubKey, Vec<u8>)> {
        let mut channels = self.channels.write().await;
        channels.entry(thread).or_insert_with(|| broadcast::channel(256).0).clone()
    }
}

impl Default for GossipNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory GossipLayer implementation using broadcast channels.
///
/// Each `BroadcastGossip` instance belongs to one peer. The layer deals
/// only with raw bytes; message encoding lives in weft-net.
pub struct BroadcastGossip {
    my_pubkey: PubKey,
    network: GossipNetwork,
    senders: Mutex<HashMap<ThreadId, broadcast::Sender<(PubKey, Vec<u8>)>>>,
    tokens: Mutex<HashMap<ThreadId, CancellationToken>>,
    event_tx: broadcast::Sender<NetworkEvent>,
}

impl BroadcastGossip {
    pub fn new(pubkey: PubKey, network: &GossipNetwork) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            my_pubkey: pubkey,
            network: network.clone(),
            senders: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            event_tx,
        }
    }
}

#[async_trait::async_trait]
impl GossipLayer for BroadcastGossip {
    async fn subscribe(
        &self,
        thread: ThreadId,
        _initial_peers: Vec<PubKey>,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, GossipError> {
        // Tear down any existing subscription for this thread.
        self.unsubscribe(thread).await;

        let sender = self.network.get_or_create(thread).await;
        let mut source = sender.subscribe();
        self.senders.lock().await.insert(thread, sender);

        let token = CancellationToken::new();
        self.tokens.lock().await.insert(thread, token.clone());

        // Forward everything except our own messages.
        let (inbound_tx, inbound_rx) = broadcast::channel(256);
        let my_pubkey = self.my_pubkey;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = source.recv() => match msg {
                        Ok((from, bytes)) if from != my_pubkey => {
                            let _ = inbound_tx.send((from, bytes));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(inbound_rx)
    }

    async fn broadcast(&self, thread: ThreadId, data: Vec<u8>) -> Result<(), GossipError> {
        let senders = self.senders.lock().await;
        if let Some(sender) = senders.get(&thread) {
            sender
                .send((self.my_pubkey, data))
                .map_err(|e| GossipError::Broadcast(e.to_string()))?;
        }
        Ok(())
    }

    async fn join_peers(&self, _thread: ThreadId, _peers: Vec<PubKey>) -> Result<(), GossipError> {
        // The simulated network is fully connected.
        Ok(())
    }

    async fn unsubscribe(&self, thread: ThreadId) {
        if let Some(token) = self.tokens.lock().await.remove(&thread) {
            token.cancel();
        }
        self.senders.lock().await.remove(&thread);
    }

    async fn shutdown(&self) {
        for (_, token) in self.tokens.lock().await.drain() {
            token.cancel();
        }
        self.senders.lock().await.clear();
    }

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }
}
