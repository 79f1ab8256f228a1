//! IrohGossip — thin wrapper around `iroh_gossip::Gossip`
//!
//! Only deals with raw bytes and peer connectivity. Head-announcement
//! encoding and fetch decisions live in `weft-net`.

use std::collections::HashMap;
use std::sync::Arc;

use iroh_gossip::api::GossipSender;
use iroh_gossip::Gossip;
use tokio::sync::{broadcast, RwLock};

use weft_model::{crypto, PubKey, ThreadId};
use weft_net_types::{GossipError, GossipLayer, NetworkEvent};

/// Derive a gossip topic from a thread id.
pub fn topic_for_thread(thread: &ThreadId) -> iroh_gossip::TopicId {
    let label = format!("{}/{}", weft_net::IPEL, thread);
    iroh_gossip::TopicId::from_bytes(crypto::content_cid(label.as_bytes()).0)
}

pub struct IrohGossip {
    gossip: Gossip,
    senders: Arc<RwLock<HashMap<ThreadId, GossipSender>>>,
    event_tx: broadcast::Sender<NetworkEvent>,
}

impl IrohGossip {
    pub fn new(transport: &crate::IrohTransport) -> Self {
        let gossip = Gossip::builder().spawn(transport.endpoint().clone());
        let (event_tx, _) = broadcast::channel(64);
        Self { gossip, senders: Arc::new(RwLock::new(HashMap::new())), event_tx }
    }

    /// Expose the underlying Gossip for router registration.
    pub fn gossip(&self) -> &Gossip {
        &self.gossip
    }
}

#[async_trait::async_trait]
impl GossipLayer for IrohGossip {
    async fn subscribe(
        &self,
        thread: ThreadId,
        initial_peers: Vec<PubKey>,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, GossipError> {
        let topic = topic_for_thread(&thread);

        let bootstrap_peers: Vec<iroh::PublicKey> = initial_peers
            .iter()
            .filter_map(|p| iroh::PublicKey::from_bytes(p.as_bytes()).ok())
            .collect();

        // Non-blocking subscribe: does not wait for peers to appear.
        let gossip_topic = self
            .gossip
            .subscribe(topic, bootstrap_peers)
            .await
            .map_err(|e| GossipError::Subscribe(e.to_string()))?;

        let (sender, mut receiver) = gossip_topic.split();
        self.senders.write().await.insert(thread, sender);

        let (inbound_tx, inbound_rx) = broadcast::channel(256);
        let event_tx = self.event_tx.clone();

        // Convert iroh events into raw (PubKey, bytes) pairs.
        tokio::spawn(async move {
            use futures_util::StreamExt;
            while let Some(Ok(event)) = receiver.next().await {
                match event {
                    iroh_gossip::api::Event::Received(msg) => {
                        let sender_pubkey = PubKey::from(*msg.delivered_from.as_bytes());
                        let _ = inbound_tx.send((sender_pubkey, msg.content.to_vec()));
                    }
                    iroh_gossip::api::Event::NeighborUp(peer_id) => {
                        let pk = PubKey::from(*peer_id.as_bytes());
                        let _ = event_tx.send(NetworkEvent::PeerConnected(pk));
                    }
                    iroh_gossip::api::Event::NeighborDown(peer_id) => {
                        let pk = PubKey::from(*peer_id.as_bytes());
                        let _ = event_tx.send(NetworkEvent::PeerDisconnected(pk));
                    }
                    iroh_gossip::api::Event::Lagged => {
                        tracing::warn!(thread = %thread, "gossip receiver lagged");
                    }
                }
            }
        });

        Ok(inbound_rx)
    }

    async fn broadcast(&self, thread: ThreadId, data: Vec<u8>) -> Result<(), GossipError> {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&thread) {
            sender
                .broadcast(data.into())
                .await
                .map_err(|e| GossipError::Broadcast(e.to_string()))?;
        }
        Ok(())
    }

    async fn join_peers(&self, thread: ThreadId, peers: Vec<PubKey>) -> Result<(), GossipError> {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&thread) {
            let iroh_peers: Vec<iroh::PublicKey> = peers
                .iter()
                .filter_map(|p| iroh::PublicKey::from_bytes(p.as_bytes()).ok())
                .collect();
            if !iroh_peers.is_empty() {
                sender
                    .join_peers(iroh_peers)
                    .await
                    .map_err(|e| GossipError::Subscribe(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, thread: ThreadId) {
        // Dropping the GossipSender leaves the topic.
        self.senders.write().await.remove(&thread);
    }

    async fn shutdown(&self) {
        self.senders.write().await.clear();
        let _ = self.gossip.shutdown().await;
    }

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }
}
