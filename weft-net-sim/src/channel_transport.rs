//! ChannelTransport — in-memory Transport implementation
//!
//! Uses `tokio::io::DuplexStream` for bidirectional byte streams and a
//! shared `ChannelNetwork` broker for peer discovery. Each connection is a
//! symmetric pair of stream queues: either side can open streams, the other
//! side accepts them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};

use weft_model::PubKey;
use weft_net_types::{BiStream, Connection, NetworkEvent, Transport, TransportError};

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

/// Shared network broker — routes connections between ChannelTransport instances.
#[derive(Clone, Debug)]
pub struct ChannelNetwork {
    peers: Arc<Mutex<HashMap<PubKey, mpsc::Sender<ChannelConnection>>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self { peers: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn register(&self, pubkey: PubKey, accept_tx: mpsc::Sender<ChannelConnection>) {
        self.peers.lock().await.insert(pubkey, accept_tx);
    }

    /// Drop a peer from the network, making future dials to it fail.
    pub async fn disconnect(&self, pubkey: &PubKey) {
        self.peers.lock().await.remove(pubkey);
    }
}

impl Default for ChannelNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory Transport implementation.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    pubkey: PubKey,
    network: ChannelNetwork,
    accept_rx: Arc<Mutex<mpsc::Receiver<ChannelConnection>>>,
    network_events_tx: tokio::sync::broadcast::Sender<NetworkEvent>,
}

impl ChannelTransport {
    pub async fn new(pubkey: PubKey, network: &ChannelNetwork) -> Self {
        let (accept_tx, accept_rx) = mpsc::channel(64);
        let (network_events_tx, _) = tokio::sync::broadcast::channel(128);
        network.register(pubkey, accept_tx).await;
        Self {
            pubkey,
            network: network.clone(),
            accept_rx: Arc::new(Mutex::new(accept_rx)),
            network_events_tx,
        }
    }
}

impl Transport for ChannelTransport {
    type Connection = ChannelConnection;

    fn public_key(&self) -> PubKey {
        self.pubkey
    }

    fn connect(
        &self,
        peer: &PubKey,
    ) -> impl std::future::Future<Output = Result<ChannelConnection, TransportError>> + Send {
        let network = self.network.clone();
        let my_pubkey = self.pubkey;
        let peer_pubkey = *peer;
        let events_tx = self.network_events_tx.clone();

        async move {
            let accept_tx = {
                let peers = network.peers.lock().await;
                peers
                    .get(&peer_pubkey)
                    .ok_or_else(|| {
                        TransportError::Connect(format!("peer {} not found in network", peer_pubkey))
                    })?
                    .clone()
            };

            // Two stream queues, one per direction.
            let (out_tx, out_rx) = mpsc::channel::<DuplexStream>(8);
            let (in_tx, in_rx) = mpsc::channel::<DuplexStream>(8);

            let peer_conn = ChannelConnection {
                remote_pubkey: my_pubkey,
                stream_tx: in_tx,
                stream_rx: Arc::new(Mutex::new(out_rx)),
            };
            accept_tx.send(peer_conn).await.map_err(|_| {
                TransportError::Connect(format!("peer {} accept channel closed", peer_pubkey))
            })?;

            let _ = events_tx.send(NetworkEvent::PeerConnected(peer_pubkey));

            Ok(ChannelConnection {
                remote_pubkey: peer_pubkey,
                stream_tx: out_tx,
                stream_rx: Arc::new(Mutex::new(in_rx)),
            })
        }
    }

    fn accept(&self) -> impl std::future::Future<Output = Option<ChannelConnection>> + Send {
        let accept_rx = self.accept_rx.clone();
        let events_tx = self.network_events_tx.clone();
        async move {
            let conn = accept_rx.lock().await.recv().await;
            if let Some(ref c) = conn {
                let _ = events_tx.send(NetworkEvent::PeerConnected(c.remote_pubkey));
            }
            conn
        }
    }

    fn network_events(&self) -> tokio::sync::broadcast::Receiver<NetworkEvent> {
        self.network_events_tx.subscribe()
    }
}

/// In-memory connection between two ChannelTransport instances.
pub struct ChannelConnection {
    remote_pubkey: PubKey,
    /// Streams this side opens toward the peer.
    stream_tx: mpsc::Sender<DuplexStream>,
    /// Streams the peer opened toward this side.
    stream_rx: Arc<Mutex<mpsc::Receiver<DuplexStream>>>,
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("remote", &self.remote_pubkey)
            .finish()
    }
}

impl Connection for ChannelConnection {
    type Stream = ChannelBiStream;

    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<ChannelBiStream, TransportError>> + Send {
        let tx = self.stream_tx.clone();
        async move {
            let (mine, theirs) = tokio::io::duplex(DUPLEX_BUF_SIZE);
            tx.send(theirs)
                .await
                .map_err(|_| TransportError::Stream("connection closed".into()))?;
            Ok(ChannelBiStream(mine))
        }
    }

    fn accept_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<ChannelBiStream, TransportError>> + Send {
        let rx = self.stream_rx.clone();
        async move {
            let mut rx = rx.lock().await;
            let stream = rx
                .recv()
                .await
                .ok_or_else(|| TransportError::Stream("connection closed".into()))?;
            Ok(ChannelBiStream(stream))
        }
    }

    fn remote_public_key(&self) -> PubKey {
        self.remote_pubkey
    }
}

/// In-memory bidirectional stream backed by a single `DuplexStream`.
///
/// Each side gets one end of the duplex pair: writes on one end are reads
/// on the other.
pub struct ChannelBiStream(DuplexStream);

impl BiStream for ChannelBiStream {
    type SendStream = WriteHalf<DuplexStream>;
    type RecvStream = ReadHalf<DuplexStream>;

    fn into_split(self) -> (Self::SendStream, Self::RecvStream) {
        let (read, write) = tokio::io::split(self.0);
        (write, read)
    }
}
