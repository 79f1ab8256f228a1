//! Iroh transport for weft networking
//!
//! Creates an iroh endpoint from the host's Ed25519 secret key, so the same
//! identity signs push envelopes and authenticates the QUIC connection.
//!
//! Discovery: static provider (direct peer addition) and DNS (internet).

use iroh::discovery::dns::DnsDiscovery;
use iroh::discovery::static_provider::StaticProvider;
use iroh::endpoint::BindError;
use iroh::Endpoint;
pub use iroh::PublicKey;

use weft_model::PubKey;
use weft_net_types::{
    BiStream, Connection as TransportConnection, NetworkEvent, Transport, TransportError,
};

/// Wrapper around an iroh endpoint speaking the `ipel` protocol.
#[derive(Clone)]
pub struct IrohTransport {
    endpoint: Endpoint,
    /// Static provider for adding peer addresses directly (useful for tests)
    static_discovery: StaticProvider,
    events_tx: tokio::sync::broadcast::Sender<NetworkEvent>,
}

impl std::fmt::Debug for IrohTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrohTransport")
            .field("public_key", &self.endpoint.secret_key().public())
            .finish()
    }
}

impl IrohTransport {
    /// Create a new endpoint from the host Ed25519 signing key.
    pub async fn new(signing_key: ed25519_dalek::SigningKey) -> Result<Self, BindError> {
        let secret_key = iroh::SecretKey::from(signing_key.to_bytes());

        let static_discovery = StaticProvider::new();
        let dns = DnsDiscovery::n0_dns();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![
                weft_net::IPEL_ALPN.to_vec(),
                iroh_gossip::ALPN.to_vec(),
            ])
            .discovery(static_discovery.clone())
            .discovery(dns)
            .bind()
            .await?;

        let (events_tx, _) = tokio::sync::broadcast::channel(256);

        Ok(Self { endpoint, static_discovery, events_tx })
    }

    /// Get the underlying endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get this endpoint's address info (for sharing with other peers).
    pub fn addr(&self) -> iroh::EndpointAddr {
        self.endpoint.addr()
    }

    /// Add a peer's address directly, bypassing discovery.
    pub fn add_peer_addr(&self, addr: iroh::EndpointAddr) {
        self.static_discovery.add_endpoint_info(addr);
    }
}

/// Adapter: iroh bi-stream → `BiStream` trait
pub struct IrohBiStream {
    pub send: iroh::endpoint::SendStream,
    pub recv: iroh::endpoint::RecvStream,
}

impl BiStream for IrohBiStream {
    type SendStream = iroh::endpoint::SendStream;
    type RecvStream = iroh::endpoint::RecvStream;

    fn into_split(self) -> (Self::SendStream, Self::RecvStream) {
        (self.send, self.recv)
    }
}

/// Adapter: iroh connection → `Connection` trait
pub struct IrohConnection {
    pub inner: iroh::endpoint::Connection,
}

impl TransportConnection for IrohConnection {
    type Stream = IrohBiStream;

    async fn open_bi(&self) -> Result<IrohBiStream, TransportError> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        Ok(IrohBiStream { send, recv })
    }

    async fn accept_bi(&self) -> Result<IrohBiStream, TransportError> {
        let (send, recv) = self
            .inner
            .accept_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        Ok(IrohBiStream { send, recv })
    }

    fn remote_public_key(&self) -> PubKey {
        PubKey::from(*self.inner.remote_id().as_bytes())
    }
}

impl Transport for IrohTransport {
    type Connection = IrohConnection;

    fn public_key(&self) -> PubKey {
        PubKey::from(*self.endpoint.secret_key().public().as_bytes())
    }

    async fn connect(&self, peer: &PubKey) -> Result<IrohConnection, TransportError> {
        let iroh_key = iroh::PublicKey::from_bytes(peer.as_bytes())
            .map_err(|e| TransportError::Connect(format!("invalid public key: {}", e)))?;
        let conn = self
            .endpoint
            .connect(iroh_key, weft_net::IPEL_ALPN)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let _ = self.events_tx.send(NetworkEvent::PeerConnected(*peer));
        Ok(IrohConnection { inner: conn })
    }

    /// Inbound connections never arrive here: the [`crate::IrohBackend`]
    /// router owns `endpoint.accept()` and dispatches each connection to the
    /// replication or gossip handler by its negotiated ALPN. A bare
    /// transport is outbound-only, so generic accept loops over it end
    /// immediately instead of contending with the router.
    async fn accept(&self) -> Option<IrohConnection> {
        None
    }

    fn network_events(&self) -> tokio::sync::broadcast::Receiver<NetworkEvent> {
        self.events_tx.subscribe()
    }
}
