//! Iroh backend for weft networking
//!
//! Binds one QUIC endpoint to the host identity key and serves two ALPNs
//! over it: `/ipel/0.0.1` for replication and the iroh-gossip protocol for
//! head announcements. An iroh `Router` dispatches every inbound connection
//! to the matching handler by its negotiated ALPN; peers are addressed by
//! public key, with discovery resolving dialing information.

mod gossip;
mod protocol;
mod transport;

pub use gossip::{topic_for_thread, IrohGossip};
pub use protocol::IpelProtocol;
pub use transport::{IrohBiStream, IrohConnection, IrohTransport};

use std::sync::Arc;

use iroh::protocol::Router;

use weft_core::ServerBackend;

/// Complete iroh networking stack: transport, gossip, and the router tying
/// both to the shared endpoint.
///
/// The router owns inbound dispatch: replication connections are served by
/// [`IpelProtocol`] against the injected backend, gossip connections by
/// `iroh-gossip`. The bare [`IrohTransport`] stays outbound-only.
pub struct IrohBackend {
    transport: IrohTransport,
    gossip: Arc<IrohGossip>,
    router: Router,
}

impl IrohBackend {
    /// Bind an endpoint on `signing_key` and wire both protocol handlers.
    pub async fn bind<B: ServerBackend>(
        signing_key: ed25519_dalek::SigningKey,
        backend: Arc<B>,
    ) -> Result<Self, iroh::endpoint::BindError> {
        let transport = IrohTransport::new(signing_key).await?;
        let gossip = Arc::new(IrohGossip::new(&transport));

        let router = Router::builder(transport.endpoint().clone())
            .accept(weft_net::IPEL_ALPN, IpelProtocol::new(backend))
            .accept(iroh_gossip::ALPN, gossip.gossip().clone())
            .spawn();

        Ok(Self { transport, gossip, router })
    }

    /// The outbound transport over the shared endpoint.
    pub fn transport(&self) -> &IrohTransport {
        &self.transport
    }

    /// The gossip layer over the shared endpoint.
    pub fn gossip(&self) -> Arc<IrohGossip> {
        self.gossip.clone()
    }

    /// Shut down the router and stop accepting connections.
    pub async fn shutdown(&self) -> Result<(), String> {
        self.router.shutdown().await.map_err(|e| e.to_string())
    }
}
