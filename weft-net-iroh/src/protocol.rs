//! Iroh-specific protocol handler (IpelProtocol) — thin shim
//!
//! Accepts iroh connections negotiated under the `/ipel/0.0.1` ALPN and
//! delegates to the generic connection handler in `weft-net`. Used with
//! iroh's Router so that replication and gossip connections sharing one
//! endpoint are dispatched by their negotiated ALPN.

use std::sync::Arc;

use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};

use weft_core::ServerBackend;

use crate::IrohConnection;

/// Protocol handler for the IPEL ALPN.
///
/// Every routed connection is served for its whole lifetime by the
/// replication server against the injected backend.
pub struct IpelProtocol<B: ServerBackend> {
    backend: Arc<B>,
}

impl<B: ServerBackend> IpelProtocol<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: ServerBackend> std::fmt::Debug for IpelProtocol<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpelProtocol").finish()
    }
}

impl<B: ServerBackend> ProtocolHandler for IpelProtocol<B> {
    fn accept(
        &self,
        conn: Connection,
    ) -> impl std::future::Future<Output = Result<(), AcceptError>> + Send {
        let backend = self.backend.clone();
        Box::pin(async move {
            weft_net::server::handle_connection(backend, IrohConnection { inner: conn }).await;
            Ok(())
        })
    }
}
