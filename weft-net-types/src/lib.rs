//! Weft networking abstractions
//!
//! Traits decoupling replication logic from any concrete network stack.
//! Production uses the iroh QUIC backend; tests run over in-memory channels.

pub mod gossip;
pub mod transport;

pub use gossip::{GossipError, GossipLayer};
pub use transport::{BiStream, Connection, Transport, TransportError};

use weft_model::PubKey;

/// Connectivity events emitted by transports and gossip layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    PeerConnected(PubKey),
    PeerDisconnected(PubKey),
}
