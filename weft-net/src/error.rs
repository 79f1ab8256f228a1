//! Error types for weft-net

use thiserror::Error;
use weft_net_types::{GossipError, TransportError};

/// Network layer errors for replication operations.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("gossip error: {0}")]
    Gossip(#[from] GossipError),

    #[error(transparent)]
    Service(#[from] weft_core::Error),

    #[error("request timed out")]
    Timeout,

    #[error("stream closed before a response arrived")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote peer rejected the request.
    #[error("remote returned {status}: {message}")]
    Remote { status: u32, message: String },
}

// The facade surfaces the core error kinds; network failures during fan-out
// collapse into the replication kind, deadlines into cancellation.
impl From<NetError> for weft_core::Error {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Service(e) => e,
            NetError::Timeout => weft_core::Error::Canceled,
            NetError::Remote { status, message } => {
                weft_core::Error::Replication(format!("status {status}: {message}"))
            }
            other => weft_core::Error::Replication(other.to_string()),
        }
    }
}
