//! Weft Networking
//!
//! The replication protocol: pushing new records to the addresses of other
//! known logs, pulling history on demand, and gossiping head notifications.
//! Wire messages are protobuf frames over any [`weft_net_types::Transport`];
//! the record payloads inside them stay CBOR.

pub mod client;
pub mod error;
pub mod framing;
pub mod proto;
pub mod server;
pub mod service;

pub use client::ReplicationClient;
pub use error::NetError;
pub use framing::{MessageSink, MessageStream};
pub use service::ThreadNetwork;

/// Protocol name.
pub const IPEL: &str = "ipel";
/// Registered protocol code.
pub const IPEL_CODE: u16 = 406;
/// Protocol version.
pub const IPEL_VERSION: &str = "0.0.1";
/// ALPN identifier spoken by transports carrying this protocol.
pub const IPEL_ALPN: &[u8] = b"/ipel/0.0.1";

/// Response status codes carried in push/pull responses.
pub mod status {
    /// Accepted; response carries an invite for the previously unknown sender.
    pub const CREATED: u32 = 201;
    /// Accepted; sender already known.
    pub const NO_CONTENT: u32 = 204;
    /// Pull succeeded.
    pub const OK: u32 = 200;
    /// Malformed request or envelope decrypt failure.
    pub const BAD_REQUEST: u32 = 400;
    /// Signature or follow-key verification failure.
    pub const UNAUTHORIZED: u32 = 401;
    /// Unknown thread or log.
    pub const NOT_FOUND: u32 = 404;
    /// Responder-side failure.
    pub const INTERNAL: u32 = 500;
}
