//! In-memory network simulation for weft
//!
//! Provides:
//! - `ChannelTransport` — `Transport` impl using tokio duplex streams
//! - `BroadcastGossip` — `GossipLayer` impl using broadcast channels
//!
//! Enables multi-peer replication and gossip testing without real
//! networking.

mod broadcast_gossip;
mod channel_transport;

pub use broadcast_gossip::{BroadcastGossip, GossipNetwork};
pub use channel_transport::{ChannelBiStream, ChannelConnection, ChannelNetwork, ChannelTransport};
