// Each integration test compiles as a separate binary that includes this
// module via `mod common;`. Not every binary uses every helper, so Rust
// emits spurious dead_code warnings.
#![allow(dead_code)]
//! Shared test utilities for weft-net integration tests.

use std::sync::Arc;
use std::time::Duration;

use weft_core::{MemBlockStore, MemThreadStore, ThreadService};
use weft_model::{LogIdentity, LogInfo, PeerAddr, ThreadInfo};
use weft_net::ThreadNetwork;
use weft_net_sim::{BroadcastGossip, ChannelNetwork, ChannelTransport, GossipNetwork};
use weft_net_types::GossipLayer;

/// One simulated peer: identity, local service, and network facade wired
/// over the in-memory transport.
pub struct TestPeer {
    pub identity: LogIdentity,
    pub service: Arc<ThreadService>,
    pub network: ThreadNetwork<ChannelTransport>,
}

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

impl TestPeer {
    /// Build a peer on `net`, optionally joined to a gossip broker.
    pub async fn new(net: &ChannelNetwork, gossip_net: Option<&GossipNetwork>) -> Self {
        init_tracing();

        let identity = LogIdentity::generate();
        let transport = Arc::new(ChannelTransport::new(identity.public_key(), net).await);
        let service =
            ThreadService::new(Arc::new(MemThreadStore::new()), Arc::new(MemBlockStore::new()));
        let gossip = gossip_net.map(|g| {
            Arc::new(BroadcastGossip::new(identity.public_key(), g)) as Arc<dyn GossipLayer>
        });
        let network = ThreadNetwork::new(service.clone(), transport, identity.clone(), gossip);
        Self { identity, service, network }
    }

    /// The address other peers dial to reach this one.
    pub fn addr(&self) -> PeerAddr {
        PeerAddr(self.identity.public_key())
    }
}

/// Hand `thread` (and optionally some of `from`'s logs, re-addressed to
/// `from`) to `to`, simulating an out-of-band invite link.
pub fn share_thread(from: &TestPeer, to: &TestPeer, thread: &ThreadInfo, with_logs: bool) {
    let logs: Vec<LogInfo> = if with_logs {
        from.service
            .logs(&thread.id)
            .expect("logs")
            .iter()
            .map(|l| {
                let mut shared = l.without_priv_key();
                if !shared.addrs.contains(&from.addr()) {
                    shared.addrs.push(from.addr());
                }
                shared
            })
            .collect()
    } else {
        Vec::new()
    };
    to.service
        .register_thread(ThreadInfo { logs: Vec::new(), ..thread.clone() }, logs)
        .expect("register thread");
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_for(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
