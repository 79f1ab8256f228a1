//! Integration tests: two iroh-backed peers on one machine, exchanging
//! records through the router's ALPN dispatch. Exercises both branches of
//! the router: pushes over `/ipel/0.0.1` and head announcements over the
//! iroh-gossip protocol.

use std::sync::Arc;
use std::time::Duration;

use weft_core::{AddSettings, MemBlockStore, MemThreadStore, PullSettings, ThreadService};
use weft_model::{LogIdentity, LogInfo, PeerAddr, ThreadInfo};
use weft_net::ThreadNetwork;
use weft_net_iroh::{IrohBackend, IrohTransport};
use weft_net_types::{GossipLayer, NetworkEvent};

/// One iroh-backed peer: identity, local service, router-managed backend,
/// and the network facade over the backend's transport.
struct IrohPeer {
    identity: LogIdentity,
    service: Arc<ThreadService>,
    network: ThreadNetwork<IrohTransport>,
    backend: IrohBackend,
}

async fn iroh_peer() -> IrohPeer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let identity = LogIdentity::generate();
    let service =
        ThreadService::new(Arc::new(MemThreadStore::new()), Arc::new(MemBlockStore::new()));
    let backend = IrohBackend::bind(identity.signing_key().clone(), service.clone())
        .await
        .expect("bind backend");
    let transport = Arc::new(backend.transport().clone());
    let gossip = Some(backend.gossip() as Arc<dyn GossipLayer>);
    let network = ThreadNetwork::new(service.clone(), transport, identity.clone(), gossip);
    IrohPeer { identity, service, network, backend }
}

/// Exchange endpoint addresses directly, bypassing external discovery.
fn introduce(a: &IrohPeer, b: &IrohPeer) {
    a.backend.transport().add_peer_addr(b.backend.transport().addr());
    b.backend.transport().add_peer_addr(a.backend.transport().addr());
}

/// Hand `thread` and `from`'s logs (re-addressed to `from`) to `to`.
fn share_thread(from: &IrohPeer, to: &IrohPeer, thread: &ThreadInfo) {
    let addr = PeerAddr(from.identity.public_key());
    let logs: Vec<LogInfo> = from
        .service
        .logs(&thread.id)
        .expect("logs")
        .iter()
        .map(|l| {
            let mut shared = l.without_priv_key();
            if !shared.addrs.contains(&addr) {
                shared.addrs.push(addr);
            }
            shared
        })
        .collect();
    to.service
        .register_thread(ThreadInfo { logs: Vec::new(), ..thread.clone() }, logs)
        .expect("register thread");
}

async fn wait_for(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test]
async fn test_push_routes_through_ipel_alpn() {
    let a = iroh_peer().await;
    let b = iroh_peer().await;
    introduce(&a, &b);

    // B participates in a thread; A learns of it out of band.
    let thread = b.network.create_thread().unwrap();
    b.network
        .add(b"welcome", AddSettings::new(thread.id))
        .await
        .unwrap();
    share_thread(&b, &a, &thread);

    // A's push crosses real QUIC; the router hands it to the replication
    // handler, which registers A's log and answers with an invite.
    let (log_a, parsed) = a
        .network
        .add(b"hello", AddSettings::new(thread.id))
        .await
        .unwrap();

    let replica = b
        .service
        .logs(&thread.id)
        .unwrap()
        .into_iter()
        .find(|l| l.id == log_a)
        .expect("replica registered from first contact");
    assert_eq!(replica.heads, vec![parsed.cid]);

    // Invite closure: both sides now know both logs.
    assert_eq!(a.network.logs(&thread.id).unwrap().len(), 2);
    assert_eq!(b.network.logs(&thread.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_gossip_routes_through_gossip_alpn() {
    let a = iroh_peer().await;
    let b = iroh_peer().await;
    introduce(&a, &b);

    // A writes once locally; B learns the thread and A's log out of band
    // but no push relationship exists (A never learns B's address).
    let thread = a.network.create_thread().unwrap();
    let (_, first) = a
        .network
        .add(b"first", AddSettings::new(thread.id))
        .await
        .unwrap();
    let log_a = a.service.logs(&thread.id).unwrap().remove(0).id;
    share_thread(&a, &b, &thread);

    // Join the topic on both sides; B bootstraps toward A, so the gossip
    // connection itself goes through the router's gossip branch.
    let mut events = a.backend.gossip().network_events();
    a.network.subscribe_gossip(thread.id).await.unwrap();
    b.network.subscribe_gossip(thread.id).await.unwrap();

    // Wait for the mesh to form before announcing anything.
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            match events.recv().await {
                Ok(NetworkEvent::PeerConnected(_)) => break,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    panic!("gossip event channel closed")
                }
            }
        }
    })
    .await
    .expect("gossip neighbors never appeared");

    // A appends: no push targets, only the head announcement goes out. B
    // chases the announced head with a fetch over the replication ALPN.
    let (_, second) = a
        .network
        .add(b"second", AddSettings::new(thread.id))
        .await
        .unwrap();

    let caught_up = wait_for(|| {
        b.service
            .logs(&thread.id)
            .map(|logs| {
                logs.iter()
                    .any(|l| l.id == log_a && l.heads == vec![second.cid])
            })
            .unwrap_or(false)
    })
    .await;
    assert!(caught_up, "B never caught up to the announced head");

    let pulled = b
        .network
        .pull(&thread.id, &log_a, &PullSettings::default())
        .unwrap();
    assert_eq!(pulled.len(), 2);
    assert_eq!(pulled[0].cid, second.cid);
    assert_eq!(pulled[1].cid, first.cid);
}
