//! Gossip head announcements: a peer that only hears about a new head over
//! the topic fetches the missing history from the announcer.

mod common;

use common::{share_thread, wait_for, TestPeer};

use weft_core::{AddSettings, PullSettings};
use weft_net_sim::{ChannelNetwork, GossipNetwork};

#[tokio::test]
async fn test_head_announce_triggers_fetch() {
    let net = ChannelNetwork::new();
    let gossip_net = GossipNetwork::new();
    let a = TestPeer::new(&net, Some(&gossip_net)).await;
    let b = TestPeer::new(&net, Some(&gossip_net)).await;

    // A writes once so its log exists; B learns the thread and log out of
    // band but holds no history and no push relationship exists (A does not
    // know B's address).
    let thread = a.network.create_thread().unwrap();
    a.network.add(b"first", AddSettings::new(thread.id)).await.unwrap();
    let log_a = a.service.logs(&thread.id).unwrap().remove(0).id;

    share_thread(&a, &b, &thread, true);
    let mut replica = b
        .service
        .logs(&thread.id)
        .unwrap()
        .into_iter()
        .find(|l| l.id == log_a)
        .unwrap();
    replica.heads.clear();
    b.service.store().add_log(&thread.id, replica).unwrap();

    a.network.subscribe_gossip(thread.id).await.unwrap();
    b.network.subscribe_gossip(thread.id).await.unwrap();

    // A appends: no push targets, but the head announcement goes out.
    let (_, parsed) = a
        .network
        .add(b"second", AddSettings::new(thread.id))
        .await
        .unwrap();

    // B chases the announced head and backfills the whole chain.
    let caught_up = wait_for(|| {
        b.service
            .logs(&thread.id)
            .map(|logs| {
                logs.iter()
                    .any(|l| l.id == log_a && l.heads == vec![parsed.cid])
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
    assert_eq!(pulled[0].cid, parsed.cid);
}

#[tokio::test]
async fn test_announce_for_unknown_log_is_ignored() {
    let net = ChannelNetwork::new();
    let gossip_net = GossipNetwork::new();
    let a = TestPeer::new(&net, Some(&gossip_net)).await;
    let b = TestPeer::new(&net, Some(&gossip_net)).await;

    let thread = a.network.create_thread().unwrap();
    // B knows the thread but none of its logs.
    share_thread(&a, &b, &thread, false);

    a.network.subscribe_gossip(thread.id).await.unwrap();
    b.network.subscribe_gossip(thread.id).await.unwrap();

    a.network.add(b"noise", AddSettings::new(thread.id)).await.unwrap();

    // Give the announcement time to propagate; B must not invent a log.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(b.network.logs(&thread.id).unwrap().is_empty());
}
