//! Remote history fetch: pulling a foreign log's records from the peer
//! serving it, gated by follow-key possession.

mod common;

use common::{share_thread, TestPeer};

use weft_core::{AddSettings, Error, PullSettings};
use weft_net_sim::ChannelNetwork;

#[tokio::test]
async fn test_fetch_ingests_remote_history() {
    let net = ChannelNetwork::new();
    let a = TestPeer::new(&net, None).await;
    let b = TestPeer::new(&net, None).await;

    // A writes three records locally (it knows no peers, so no fan-out).
    let thread = a.network.create_thread().unwrap();
    let mut cids = Vec::new();
    for body in [&b"one"[..], b"two", b"three"] {
        let (_, parsed) = a.network.add(body, AddSettings::new(thread.id)).await.unwrap();
        cids.push(parsed.cid);
    }
    let log_a = a.service.logs(&thread.id).unwrap().remove(0).id;

    // B learns the thread and A's log out of band, with no local history.
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

    // Fetch walks A's chain and ingests it locally.
    let fetched = b
        .network
        .fetch(&thread.id, &log_a, &a.addr(), PullSettings::default())
        .await
        .unwrap();
    let fetched_cids: Vec<_> = fetched.iter().map(|r| r.cid).collect();
    assert_eq!(fetched_cids, vec![cids[2], cids[1], cids[0]]);

    // B's replica head landed on the newest record, and local pulls work.
    let local = b
        .network
        .pull(&thread.id, &log_a, &PullSettings::default())
        .unwrap();
    assert_eq!(local.len(), 3);
    assert_eq!(local[0].cid, cids[2]);

    let head = b
        .service
        .logs(&thread.id)
        .unwrap()
        .into_iter()
        .find(|l| l.id == log_a)
        .unwrap()
        .heads;
    assert_eq!(head, vec![cids[2]]);
}

#[tokio::test]
async fn test_fetch_respects_offset_and_limit() {
    let net = ChannelNetwork::new();
    let a = TestPeer::new(&net, None).await;
    let b = TestPeer::new(&net, None).await;

    let thread = a.network.create_thread().unwrap();
    let mut cids = Vec::new();
    for i in 0..5u8 {
        let (_, parsed) = a.network.add(&[i], AddSettings::new(thread.id)).await.unwrap();
        cids.push(parsed.cid);
    }
    let log_a = a.service.logs(&thread.id).unwrap().remove(0).id;

    share_thread(&a, &b, &thread, true);

    let fetched = b
        .network
        .fetch(
            &thread.id,
            &log_a,
            &a.addr(),
            PullSettings { offset: Some(cids[3]), limit: 2 },
        )
        .await
        .unwrap();
    let fetched_cids: Vec<_> = fetched.iter().map(|r| r.cid).collect();
    assert_eq!(fetched_cids, vec![cids[3], cids[2]]);
}

#[tokio::test]
async fn test_fetch_requires_matching_follow_key() {
    let net = ChannelNetwork::new();
    let a = TestPeer::new(&net, None).await;
    let b = TestPeer::new(&net, None).await;

    let thread = a.network.create_thread().unwrap();
    a.network.add(b"private", AddSettings::new(thread.id)).await.unwrap();
    let log_a = a.service.logs(&thread.id).unwrap().remove(0).id;

    // B registers A's log with a follow key that is simply wrong.
    share_thread(&a, &b, &thread, true);
    let mut replica = b
        .service
        .logs(&thread.id)
        .unwrap()
        .into_iter()
        .find(|l| l.id == log_a)
        .unwrap();
    replica.follow_key = weft_model::FollowKey::generate();
    replica.heads.clear();
    b.service.store().add_log(&thread.id, replica).unwrap();

    let err = b
        .network
        .fetch(&thread.id, &log_a, &a.addr(), PullSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Replication(_)));
}

#[tokio::test]
async fn test_fetch_unknown_log_is_rejected_remotely() {
    let net = ChannelNetwork::new();
    let a = TestPeer::new(&net, None).await;
    let b = TestPeer::new(&net, None).await;

    let thread = a.network.create_thread().unwrap();
    a.network.add(b"data", AddSettings::new(thread.id)).await.unwrap();

    // B invents a log A has never seen.
    share_thread(&a, &b, &thread, false);
    let phantom = weft_model::LogInfo::replica(
        weft_model::LogIdentity::generate().public_key(),
        thread.read_key,
        weft_model::FollowKey::generate(),
        vec![a.addr()],
    );
    let phantom_id = phantom.id;
    b.service.store().add_log(&thread.id, phantom).unwrap();

    let err = b
        .network
        .fetch(&thread.id, &phantom_id, &a.addr(), PullSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Replication(_)));
}
