//! Routing scenarios: healthy dispatch, MOVED and ASK redirects, and
//! recovery from node failure through a topology refresh.

mod common;

use std::time::Duration;

use common::{ask, bulk, moved, simple, slots_reply, Action, MockNode};
use shoal::{key_slot, ClusterBuilder, Cmd, Frame};

/// A single node owning every slot answers the command directly.
#[tokio::test]
async fn test_healthy_dispatch() {
    let node = MockNode::bind().await;
    let addr = node.addr().to_string();
    let node = node.serve(move |cmd, _| match cmd {
        "CLUSTER" => Action::Reply(slots_reply(&[(0, 16383, &addr)])),
        "GET" => Action::Reply(bulk("value")),
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(node.addr())
        .pool_size(1)
        .build()
        .await
        .unwrap();

    let frame = cluster.cmd(Cmd::new("GET").arg("k")).await.unwrap();
    assert_eq!(frame, bulk("value"));
    assert_eq!(node.hits("GET"), 1);
    assert_eq!(node.hits("CLUSTER"), 1);
    cluster.close().await;
}

/// A MOVED redirect is followed, rewrites the slot map, and lazily creates
/// a pool for the previously unknown target node.
#[tokio::test]
async fn test_moved_updates_mapping_and_creates_pool() {
    let slot = key_slot("k");

    let target = MockNode::bind().await;
    let target_addr = target.addr().to_string();
    let target = target.serve(move |cmd, _| match cmd {
        "GET" => Action::Reply(bulk("from-target")),
        _ => Action::Reply(simple("PONG")),
    });

    let seed = MockNode::bind().await;
    let seed_addr = seed.addr().to_string();
    let redirect_to = target_addr.clone();
    let own_addr = seed_addr.clone();
    let seed = seed.serve(move |cmd, _| match cmd {
        "CLUSTER" => Action::Reply(slots_reply(&[(0, 16383, &own_addr)])),
        "GET" => Action::Reply(moved(slot, &redirect_to)),
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(&seed_addr)
        .pool_size(1)
        .build()
        .await
        .unwrap();

    // Park a waiter before dispatch so the slot-miss signal has a listener.
    let miss = {
        let cluster = cluster.clone();
        tokio::spawn(async move { cluster.wait_slot_miss().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frame = cluster.cmd(Cmd::new("GET").arg("k")).await.unwrap();
    assert_eq!(frame, bulk("from-target"));
    assert_eq!(seed.hits("GET"), 1);
    assert_eq!(target.hits("GET"), 1);

    // The slot map now names the target as the owner.
    assert_eq!(cluster.addr_for_key("k").await.unwrap(), target_addr);

    // A pool for the target was registered on the fly.
    let conns = cluster.get_every().await.unwrap();
    assert!(conns.contains_key(&target_addr));
    for (_, conn) in conns {
        cluster.put(conn).await;
    }

    tokio::time::timeout(Duration::from_secs(1), miss)
        .await
        .expect("slot-miss signal should have fired")
        .unwrap();
    cluster.close().await;
}

/// An ASK redirect retries behind an ASKING preamble and leaves the slot
/// map untouched.
#[tokio::test]
async fn test_ask_redirects_once_without_mapping_update() {
    let slot = key_slot("k");

    let target = MockNode::bind().await;
    let target_addr = target.addr().to_string();
    let target = target.serve(move |cmd, _| match cmd {
        "ASKING" => Action::Reply(simple("OK")),
        "GET" => Action::Reply(bulk("migrating")),
        _ => Action::Reply(simple("PONG")),
    });

    let seed = MockNode::bind().await;
    let seed_addr = seed.addr().to_string();
    let redirect_to = target_addr.clone();
    let own_addr = seed_addr.clone();
    let seed = seed.serve(move |cmd, _| match cmd {
        "CLUSTER" => Action::Reply(slots_reply(&[(0, 16383, &own_addr)])),
        "GET" => Action::Reply(ask(slot, &redirect_to)),
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(&seed_addr)
        .pool_size(1)
        .build()
        .await
        .unwrap();

    let frame = cluster.cmd(Cmd::new("GET").arg("k")).await.unwrap();
    assert_eq!(frame, bulk("migrating"));
    assert_eq!(target.hits("ASKING"), 1);
    assert_eq!(target.hits("GET"), 1);
    assert_eq!(seed.hits("GET"), 1);

    // ASK is one-shot: the seed still owns the slot as far as the map knows.
    assert_eq!(cluster.addr_for_key("k").await.unwrap(), seed_addr);
    cluster.close().await;
}

/// Node failure: two I/O errors against the owner trigger a refresh, after
/// which the command succeeds against the new owner.
#[tokio::test]
async fn test_io_error_then_refresh_recovers() {
    let fallback = MockNode::bind().await;
    let fallback_addr = fallback.addr().to_string();
    let fallback = fallback.serve(move |cmd, _| match cmd {
        "GET" => Action::Reply(bulk("recovered")),
        _ => Action::Reply(simple("PONG")),
    });

    let seed = MockNode::bind().await;
    let seed_addr = seed.addr().to_string();
    let own_addr = seed_addr.clone();
    let new_owner = fallback_addr.clone();
    let mut topology_calls = 0u32;
    let seed = seed.serve(move |cmd, _| match cmd {
        "CLUSTER" => {
            topology_calls += 1;
            if topology_calls == 1 {
                Action::Reply(slots_reply(&[(0, 16383, &own_addr)]))
            } else {
                Action::Reply(slots_reply(&[(0, 16383, &new_owner)]))
            }
        }
        "GET" => Action::Hangup,
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(&seed_addr)
        .pool_size(1)
        .reset_throttle(Duration::from_nanos(1))
        .build()
        .await
        .unwrap();

    let frame = cluster.cmd(Cmd::new("GET").arg("k")).await.unwrap();
    assert_eq!(frame, bulk("recovered"));
    // Once against the pooled connection, once against a fresh one.
    assert_eq!(seed.hits("GET"), 2);
    assert_eq!(seed.hits("CLUSTER"), 2);
    assert_eq!(fallback.hits("GET"), 1);
    cluster.close().await;
}

/// An application error is returned verbatim, with no retries.
#[tokio::test]
async fn test_application_error_passes_through() {
    let node = MockNode::bind().await;
    let addr = node.addr().to_string();
    let node = node.serve(move |cmd, _| match cmd {
        "CLUSTER" => Action::Reply(slots_reply(&[(0, 16383, &addr)])),
        "INCR" => Action::Reply(Frame::Error(
            b"WRONGTYPE Operation against a key holding the wrong kind of value".to_vec(),
        )),
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(node.addr())
        .pool_size(1)
        .build()
        .await
        .unwrap();

    let err = cluster.cmd(Cmd::new("INCR").arg("k")).await.unwrap_err();
    assert!(matches!(err, shoal::Error::Server { ref message } if message.starts_with("WRONGTYPE")));
    assert_eq!(node.hits("INCR"), 1);
    cluster.close().await;
}

/// Commands without arguments cannot be routed.
#[tokio::test]
async fn test_cmd_without_key_is_rejected() {
    let node = MockNode::bind().await;
    let addr = node.addr().to_string();
    let node = node.serve(move |cmd, _| match cmd {
        "CLUSTER" => Action::Reply(slots_reply(&[(0, 16383, &addr)])),
        _ => Action::Reply(simple("PONG")),
    });

    let cluster = ClusterBuilder::new()
        .address(node.addr())
        .pool_size(1)
        .build()
        .await
        .unwrap();

    let err = cluster.cmd(Cmd::new("PING")).await.unwrap_err();
    assert!(matches!(err, shoal::Error::NoKey));
    assert_eq!(node.hits("PING"), 0);
    cluster.close().await;
}
