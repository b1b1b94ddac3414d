//! Integration test: two-node broadcast channels.
//!
//! Spawns two nodes on localhost, connects them directly, joins the
//! same channel on both, and verifies a published payload arrives on
//! the other side. Also covers shutdown semantics: channels drain
//! and close, and late publishes fail.
//!
//! Requires: `tokio` multi-thread runtime.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use veilchat_p2p::config::NetworkConfig;
use veilchat_p2p::node::P2pNode;
use veilchat_p2p::GLOBAL_TOPIC;

fn localhost_config() -> NetworkConfig {
    NetworkConfig {
        listen_ip: Some(Ipv4Addr::LOCALHOST),
        listen_port: 0,
        // Multicast and gateway probing are pointless on localhost
        // and flaky in CI sandboxes.
        enable_mdns: false,
        enable_upnp: false,
        ..NetworkConfig::default()
    }
}

async fn spawn_node() -> P2pNode {
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    P2pNode::assemble(keypair, localhost_config(), CancellationToken::new())
        .await
        .expect("failed to assemble node")
}

/// Polls until the node reports at least one bound listener.
async fn wait_for_listen_addr(node: &P2pNode) -> libp2p::Multiaddr {
    let handle = node.handle();
    for _ in 0..50 {
        let addrs = handle.listen_addrs().await;
        if let Some(addr) = addrs.into_iter().next() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("node did not bind a listener within 5 seconds");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publish_reaches_connected_peer() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("veilchat_p2p=debug")
        .try_init();

    let node_a = spawn_node().await;
    let node_b = spawn_node().await;
    assert_ne!(node_a.peer_id(), node_b.peer_id(), "PeerIds must differ");

    let addr_a = wait_for_listen_addr(&node_a).await;
    let dial_addr = format!("{}/p2p/{}", addr_a, node_a.peer_id());
    node_b
        .handle()
        .connect_to_peer(&dial_addr)
        .await
        .expect("failed to dial node A from node B");

    let ch_a = node_a.handle().join(GLOBAL_TOPIC).await.expect("join on A");
    let mut ch_b = node_b.handle().join(GLOBAL_TOPIC).await.expect("join on B");

    // Gossipsub needs subscription exchange before the mesh forms,
    // so publish repeatedly until the message comes through.
    let payload = b"hello from node A".to_vec();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    let received = loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "message did not propagate within 20 seconds"
        );
        let _ = ch_a.publish(payload.clone()).await;
        match tokio::time::timeout(Duration::from_millis(500), ch_b.recv()).await {
            Ok(Ok(msg)) => break msg,
            Ok(Err(e)) => panic!("channel error while waiting: {e}"),
            Err(_) => continue,
        }
    };

    assert_eq!(received.data, payload);
    assert_eq!(received.source, Some(node_a.peer_id()));

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_peer_address_is_rejected_without_crashing() {
    let node = spawn_node().await;
    let handle = node.handle();

    let err = handle.connect_to_peer("not-a-multiaddr").await.unwrap_err();
    assert!(err.to_string().contains("invalid"));

    let err = handle
        .connect_to_peer("/ip4/127.0.0.1/tcp/9999")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("/p2p/"));

    // The node stays functional after both rejections.
    let _ch = handle.join(GLOBAL_TOPIC).await.expect("join after bad dials");
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bootstrap_addr_without_peer_id_does_not_abort_assembly() {
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let config = NetworkConfig {
        // Parsable multiaddr, but no /p2p component: nothing can be
        // seeded into the routing table. Assembly degrades with a
        // warning instead of failing on an empty-table bootstrap.
        bootstrap_nodes: vec!["/ip4/203.0.113.9/tcp/4001".parse().unwrap()],
        ..localhost_config()
    };
    let node = P2pNode::assemble(keypair, config, CancellationToken::new())
        .await
        .expect("assembly must survive a bootstrap address without a peer id");
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channels_close_after_shutdown() {
    let node = spawn_node().await;
    let handle = node.handle();
    let mut ch = handle.join(GLOBAL_TOPIC).await.expect("join");

    node.shutdown().await;

    assert!(matches!(ch.recv().await, Err(RecvError::Closed)));
    let err = ch.publish(b"too late".to_vec()).await.unwrap_err();
    assert!(err.to_string().contains("publish"));

    // The detached handle degrades gracefully too.
    assert!(handle.listen_addrs().await.is_empty());
    assert!(handle.join(GLOBAL_TOPIC).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_same_topic_twice_yields_independent_channels() {
    let node = spawn_node().await;
    let handle = node.handle();

    let ch1 = handle.join(GLOBAL_TOPIC).await.expect("first join");
    let ch2 = handle.join(GLOBAL_TOPIC).await.expect("second join");
    assert_eq!(ch1.topic(), ch2.topic());

    node.shutdown().await;
}
