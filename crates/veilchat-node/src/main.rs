//! Veilchat Node -- secure messaging peer.
//!
//! Usage:
//!
//!   veilchat-node [OPTIONS]
//!
//! Options:
//!
//!   --data-dir <PATH>         Data directory (default: platform-specific)
//!   --p2p-port <PORT>         P2P listen port (default: 4001)
//!   --bootstrap <MULTIADDR>   Add a bootstrap peer (repeatable)
//!   --write-bootstrap <PATH>  Write this node's dialable address to a file
//!   --no-mdns                 Disable mDNS local discovery
//!   --config <PATH>           Load config from JSON file
//!
//! Startup order: storage, identity, network, channels, crypto
//! engine sidecar. Shutdown reverses it: sidecar, network, storage.
//! The node runs until interrupted with Ctrl+C (SIGINT/SIGTERM).

use std::sync::Arc;
use std::time::Duration;

use libp2p::Multiaddr;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use veilchat_p2p::{get_or_create_identity, Channel, NetworkConfig, P2pHandle, P2pNode, GLOBAL_TOPIC};
use veilchat_store::ConfigStore;
use veilchat_types::{Result, VeilError};

mod config;
mod health;
mod signals;
mod supervisor;

use supervisor::EngineSupervisor;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const STORAGE_DIR: &str = "storage";

/// Delay before the bootstrap file is written, giving listeners time
/// to bind and report their addresses.
const BOOTSTRAP_WRITE_DELAY: Duration = Duration::from_secs(2);

/// Interval between liveness broadcasts on the global channel.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner();

    let cli = config::CliArgs::parse_from_env();

    let node_config = match &cli.config_path {
        Some(path) => match config::NodeConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::NodeConfig::from_cli(&cli),
    };

    if let Err(e) = run_node(node_config).await {
        tracing::error!("node error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Node main logic
// ---------------------------------------------------------------------------

async fn run_node(cfg: config::NodeConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.data_dir).map_err(|e| VeilError::Storage {
        reason: format!("failed to create data directory: {e}"),
    })?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    // -----------------------------------------------------------------------
    // 1. Storage and identity (fatal on failure)
    // -----------------------------------------------------------------------

    let store = ConfigStore::open(&cfg.data_dir.join(STORAGE_DIR))?;
    let (keypair, peer_id) = get_or_create_identity(&store)?;

    // -----------------------------------------------------------------------
    // 2. Network assembly (fatal on failure)
    // -----------------------------------------------------------------------

    let bootstrap_addrs: Vec<Multiaddr> = cfg
        .bootstrap_nodes
        .iter()
        .filter_map(|s| {
            s.parse::<Multiaddr>()
                .map_err(|e| tracing::warn!("invalid bootstrap addr '{s}': {e}"))
                .ok()
        })
        .collect();

    let net_config = NetworkConfig {
        listen_port: cfg.p2p_port,
        bootstrap_nodes: bootstrap_addrs,
        enable_mdns: cfg.enable_mdns,
        ..NetworkConfig::default()
    };
    tracing::info!(
        p2p_port = cfg.p2p_port,
        mdns = cfg.enable_mdns,
        bootstrap_count = net_config.bootstrap_nodes.len(),
        "network config"
    );

    let root = CancellationToken::new();
    let node = P2pNode::assemble(keypair, net_config, root.child_token()).await?;
    let handle = node.handle();

    // -----------------------------------------------------------------------
    // 3. Background tasks: bootstrap file, dialer, global channel
    // -----------------------------------------------------------------------

    if let Some(path) = cfg.write_bootstrap.clone() {
        spawn_bootstrap_writer(handle.clone(), path, root.child_token());
    }
    if !cfg.bootstrap_nodes.is_empty() {
        spawn_bootstrap_dialer(handle.clone(), cfg.bootstrap_nodes.clone());
    }

    // Join failure degrades the node to transport-only; it keeps
    // running for DHT routing and direct dials.
    match handle.join(GLOBAL_TOPIC).await {
        Ok(reader) => {
            spawn_channel_reader(reader, root.child_token());
            match handle.join(GLOBAL_TOPIC).await {
                Ok(publisher) => spawn_liveness_publisher(publisher, handle.clone(), root.child_token()),
                Err(e) => tracing::warn!(%e, "liveness publisher disabled"),
            }
        }
        Err(e) => tracing::warn!(%e, topic = GLOBAL_TOPIC, "failed to join global channel"),
    }

    // -----------------------------------------------------------------------
    // 4. Crypto engine sidecar (soft failure)
    // -----------------------------------------------------------------------

    let engine = Arc::new(EngineSupervisor::new());
    match engine.start() {
        Ok(port) => {
            tokio::spawn(health::probe_engine(port));
        }
        Err(e) => {
            tracing::warn!(%e, "crypto engine unavailable; continuing without it");
        }
    }

    // -----------------------------------------------------------------------
    // 5. Status summary, then wait for shutdown
    // -----------------------------------------------------------------------

    println!();
    println!("============================================================");
    println!("  Veilchat Node running");
    println!("============================================================");
    println!("  Peer ID:   {peer_id}");
    println!("  P2P port:  {}", cfg.p2p_port);
    println!("  mDNS:      {}", if cfg.enable_mdns { "enabled" } else { "disabled" });
    println!("  Engine:    {}", match engine.port() {
        Some(port) => format!("127.0.0.1:{port}"),
        None => "unavailable".to_string(),
    });
    println!("  Data dir:  {}", cfg.data_dir.display());
    println!("============================================================");
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();

    signals::wait_for_shutdown().await.map_err(|e| VeilError::Config {
        reason: format!("failed to install signal handler: {e}"),
    })?;

    // -----------------------------------------------------------------------
    // 6. Ordered teardown: sidecar, network, storage
    // -----------------------------------------------------------------------

    tracing::info!("shutting down");
    shutdown_node(&engine, &root, node, &store).await;
    tracing::info!("node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Releases resources in reverse-acquisition order: crypto engine
/// sidecar, then the network stack, then storage. Every step is
/// best-effort; a failed step never prevents the ones after it.
async fn shutdown_node(
    engine: &EngineSupervisor,
    root: &CancellationToken,
    node: P2pNode,
    store: &ConfigStore,
) {
    engine.stop();
    root.cancel();
    node.shutdown().await;
    if let Err(e) = store.flush() {
        tracing::error!(%e, "final storage flush failed");
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Writes this node's dialable multiaddr to a file so a second
/// machine can join with `--bootstrap "$(cat <file>)"`.
fn spawn_bootstrap_writer(handle: P2pHandle, path: std::path::PathBuf, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(BOOTSTRAP_WRITE_DELAY) => {}
        }

        let addrs = handle.listen_addrs().await;
        let Some(addr) = addrs
            .iter()
            .find(|a| !veilchat_p2p::netif::is_loopback_multiaddr(a))
        else {
            tracing::warn!("no non-loopback listen address; bootstrap file not written");
            return;
        };

        let line = format!("{addr}/p2p/{}", handle.peer_id());
        match std::fs::write(&path, &line) {
            Ok(()) => tracing::info!(path = %path.display(), %line, "bootstrap address written"),
            Err(e) => tracing::error!(path = %path.display(), %e, "failed to write bootstrap file"),
        }
    });
}

/// Dials each configured bootstrap peer once. Individual failures
/// are logged and skipped.
fn spawn_bootstrap_dialer(handle: P2pHandle, addrs: Vec<String>) {
    tokio::spawn(async move {
        for addr in addrs {
            match handle.connect_to_peer(&addr).await {
                Ok(()) => tracing::info!(%addr, "bootstrap dial initiated"),
                Err(e) => tracing::warn!(%addr, %e, "bootstrap dial failed"),
            }
        }
    });
}

/// Logs messages arriving on the global channel until it closes.
fn spawn_channel_reader(mut channel: Channel, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = channel.recv() => match result {
                    Ok(msg) => {
                        tracing::info!(
                            source = ?msg.source,
                            text = %String::from_utf8_lossy(&msg.data),
                            "channel message"
                        );
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "channel reader lagging; oldest messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("channel reader stopped");
    });
}

/// Broadcasts a liveness line on the global channel every
/// [`LIVENESS_INTERVAL`].
fn spawn_liveness_publisher(channel: Channel, handle: P2pHandle, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIVENESS_INTERVAL);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let msg = format!(
                        "Ping from {} at {}",
                        handle.peer_id(),
                        chrono::Utc::now().to_rfc3339()
                    );
                    if let Err(e) = channel.publish(msg.into_bytes()).await {
                        tracing::warn!(%e, "liveness publish failed");
                    }
                }
            }
        }
        tracing::debug!("liveness publisher stopped");
    });
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_banner() {
    println!(
        r#"
 __     __   _ _      _           _
 \ \   / /__(_) | ___| |__   __ _| |_
  \ \ / / _ \ | |/ __| '_ \ / _` | __|
   \ V /  __/ | | (__| | | | (_| | |_
    \_/ \___|_|_|\___|_| |_|\__,_|\__|
                          node v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[cfg(unix)]
    fn write_fake_engine(dir: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("veilchat-engine");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn teardown_releases_sidecar_then_network_then_storage() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_engine(dir.path());
        let engine = Arc::new(EngineSupervisor::with_binary_dir(dir.path().to_path_buf()));
        engine.start().unwrap();
        assert!(engine.is_running());

        let store = ConfigStore::open(&dir.path().join("db")).unwrap();
        store.set_config("k", b"v").unwrap();

        let net_config = NetworkConfig {
            listen_ip: Some(Ipv4Addr::LOCALHOST),
            listen_port: 0,
            enable_mdns: false,
            enable_upnp: false,
            ..NetworkConfig::default()
        };
        let root = CancellationToken::new();
        let node = P2pNode::assemble(
            libp2p::identity::Keypair::generate_ed25519(),
            net_config,
            root.child_token(),
        )
        .await
        .unwrap();
        let mut channel = node.handle().join(GLOBAL_TOPIC).await.unwrap();

        // Snapshot the sidecar state at the moment the network
        // closes: the engine must already be stopped by then.
        let (state_tx, state_rx) = tokio::sync::oneshot::channel();
        let engine_observer = Arc::clone(&engine);
        tokio::spawn(async move {
            loop {
                match channel.recv().await {
                    Err(RecvError::Closed) => {
                        let _ = state_tx.send(engine_observer.is_running());
                        break;
                    }
                    _ => continue,
                }
            }
        });

        shutdown_node(&engine, &root, node, &store).await;

        let engine_running_at_network_close = state_rx.await.unwrap();
        assert!(
            !engine_running_at_network_close,
            "sidecar must be released before the network stack"
        );
        assert!(!engine.is_running());
        assert!(root.is_cancelled());

        // Storage is flushed last and survives reopen.
        drop(store);
        let reopened = ConfigStore::open(&dir.path().join("db")).unwrap();
        assert_eq!(reopened.get_config("k").unwrap(), Some(b"v".to_vec()));
    }
}
