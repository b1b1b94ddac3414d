//! Network stack assembly and the swarm task.
//!
//! [`P2pNode::assemble`] builds the libp2p swarm (transport, DHT,
//! gossipsub, discovery), starts the listeners, and hands the swarm
//! to a background task. Assembly is sequential and fail-fast for
//! everything except mDNS, which degrades to a warning.
//!
//! The swarm task is the single owner of the `Swarm`; everything
//! else talks to it through [`SwarmCommand`]s sent via [`P2pHandle`].

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, identify, kad, mdns, noise, upnp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use veilchat_types::VeilError;

use crate::channel::{Channel, ChannelMessage};
use crate::config::NetworkConfig;
use crate::netif;

/// Convenience alias to avoid shadowing `std::result::Result`
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type PResult<T> = std::result::Result<T, VeilError>;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The well-known broadcast channel every node joins at startup.
pub const GLOBAL_TOPIC: &str = "/veilchat/chat/global";

/// Maximum allowed broadcast message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Per-channel inbound queue depth. On overflow the oldest message
/// is dropped and the consumer observes a lag report.
pub const CHANNEL_QUEUE_CAPACITY: usize = 128;

/// Depth of the command channel into the swarm task.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Identify protocol version string.
const IDENTIFY_PROTOCOL: &str = "/veilchat/id/1.0.0";

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour for the Veilchat node.
///
/// Composes:
/// - `kad::Behaviour` — DHT peer routing.
/// - `gossipsub::Behaviour` — broadcast channels.
/// - `identify::Behaviour` — peer info exchange, feeds the DHT.
/// - `mdns::tokio::Behaviour` — LAN discovery (optional).
/// - `upnp::tokio::Behaviour` — gateway port mapping (optional).
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates
/// `VeilBehaviourEvent` with one variant per field.
#[derive(NetworkBehaviour)]
pub struct VeilBehaviour {
    kademlia: kad::Behaviour<kad::store::MemoryStore>,
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    mdns: Toggle<mdns::tokio::Behaviour>,
    upnp: Toggle<upnp::tokio::Behaviour>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests routed into the swarm task. Replies travel back over
/// oneshot channels so callers never touch the swarm directly.
pub(crate) enum SwarmCommand {
    Join {
        topic: String,
        reply: oneshot::Sender<PResult<broadcast::Receiver<ChannelMessage>>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<PResult<()>>,
    },
    Dial {
        peer_id: PeerId,
        addr: Multiaddr,
        reply: oneshot::Sender<PResult<()>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
}

// ---------------------------------------------------------------------------
// Multiaddr helpers
// ---------------------------------------------------------------------------

/// Parses a peer address string, requiring a `/p2p/<peer_id>` suffix.
///
/// # Errors
///
/// Returns [`VeilError::PeerConnect`] for malformed multiaddrs or
/// addresses without a peer identity.
pub fn parse_peer_multiaddr(s: &str) -> PResult<(PeerId, Multiaddr)> {
    let addr: Multiaddr = s.parse().map_err(|e| VeilError::PeerConnect {
        reason: format!("invalid multiaddr '{s}': {e}"),
    })?;
    let peer_id = extract_peer_id(&addr).ok_or_else(|| VeilError::PeerConnect {
        reason: format!("multiaddr '{s}' is missing a /p2p/<peer_id> component"),
    })?;
    Ok((peer_id, addr))
}

/// Extracts the `/p2p/<peer_id>` component from a multiaddr.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(id) => Some(id),
        _ => None,
    })
}

/// Returns `addr` without its `/p2p/...` suffix, as expected by the
/// Kademlia routing table.
fn strip_peer_id(addr: &Multiaddr) -> Multiaddr {
    addr.iter().filter(|p| !matches!(p, Protocol::P2p(_))).collect()
}

// ---------------------------------------------------------------------------
// P2pHandle
// ---------------------------------------------------------------------------

/// Cheap cloneable handle to the swarm task.
#[derive(Clone)]
pub struct P2pHandle {
    peer_id: PeerId,
    cmd_tx: mpsc::Sender<SwarmCommand>,
}

impl P2pHandle {
    /// The local peer identity.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Joins a broadcast channel, subscribing the node to `topic`.
    ///
    /// Joining an already-joined topic succeeds and returns a fresh
    /// independent [`Channel`].
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Join`] if the substrate rejects the
    /// subscription or the network task has stopped.
    pub async fn join(&self, topic: &str) -> PResult<Channel> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SwarmCommand::Join {
                topic: topic.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| VeilError::Join {
                reason: "network task stopped".into(),
            })?;
        let rx = reply_rx.await.map_err(|_| VeilError::Join {
            reason: "network task dropped the reply".into(),
        })??;
        Ok(Channel::new(topic.to_string(), self.cmd_tx.clone(), rx))
    }

    /// Dials a remote peer given its full multiaddr string.
    ///
    /// The address must carry a `/p2p/<peer_id>` component; the peer
    /// is also seeded into the DHT routing table.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::PeerConnect`] for malformed addresses or
    /// dial failures. Callers treat this as recoverable.
    pub async fn connect_to_peer(&self, addr: &str) -> PResult<()> {
        let (peer_id, addr) = parse_peer_multiaddr(addr)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SwarmCommand::Dial {
                peer_id,
                addr,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VeilError::PeerConnect {
                reason: "network task stopped".into(),
            })?;
        reply_rx.await.map_err(|_| VeilError::PeerConnect {
            reason: "network task dropped the reply".into(),
        })?
    }

    /// Addresses the node is currently listening on. Empty until the
    /// listeners have bound, or after the network task stopped.
    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SwarmCommand::ListenAddrs { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// P2pNode
// ---------------------------------------------------------------------------

/// The assembled network stack.
///
/// Owns the background swarm task. Dropping the node without calling
/// [`shutdown`](Self::shutdown) leaves the task running until the
/// cancellation token fires.
pub struct P2pNode {
    handle: P2pHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl P2pNode {
    /// Builds the network stack and spawns the swarm task.
    ///
    /// Assembly order: local address selection, transport + behaviour
    /// construction, listeners, DHT mode and bootstrap seeding. Any
    /// failure tears down everything built so far and is fatal to the
    /// caller; only mDNS construction is allowed to fail softly.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Config`] for invalid configuration and
    /// [`VeilError::NetworkAssembly`] for any construction failure.
    pub async fn assemble(
        keypair: libp2p::identity::Keypair,
        config: NetworkConfig,
        cancel: CancellationToken,
    ) -> PResult<Self> {
        config.validate()?;
        let peer_id = keypair.public().to_peer_id();

        // Bind to a concrete interface address so advertised
        // multiaddrs are usable by LAN peers.
        let ip = config.listen_ip.unwrap_or_else(netif::best_local_ip);
        let tcp_addr: Multiaddr = Multiaddr::empty()
            .with(Protocol::Ip4(ip))
            .with(Protocol::Tcp(config.listen_port));
        let quic_addr: Multiaddr = Multiaddr::empty()
            .with(Protocol::Ip4(ip))
            .with(Protocol::Udp(config.listen_port))
            .with(Protocol::QuicV1);

        let kad_protocol = config.kad_protocol.clone();
        let enable_mdns = config.enable_mdns;
        let enable_upnp = config.enable_upnp;

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default().port_reuse(true).nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| VeilError::NetworkAssembly {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_quic()
            .with_behaviour(|key| {
                build_behaviour(key, &kad_protocol, enable_mdns, enable_upnp)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| VeilError::NetworkAssembly {
                reason: format!("failed to build network behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(Duration::from_secs(config.idle_timeout_secs))
            })
            .build();

        for addr in [tcp_addr, quic_addr] {
            swarm.listen_on(addr.clone()).map_err(|e| VeilError::NetworkAssembly {
                reason: format!("failed to listen on {addr}: {e}"),
            })?;
        }

        // Automatic client/server mode based on observed reachability.
        swarm.behaviour_mut().kademlia.set_mode(None);

        // Seed the routing table. An entry without a /p2p component is
        // skipped; triggering bootstrap against seeded peers must
        // succeed or assembly fails.
        let mut seeded = 0usize;
        for addr in &config.bootstrap_nodes {
            match extract_peer_id(addr) {
                Some(peer) => {
                    swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer, strip_peer_id(addr));
                    seeded += 1;
                }
                None => {
                    tracing::warn!(%addr, "bootstrap address has no /p2p component; skipping");
                }
            }
        }
        if seeded > 0 {
            swarm
                .behaviour_mut()
                .kademlia
                .bootstrap()
                .map_err(|e| VeilError::NetworkAssembly {
                    reason: format!("DHT bootstrap failed: {e}"),
                })?;
        } else if !config.bootstrap_nodes.is_empty() {
            tracing::warn!("no usable bootstrap addresses; skipping DHT bootstrap");
        }

        tracing::info!(%peer_id, "network stack assembled");

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            SwarmTask {
                swarm,
                cmd_rx,
                cancel: task_cancel,
                topics: HashMap::new(),
                listen_addrs: Vec::new(),
            }
            .run()
            .await;
        });

        Ok(Self {
            handle: P2pHandle { peer_id, cmd_tx },
            cancel,
            task,
        })
    }

    /// The local peer identity.
    pub fn peer_id(&self) -> PeerId {
        self.handle.peer_id
    }

    /// Returns a cloneable handle to the swarm task.
    pub fn handle(&self) -> P2pHandle {
        self.handle.clone()
    }

    /// Stops the swarm task and waits for it to finish.
    ///
    /// All listeners and connections close; every outstanding
    /// [`Channel`] drains and then reports `Closed`.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(%e, "network task join failed");
        }
        tracing::info!("network stack closed");
    }
}

// ---------------------------------------------------------------------------
// Behaviour construction
// ---------------------------------------------------------------------------

/// Builds the combined [`VeilBehaviour`].
///
/// mDNS is the only soft spot: if multicast setup fails the node
/// continues with DHT and manual bootstrap discovery only.
fn build_behaviour(
    key: &libp2p::identity::Keypair,
    kad_protocol: &str,
    enable_mdns: bool,
    enable_upnp: bool,
) -> PResult<VeilBehaviour> {
    let peer_id = key.public().to_peer_id();

    let protocol = StreamProtocol::try_from_owned(kad_protocol.to_string()).map_err(|e| {
        VeilError::NetworkAssembly {
            reason: format!("invalid Kademlia protocol name: {e}"),
        }
    })?;
    let mut kad_config = kad::Config::default();
    kad_config.set_protocol_names(vec![protocol]);
    let store = kad::store::MemoryStore::new(peer_id);
    let kademlia = kad::Behaviour::with_config(peer_id, store, kad_config);

    let gossip_config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(MAX_MESSAGE_SIZE)
        .build()
        .map_err(|e| VeilError::NetworkAssembly {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;
    let gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(key.clone()),
        gossip_config,
    )
    .map_err(|e| VeilError::NetworkAssembly {
        reason: format!("failed to create gossipsub behaviour: {e}"),
    })?;

    let identify = identify::Behaviour::new(
        identify::Config::new(IDENTIFY_PROTOCOL.into(), key.public())
            .with_agent_version(format!("veilchat/{}", env!("CARGO_PKG_VERSION"))),
    );

    let mdns = if enable_mdns {
        match mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id) {
            Ok(behaviour) => Toggle::from(Some(behaviour)),
            Err(e) => {
                tracing::warn!(%e, "mDNS unavailable; continuing without LAN discovery");
                Toggle::from(None)
            }
        }
    } else {
        Toggle::from(None)
    };

    let upnp = if enable_upnp {
        Toggle::from(Some(upnp::tokio::Behaviour::default()))
    } else {
        Toggle::from(None)
    };

    Ok(VeilBehaviour {
        kademlia,
        gossipsub,
        identify,
        mdns,
        upnp,
    })
}

// ---------------------------------------------------------------------------
// Swarm task
// ---------------------------------------------------------------------------

struct SwarmTask {
    swarm: Swarm<VeilBehaviour>,
    cmd_rx: mpsc::Receiver<SwarmCommand>,
    cancel: CancellationToken,
    /// Topic hash → fan-out queue for joined channels.
    topics: HashMap<gossipsub::TopicHash, broadcast::Sender<ChannelMessage>>,
    listen_addrs: Vec<Multiaddr>,
}

impl SwarmTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("network task stopping");
                    break;
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }
        // Dropping the task drops all broadcast senders; receivers
        // drain and then observe Closed.
    }

    fn handle_command(&mut self, cmd: SwarmCommand) {
        match cmd {
            SwarmCommand::Join { topic, reply } => {
                let t = gossipsub::IdentTopic::new(&topic);
                let result = match self.swarm.behaviour_mut().gossipsub.subscribe(&t) {
                    Ok(_) => {
                        let sender = self
                            .topics
                            .entry(t.hash())
                            .or_insert_with(|| broadcast::channel(CHANNEL_QUEUE_CAPACITY).0);
                        tracing::info!(%topic, "joined broadcast channel");
                        Ok(sender.subscribe())
                    }
                    Err(e) => Err(VeilError::Join {
                        reason: format!("substrate rejected topic '{topic}': {e}"),
                    }),
                };
                let _ = reply.send(result);
            }

            SwarmCommand::Publish { topic, data, reply } => {
                let t = gossipsub::IdentTopic::new(&topic);
                let result = match self.swarm.behaviour_mut().gossipsub.publish(t, data) {
                    Ok(_) => Ok(()),
                    // A lone node has nobody to propagate to; that is
                    // not a caller-visible failure.
                    Err(gossipsub::PublishError::InsufficientPeers) => {
                        tracing::debug!(%topic, "publish with no connected peers");
                        Ok(())
                    }
                    Err(e) => Err(VeilError::Publish {
                        reason: format!("failed to publish to '{topic}': {e}"),
                    }),
                };
                let _ = reply.send(result);
            }

            SwarmCommand::Dial { peer_id, addr, reply } => {
                self.swarm
                    .behaviour_mut()
                    .kademlia
                    .add_address(&peer_id, strip_peer_id(&addr));
                let result = self.swarm.dial(addr.clone()).map_err(|e| VeilError::PeerConnect {
                    reason: format!("failed to dial {addr}: {e}"),
                });
                if result.is_ok() {
                    tracing::info!(%peer_id, %addr, "dialing peer");
                }
                let _ = reply.send(result);
            }

            SwarmCommand::ListenAddrs { reply } => {
                let _ = reply.send(self.listen_addrs.clone());
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<VeilBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "new listen address");
                self.listen_addrs.push(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                tracing::debug!(%address, "listen address expired");
                self.listen_addrs.retain(|a| a != &address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, num_established, "connection established");
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, ?cause, num_established, "connection closed");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
            }
            SwarmEvent::IncomingConnectionError {
                local_addr,
                send_back_addr,
                error,
                ..
            } => {
                tracing::warn!(%local_addr, %send_back_addr, %error, "incoming connection error");
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    fn handle_behaviour_event(&mut self, event: VeilBehaviourEvent) {
        match event {
            VeilBehaviourEvent::Gossipsub(event) => self.handle_gossipsub_event(event),
            VeilBehaviourEvent::Kademlia(event) => handle_kademlia_event(event),
            VeilBehaviourEvent::Identify(event) => self.handle_identify_event(event),
            VeilBehaviourEvent::Mdns(event) => self.handle_mdns_event(event),
            VeilBehaviourEvent::Upnp(event) => handle_upnp_event(event),
        }
    }

    fn handle_gossipsub_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                tracing::debug!(
                    source = %propagation_source,
                    topic = %message.topic,
                    bytes = message.data.len(),
                    "inbound channel message"
                );
                if let Some(sender) = self.topics.get(&message.topic) {
                    // Err means no live receivers; the queue itself
                    // handles overflow by dropping the oldest entry.
                    let _ = sender.send(ChannelMessage {
                        source: message.source,
                        data: message.data,
                    });
                }
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer subscribed to topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer unsubscribed from topic");
            }
            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    /// mDNS discoveries feed the routing table and trigger a direct
    /// dial so LAN peers connect without manual bootstrap.
    fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(peers) => {
                for (peer_id, addr) in peers {
                    tracing::info!(%peer_id, %addr, "mDNS: discovered peer");
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr.clone());
                    if let Err(e) = self.swarm.dial(addr) {
                        tracing::debug!(%peer_id, %e, "mDNS: dial failed (may already be connected)");
                    }
                }
            }
            mdns::Event::Expired(peers) => {
                for (peer_id, addr) in peers {
                    tracing::debug!(%peer_id, %addr, "mDNS: peer expired");
                }
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                tracing::debug!(
                    %peer_id,
                    agent_version = %info.agent_version,
                    "identify: received peer info"
                );
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                tracing::warn!(%peer_id, %error, "identify: error");
            }
            other => {
                tracing::trace!(?other, "other identify event");
            }
        }
    }
}

fn handle_kademlia_event(event: kad::Event) {
    match event {
        kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
            kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk {
                peer,
                num_remaining,
            })) => {
                tracing::info!(?id, %peer, num_remaining, "Kademlia bootstrap progress");
            }
            kad::QueryResult::Bootstrap(Err(e)) => {
                tracing::warn!(?id, ?e, "Kademlia bootstrap failed");
            }
            other => {
                tracing::trace!(?id, ?other, "other Kademlia query result");
            }
        },
        kad::Event::RoutingUpdated { peer, .. } => {
            tracing::debug!(%peer, "Kademlia routing table updated");
        }
        other => {
            tracing::trace!(?other, "other Kademlia event");
        }
    }
}

fn handle_upnp_event(event: upnp::Event) {
    match event {
        upnp::Event::NewExternalAddr(addr) => {
            tracing::info!(%addr, "UPnP: mapped external address");
        }
        upnp::Event::ExpiredExternalAddr(addr) => {
            tracing::debug!(%addr, "UPnP: external address expired");
        }
        upnp::Event::GatewayNotFound => {
            tracing::debug!("UPnP: no gateway found");
        }
        upnp::Event::NonRoutableGateway => {
            tracing::debug!("UPnP: gateway is not routable");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PEER_ADDR: &str =
        "/ip4/1.2.3.4/tcp/9000/p2p/12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN";

    #[test]
    fn parse_valid_peer_multiaddr() {
        let (peer_id, addr) = parse_peer_multiaddr(VALID_PEER_ADDR).unwrap();
        assert_eq!(
            peer_id.to_string(),
            "12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN"
        );
        assert_eq!(addr.to_string(), VALID_PEER_ADDR);
    }

    #[test]
    fn parse_malformed_multiaddr_rejected() {
        let err = parse_peer_multiaddr("not-a-multiaddr").unwrap_err();
        assert!(matches!(err, VeilError::PeerConnect { .. }));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn parse_multiaddr_without_peer_id_rejected() {
        let err = parse_peer_multiaddr("/ip4/1.2.3.4/tcp/9000").unwrap_err();
        assert!(err.to_string().contains("/p2p/"));
    }

    #[test]
    fn strip_peer_id_removes_p2p_component() {
        let addr: Multiaddr = VALID_PEER_ADDR.parse().unwrap();
        let stripped = strip_peer_id(&addr);
        assert_eq!(stripped.to_string(), "/ip4/1.2.3.4/tcp/9000");
    }

    #[test]
    fn build_behaviour_without_optional_discovery() {
        let keypair = libp2p::identity::Keypair::generate_ed25519();
        let result = build_behaviour(&keypair, "/veilchat/kad/1.0.0", false, false);
        assert!(result.is_ok());
    }

    #[test]
    fn build_behaviour_rejects_bad_protocol_name() {
        let keypair = libp2p::identity::Keypair::generate_ed25519();
        let result = build_behaviour(&keypair, "no-leading-slash", false, false);
        assert!(result.is_err());
    }
}
