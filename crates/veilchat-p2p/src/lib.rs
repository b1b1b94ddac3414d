//! Peer-to-peer networking for the Veilchat node.
//!
//! Built on libp2p with a dual-stack transport (QUIC primary,
//! TCP + Noise + Yamux fallback), Kademlia DHT routing, gossipsub
//! broadcast channels, and optional mDNS LAN discovery.
//!
//! The entry point is [`node::P2pNode::assemble`], which builds the
//! swarm and spawns a background task that owns it. All interaction
//! with the swarm goes through [`node::P2pHandle`] commands.

pub mod channel;
pub mod config;
pub mod identity;
pub mod netif;
pub mod node;

pub use channel::{Channel, ChannelMessage};
pub use config::NetworkConfig;
pub use identity::get_or_create_identity;
pub use node::{P2pHandle, P2pNode, GLOBAL_TOPIC};
