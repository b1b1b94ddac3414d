//! Network configuration for the Veilchat libp2p layer.
//!
//! All values have documented defaults. Validation ensures no
//! zero-valued timeouts or invalid protocol names at startup.
//!
//! This config lives in `veilchat-p2p` rather than `veilchat-types`
//! to avoid pulling `libp2p::Multiaddr` into the shared types crate.

use std::net::Ipv4Addr;

use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use veilchat_types::{Result, VeilError};

/// Network-layer configuration.
///
/// Controls the listen address, bootstrap peers, discovery toggles,
/// and timeout durations for the libp2p swarm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// IPv4 address to bind listeners to.
    ///
    /// `None` (the default) selects the best non-virtual interface
    /// address at assembly time. Tests pin this to `127.0.0.1`.
    pub listen_ip: Option<Ipv4Addr>,

    /// Port for both the TCP and QUIC listeners. `0` lets the OS pick.
    pub listen_port: u16,

    /// Bootstrap nodes seeded into the Kademlia routing table.
    ///
    /// Each entry must be a fully-qualified multiaddr containing a
    /// `/p2p/<peer_id>` component, e.g.:
    /// `/ip4/1.2.3.4/tcp/4001/p2p/12D3KooW...`
    #[serde(with = "multiaddr_vec_serde")]
    pub bootstrap_nodes: Vec<Multiaddr>,

    /// Enable mDNS for automatic peer discovery on the local network.
    ///
    /// mDNS failure never aborts assembly; the node degrades to DHT
    /// and manual bootstrap discovery.
    pub enable_mdns: bool,

    /// Enable UPnP port mapping on the local gateway.
    pub enable_upnp: bool,

    /// Custom Kademlia protocol name for network isolation.
    ///
    /// Nodes using different protocol names will not exchange
    /// Kademlia messages.
    pub kad_protocol: String,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_ip: None,
            listen_port: 4001,
            bootstrap_nodes: Vec::new(),
            enable_mdns: true,
            enable_upnp: true,
            kad_protocol: "/veilchat/kad/1.0.0".into(),
            idle_timeout_secs: 60,
        }
    }
}

impl NetworkConfig {
    /// Validates all configuration values.
    ///
    /// Returns `Err(VeilError::Config)` if any value is outside its
    /// acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.kad_protocol.is_empty() {
            return Err(VeilError::Config {
                reason: "kad_protocol must not be empty".into(),
            });
        }
        if !self.kad_protocol.starts_with('/') {
            return Err(VeilError::Config {
                reason: "kad_protocol must start with '/'".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(VeilError::Config {
                reason: "idle_timeout_secs must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers — Multiaddr does not implement Serialize/Deserialize
// ---------------------------------------------------------------------------

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addrs: &[Multiaddr], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
