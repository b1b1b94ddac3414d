//! Local interface selection for listener binding.
//!
//! Binding to a concrete interface address instead of `0.0.0.0`
//! keeps advertised multiaddrs usable by LAN peers. Selection is a
//! two-stage fallback:
//!
//! 1. UDP connect trick — open a socket "towards" a public address
//!    (no packet is sent) and read back the local address the OS
//!    routing table picked. Unspecified and loopback results are
//!    both discarded: a loopback route answer means the host has no
//!    usable route out, and a loopback bind only ever comes from
//!    explicit configuration.
//! 2. Interface enumeration — walk the interface list, skipping
//!    loopback, link-local, and virtual-adapter addresses.
//!
//! If both stages fail the node binds to `0.0.0.0` and logs it;
//! address selection never aborts startup.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;

/// Timeout applied to the probe socket.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Public address used as routing target by the UDP connect trick.
/// Nothing is ever sent to it.
const PROBE_TARGET: (&str, u16) = ("8.8.8.8", 80);

/// Name fragments identifying virtual adapters to skip during
/// interface enumeration.
const VIRTUAL_ADAPTER_PATTERNS: &[&str] =
    &["docker", "veth", "wsl", "virtual", "vmware", "vbox", "br-"];

/// Returns the best local IPv4 address for listener binding.
///
/// Falls back to `0.0.0.0` when no suitable address exists.
pub fn best_local_ip() -> Ipv4Addr {
    if let Some(ip) = probe_outbound_ip() {
        tracing::debug!(%ip, "selected local address via routing probe");
        return ip;
    }

    match local_ip_address::list_afinet_netifas() {
        Ok(ifas) => {
            let ip = select_interface_ip(&ifas);
            if ip.is_unspecified() {
                tracing::warn!("no suitable interface address found; binding to 0.0.0.0");
            } else {
                tracing::debug!(%ip, "selected local address via interface scan");
            }
            ip
        }
        Err(e) => {
            tracing::warn!(%e, "interface enumeration failed; binding to 0.0.0.0");
            Ipv4Addr::UNSPECIFIED
        }
    }
}

/// UDP connect trick: asks the OS routing table which local address
/// would be used for outbound traffic. No packet leaves the host.
fn probe_outbound_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.set_write_timeout(Some(PROBE_TIMEOUT)).ok()?;
    socket.connect(PROBE_TARGET).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() && !v4.is_loopback() => Some(v4),
        _ => None,
    }
}

/// Picks the first usable IPv4 address from an interface list.
///
/// Skips virtual adapters by name, then loopback, link-local, and
/// unspecified addresses. Returns `0.0.0.0` if nothing qualifies.
pub fn select_interface_ip(ifas: &[(String, IpAddr)]) -> Ipv4Addr {
    for (name, addr) in ifas {
        let lname = name.to_lowercase();
        if VIRTUAL_ADAPTER_PATTERNS.iter().any(|p| lname.contains(p)) {
            continue;
        }
        if let IpAddr::V4(v4) = addr {
            if v4.is_loopback() || v4.is_link_local() || v4.is_unspecified() {
                continue;
            }
            return *v4;
        }
    }
    Ipv4Addr::UNSPECIFIED
}

/// Whether a multiaddr's IPv4 component is the loopback address.
///
/// Used to skip `127.0.0.1` listeners when advertising a bootstrap
/// address to other machines.
pub fn is_loopback_multiaddr(addr: &Multiaddr) -> bool {
    addr.iter().any(|p| match p {
        Protocol::Ip4(ip) => ip.is_loopback(),
        Protocol::Ip6(ip) => ip.is_loopback(),
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ifa(name: &str, ip: [u8; 4]) -> (String, IpAddr) {
        (name.to_string(), IpAddr::V4(Ipv4Addr::from(ip)))
    }

    #[test]
    fn skips_loopback_and_picks_physical() {
        let ifas = vec![ifa("lo", [127, 0, 0, 1]), ifa("eth0", [192, 168, 1, 7])];
        assert_eq!(select_interface_ip(&ifas), Ipv4Addr::new(192, 168, 1, 7));
    }

    #[test]
    fn skips_virtual_adapters() {
        let ifas = vec![
            ifa("docker0", [172, 17, 0, 1]),
            ifa("veth1234", [172, 18, 0, 1]),
            ifa("vEthernet (WSL)", [172, 19, 0, 1]),
            ifa("wlan0", [10, 0, 0, 5]),
        ];
        assert_eq!(select_interface_ip(&ifas), Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn skips_link_local() {
        let ifas = vec![ifa("eth0", [169, 254, 1, 1]), ifa("eth1", [192, 168, 0, 2])];
        assert_eq!(select_interface_ip(&ifas), Ipv4Addr::new(192, 168, 0, 2));
    }

    #[test]
    fn empty_list_yields_unspecified() {
        assert_eq!(select_interface_ip(&[]), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn only_virtual_yields_unspecified() {
        let ifas = vec![ifa("docker0", [172, 17, 0, 1]), ifa("br-abc123", [172, 20, 0, 1])];
        assert_eq!(select_interface_ip(&ifas), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn loopback_multiaddr_detected() {
        let lo: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        let lan: Multiaddr = "/ip4/192.168.1.7/tcp/4001".parse().unwrap();
        assert!(is_loopback_multiaddr(&lo));
        assert!(!is_loopback_multiaddr(&lan));
    }
}
