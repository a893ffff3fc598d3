//! Network capability probing.
//!
//! Mobile radios reclassify connectivity often, so capability is always
//! derived from a fresh [`LinkProperties`] snapshot at the start of a
//! resolution and never kept past it.
//!
//! The platform side is abstracted as [`NetworkMonitor`]. Embedders on
//! Android/iOS feed it from the OS connectivity APIs; [`SystemNetwork`] is a
//! best-effort implementation for desktop hosts.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::{Arc, RwLock},
};

/// Point-in-time description of the active network path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkProperties {
    /// The platform reports this path as reaching the internet.
    pub internet_capable: bool,
    /// Interface addresses on the path.
    pub addresses: Vec<IpAddr>,
    /// Plain DNS servers announced for the path, in platform order.
    pub dns_servers: Vec<IpAddr>,
    /// Encrypted resolver currently in use, if any.
    pub private_dns: Option<PrivateDns>,
}

/// Private (encrypted) DNS state of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateDns {
    /// Whether the encrypted resolver is active on this link.
    pub active: bool,
    /// Hostname of the encrypted resolver; requires bootstrap resolution.
    pub server_name: Option<String>,
}

impl LinkProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn internet_capable(mut self, capable: bool) -> Self {
        self.internet_capable = capable;
        self
    }

    pub fn address(mut self, addr: IpAddr) -> Self {
        self.addresses.push(addr);
        self
    }

    pub fn dns_server(mut self, server: IpAddr) -> Self {
        self.dns_servers.push(server);
        self
    }

    pub fn private_dns(mut self, server_name: impl Into<String>) -> Self {
        self.private_dns = Some(PrivateDns {
            active: true,
            server_name: Some(server_name.into()),
        });
        self
    }

    /// Hostname of the active private resolver, if one needs bootstrapping.
    pub fn active_private_dns_name(&self) -> Option<&str> {
        self.private_dns
            .as_ref()
            .filter(|p| p.active)
            .and_then(|p| p.server_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Which address families the active path can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCapability {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl NetworkCapability {
    pub const NONE: Self = Self::new(false, false);
    pub const DUAL_STACK: Self = Self::new(true, true);
    pub const IPV4_ONLY: Self = Self::new(true, false);
    pub const IPV6_ONLY: Self = Self::new(false, true);

    pub const fn new(ipv4: bool, ipv6: bool) -> Self {
        Self { ipv4, ipv6 }
    }

    pub fn is_ipv4_only(&self) -> bool {
        self.ipv4 && !self.ipv6
    }

    pub fn is_ipv6_only(&self) -> bool {
        self.ipv6 && !self.ipv4
    }
}

/// Addresses that say nothing about internet reachability of a family.
///
/// Every IPv6 interface carries an `fe80::/10` address, so counting it would
/// mark IPv4-only networks as dual stack.
fn is_usable_interface_address(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !(v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()),
        IpAddr::V6(v6) => {
            !(v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}

/// Derives the capability of a link snapshot.
///
/// A family is usable when the link is internet capable and carries either a
/// usable interface address or a DNS server of that family. `None` (no
/// active network) yields [`NetworkCapability::NONE`].
pub fn capability(link: Option<&LinkProperties>) -> NetworkCapability {
    let Some(link) = link else {
        return NetworkCapability::NONE;
    };
    if !link.internet_capable {
        return NetworkCapability::NONE;
    }

    let has_family = |v4: bool| {
        let usable = |a: &IpAddr| a.is_ipv4() == v4 && is_usable_interface_address(a);
        link.addresses.iter().any(usable) || link.dns_servers.iter().any(|s| s.is_ipv4() == v4)
    };

    NetworkCapability::new(has_family(true), has_family(false))
}

/// Source of link snapshots for the active network.
///
/// `active_link` may block. [`DnsResolver`](crate::dns::DnsResolver) only
/// calls it from tokio's blocking pool.
pub trait NetworkMonitor: Send + Sync {
    /// Snapshot of the currently active network, or `None` when offline.
    fn active_link(&self) -> Option<LinkProperties>;

    /// Capability of the currently active network.
    fn probe(&self) -> NetworkCapability {
        capability(self.active_link().as_ref())
    }
}

impl<M: NetworkMonitor + ?Sized> NetworkMonitor for Arc<M> {
    fn active_link(&self) -> Option<LinkProperties> {
        (**self).active_link()
    }
}

/// A monitor serving a snapshot supplied by the embedder.
///
/// Platform glue calls [`StaticNetwork::set`] from its connectivity callback.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    link: RwLock<Option<LinkProperties>>,
}

impl StaticNetwork {
    pub fn new(link: Option<LinkProperties>) -> Self {
        Self {
            link: RwLock::new(link),
        }
    }

    /// Replaces the snapshot; the next resolution sees the new network.
    pub fn set(&self, link: Option<LinkProperties>) {
        match self.link.write() {
            Ok(mut guard) => *guard = link,
            Err(poisoned) => *poisoned.into_inner() = link,
        }
    }
}

impl NetworkMonitor for StaticNetwork {
    fn active_link(&self) -> Option<LinkProperties> {
        match self.link.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Well-known destinations used only to ask the kernel for a route.
/// No packet is sent: connecting a UDP socket just selects a source address.
const ROUTE_TARGET_V4: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const ROUTE_TARGET_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);

/// Derives link snapshots from the host's routing table and resolver config.
#[derive(Debug, Clone, Default)]
pub struct SystemNetwork;

impl SystemNetwork {
    pub fn new() -> Self {
        Self
    }

    fn route_source(target: SocketAddr) -> Option<IpAddr> {
        let bind: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).ok()?;
        socket.connect(target).ok()?;
        let local = socket.local_addr().ok()?.ip();
        (!local.is_unspecified()).then_some(local)
    }

    fn system_dns_servers() -> Vec<IpAddr> {
        match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, _opts)) => {
                let mut servers: Vec<IpAddr> = Vec::new();
                for ns in config.name_servers() {
                    let ip = ns.socket_addr.ip();
                    if !servers.contains(&ip) {
                        servers.push(ip);
                    }
                }
                servers
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read system DNS config");
                Vec::new()
            }
        }
    }
}

impl NetworkMonitor for SystemNetwork {
    fn active_link(&self) -> Option<LinkProperties> {
        let targets = [IpAddr::V4(ROUTE_TARGET_V4), IpAddr::V6(ROUTE_TARGET_V6)];
        let addresses: Vec<IpAddr> = targets
            .into_iter()
            .filter_map(|ip| Self::route_source(SocketAddr::new(ip, 53)))
            .collect();
        let dns_servers = Self::system_dns_servers();

        if addresses.is_empty() && dns_servers.is_empty() {
            tracing::debug!("no active network detected");
            return None;
        }

        Some(LinkProperties {
            internet_capable: !addresses.is_empty(),
            addresses,
            dns_servers,
            private_dns: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_network_is_incapable() {
        assert_eq!(capability(None), NetworkCapability::NONE);
    }

    #[test]
    fn test_not_internet_capable() {
        let link = LinkProperties::new()
            .address(ip("10.0.0.2"))
            .dns_server(ip("10.0.0.1"));
        assert_eq!(capability(Some(&link)), NetworkCapability::NONE);
    }

    #[test]
    fn test_ipv4_only_ignores_link_local_v6() {
        let link = LinkProperties::new()
            .internet_capable(true)
            .address(ip("10.0.0.2"))
            .address(ip("fe80::1"))
            .dns_server(ip("10.0.0.1"));
        let cap = capability(Some(&link));
        assert!(cap.is_ipv4_only());
    }

    #[test]
    fn test_ipv6_only_via_dns_server() {
        let link = LinkProperties::new()
            .internet_capable(true)
            .dns_server(ip("2001:db8::53"));
        assert!(capability(Some(&link)).is_ipv6_only());
    }

    #[test]
    fn test_dual_stack() {
        let link = LinkProperties::new()
            .internet_capable(true)
            .address(ip("192.168.1.20"))
            .address(ip("2001:db8::20"));
        assert_eq!(capability(Some(&link)), NetworkCapability::DUAL_STACK);
    }

    #[test]
    fn test_active_private_dns_name() {
        let link = LinkProperties::new().private_dns("dns.example");
        assert_eq!(link.active_private_dns_name(), Some("dns.example"));

        let inactive = LinkProperties {
            private_dns: Some(PrivateDns {
                active: false,
                server_name: Some("x".into()),
            }),
            ..Default::default()
        };
        assert_eq!(inactive.active_private_dns_name(), None);
    }

    #[test]
    fn test_static_network_updates() {
        let monitor = StaticNetwork::new(None);
        assert_eq!(monitor.probe(), NetworkCapability::NONE);

        let link = LinkProperties::new()
            .internet_capable(true)
            .address(ip("10.1.1.1"));
        monitor.set(Some(link));
        assert_eq!(monitor.probe(), NetworkCapability::IPV4_ONLY);
    }
}
