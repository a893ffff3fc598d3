//! Server selection policy.
//!
//! Builds the ordered, de-duplicated list of DNS servers one resolution
//! walks: the preferred server, then the system tier (private DNS or the
//! link's plain servers), then the static fallback servers. The list is
//! rebuilt for every call so it always reflects the current network.

use super::engine::Engine;
use super::literal;
use super::probe::{LinkProperties, NetworkCapability};
use super::resolve::Name;
use crate::base::neterror::NetError;
use crate::config::ResolverConfig;
use futures::future::join_all;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Where a candidate server came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerOrigin {
    Preferred,
    System,
    PrivateDns,
    Fallback,
}

/// One DNS server to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerCandidate {
    pub address: IpAddr,
    pub origin: ServerOrigin,
}

impl ServerCandidate {
    pub fn new(address: IpAddr, origin: ServerOrigin) -> Self {
        Self { address, origin }
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.address, port)
    }
}

/// Ordered candidate list; an address is kept at its first position only.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    servers: Vec<ServerCandidate>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `address` unless it is already listed. Returns whether it was added.
    pub fn push(&mut self, address: IpAddr, origin: ServerOrigin) -> bool {
        if self.servers.iter().any(|c| c.address == address) {
            return false;
        }
        self.servers.push(ServerCandidate::new(address, origin));
        true
    }

    pub fn extend(&mut self, addresses: impl IntoIterator<Item = IpAddr>, origin: ServerOrigin) {
        for address in addresses {
            self.push(address, origin);
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn as_slice(&self) -> &[ServerCandidate] {
        &self.servers
    }

    pub fn into_vec(self) -> Vec<ServerCandidate> {
        self.servers
    }
}

/// Alias for the `Future` type returned by a reachability probe.
pub type Probing<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Best-effort check that a server can be contacted at all.
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable<'a>(&'a self, server: SocketAddr, timeout: Duration) -> Probing<'a>;
}

impl<P: ReachabilityProbe + ?Sized> ReachabilityProbe for Arc<P> {
    fn is_reachable<'a>(&'a self, server: SocketAddr, timeout: Duration) -> Probing<'a> {
        (**self).is_reachable(server, timeout)
    }
}

/// Probes by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Clone, Default)]
pub struct TcpReachability;

impl ReachabilityProbe for TcpReachability {
    fn is_reachable<'a>(&'a self, server: SocketAddr, timeout: Duration) -> Probing<'a> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, TcpStream::connect(server)).await {
                Ok(Ok(_stream)) => true,
                Ok(Err(e)) => {
                    tracing::debug!(%server, error = %e, "DNS server refused connection");
                    false
                }
                Err(_) => {
                    tracing::debug!(%server, ?timeout, "DNS server connect timed out");
                    false
                }
            }
        })
    }
}

/// Assembles the candidate list for one resolution.
pub struct ServerSelector<'a> {
    config: &'a ResolverConfig,
    engine: &'a Engine,
    reachability: &'a dyn ReachabilityProbe,
}

impl<'a> ServerSelector<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        engine: &'a Engine,
        reachability: &'a dyn ReachabilityProbe,
    ) -> Self {
        Self {
            config,
            engine,
            reachability,
        }
    }

    /// Ordered candidates for the given network snapshot. Never empty.
    pub async fn select(
        &self,
        link: Option<&LinkProperties>,
        capability: NetworkCapability,
    ) -> Vec<ServerCandidate> {
        let mut list = CandidateList::new();
        let plain_servers: &[IpAddr] = link.map(|l| l.dns_servers.as_slice()).unwrap_or(&[]);

        if let Some(preferred) = &self.config.preferred_server {
            match literal::parse_literal(preferred) {
                Some(addr) => {
                    list.push(addr.ip(), ServerOrigin::Preferred);
                }
                None => {
                    let addresses = self.bootstrap(preferred, plain_servers, capability).await;
                    if addresses.is_empty() {
                        tracing::warn!(server = %preferred, "preferred DNS server did not resolve");
                    }
                    list.extend(addresses, ServerOrigin::Preferred);
                }
            }
        }

        if self.config.preferred_only && !list.is_empty() {
            tracing::debug!("preferred-only policy, skipping system DNS servers");
        } else if let Some(private_name) = link.and_then(LinkProperties::active_private_dns_name) {
            let private = self
                .private_dns_servers(private_name, plain_servers, capability)
                .await;
            match private {
                Ok(addresses) => list.extend(addresses, ServerOrigin::PrivateDns),
                Err(e) => tracing::warn!(error = %e, "private DNS unavailable"),
            }
        } else if self.config.check_reachability {
            let reachable = self.filter_reachable(plain_servers).await;
            list.extend(reachable, ServerOrigin::System);
        } else {
            list.extend(plain_servers.iter().copied(), ServerOrigin::System);
        }

        let fallback = self.config.effective_fallback_servers();
        list.extend(fallback.iter().copied(), ServerOrigin::Fallback);
        list.into_vec()
    }

    /// Resolves the private DNS hostname and keeps the reachable addresses.
    pub async fn private_dns_servers(
        &self,
        hostname: &str,
        plain_servers: &[IpAddr],
        capability: NetworkCapability,
    ) -> Result<Vec<IpAddr>, NetError> {
        let resolved = self.bootstrap(hostname, plain_servers, capability).await;
        let reachable = self.filter_reachable(&resolved).await;
        if reachable.is_empty() {
            return Err(NetError::PrivateDnsResolutionFailed {
                hostname: hostname.to_owned(),
            });
        }
        Ok(reachable)
    }

    /// Resolves a server hostname against the plain and fallback servers,
    /// bypassing the cache.
    async fn bootstrap(
        &self,
        hostname: &str,
        plain_servers: &[IpAddr],
        capability: NetworkCapability,
    ) -> Vec<IpAddr> {
        let name = match literal::classify(hostname) {
            Ok(literal::Classified::Literal(addr)) => return vec![addr.ip()],
            Ok(literal::Classified::Hostname(host)) => Name::new(host),
            Err(e) => {
                tracing::warn!(server = %hostname, error = %e, "invalid DNS server name");
                return Vec::new();
            }
        };

        let mut bootstrap = CandidateList::new();
        bootstrap.extend(plain_servers.iter().copied(), ServerOrigin::System);
        bootstrap.extend(
            self.config.effective_fallback_servers().iter().copied(),
            ServerOrigin::Fallback,
        );

        let resolution = self
            .engine
            .resolve(&name, bootstrap.as_slice(), false, None, capability)
            .await;
        resolution.addresses.iter().map(|a| a.ip()).collect()
    }

    async fn filter_reachable(&self, servers: &[IpAddr]) -> Vec<IpAddr> {
        let port = self.engine.port();
        let timeout = self.engine.query_timeout() / 2;
        let checks = servers.iter().map(|&ip| async move {
            let server = SocketAddr::new(ip, port);
            let reachable = self.reachability.is_reachable(server, timeout).await;
            if !reachable {
                tracing::warn!(server = %ip, "DNS server unreachable, skipping");
            }
            reachable.then_some(ip)
        });
        join_all(checks).await.into_iter().flatten().collect()
    }
}
