//! Tunnel peer endpoints.
//!
//! An [`Endpoint`] is the `host:port` a tunnel peer is reached at. Hostnames
//! are resolved lazily and the answer is remembered: a successful resolution
//! for five minutes, a failed one for thirty seconds.

use crate::base::neterror::NetError;
use crate::dns::literal;
use crate::dns::{Name, Resolve, ResolveOptions, ResolvedAddress};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a successful resolution is reused.
pub const RESOLVED_TTL: Duration = Duration::from_secs(300);

/// How long a failed resolution suppresses new attempts.
pub const FAILED_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct ResolutionState {
    resolved: Option<Endpoint>,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
}

impl ResolutionState {
    fn within(at: Option<Instant>, ttl: Duration) -> bool {
        at.is_some_and(|at| at.elapsed() <= ttl)
    }

    fn record_failure(&mut self) {
        self.resolved = None;
        self.last_failure = Some(Instant::now());
    }
}

/// A peer's external endpoint.
///
/// Clones share the remembered resolution. Equality and hashing only look
/// at host and port.
#[derive(Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    is_resolved: bool,
    state: Arc<Mutex<ResolutionState>>,
}

impl Endpoint {
    /// Parses `host:port`, where an IPv6 host must be bracketed.
    pub fn parse(endpoint: &str) -> Result<Self, NetError> {
        let invalid = |reason: &str| NetError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: reason.to_owned(),
        };

        if endpoint.contains(['/', '?', '#']) {
            return Err(invalid("forbidden characters"));
        }

        let (host, port, bracketed) = if let Some(rest) = endpoint.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unclosed bracket"))?;
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port number"))?;
            (host, port, true)
        } else {
            let (host, port) = endpoint
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port number"))?;
            if host.contains(':') {
                return Err(invalid("IPv6 address must be enclosed in brackets"));
            }
            (host, port, false)
        };

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("missing/invalid port number"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| invalid("missing/invalid port number"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        match literal::parse_literal(host) {
            Some(addr) if bracketed && addr.ip().is_ipv4() => {
                Err(invalid("brackets are only valid around IPv6 addresses"))
            }
            Some(_) => Ok(Self::new(host.to_owned(), port, true)),
            None if bracketed => Err(invalid("invalid IPv6 address")),
            None => {
                literal::validate_hostname(host).map_err(|e| invalid(&e.to_string()))?;
                Ok(Self::new(host.to_ascii_lowercase(), port, false))
            }
        }
    }

    /// An already-resolved endpoint.
    pub fn from_address(address: &ResolvedAddress, port: u16) -> Self {
        Self::new(address.to_string(), port, true)
    }

    fn new(host: String, port: u16, is_resolved: bool) -> Self {
        Self {
            host,
            port,
            is_resolved,
            state: Arc::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the host is a literal address.
    pub fn is_resolved(&self) -> bool {
        self.is_resolved
    }

    /// Socket address for a literal host. Zone ids are not carried over.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        if !self.is_resolved {
            return None;
        }
        literal::parse_literal(&self.host).map(|addr| SocketAddr::new(addr.ip(), self.port))
    }

    /// The endpoint with its host resolved to an address.
    ///
    /// A literal endpoint returns itself. Otherwise a successful resolution
    /// younger than [`RESOLVED_TTL`] is reused, a failure younger than
    /// [`FAILED_TTL`] returns `None` without asking again, and anything older
    /// triggers a fresh resolution.
    pub async fn resolved(&self, resolver: &dyn Resolve, prefer_ipv4: bool) -> Option<Endpoint> {
        if self.is_resolved {
            return Some(self.clone());
        }

        let mut state = self.state.lock().await;
        if ResolutionState::within(state.last_success, RESOLVED_TTL) {
            return state.resolved.clone();
        }
        if ResolutionState::within(state.last_failure, FAILED_TTL) {
            return None;
        }

        let name = Name::new(self.host.as_str());
        match resolver.resolve(name, peer_options(prefer_ipv4)).await {
            Ok(addresses) => match pick_address(&addresses, prefer_ipv4) {
                Some(address) => {
                    let endpoint = Endpoint::from_address(address, self.port);
                    tracing::debug!(host = %self.host, resolved = %endpoint, "endpoint resolved");
                    state.resolved = Some(endpoint.clone());
                    state.last_success = Some(Instant::now());
                    Some(endpoint)
                }
                None => {
                    tracing::warn!(host = %self.host, "no addresses resolved for peer endpoint");
                    state.record_failure();
                    None
                }
            },
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "failed to resolve peer endpoint");
                state.record_failure();
                None
            }
        }
    }

    /// Records an externally obtained address as this endpoint's resolution.
    pub async fn set_resolved(&self, address: &ResolvedAddress) -> Endpoint {
        let endpoint = Endpoint::from_address(address, self.port);
        let mut state = self.state.lock().await;
        state.resolved = Some(endpoint.clone());
        state.last_success = Some(Instant::now());
        endpoint
    }
}

/// Peer lookups always go to the network; the shared cache is bypassed.
fn peer_options(prefer_ipv4: bool) -> ResolveOptions {
    ResolveOptions::new()
        .prefer_ipv4(prefer_ipv4)
        .use_cache(false)
}

fn pick_address(addresses: &[ResolvedAddress], prefer_ipv4: bool) -> Option<&ResolvedAddress> {
    if prefer_ipv4 {
        if let Some(v4) = addresses.iter().find(|a| a.ip().is_ipv4()) {
            return Some(v4);
        }
    }
    addresses.first()
}

impl FromStr for Endpoint {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::from_address(&ResolvedAddress::new(addr.ip()), addr.port())
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resolved && self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("is_resolved", &self.is_resolved)
            .finish()
    }
}

/// Resolves every peer endpoint ahead of bringing a tunnel up.
///
/// Literal endpoints pass through. Each hostname is resolved once with the
/// tunnel's IPv4 preference and the first address is used. An error or an
/// empty answer for any peer fails the whole attempt with
/// [`NetError::DnsResolutionFailure`].
pub async fn resolve_peer_endpoints(
    resolver: &dyn Resolve,
    endpoints: &[Endpoint],
    prefer_ipv4: bool,
) -> Result<Vec<Endpoint>, NetError> {
    let mut resolved = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        if endpoint.is_resolved() {
            resolved.push(endpoint.clone());
            continue;
        }

        let name = Name::new(endpoint.host());
        let addresses = match resolver.resolve(name, peer_options(prefer_ipv4)).await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::warn!(host = %endpoint.host(), error = %e, "peer resolution failed");
                Vec::new()
            }
        };

        let Some(first) = addresses.first() else {
            return Err(NetError::DnsResolutionFailure {
                host: endpoint.host().to_owned(),
            });
        };
        let peer = endpoint.set_resolved(first).await;
        tracing::debug!(host = %endpoint.host(), resolved = %peer, "resolved peer endpoint");
        resolved.push(peer);
    }

    Ok(resolved)
}
