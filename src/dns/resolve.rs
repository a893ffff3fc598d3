//! Core DNS resolution types and traits.
//!
//! This module defines the `Resolve` trait and supporting types that form
//! the foundation of the DNS abstraction layer.

use crate::base::neterror::NetError;
use crate::dns::probe::LinkProperties;
use std::{
    fmt,
    future::Future,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    pin::Pin,
    sync::Arc,
};

/// A domain name to resolve into IP addresses.
///
/// This is a lightweight wrapper around a hostname string that provides
/// a type-safe way to pass domain names to resolvers.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    /// Creates a new [`Name`] from any string-like type.
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    /// View the hostname as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

/// Address family of a resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

/// An address record as it appears on the wire.
///
/// Only A and AAAA answers are ever turned into this type; any other
/// record type in a response is dropped by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressRecord {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl AddressRecord {
    pub fn ip(&self) -> IpAddr {
        match *self {
            AddressRecord::V4(v4) => IpAddr::V4(v4),
            AddressRecord::V6(v6) => IpAddr::V6(v6),
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            AddressRecord::V4(_) => AddressFamily::V4,
            AddressRecord::V6(_) => AddressFamily::V6,
        }
    }
}

impl From<IpAddr> for AddressRecord {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => AddressRecord::V4(v4),
            IpAddr::V6(v6) => AddressRecord::V6(v6),
        }
    }
}

/// A resolved address handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    addr: IpAddr,
    /// Zone id carried over from a scoped IPv6 literal (`fe80::1%wlan0`).
    zone: Option<Box<str>>,
    synthesized: bool,
}

impl ResolvedAddress {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            zone: None,
            synthesized: false,
        }
    }

    pub(crate) fn scoped(addr: Ipv6Addr, zone: impl Into<Box<str>>) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            zone: Some(zone.into()),
            synthesized: false,
        }
    }

    /// An IPv6 address built by NAT64 synthesis.
    pub(crate) fn synthesized(addr: Ipv6Addr) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            zone: None,
            synthesized: true,
        }
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.addr
    }

    pub fn family(&self) -> AddressFamily {
        if self.addr.is_ipv4() {
            AddressFamily::V4
        } else {
            AddressFamily::V6
        }
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// True when the address was derived from an A record through NAT64.
    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }
}

impl From<AddressRecord> for ResolvedAddress {
    fn from(record: AddressRecord) -> Self {
        Self::new(record.ip())
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{}%{}", self.addr, zone),
            None => fmt::Display::fmt(&self.addr, f),
        }
    }
}

/// Per-call knobs for a resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Query A before AAAA (or keep IPv4 answers, for the native adapter).
    pub prefer_ipv4: bool,
    /// Consult and populate the shared result cache (default: true).
    pub use_cache: bool,
    /// Use this link snapshot instead of asking the network monitor.
    pub network_hint: Option<LinkProperties>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            prefer_ipv4: false,
            use_cache: true,
            network_hint: None,
        }
    }
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefer_ipv4(mut self, prefer: bool) -> Self {
        self.prefer_ipv4 = prefer;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn network_hint(mut self, link: LinkProperties) -> Self {
        self.network_hint = Some(link);
        self
    }
}

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<ResolvedAddress>, NetError>> + Send + 'a>>;

/// Trait for DNS resolution.
///
/// Both the server-selecting [`DnsResolver`](crate::dns::DnsResolver) and the
/// platform-backed [`NativeResolver`](crate::dns::NativeResolver) implement
/// it, so tunnel code can hold either behind `Arc<dyn Resolve>`.
///
/// # Design Notes
///
/// - An empty `Ok` means the name authoritatively has no usable address.
///   Callers bringing up a connection must treat it as a failure.
/// - Uses `&self`; implementations decide how to serialize concurrent calls.
/// - Returns boxed futures for trait object compatibility.
pub trait Resolve: Send + Sync {
    /// Resolves a hostname or literal to IP addresses.
    fn resolve<'a>(&'a self, name: Name, options: ResolveOptions) -> Resolving<'a>;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve<'a>(&'a self, name: Name, options: ResolveOptions) -> Resolving<'a> {
        (**self).resolve(name, options)
    }
}
