//! Resolver configuration.

use crate::base::neterror::NetError;
use crate::dns::literal;
use crate::dns::nat64::WELL_KNOWN_PREFIX;
use crate::dns::retry::RetryPolicy;
use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Duration,
};

/// Cloudflare's public resolvers, one per address family.
pub const DEFAULT_FALLBACK_SERVERS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
    IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111)),
];

/// Resolver configuration.
///
/// Deserializes from JSON with every field optional; durations are given in
/// milliseconds (`query_timeout_ms`, `cache_ttl_ms`, `negative_cache_ttl_ms`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Server tried before anything else; literal or hostname.
    pub preferred_server: Option<String>,
    /// When a preferred server is set, skip the system tier entirely.
    pub preferred_only: bool,
    /// Static last-resort servers. Empty means the defaults.
    pub fallback_servers: Vec<IpAddr>,
    /// Per-attempt deadline (default 5s, must be non-zero).
    #[serde(rename = "query_timeout_ms", with = "millis")]
    pub query_timeout: Duration,
    /// Additional attempts per (server, record type) (default 2).
    pub max_retries: u32,
    /// NAT64 prefix; only the first 96 bits are used.
    pub nat64_prefix: Ipv6Addr,
    /// Drop system servers that do not accept a connection quickly.
    pub check_reachability: bool,
    /// Port DNS servers listen on.
    pub port: u16,
    /// Lifetime of cached non-empty answers.
    #[serde(rename = "cache_ttl_ms", with = "millis")]
    pub cache_ttl: Duration,
    /// Lifetime of cached empty answers.
    #[serde(rename = "negative_cache_ttl_ms", with = "millis")]
    pub negative_cache_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            preferred_server: None,
            preferred_only: false,
            fallback_servers: DEFAULT_FALLBACK_SERVERS.to_vec(),
            query_timeout: Duration::from_secs(5),
            max_retries: 2,
            nat64_prefix: WELL_KNOWN_PREFIX,
            check_reachability: false,
            port: 53,
            cache_ttl: crate::dns::cache::DEFAULT_TTL,
            negative_cache_ttl: crate::dns::cache::DEFAULT_NEGATIVE_TTL,
        }
    }
}

impl ResolverConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred server.
    pub fn preferred_server(mut self, server: impl Into<String>) -> Self {
        self.preferred_server = Some(server.into());
        self
    }

    /// Only use the preferred server (plus fallback) when one is set.
    pub fn preferred_only(mut self, enabled: bool) -> Self {
        self.preferred_only = enabled;
        self
    }

    /// Replace the fallback servers.
    pub fn fallback_servers(mut self, servers: impl IntoIterator<Item = IpAddr>) -> Self {
        self.fallback_servers = servers.into_iter().collect();
        self
    }

    /// Set the per-attempt timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the NAT64 prefix.
    pub fn nat64_prefix(mut self, prefix: Ipv6Addr) -> Self {
        self.nat64_prefix = prefix;
        self
    }

    /// Enable or disable the reachability filter for system servers.
    pub fn check_reachability(mut self, enabled: bool) -> Self {
        self.check_reachability = enabled;
        self
    }

    /// Set the DNS server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set cache lifetimes for positive and negative answers.
    pub fn cache_ttls(mut self, ttl: Duration, negative_ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self.negative_cache_ttl = negative_ttl;
        self
    }

    /// Check invariants the resolver relies on.
    pub fn validate(&self) -> Result<(), NetError> {
        if self.query_timeout.is_zero() {
            return Err(NetError::invalid_config(
                "query timeout must be greater than zero",
            ));
        }
        if self.port == 0 {
            return Err(NetError::invalid_config("DNS port must be non-zero"));
        }
        if let Some(server) = &self.preferred_server {
            if !literal::is_literal(server) {
                literal::validate_hostname(server).map_err(|e| {
                    NetError::invalid_config(format!("preferred server {server:?}: {e}"))
                })?;
            }
        }
        if let Some(bad) = self.fallback_servers.iter().find(|ip| ip.is_unspecified()) {
            return Err(NetError::invalid_config(format!(
                "fallback server {bad} is unspecified"
            )));
        }
        Ok(())
    }

    /// Fallback servers, substituting the defaults for an empty list.
    pub fn effective_fallback_servers(&self) -> &[IpAddr] {
        if self.fallback_servers.is_empty() {
            &DEFAULT_FALLBACK_SERVERS
        } else {
            &self.fallback_servers
        }
    }

    /// Retry policy derived from `max_retries`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }

    /// Parse and validate a JSON document.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            NetError::invalid_config(format!("malformed resolver config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    #[cfg(feature = "json")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, NetError> {
        use crate::base::context::IoResultExt;

        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .io_context(&format!("reading resolver config {}", path.display()))?;
        Self::from_json(&json)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
