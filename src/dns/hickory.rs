//! Platform resolver backed by hickory-dns.
//!
//! Uses the host's resolver configuration (`/etc/resolv.conf` and friends)
//! and the hosts file, the way the operating system's own resolver would.
//! Each query runs as a tokio task that the cancellation signal aborts.

use super::native::{CancellationSignal, PlatformDns, QueryCallback, RCODE_NXDOMAIN};
use hickory_resolver::{
    config::{LookupIpStrategy, ResolverConfig},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::{io, sync::Arc};

/// [`PlatformDns`] over a hickory `TokioResolver`.
///
/// # Example
///
/// ```rust,ignore
/// use peerdns::dns::{HickoryPlatform, NativeResolver};
///
/// let resolver = NativeResolver::new(HickoryPlatform::new());
/// let addrs = resolver.resolve("vpn.example.com", false).await?;
/// ```
#[derive(Clone)]
pub struct HickoryPlatform {
    resolver: Arc<TokioResolver>,
}

impl HickoryPlatform {
    /// Reads the system DNS configuration; falls back to hickory's defaults
    /// when it cannot be read.
    pub fn new() -> Self {
        let mut builder = match TokioResolver::builder_tokio() {
            Ok(builder) => {
                tracing::debug!("Using system DNS configuration");
                builder
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read system DNS config, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };

        // Family selection happens in the adapter.
        builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        Self {
            resolver: Arc::new(builder.build()),
        }
    }
}

impl Default for HickoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HickoryPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryPlatform").finish_non_exhaustive()
    }
}

impl PlatformDns for HickoryPlatform {
    fn query(&self, host: &str, signal: Arc<CancellationSignal>, callback: QueryCallback) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                callback.on_error(io::Error::other(e));
                return;
            }
        };

        let resolver = Arc::clone(&self.resolver);
        let host = host.to_owned();
        let task = runtime.spawn(async move {
            match resolver.lookup_ip(host.as_str()).await {
                Ok(lookup) => callback.on_answer(lookup.iter().collect(), 0),
                Err(e) if e.is_nx_domain() => callback.on_answer(Vec::new(), RCODE_NXDOMAIN),
                Err(e) if e.is_no_records_found() => callback.on_answer(Vec::new(), 0),
                Err(e) => {
                    tracing::debug!(domain = %host, error = %e, "hickory-dns lookup failed");
                    callback.on_error(io::Error::other(e.to_string()));
                }
            }
        });

        let abort = task.abort_handle();
        signal.on_cancel(move || abort.abort());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::native::NativeResolver;

    #[tokio::test]
    async fn test_literal_needs_no_lookup() {
        let resolver = NativeResolver::new(HickoryPlatform::new());
        let addrs = resolver.resolve("[2001:db8::7]", false).await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].to_string(), "2001:db8::7");
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_loopback() {
        let resolver = NativeResolver::new(HickoryPlatform::new());
        // localhost is answered locally; whatever comes back must be loopback.
        if let Ok(addrs) = resolver.resolve("localhost", true).await {
            assert!(addrs.iter().all(|a| a.ip().is_loopback()));
        }
    }

    #[tokio::test]
    async fn test_hickory_platform_is_clone() {
        let p1 = HickoryPlatform::new();
        let p2 = p1.clone();
        assert!(Arc::ptr_eq(&p1.resolver, &p2.resolver));
    }
}
