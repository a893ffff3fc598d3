//! Protocol resolution engine.
//!
//! Walks an ordered list of candidate servers and asks each for address
//! records until one of them produces a usable answer. Per-server and
//! per-attempt failures never escape: they only move the walk to the next
//! attempt or the next server.
//!
//! The cache is consulted for known answers only. Whatever a server says
//! during a walk is written back once the walk is over, so one server's
//! answer never stands in for another server that has not been asked yet.

use super::cache::ResolutionCache;
use super::nat64;
use super::probe::NetworkCapability;
use super::resolve::{AddressRecord, Name, ResolvedAddress};
use super::retry::{calculate_backoff, should_retry, RetryPolicy};
use super::servers::ServerCandidate;
use super::transport::{DnsTransport, RecordType};
use crate::base::neterror::NetError;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Result of walking the candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Routable addresses from the first server that produced any. When no
    /// server did, the first non-routable answer seen.
    pub addresses: Vec<ResolvedAddress>,
    /// Some server answered authoritatively that there is nothing to return.
    pub authoritative_negative: bool,
    /// Number of servers contacted before the walk stopped.
    pub servers_tried: usize,
}

/// Issues queries with retry, caching and NAT64 synthesis.
pub struct Engine {
    transport: Arc<dyn DnsTransport>,
    retry: RetryPolicy,
    query_timeout: Duration,
    nat64_prefix: Ipv6Addr,
    port: u16,
}

impl Engine {
    pub fn new(
        transport: Arc<dyn DnsTransport>,
        retry: RetryPolicy,
        query_timeout: Duration,
        nat64_prefix: Ipv6Addr,
        port: u16,
    ) -> Self {
        Self {
            transport,
            retry,
            query_timeout,
            nat64_prefix,
            port,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves `name` against `candidates` in order.
    ///
    /// `cache` of `None` bypasses caching entirely: nothing is read and
    /// nothing is stored. With a cache, a fresh negative entry for every
    /// record type the walk would ask answers without touching the wire.
    /// The records of the winning server are stored, and an authoritative
    /// empty walk is stored for the negative lifetime.
    pub async fn resolve(
        &self,
        name: &Name,
        candidates: &[ServerCandidate],
        prefer_ipv4: bool,
        cache: Option<&ResolutionCache>,
        capability: NetworkCapability,
    ) -> Resolution {
        let order = lookup_order(prefer_ipv4, capability);
        if cache.is_some_and(|cache| is_cached_negative(cache, name, order)) {
            tracing::debug!(domain = %name, "cached negative answer");
            return Resolution {
                authoritative_negative: true,
                ..Default::default()
            };
        }

        let mut resolution = Resolution::default();
        let mut last_resort = None;

        for candidate in candidates {
            let server = candidate.socket_addr(self.port);
            resolution.servers_tried += 1;

            let answer = self
                .resolve_on_server(server, name, prefer_ipv4, cache, capability)
                .await;
            if answer.negative {
                resolution.authoritative_negative = true;
            }
            if answer.addresses.is_empty() {
                tracing::debug!(domain = %name, %server, "no addresses from server, trying next");
                continue;
            }
            if !answer.addresses.iter().any(|a| is_routable(a.ip())) {
                tracing::debug!(domain = %name, %server, "only unroutable addresses, trying next");
                last_resort.get_or_insert(answer.addresses);
                continue;
            }

            tracing::debug!(
                domain = %name,
                %server,
                origin = ?candidate.origin,
                count = answer.addresses.len(),
                "resolved"
            );
            if let Some(cache) = cache {
                for (record_type, records) in answer.fresh {
                    cache.insert(name.as_str(), record_type, records);
                }
            }
            resolution.addresses = prefer_routable(answer.addresses);
            return resolution;
        }

        if let Some(addresses) = last_resort {
            tracing::debug!(domain = %name, "no routable answer, keeping the first one seen");
            resolution.addresses = addresses;
        } else if let Some(cache) = cache.filter(|_| resolution.authoritative_negative) {
            for &record_type in order {
                cache.insert(name.as_str(), record_type, Vec::new());
            }
        }

        resolution
    }

    async fn resolve_on_server(
        &self,
        server: SocketAddr,
        name: &Name,
        prefer_ipv4: bool,
        cache: Option<&ResolutionCache>,
        capability: NetworkCapability,
    ) -> ServerAnswer {
        let mut lookup = ServerLookup {
            engine: self,
            server,
            name,
            cache,
            negative: true,
            fresh: Vec::new(),
        };

        let addresses = if prefer_ipv4 {
            let v4 = lookup.records(RecordType::A).await;
            let records = if v4.is_empty() {
                lookup.records(RecordType::Aaaa).await
            } else {
                v4
            };
            into_addresses(records)
        } else if capability.is_ipv4_only() {
            into_addresses(lookup.records(RecordType::A).await)
        } else {
            let v6 = lookup.records(RecordType::Aaaa).await;
            if !v6.is_empty() {
                into_addresses(v6)
            } else if capability.is_ipv6_only() {
                let v4 = lookup.records(RecordType::A).await;
                if !v4.is_empty() {
                    tracing::debug!(domain = %name, prefix = %self.nat64_prefix, "using NAT64");
                }
                nat64::synthesize_all(self.nat64_prefix, &v4)
            } else {
                into_addresses(lookup.records(RecordType::A).await)
            }
        };

        ServerAnswer {
            negative: addresses.is_empty() && lookup.negative,
            addresses,
            fresh: lookup.fresh,
        }
    }

    /// Asks one server one question, retrying transient failures.
    ///
    /// An answer returns at once, NODATA included as an empty list, and so
    /// does NXDOMAIN as [`NetError::NameNotFound`]. Errors for which
    /// [`NetError::is_retryable`] holds are retried after an exponential
    /// backoff until the budget is spent; the last one is returned.
    pub async fn query_with_retry(
        &self,
        server: SocketAddr,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Vec<AddressRecord>, NetError> {
        let mut attempt = 0;
        loop {
            let delay = calculate_backoff(attempt, &self.retry);
            if !delay.is_zero() {
                tracing::debug!(domain = %name, %server, ?delay, attempt, "backing off");
                tokio::time::sleep(delay).await;
            }

            let query = self
                .transport
                .query(server, name, record_type, self.query_timeout);
            let result = match tokio::time::timeout(self.query_timeout, query).await {
                Ok(outcome) => outcome.into_result(server, name),
                Err(_) => Err(NetError::ServerTimeout {
                    server: server.to_string(),
                }),
            };
            attempt += 1;

            match result {
                Err(e) if e.is_retryable() && should_retry(attempt, &self.retry) => {
                    tracing::debug!(domain = %name, %server, %record_type, error = %e, "retrying");
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        domain = %name,
                        %server,
                        %record_type,
                        attempts = attempt,
                        error = %e,
                        "server gave no answer"
                    );
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("retry", &self.retry)
            .field("query_timeout", &self.query_timeout)
            .field("nat64_prefix", &self.nat64_prefix)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

struct ServerAnswer {
    addresses: Vec<ResolvedAddress>,
    negative: bool,
    /// Non-empty record sets this server put on the wire.
    fresh: Vec<(RecordType, Vec<AddressRecord>)>,
}

/// Queries against a single server. `negative` stays set only while every
/// answer was authoritative.
struct ServerLookup<'a> {
    engine: &'a Engine,
    server: SocketAddr,
    name: &'a Name,
    cache: Option<&'a ResolutionCache>,
    negative: bool,
    fresh: Vec<(RecordType, Vec<AddressRecord>)>,
}

impl ServerLookup<'_> {
    async fn records(&mut self, record_type: RecordType) -> Vec<AddressRecord> {
        if let Some(records) = self.cached(record_type) {
            return records;
        }

        let result = self
            .engine
            .query_with_retry(self.server, self.name, record_type)
            .await;
        match result {
            Ok(records) => {
                if !records.is_empty() {
                    self.fresh.push((record_type, records.clone()));
                }
                records
            }
            Err(NetError::NameNotFound { .. }) => Vec::new(),
            Err(_) => {
                self.negative = false;
                Vec::new()
            }
        }
    }

    /// A fresh non-empty cached set. Negative entries are only honored
    /// before the walk starts.
    fn cached(&self, record_type: RecordType) -> Option<Vec<AddressRecord>> {
        let records = self.cache?.get(self.name.as_str(), record_type)?;
        (!records.is_empty()).then(|| records.to_vec())
    }
}

/// Record types asked of a server, in order, when it has nothing to return.
fn lookup_order(prefer_ipv4: bool, capability: NetworkCapability) -> &'static [RecordType] {
    if prefer_ipv4 {
        &[RecordType::A, RecordType::Aaaa]
    } else if capability.is_ipv4_only() {
        &[RecordType::A]
    } else {
        &[RecordType::Aaaa, RecordType::A]
    }
}

fn is_cached_negative(cache: &ResolutionCache, name: &Name, order: &[RecordType]) -> bool {
    order.iter().all(|&record_type| {
        cache
            .get(name.as_str(), record_type)
            .is_some_and(|records| records.is_empty())
    })
}

fn into_addresses(records: Vec<AddressRecord>) -> Vec<ResolvedAddress> {
    records.into_iter().map(ResolvedAddress::from).collect()
}

/// Whether an address can be used to reach a remote peer.
pub fn is_routable(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_multicast()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || link_local)
        }
    }
}

/// Keeps only routable addresses, unless that would leave nothing.
pub fn prefer_routable(addresses: Vec<ResolvedAddress>) -> Vec<ResolvedAddress> {
    if addresses.iter().any(|a| is_routable(a.ip())) {
        addresses
            .into_iter()
            .filter(|a| is_routable(a.ip()))
            .collect()
    } else {
        addresses
    }
}
