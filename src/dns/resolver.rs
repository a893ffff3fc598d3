//! The server-selecting resolver.
//!
//! [`DnsResolver`] wires the pipeline together: literal short-circuit,
//! network capability, candidate selection, then the protocol engine.

use super::cache::ResolutionCache;
use super::engine::Engine;
use super::literal::{self, Classified};
use super::probe::{self, LinkProperties, NetworkMonitor, SystemNetwork};
use super::resolve::{Name, Resolve, ResolveOptions, ResolvedAddress, Resolving};
use super::servers::{ReachabilityProbe, ServerSelector, TcpReachability};
use super::transport::{DnsTransport, UdpTransport};
use crate::base::blocking::block_on_background;
use crate::base::neterror::NetError;
use crate::config::ResolverConfig;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Hostname resolver with server selection, retry and NAT64 support.
///
/// Calls on one instance are serialized; concurrent callers queue. Separate
/// instances only share state through an explicitly shared cache.
///
/// # Example
///
/// ```rust,ignore
/// use peerdns::config::ResolverConfig;
/// use peerdns::dns::{DnsResolver, ResolveOptions};
///
/// let resolver = DnsResolver::new(ResolverConfig::default())?;
/// let addrs = resolver.resolve("vpn.example.com", ResolveOptions::new()).await?;
/// ```
pub struct DnsResolver {
    config: ResolverConfig,
    engine: Engine,
    network: Arc<dyn NetworkMonitor>,
    reachability: Arc<dyn ReachabilityProbe>,
    cache: RwLock<Arc<ResolutionCache>>,
    entry: Mutex<()>,
}

impl DnsResolver {
    /// Resolver using the host's network state and plain UDP DNS.
    pub fn new(config: ResolverConfig) -> Result<Self, NetError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ResolverConfig) -> DnsResolverBuilder {
        DnsResolverBuilder {
            config,
            network: None,
            transport: None,
            reachability: None,
            cache: None,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The cache currently in use.
    pub fn cache(&self) -> Arc<ResolutionCache> {
        match self.cache.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swaps in another cache. Resolutions already running keep the old one.
    pub fn replace_cache(&self, cache: Arc<ResolutionCache>) {
        match self.cache.write() {
            Ok(mut guard) => *guard = cache,
            Err(poisoned) => *poisoned.into_inner() = cache,
        }
    }

    /// Resolves `host` to textual addresses.
    ///
    /// A literal comes back unchanged (without brackets) and without any
    /// network I/O. `Ok` with an empty list means some server answered
    /// authoritatively that the name has no address; when no server answered
    /// at all the error is [`NetError::AllServersExhausted`].
    ///
    /// There is no overall deadline. Each attempt is bounded by the query
    /// timeout, so a call takes at most roughly
    /// `servers × record types × (max_retries + 1) × (query_timeout + backoff)`.
    pub async fn resolve(
        &self,
        host: &str,
        options: ResolveOptions,
    ) -> Result<Vec<String>, NetError> {
        let addresses = self.resolve_addresses(host, options).await?;
        Ok(addresses.iter().map(ToString::to_string).collect())
    }

    /// Like [`DnsResolver::resolve`] but returns typed addresses.
    pub async fn resolve_addresses(
        &self,
        host: &str,
        options: ResolveOptions,
    ) -> Result<Vec<ResolvedAddress>, NetError> {
        let name = match literal::classify(host)? {
            Classified::Literal(addr) => {
                tracing::trace!(host, "literal address, skipping resolution");
                return Ok(vec![addr]);
            }
            Classified::Hostname(host) => Name::new(host),
        };

        let _entry = self.entry.lock().await;

        let link = match options.network_hint {
            Some(link) => Some(link),
            None => self.active_link().await,
        };
        let capability = probe::capability(link.as_ref());
        tracing::debug!(domain = %name, ?capability, "resolving");

        let selector = ServerSelector::new(&self.config, &self.engine, &*self.reachability);
        let candidates = selector.select(link.as_ref(), capability).await;

        let cache = options.use_cache.then(|| self.cache());
        let resolution = self
            .engine
            .resolve(
                &name,
                &candidates,
                options.prefer_ipv4,
                cache.as_deref(),
                capability,
            )
            .await;

        if !resolution.addresses.is_empty() {
            return Ok(resolution.addresses);
        }
        if resolution.authoritative_negative {
            tracing::debug!(domain = %name, "name has no addresses");
            return Ok(Vec::new());
        }

        tracing::warn!(domain = %name, servers = resolution.servers_tried, "all servers failed");
        Err(NetError::AllServersExhausted {
            domain: name.as_str().to_owned(),
            attempted: resolution.servers_tried,
        })
    }

    /// Blocking form of [`DnsResolver::resolve`], driven on a background thread.
    pub fn resolve_blocking(
        &self,
        host: &str,
        options: ResolveOptions,
    ) -> Result<Vec<String>, NetError> {
        block_on_background(self.resolve(host, options))
    }

    /// Snapshot of the active network, taken on the blocking pool since
    /// monitors may open sockets and read resolver configuration files.
    async fn active_link(&self) -> Option<LinkProperties> {
        let network = Arc::clone(&self.network);
        let result = tokio::task::spawn_blocking(move || network.active_link()).await;

        match result {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(error = %e, "network snapshot task failed");
                None
            }
        }
    }
}

impl Resolve for DnsResolver {
    fn resolve<'a>(&'a self, name: Name, options: ResolveOptions) -> Resolving<'a> {
        Box::pin(async move {
            let host = name.as_str();
            self.resolve_addresses(host, options).await
        })
    }
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("cache", &self.cache())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DnsResolver`]; every collaborator has a default.
pub struct DnsResolverBuilder {
    config: ResolverConfig,
    network: Option<Arc<dyn NetworkMonitor>>,
    transport: Option<Arc<dyn DnsTransport>>,
    reachability: Option<Arc<dyn ReachabilityProbe>>,
    cache: Option<Arc<ResolutionCache>>,
}

impl DnsResolverBuilder {
    /// Source of link snapshots (default: [`SystemNetwork`]).
    pub fn network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// Wire transport (default: [`UdpTransport`]).
    pub fn transport(mut self, transport: Arc<dyn DnsTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reachability probe (default: [`TcpReachability`]).
    pub fn reachability(mut self, reachability: Arc<dyn ReachabilityProbe>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Cache shared with other resolvers (default: a private one).
    pub fn cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<DnsResolver, NetError> {
        self.config.validate()?;

        let config = self.config;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(UdpTransport::new()),
        };
        let engine = Engine::new(
            transport,
            config.retry_policy(),
            config.query_timeout,
            config.nat64_prefix,
            config.port,
        );
        let cache = self.cache.unwrap_or_else(|| {
            let cache = ResolutionCache::with_ttls(config.cache_ttl, config.negative_cache_ttl);
            Arc::new(cache)
        });
        let network = match self.network {
            Some(network) => network,
            None => Arc::new(SystemNetwork::new()),
        };
        let reachability = match self.reachability {
            Some(reachability) => reachability,
            None => Arc::new(TcpReachability),
        };

        Ok(DnsResolver {
            engine,
            network,
            reachability,
            cache: RwLock::new(cache),
            entry: Mutex::new(()),
            config,
        })
    }
}
