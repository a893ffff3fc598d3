//! DNS Resolution Module
//!
//! Turns a peer hostname into addresses that are usable on the current
//! network:
//! - Literal addresses short-circuit without any I/O
//! - Candidate servers: preferred, system (or private DNS), static fallback
//! - A/AAAA queries over UDP with TCP fallback, per-attempt timeout and
//!   exponential backoff
//! - NAT64 synthesis on IPv6-only networks
//! - A shared result cache
//! - An adapter for callback-based platform resolvers
//!
//! # Architecture
//!
//! The `Resolve` trait is the core abstraction. [`DnsResolver`] runs the
//! full server-selection pipeline; [`NativeResolver`] delegates to the
//! platform. Both can sit behind `Arc<dyn Resolve>`.
//!
//! # Example
//!
//! ```rust,ignore
//! use peerdns::config::ResolverConfig;
//! use peerdns::dns::{DnsResolver, ResolveOptions};
//!
//! let resolver = DnsResolver::new(ResolverConfig::default())?;
//! let addrs = resolver.resolve("vpn.example.com", ResolveOptions::new().prefer_ipv4(true)).await?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

pub mod cache;
pub mod engine;
mod hickory;
pub mod literal;
pub mod nat64;
pub mod native;
pub mod probe;
mod resolve;
mod resolver;
pub mod retry;
pub mod servers;
pub mod transport;

pub use cache::{CacheStats, ResolutionCache};
pub use engine::{Engine, Resolution};
pub use hickory::HickoryPlatform;
pub use native::{CancellationSignal, NativeResolver, PlatformDns, QueryCallback};
pub use probe::{
    LinkProperties, NetworkCapability, NetworkMonitor, PrivateDns, StaticNetwork, SystemNetwork,
};
pub use resolve::{
    AddressFamily, AddressRecord, Name, Resolve, ResolveOptions, ResolvedAddress, Resolving,
};
pub use resolver::{DnsResolver, DnsResolverBuilder};
pub use servers::{ReachabilityProbe, ServerCandidate, ServerOrigin, TcpReachability};
pub use transport::{DnsTransport, QueryOutcome, RecordType, UdpTransport};
