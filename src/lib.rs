//! # peerdns
//!
//! Hostname resolution for tunnel peer endpoints on mobile networks.
//!
//! `peerdns` turns a user-supplied endpoint host into addresses that are
//! usable on whatever network the device is on right now: IPv4-only,
//! IPv6-only behind NAT64, dual-stack, or a network whose system DNS is
//! only reachable over private (encrypted) DNS.
//!
//! ## Features
//!
//! - **Literal Short-Circuit**: IPv4/IPv6 literals never touch the network
//! - **Server Selection**: preferred server, system or private DNS, fallback
//! - **Retry/Backoff**: per-attempt timeout, exponential backoff from 1s
//! - **NAT64**: RFC 6052 synthesis on IPv6-only networks
//! - **Result Cache**: shared, with positive and negative lifetimes
//! - **Native Adapter**: callback-based platform resolvers behind the same trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use peerdns::config::ResolverConfig;
//! use peerdns::dns::{DnsResolver, ResolveOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = DnsResolver::new(ResolverConfig::default()).unwrap();
//!     let addrs = resolver
//!         .resolve("vpn.example.com", ResolveOptions::new())
//!         .await
//!         .unwrap();
//!     println!("Resolved: {:?}", addrs);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions and the blocking bridge
//! - [`config`] - Resolver configuration
//! - [`dns`] - Resolution pipeline and the native adapter
//! - [`endpoint`] - Peer endpoint parsing and resolution

pub mod base;
pub mod config;
pub mod dns;
pub mod endpoint;
