//! Native Resolver Adapter Tests
//!
//! Covers `NativeResolver` over a scripted `PlatformDns`:
//! - Literal short-circuit
//! - Family preference and response code mapping
//! - One platform query in flight at a time
//! - Cancellation when the caller stops waiting
//! - Blocking form

use peerdns::base::neterror::NetError;
use peerdns::dns::{
    CancellationSignal, Name, NativeResolver, PlatformDns, QueryCallback, Resolve,
    ResolveOptions,
};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Answer(Vec<IpAddr>, u16),
    Fail,
    /// Answers, then reports an error that must be ignored.
    Twice(Vec<IpAddr>),
    /// Keeps the callback and never completes it.
    Hold,
    /// Drops the callback without completing it.
    Drop,
}

#[derive(Default)]
struct FakePlatform {
    replies: HashMap<String, Reply>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    cancels: Arc<AtomicUsize>,
    held: Mutex<Vec<QueryCallback>>,
}

impl FakePlatform {
    fn new() -> Self {
        Self::default()
    }

    fn reply(mut self, host: &str, reply: Reply) -> Self {
        self.replies.insert(host.to_string(), reply);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl PlatformDns for FakePlatform {
    fn query(&self, host: &str, signal: Arc<CancellationSignal>, callback: QueryCallback) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let in_flight = Arc::clone(&self.in_flight);
        let cancels = Arc::clone(&self.cancels);
        signal.on_cancel(move || {
            in_flight.fetch_sub(1, Ordering::SeqCst);
            cancels.fetch_add(1, Ordering::SeqCst);
        });

        let reply = self
            .replies
            .get(host)
            .cloned()
            .unwrap_or(Reply::Answer(Vec::new(), 3));
        if let Reply::Hold = reply {
            self.held.lock().unwrap().push(callback);
            return;
        }

        let deliver = move || match reply {
            Reply::Answer(addresses, rcode) => callback.on_answer(addresses, rcode),
            Reply::Fail => callback.on_error(io::Error::other("socket closed")),
            Reply::Twice(addresses) => {
                callback.on_answer(addresses, 0);
                callback.on_error(io::Error::other("late"));
            }
            Reply::Hold | Reply::Drop => drop(callback),
        };

        if self.delay.is_zero() {
            deliver();
        } else {
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                deliver();
            });
        }
    }
}

fn ips(list: &[&str]) -> Vec<IpAddr> {
    list.iter().map(|s| s.parse().unwrap()).collect()
}

fn strings(addrs: &[peerdns::dns::ResolvedAddress]) -> Vec<String> {
    addrs.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_literal_short_circuit() {
    let platform = Arc::new(FakePlatform::new());
    let resolver = NativeResolver::with_platform(platform.clone());

    let addrs = resolver.resolve("[2001:db8::2]", false).await.unwrap();

    assert_eq!(strings(&addrs), vec!["2001:db8::2"]);
    assert_eq!(platform.calls(), 0);
}

#[tokio::test]
async fn test_family_preference() {
    let mixed = ips(&["192.0.2.1", "2001:db8::1", "192.0.2.2"]);
    let platform = Arc::new(
        FakePlatform::new()
            .reply("mixed.test", Reply::Answer(mixed, 0))
            .reply("v4.test", Reply::Answer(ips(&["192.0.2.9"]), 0)),
    );
    let resolver = NativeResolver::with_platform(platform.clone());

    let v4 = resolver.resolve("mixed.test", true).await.unwrap();
    let v6 = resolver.resolve("mixed.test", false).await.unwrap();
    let only_v4 = resolver.resolve("v4.test", false).await.unwrap();

    assert_eq!(strings(&v4), vec!["192.0.2.1", "192.0.2.2"]);
    assert_eq!(strings(&v6), vec!["2001:db8::1"]);
    assert_eq!(strings(&only_v4), vec!["192.0.2.9"]);
}

#[tokio::test]
async fn test_response_codes() {
    let platform = Arc::new(
        FakePlatform::new()
            .reply("nx.test", Reply::Answer(Vec::new(), 3))
            .reply("servfail.test", Reply::Answer(Vec::new(), 2))
            .reply("broken.test", Reply::Fail),
    );
    let resolver = NativeResolver::with_platform(platform);

    assert!(resolver.resolve("nx.test", false).await.unwrap().is_empty());

    let err = resolver.resolve("servfail.test", false).await.unwrap_err();
    assert!(matches!(err, NetError::ServerError { .. }), "{err:?}");

    let err = resolver.resolve("broken.test", false).await.unwrap_err();
    assert!(matches!(err, NetError::Io { .. }), "{err:?}");
    assert_eq!(err.as_i32(), -104);
}

#[tokio::test]
async fn test_first_completion_wins() {
    let platform = Arc::new(
        FakePlatform::new().reply("twice.test", Reply::Twice(ips(&["192.0.2.5"]))),
    );
    let resolver = NativeResolver::with_platform(platform.clone());

    let addrs = resolver.resolve("twice.test", true).await.unwrap();

    assert_eq!(strings(&addrs), vec!["192.0.2.5"]);
    assert_eq!(platform.cancels(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_one_query_in_flight() {
    let platform = Arc::new(
        FakePlatform::new()
            .reply("a.test", Reply::Answer(ips(&["192.0.2.1"]), 0))
            .reply("b.test", Reply::Answer(ips(&["192.0.2.2"]), 0))
            .reply("c.test", Reply::Answer(ips(&["192.0.2.3"]), 0))
            .delayed(Duration::from_millis(100)),
    );
    let resolver = NativeResolver::with_platform(platform.clone());

    let (a, b, c) = tokio::join!(
        resolver.resolve("a.test", true),
        resolver.resolve("b.test", true),
        resolver.resolve("c.test", true),
    );

    assert_eq!(strings(&a.unwrap()), vec!["192.0.2.1"]);
    assert_eq!(strings(&b.unwrap()), vec!["192.0.2.2"]);
    assert_eq!(strings(&c.unwrap()), vec!["192.0.2.3"]);
    assert_eq!(platform.calls(), 3);
    assert_eq!(platform.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(platform.cancels(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_query_is_cancelled_once() {
    let platform = Arc::new(
        FakePlatform::new()
            .reply("stuck.test", Reply::Hold)
            .reply("next.test", Reply::Answer(ips(&["192.0.2.8"]), 0)),
    );
    let resolver = NativeResolver::with_platform(platform.clone());

    let query = resolver.resolve("stuck.test", false);
    let abandoned = tokio::time::timeout(Duration::from_secs(1), query).await;
    assert!(abandoned.is_err());
    assert_eq!(platform.cancels(), 1);

    // A completion arriving after the caller left changes nothing.
    let held = platform.held.lock().unwrap().pop().unwrap();
    held.on_answer(ips(&["192.0.2.1"]), 0);
    assert_eq!(platform.cancels(), 1);

    // The in-flight slot was released.
    let addrs = resolver.resolve("next.test", false).await.unwrap();
    assert_eq!(strings(&addrs), vec!["192.0.2.8"]);
}

#[tokio::test]
async fn test_dropped_callback_is_cancellation() {
    let platform = Arc::new(FakePlatform::new().reply("gone.test", Reply::Drop));
    let resolver = NativeResolver::with_platform(platform);

    let err = resolver.resolve("gone.test", false).await.unwrap_err();
    assert!(matches!(err, NetError::QueryCancelled));
}

#[tokio::test]
async fn test_invalid_hostname() {
    let platform = Arc::new(FakePlatform::new());
    let resolver = NativeResolver::with_platform(platform.clone());

    let err = resolver.resolve("bad host", false).await.unwrap_err();
    assert!(matches!(err, NetError::InvalidHostname { .. }));
    assert_eq!(platform.calls(), 0);
}

#[tokio::test]
async fn test_behind_resolve_trait() {
    let reply = Reply::Answer(ips(&["192.0.2.4"]), 0);
    let platform = Arc::new(FakePlatform::new().reply("peer.test", reply));
    let resolver: Arc<dyn Resolve> = Arc::new(NativeResolver::with_platform(platform));

    let options = ResolveOptions::new().prefer_ipv4(true);
    let addrs = resolver
        .resolve(Name::new("peer.test"), options)
        .await
        .unwrap();
    assert_eq!(strings(&addrs), vec!["192.0.2.4"]);
}

#[test]
fn test_resolve_blocking() {
    let reply = Reply::Answer(ips(&["2001:db8::3"]), 0);
    let platform = Arc::new(FakePlatform::new().reply("sync.test", reply));
    let resolver = NativeResolver::with_platform(platform);

    let addrs = resolver.resolve_blocking("sync.test", false).unwrap();
    assert_eq!(strings(&addrs), vec!["2001:db8::3"]);
}

#[test]
fn test_resolve_blocking_with_runtime_work() {
    let platform = Arc::new(
        FakePlatform::new()
            .reply("later.test", Reply::Answer(ips(&["192.0.2.6"]), 0))
            .delayed(Duration::from_millis(10)),
    );
    let resolver = NativeResolver::with_platform(platform);

    let addrs = resolver.resolve_blocking("later.test", true).unwrap();
    assert_eq!(strings(&addrs), vec!["192.0.2.6"]);
}
