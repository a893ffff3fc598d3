//! Resolution through the platform's asynchronous resolver.
//!
//! The platform API is callback based: a query is started with a
//! cancellation signal and a completion callback. [`NativeResolver`] turns
//! that into a future, admits one query at a time and cancels the platform
//! query when the caller stops waiting.

use super::literal::{self, Classified};
use super::resolve::{Name, Resolve, ResolveOptions, ResolvedAddress, Resolving};
use crate::base::blocking::block_on_background;
use crate::base::neterror::NetError;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Semaphore};

/// DNS response code for NXDOMAIN.
pub const RCODE_NXDOMAIN: u16 = 3;

type CancelListener = Box<dyn FnOnce() + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot cancellation flag shared with the platform query.
#[derive(Default)]
pub struct CancellationSignal {
    cancelled: AtomicBool,
    listener: Mutex<Option<CancelListener>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the query. Only the first call has an effect; it runs the
    /// registered listener and returns `true`.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener();
        }
        true
    }

    /// Registers the function releasing platform resources. Runs it right
    /// away when the signal is already cancelled.
    pub fn on_cancel(&self, listener: impl FnOnce() + Send + 'static) {
        let mut slot = lock(&self.listener);
        if self.is_cancelled() {
            drop(slot);
            listener();
        } else {
            *slot = Some(Box::new(listener));
        }
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// What the platform reported for one query.
#[derive(Debug)]
pub enum PlatformAnswer {
    /// Addresses in platform order plus the DNS response code.
    Answer { addresses: Vec<IpAddr>, rcode: u16 },
    Error(io::Error),
}

/// Completion handle passed to the platform. Clones share state; the first
/// completion wins and later ones are ignored.
#[derive(Clone)]
pub struct QueryCallback {
    inner: Arc<CallbackInner>,
}

struct CallbackInner {
    completed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<PlatformAnswer>>>,
    signal: Arc<CancellationSignal>,
}

impl QueryCallback {
    fn new(signal: Arc<CancellationSignal>) -> (Self, oneshot::Receiver<PlatformAnswer>) {
        let (tx, rx) = oneshot::channel();
        let inner = CallbackInner {
            completed: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
            signal,
        };
        let callback = Self {
            inner: Arc::new(inner),
        };
        (callback, rx)
    }

    pub fn on_answer(&self, addresses: Vec<IpAddr>, rcode: u16) {
        self.complete(PlatformAnswer::Answer { addresses, rcode });
    }

    pub fn on_error(&self, error: io::Error) {
        self.complete(PlatformAnswer::Error(error));
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    fn complete(&self, answer: PlatformAnswer) {
        if self.inner.completed.swap(true, Ordering::AcqRel) {
            tracing::trace!(?answer, "ignoring late platform completion");
            return;
        }
        if let Some(sender) = lock(&self.inner.sender).take() {
            // The waiter may already be gone.
            let _ = sender.send(answer);
        }
        self.inner.signal.cancel();
    }
}

impl std::fmt::Debug for QueryCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCallback")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// The platform's callback-based resolver.
///
/// Implementations must eventually call `callback` exactly once unless
/// `signal` is cancelled first, and should stop work when it is.
pub trait PlatformDns: Send + Sync {
    fn query(&self, host: &str, signal: Arc<CancellationSignal>, callback: QueryCallback);
}

impl<P: PlatformDns + ?Sized> PlatformDns for Arc<P> {
    fn query(&self, host: &str, signal: Arc<CancellationSignal>, callback: QueryCallback) {
        (**self).query(host, signal, callback)
    }
}

/// Cancels the platform query if the waiting future is dropped.
struct CancelOnDrop(Arc<CancellationSignal>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.0.cancel() {
            tracing::debug!("platform DNS query abandoned");
        }
    }
}

/// Resolver adapter over a [`PlatformDns`].
///
/// At most one platform query is in flight per adapter; further callers wait
/// their turn.
pub struct NativeResolver {
    platform: Arc<dyn PlatformDns>,
    in_flight: Semaphore,
}

impl NativeResolver {
    pub fn new(platform: impl PlatformDns + 'static) -> Self {
        Self::with_platform(Arc::new(platform))
    }

    pub fn with_platform(platform: Arc<dyn PlatformDns>) -> Self {
        Self {
            platform,
            in_flight: Semaphore::new(1),
        }
    }

    /// Resolves `host`, applying the address family preference to the
    /// platform's mixed answer.
    ///
    /// NXDOMAIN yields an empty list. Other error response codes and
    /// platform failures are errors.
    pub async fn resolve(
        &self,
        host: &str,
        prefer_ipv4: bool,
    ) -> Result<Vec<ResolvedAddress>, NetError> {
        let host = match literal::classify(host)? {
            Classified::Literal(addr) => return Ok(vec![addr]),
            Classified::Hostname(host) => host,
        };

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| NetError::QueryCancelled)?;

        let signal = Arc::new(CancellationSignal::new());
        let _guard = CancelOnDrop(Arc::clone(&signal));
        let (callback, answer) = QueryCallback::new(Arc::clone(&signal));

        tracing::debug!(domain = %host, "resolving via platform DNS");
        self.platform.query(&host, signal, callback);

        match answer.await.map_err(|_| NetError::QueryCancelled)? {
            PlatformAnswer::Answer { addresses, rcode } => match rcode {
                0 => {
                    let addresses = select_family(addresses, prefer_ipv4);
                    tracing::debug!(domain = %host, count = addresses.len(), "platform answered");
                    Ok(addresses.into_iter().map(ResolvedAddress::new).collect())
                }
                RCODE_NXDOMAIN => {
                    tracing::debug!(domain = %host, "platform DNS: no such name");
                    Ok(Vec::new())
                }
                rcode => Err(NetError::ServerError {
                    server: "platform".into(),
                    detail: format!("response code {rcode} for {host}"),
                }),
            },
            PlatformAnswer::Error(e) => Err(NetError::io(format!("platform query for {host}"), e)),
        }
    }

    /// Blocking form of [`NativeResolver::resolve`] for synchronous callers.
    pub fn resolve_blocking(
        &self,
        host: &str,
        prefer_ipv4: bool,
    ) -> Result<Vec<ResolvedAddress>, NetError> {
        block_on_background(self.resolve(host, prefer_ipv4))
    }
}

impl Resolve for NativeResolver {
    fn resolve<'a>(&'a self, name: Name, options: ResolveOptions) -> Resolving<'a> {
        Box::pin(async move {
            NativeResolver::resolve(self, name.as_str(), options.prefer_ipv4).await
        })
    }
}

impl std::fmt::Debug for NativeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResolver")
            .field("idle", &(self.in_flight.available_permits() == 1))
            .finish_non_exhaustive()
    }
}

/// With `prefer_ipv4` the IPv4 addresses if there are any, else the IPv6
/// ones; otherwise the reverse.
pub fn select_family(addresses: Vec<IpAddr>, prefer_ipv4: bool) -> Vec<IpAddr> {
    let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) = addresses.into_iter().partition(IpAddr::is_ipv4);
    let (preferred, other) = if prefer_ipv4 { (v4, v6) } else { (v6, v4) };
    if preferred.is_empty() {
        other
    } else {
        preferred
    }
}
