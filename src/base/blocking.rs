//! Blocking bridge for synchronous callers.
//!
//! Tunnel bring-up code typically runs on a plain worker thread. These helpers
//! drive a future to completion on a dedicated background thread that owns a
//! current-thread runtime, so they work whether or not the caller is itself
//! inside a tokio runtime.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::future::Future;

/// Runs `future` to completion on a fresh background thread.
pub fn block_on_background<F, T>(future: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>> + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("peerdns-blocking".into())
            .spawn_scoped(scope, move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .io_context("building background resolver runtime")?;
                runtime.block_on(future)
            })
            .io_context("spawning background resolver thread")?;

        worker.join().unwrap_or_else(|_| {
            tracing::error!("background resolver thread panicked");
            Err(NetError::QueryCancelled)
        })
    })
}
