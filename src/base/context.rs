//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into context-rich `NetError` variants.

use crate::base::neterror::NetError;
use std::{io, net::SocketAddr};

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Attach the DNS server the failing operation talked to.
    ///
    /// Timeouts become [`NetError::ServerTimeout`], everything else
    /// [`NetError::ServerError`], so the retry loop can classify them.
    ///
    /// # Example
    /// ```ignore
    /// use peerdns::base::context::IoResultExt;
    ///
    /// socket.send(&query).await.server_context(server)?;
    /// // Error: "DNS server 1.1.1.1:53 failed: network unreachable"
    /// ```
    fn server_context(self, server: SocketAddr) -> Result<T, NetError>;

    /// Attach a free-form description of what was being attempted.
    fn io_context(self, what: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn server_context(self, server: SocketAddr) -> Result<T, NetError> {
        self.map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => NetError::ServerTimeout {
                server: server.to_string(),
            },
            _ => NetError::ServerError {
                server: server.to_string(),
                detail: e.to_string(),
            },
        })
    }

    fn io_context(self, what: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::io(what, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_server_context_timeout() {
        let server: SocketAddr = "1.1.1.1:53".parse().unwrap();
        let result: Result<(), io::Error> = Err(Error::new(ErrorKind::TimedOut, "slow"));
        let err = result.server_context(server).unwrap_err();

        match err {
            NetError::ServerTimeout { server } => assert_eq!(server, "1.1.1.1:53"),
            other => panic!("Expected ServerTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_server_context_other() {
        let server: SocketAddr = "[2606:4700:4700::1111]:53".parse().unwrap();
        let result: Result<(), io::Error> =
            Err(Error::new(ErrorKind::ConnectionRefused, "refused"));
        let err = result.server_context(server).unwrap_err();

        match err {
            NetError::ServerError { server, detail } => {
                assert_eq!(server, "[2606:4700:4700::1111]:53");
                assert!(detail.contains("refused"));
            }
            other => panic!("Expected ServerError, got {:?}", other),
        }
    }

    #[test]
    fn test_io_context() {
        let result: Result<(), io::Error> = Err(Error::new(ErrorKind::NotFound, "missing"));
        let err = result.io_context("reading resolver config").unwrap_err();

        assert!(matches!(err, NetError::Io { .. }));
        assert!(err.to_string().starts_with("reading resolver config"));
    }
}
