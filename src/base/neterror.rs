use std::{io, sync::Arc};
use thiserror::Error;

/// Errors produced by hostname resolution.
///
/// Codes returned by [`NetError::as_i32`] follow Chromium's `net_error_list.h`
/// where an equivalent exists (`ERR_NAME_NOT_RESOLVED`, `ERR_DNS_TIMED_OUT`, ...)
/// so binding layers can pass them through unchanged.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("Invalid hostname {hostname:?}: {reason}")]
    InvalidHostname {
        hostname: String,
        reason: &'static str,
    },

    #[error("Name not found: {domain}")]
    NameNotFound { domain: String },

    #[error("DNS server {server} timed out")]
    ServerTimeout { server: String },

    #[error("DNS server {server} failed: {detail}")]
    ServerError { server: String, detail: String },

    #[error("Malformed DNS response from {server}: {detail}")]
    MalformedResponse { server: String, detail: String },

    #[error("No DNS server produced an address for {domain} ({attempted} servers tried)")]
    AllServersExhausted { domain: String, attempted: usize },

    #[error("Private DNS host {hostname} could not be resolved")]
    PrivateDnsResolutionFailed { hostname: String },

    #[error("DNS query cancelled")]
    QueryCancelled,

    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid resolver configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("DNS resolution failed for peer endpoint {host}")]
    DnsResolutionFailure { host: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: Arc<io::Error>,
    },
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::InvalidHostname { .. } => -108,
            NetError::NameNotFound { .. } => -105,
            NetError::ServerTimeout { .. } => -803,
            NetError::ServerError { .. } => -802,
            NetError::MalformedResponse { .. } => -800,
            NetError::AllServersExhausted { .. } => -137,
            NetError::PrivateDnsResolutionFailed { .. } => -808,
            NetError::QueryCancelled => -810,
            NetError::InvalidEndpoint { .. } => -300,
            NetError::DnsResolutionFailure { .. } => -10001,
            NetError::InvalidConfig { .. } => -10002,
            NetError::Io { .. } => -104,
        }
    }

    /// Whether another attempt against the same server may succeed.
    ///
    /// Authoritative answers and caller mistakes are final; transport and
    /// server-side failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetError::ServerTimeout { .. }
                | NetError::ServerError { .. }
                | NetError::MalformedResponse { .. }
                | NetError::Io { .. }
        )
    }

    pub(crate) fn invalid_hostname(hostname: &str, reason: &'static str) -> Self {
        NetError::InvalidHostname {
            hostname: hostname.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        NetError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        NetError::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }
}
