//! Literal address classification and hostname validation.
//!
//! Runs before any server selection: literal targets never trigger a network
//! query and malformed hostnames fail without one.

use super::resolve::ResolvedAddress;
use crate::base::neterror::NetError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum length of a presentation-format hostname, without the root dot.
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// Attempts to parse `host` as an IP literal.
///
/// Accepts strict dotted-quad IPv4 and every IPv6 textual form std parses
/// (full, `::`-compressed, IPv4-mapped), optionally wrapped in brackets and
/// optionally carrying a `%zone` suffix. Returns `None` for anything that
/// needs DNS.
pub fn parse_literal(host: &str) -> Option<ResolvedAddress> {
    let bracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']'));
    let inner = bracketed.unwrap_or(host);

    if bracketed.is_none() {
        if let Ok(v4) = inner.parse::<Ipv4Addr>() {
            return Some(ResolvedAddress::new(IpAddr::V4(v4)));
        }
    }

    match inner.split_once('%') {
        Some((addr, zone)) => {
            let v6 = addr.parse::<Ipv6Addr>().ok()?;
            if !is_valid_zone(zone) {
                return None;
            }
            Some(ResolvedAddress::scoped(v6, zone))
        }
        None => {
            let v6 = inner.parse::<Ipv6Addr>().ok()?;
            Some(ResolvedAddress::new(IpAddr::V6(v6)))
        }
    }
}

fn is_valid_zone(zone: &str) -> bool {
    let allowed = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_');
    !zone.is_empty() && zone.bytes().all(allowed)
}

/// Returns true if `host` is an IP literal.
pub fn is_literal(host: &str) -> bool {
    parse_literal(host).is_some()
}

/// Validates `host` as a DNS hostname.
///
/// A single trailing dot (fully-qualified form) is accepted. Underscores are
/// tolerated inside labels since some service names use them.
pub fn validate_hostname(host: &str) -> Result<(), NetError> {
    let trimmed = host.strip_suffix('.').unwrap_or(host);
    let invalid = |reason| Err(NetError::invalid_hostname(host, reason));
    let allowed = |b: u8| b.is_ascii_alphanumeric() || b == b'-' || b == b'_';

    if trimmed.is_empty() {
        return invalid("empty hostname");
    }
    if trimmed.len() > MAX_HOSTNAME_LEN {
        return invalid("hostname longer than 253 characters");
    }

    for label in trimmed.split('.') {
        if label.is_empty() {
            return invalid("empty label");
        }
        if label.len() > MAX_LABEL_LEN {
            return invalid("label longer than 63 characters");
        }
        if !label.bytes().all(allowed) {
            return invalid("invalid character in label");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return invalid("label starts or ends with a hyphen");
        }
    }

    Ok(())
}

/// Outcome of classifying user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Already an address; no lookup needed.
    Literal(ResolvedAddress),
    /// A syntactically valid name that needs DNS.
    Hostname(String),
}

/// Classifies raw input as a literal or a valid hostname.
pub fn classify(host: &str) -> Result<Classified, NetError> {
    let host = host.trim();
    if let Some(literal) = parse_literal(host) {
        return Ok(Classified::Literal(literal));
    }
    validate_hostname(host)?;
    Ok(Classified::Hostname(host.to_ascii_lowercase()))
}
