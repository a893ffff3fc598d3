//! NAT64 address synthesis (RFC 6052, /96 prefixes only).
//!
//! Used when the active path is IPv6-only and the name has no AAAA record:
//! the synthetic address routes through the network's NAT64 gateway to the
//! IPv4-only destination.

use super::resolve::{AddressRecord, ResolvedAddress};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The well-known NAT64 prefix `64:ff9b::/96`.
pub const WELL_KNOWN_PREFIX: Ipv6Addr = Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0);

/// Embeds `v4` into the low 32 bits of `prefix`.
///
/// Only the first 12 bytes of `prefix` are used; its low 32 bits are ignored.
pub fn synthesize(prefix: Ipv6Addr, v4: Ipv4Addr) -> Ipv6Addr {
    let mut octets = prefix.octets();
    octets[12..].copy_from_slice(&v4.octets());
    Ipv6Addr::from(octets)
}

/// Synthesizes one IPv6 address per A record, preserving answer order.
///
/// AAAA records in `records` are skipped. No A records means no addresses.
pub fn synthesize_all(prefix: Ipv6Addr, records: &[AddressRecord]) -> Vec<ResolvedAddress> {
    records
        .iter()
        .filter_map(|record| match *record {
            AddressRecord::V4(v4) => Some(ResolvedAddress::synthesized(synthesize(prefix, v4))),
            AddressRecord::V6(_) => None,
        })
        .collect()
}
