//! Public address classification

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Parse an address as reported by the API. IPv4-mapped IPv6 addresses
/// come back as IPv4. Unparseable values are ignored by every caller.
pub fn parse(value: &str) -> Option<IpAddr> {
    value.trim().parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}

/// Globally routable IPv4: not RFC1918, loopback, link-local or unspecified
pub fn is_public_ipv4(ip: &Ipv4Addr) -> bool {
    !(ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified())
}

/// Globally routable IPv6: not loopback, unspecified, link-local
/// (`fe80::/10`), unique-local (`fc00::/7`) or multicast
pub fn is_public_ipv6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let link_local = (first & 0xffc0) == 0xfe80;
    let unique_local = (first & 0xfe00) == 0xfc00;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || link_local || unique_local)
}

/// Count of public addresses per family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicCounts {
    pub ipv4: u32,
    pub ipv6: u32,
}

/// Classify every address and count the public ones per family
pub fn count_public<'a>(addresses: impl IntoIterator<Item = &'a str>) -> PublicCounts {
    addresses
        .into_iter()
        .filter_map(parse)
        .fold(PublicCounts::default(), |mut counts, ip| {
            match ip {
                IpAddr::V4(v4) if is_public_ipv4(&v4) => counts.ipv4 += 1,
                IpAddr::V6(v6) if is_public_ipv6(&v6) => counts.ipv6 += 1,
                _ => {}
            }
            counts
        })
}
