/// Client address resolution
///
/// Behind a reverse proxy the socket peer is the proxy, not the client. Each
/// trusted proxy appends the address it received the request from to
/// `X-Forwarded-For`, so the chain is read right to left:
///
/// ```text
/// addresses = [socket peer, XFF[n-1], XFF[n-2], ..., XFF[0]]
/// client    = addresses[min(trusted_hops, addresses.len() - 1)]
/// ```
///
/// With `trusted_hops = 0` the header is ignored entirely. Entries left of the
/// trusted hops are client-controlled and never used. An entry that is not a
/// valid IP address ends the walk at the last address that was trusted.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Header carrying the proxy chain
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolves the client address for a request
pub fn resolve_client_ip(peer: IpAddr, headers: &HeaderMap, trusted_hops: usize) -> IpAddr {
    let mut client = peer;
    if trusted_hops == 0 {
        return client;
    }

    // Split raw bytes so one non-ASCII entry cannot hide the hops appended after it
    let forwarded = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .flat_map(|value| value.as_bytes().split(|&b| b == b','))
        .map(<[u8]>::trim_ascii)
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>();

    for entry in forwarded.iter().rev().take(trusted_hops) {
        match parse_forwarded_entry(entry) {
            Some(ip) => client = ip,
            None => break,
        }
    }

    client
}

/// Parses an `X-Forwarded-For` entry, tolerating an attached port
fn parse_forwarded_entry(entry: &[u8]) -> Option<IpAddr> {
    let entry = std::str::from_utf8(entry).ok()?;
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .map(canonical)
}

/// Maps IPv4-mapped IPv6 addresses to plain IPv4 so both spellings share a bucket
pub fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn headers(xff: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in xff {
            headers.append(X_FORWARDED_FOR, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_no_header_uses_peer() {
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &HeaderMap::new(), 1), ip("10.0.0.1"));
    }

    #[test]
    fn test_zero_hops_ignores_header() {
        let h = headers(&["203.0.113.9"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 0), ip("10.0.0.1"));
    }

    #[test]
    fn test_one_hop_takes_rightmost_entry() {
        // The leftmost entry is client-supplied and must not be trusted
        let h = headers(&["6.6.6.6, 203.0.113.9"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 1), ip("203.0.113.9"));
    }

    #[test]
    fn test_two_hops() {
        let h = headers(&["6.6.6.6, 203.0.113.9", "172.16.0.2"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 2), ip("203.0.113.9"));
    }

    #[test]
    fn test_hops_beyond_chain_stop_at_leftmost() {
        let h = headers(&["203.0.113.9"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 5), ip("203.0.113.9"));
    }

    #[test]
    fn test_invalid_entry_stops_walk() {
        let h = headers(&["203.0.113.9, garbage"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 2), ip("10.0.0.1"));
    }

    #[test]
    fn test_non_ascii_entry_keeps_trusted_hops() {
        let mut h = HeaderMap::new();
        h.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_bytes(b"\xe9vil, 198.51.100.9").unwrap(),
        );
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 1), ip("198.51.100.9"));
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 2), ip("198.51.100.9"));
    }

    #[test]
    fn test_entry_with_port_and_mapped_v6() {
        let h = headers(&["203.0.113.9:4711"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 1), ip("203.0.113.9"));

        let h = headers(&["::ffff:198.51.100.4"]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, 1), ip("198.51.100.4"));
    }
}
