//! Client source address extraction for address-keyed gates.
//!
//! # Resolution Order
//!
//! 1. No socket peer (`ConnectInfo<SocketAddr>` absent): [`UNKNOWN_IP`]
//! 2. Peer outside `TRUSTED_PROXIES`, or no ranges configured: the peer itself.
//!    Forwarding headers are ignored.
//! 3. Trusted peer with `X-Forwarded-For`: walk the list from the right,
//!    skipping trusted proxy hops; the first other address is the client
//! 4. Trusted peer with `X-Real-IP`: that address
//! 5. Otherwise the peer
//!
//! Entries left of the first untrusted hop were written by the client and are
//! never used as a key.
//!
//! All requests without a socket peer share the `"unknown"` key and are
//! therefore limited collectively.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback key when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is treated as a /32 or /128. Returns `None` if the
    /// format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let ip: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Networks whose forwarding headers are believed.
///
/// Empty means no proxy is trusted and every key is the socket peer.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    /// Whether any ranges are configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `addr` is one of our proxies. Always `false` with no ranges.
    pub fn is_trusted(&self, addr: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
    }
}

// =============================================================================
// Extraction
// =============================================================================

#[inline]
fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Client address from `X-Forwarded-For`, read right to left.
///
/// Trusted hops are skipped. An entry that is not an address ends the walk
/// with `None`, since nothing to its left can be vouched for.
fn client_from_xff(value: &str, trusted: &TrustedProxyConfig) -> Option<IpAddr> {
    let mut last_hop = None;

    for entry in value.rsplit(',') {
        let addr: IpAddr = entry.trim().parse().ok()?;
        if !trusted.is_trusted(&addr) {
            return Some(addr);
        }
        last_hop = Some(addr);
    }

    // Every hop is ours; the leftmost is as far back as the chain goes
    last_hop
}

/// Address reported by the trusted proxy in front of us, if any.
fn forwarded_ip<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        return forwarded
            .to_str()
            .ok()
            .and_then(|value| client_from_xff(value, trusted));
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Resolve the client source address used as an anonymous rate-limit key.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` without allocating when there is no
/// socket peer.
pub fn extract_client_ip<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let Some(peer) = peer_ip(req) else {
        return Cow::Borrowed(UNKNOWN_IP);
    };

    if !trusted.is_trusted(&peer) {
        return Cow::Owned(peer.to_string());
    }

    match forwarded_ip(req, trusted) {
        Some(client) => Cow::Owned(client.to_string()),
        None => {
            if req.headers().contains_key("x-forwarded-for") {
                warn!(peer = %peer, "Unparseable X-Forwarded-For from trusted proxy");
            }
            Cow::Owned(peer.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    fn behind_proxy() -> TrustedProxyConfig {
        TrustedProxyConfig::new(&["10.0.0.0/8".to_string()])
    }

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(Body::empty()).unwrap();
        match peer {
            Some(peer) => with_peer(req, peer),
            None => req,
        }
    }

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let any = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(any.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config() {
        let config = TrustedProxyConfig::new(&["10.0.0.0/8".to_string(), "bogus".to_string()]);
        assert!(config.is_enabled());
        assert!(config.is_trusted(&"10.1.2.3".parse().unwrap()));
        assert!(!config.is_trusted(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_no_ranges_trusts_nobody() {
        let config = TrustedProxyConfig::default();
        assert!(!config.is_enabled());
        assert!(!config.is_trusted(&"10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn test_no_ranges_ignores_forwarding_headers() {
        let req = request(
            &[("x-forwarded-for", "1.2.3.4"), ("x-real-ip", "5.6.7.8")],
            Some("203.0.113.5:40000"),
        );
        assert_eq!(
            extract_client_ip(&req, &TrustedProxyConfig::default()),
            "203.0.113.5"
        );
    }

    #[test]
    fn test_rotating_xff_from_one_peer_keeps_one_key() {
        let keys: std::collections::HashSet<_> = (0..20)
            .map(|i| {
                let spoofed = format!("198.18.0.{i}");
                let req = request(&[("x-forwarded-for", spoofed.as_str())], Some("203.0.113.5:40000"));
                extract_client_ip(&req, &TrustedProxyConfig::default()).into_owned()
            })
            .collect();

        assert_eq!(keys.len(), 1);
        assert!(keys.contains("203.0.113.5"));
    }

    #[test]
    fn test_xff_rightmost_untrusted_entry() {
        // client-written entry, real client, our inner proxy
        let req = request(
            &[("x-forwarded-for", "6.6.6.6, 203.0.113.50 , 10.0.0.9")],
            Some("10.0.0.2:443"),
        );
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "203.0.113.50");
    }

    #[test]
    fn test_spoofed_leftmost_entry_is_ignored() {
        let proxy = behind_proxy();
        let first = request(&[("x-forwarded-for", "1.1.1.1, 198.51.100.7")], Some("10.0.0.2:443"));
        let second = request(&[("x-forwarded-for", "2.2.2.2, 198.51.100.7")], Some("10.0.0.2:443"));

        assert_eq!(extract_client_ip(&first, &proxy), "198.51.100.7");
        assert_eq!(extract_client_ip(&second, &proxy), "198.51.100.7");
    }

    #[test]
    fn test_xff_all_trusted_uses_leftmost_hop() {
        let req = request(&[("x-forwarded-for", "10.0.0.7, 10.0.0.9")], Some("10.0.0.2:443"));
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "10.0.0.7");
    }

    #[test]
    fn test_xff_garbage_falls_back_to_peer() {
        let req = request(&[("x-forwarded-for", "not-an-ip")], Some("10.0.0.2:443"));
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "10.0.0.2");
    }

    #[test]
    fn test_real_ip_from_trusted_proxy() {
        let req = request(&[("x-real-ip", " 2001:db8::1 ")], Some("10.0.0.2:443"));
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "2001:db8::1");
    }

    #[test]
    fn test_xff_priority_over_real_ip() {
        let req = request(
            &[("x-forwarded-for", "192.0.2.1"), ("x-real-ip", "192.0.2.2")],
            Some("10.0.0.2:443"),
        );
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "192.0.2.1");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let req = request(&[("x-forwarded-for", "1.2.3.4")], Some("198.51.100.7:5555"));
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "198.51.100.7");
    }

    #[test]
    fn test_peer_address_without_headers() {
        let req = request(&[], Some("10.0.0.2:443"));
        assert_eq!(extract_client_ip(&req, &behind_proxy()), "10.0.0.2");
    }

    #[test]
    fn test_no_peer_is_unknown_even_with_headers() {
        let req = request(&[("x-forwarded-for", "1.2.3.4")], None);

        let ip = extract_client_ip(&req, &behind_proxy());
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }
}
