//! Public URL resolution.

use http::uri::{Authority, Uri};
use std::net::IpAddr;

/// Replace a loopback host in `url` by the host name of the current request.
///
/// Only the host name changes: scheme, port, path and query of `url` are kept. The URL is
/// returned unchanged when it is not a loopback URL, cannot be parsed, or no request host
/// is known.
pub fn substitute_loopback_host(url: &str, request_host: Option<&str>) -> String {
    let Some(request_host) = request_host.map(str::trim).filter(|h| !h.is_empty()) else {
        return url.to_string();
    };
    let Ok(uri) = url.parse::<Uri>() else {
        return url.to_string();
    };
    let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
        return url.to_string();
    };
    if !is_loopback_host(authority.host()) {
        return url.to_string();
    }
    let Ok(request_authority) = request_host.parse::<Authority>() else {
        return url.to_string();
    };

    let mut rebuilt = format!("{}://{}", scheme, request_authority.host());
    if let Some(port) = authority.port_u16() {
        rebuilt.push_str(&format!(":{}", port));
    }
    if let Some(path_and_query) = uri.path_and_query() {
        rebuilt.push_str(path_and_query.as_str());
    }
    rebuilt
}

/// `localhost`, `127.0.0.0/8`, `::1` or `0.0.0.0`.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback() || ip.is_unspecified())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_replaced_port_kept() {
        assert_eq!(
            substitute_loopback_host(
                "http://localhost:9000/videos/abc/hls/master.m3u8",
                Some("media.example.com:8080")
            ),
            "http://media.example.com:9000/videos/abc/hls/master.m3u8"
        );
    }

    #[test]
    fn test_all_loopback_forms_detected() {
        for host in ["localhost", "127.0.0.1", "127.4.5.6", "[::1]", "0.0.0.0"] {
            assert!(is_loopback_host(host), "{} should be loopback", host);
        }
        assert!(!is_loopback_host("cdn.example.com"));
        assert!(!is_loopback_host("10.0.0.1"));
    }

    #[test]
    fn test_ipv6_loopback_url() {
        assert_eq!(
            substitute_loopback_host("http://[::1]:9000/bucket/key", Some("example.org")),
            "http://example.org:9000/bucket/key"
        );
    }

    #[test]
    fn test_public_host_unchanged() {
        let url = "https://bucket.s3.eu-west-1.amazonaws.com/videos/a/thumbnail.jpg";
        assert_eq!(substitute_loopback_host(url, Some("example.org")), url);
    }

    #[test]
    fn test_without_request_host_unchanged() {
        let url = "http://127.0.0.1:9000/bucket/key";
        assert_eq!(substitute_loopback_host(url, None), url);
        assert_eq!(substitute_loopback_host(url, Some("  ")), url);
    }
}
