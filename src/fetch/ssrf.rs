//! SSRF protection: every outbound article fetch validates its URL first so
//! the service can never be steered at internal networks or cloud metadata
//! endpoints.

use std::net::IpAddr;

use url::Url;

use crate::app::{EstuaryError, Result};

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata",
    "metadata.google.internal",
    "kubernetes.default",
    "kubernetes.default.svc",
];

const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// Check an address against private, loopback, link-local, unique-local,
/// broadcast, and documentation ranges.
pub fn is_ip_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || octets[0] == 0
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                // Unique local fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().map(IpAddr::V4).is_some_and(is_ip_blocked)
        }
    }
}

/// Validate a URL before fetching. Scheme must be http(s); the hostname must
/// not be a blocked literal, a blocked suffix, or resolve to a blocked
/// address. DNS failure is tolerated since the fetch will fail on its own.
pub async fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(EstuaryError::Ssrf(format!(
            "scheme '{}' is not allowed, use http or https",
            scheme
        )));
    }

    let Some(host) = url.host_str() else {
        return Err(EstuaryError::Ssrf("URL must include a hostname".into()));
    };
    let host = host.trim_matches(['[', ']']).to_lowercase();

    if BLOCKED_HOSTNAMES.contains(&host.as_str()) {
        return Err(EstuaryError::Ssrf(format!(
            "access to '{}' is not allowed",
            host
        )));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_ip_blocked(ip) {
            return Err(EstuaryError::Ssrf(format!(
                "access to IP address '{}' is not allowed",
                ip
            )));
        }
        return Ok(url);
    }

    for suffix in BLOCKED_SUFFIXES {
        if host.ends_with(suffix) {
            return Err(EstuaryError::Ssrf(format!(
                "access to '*{}' domains is not allowed",
                suffix
            )));
        }
    }

    let port = url.port_or_known_default().unwrap_or(80);
    match tokio::net::lookup_host((host.as_str(), port)).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_ip_blocked(addr.ip()) {
                    return Err(EstuaryError::Ssrf(format!(
                        "hostname '{}' resolves to blocked IP address '{}'",
                        host,
                        addr.ip()
                    )));
                }
            }
        }
        Err(_) => {
            // DNS failure: let the fetch surface its own error.
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocked_hostnames_and_ips() {
        for url in [
            "http://localhost/x",
            "http://127.0.0.1/x",
            "http://10.0.0.1/x",
            "http://172.16.0.1/x",
            "http://192.168.1.1/x",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/x",
            "http://metadata.google.internal/x",
            "http://printer.local/x",
            "http://service.internal/x",
        ] {
            assert!(validate_url(url).await.is_err(), "{} should be blocked", url);
        }
    }

    #[tokio::test]
    async fn test_blocked_schemes() {
        for url in ["file:///etc/passwd", "ftp://example.com/x", "gopher://example.com/x"] {
            assert!(validate_url(url).await.is_err(), "{} should be blocked", url);
        }
    }

    #[tokio::test]
    async fn test_public_ip_literal_allowed() {
        assert!(validate_url("https://93.184.216.34/").await.is_ok());
    }

    #[test]
    fn test_ip_range_classification() {
        assert!(is_ip_blocked("10.1.2.3".parse().unwrap()));
        assert!(is_ip_blocked("192.0.2.7".parse().unwrap()));
        assert!(is_ip_blocked("255.255.255.255".parse().unwrap()));
        assert!(is_ip_blocked("fe80::1".parse().unwrap()));
        assert!(is_ip_blocked("fc00::1".parse().unwrap()));
        assert!(is_ip_blocked("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_ip_blocked("93.184.216.34".parse().unwrap()));
        assert!(!is_ip_blocked("2606:2800:220:1::1".parse().unwrap()));
    }
}
