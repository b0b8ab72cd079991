//! Target resolution from the first bytes of a proxied connection.
//!
//! The local listener hands the first chunk read from a client socket to
//! [`resolve_target`], which decides where the relay should connect on the
//! client's behalf. Resolution runs exactly once per connection and sees only
//! that first chunk; a request whose start line spans multiple reads is
//! rejected as malformed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Destination of one proxied connection, immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    /// Destination host (never empty).
    pub host: String,
    /// Destination port (1-65535).
    pub port: u16,
    /// Whether this is a CONNECT tunnel rather than a plain HTTP request.
    pub is_connect: bool,
}

/// Errors from parsing the first chunk of a client connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("request line is missing a method or target")]
    MalformedRequestLine,

    #[error("request target has an empty host")]
    EmptyHost,

    #[error("absolute URL has no host: {0}")]
    UrlWithoutHost(String),

    #[error("no usable Host header in request")]
    MissingHostHeader,

    #[error("explicit port 0 is not routable")]
    InvalidPort,
}

/// Parse the first chunk of a client connection into a [`ProxyTarget`].
///
/// Supports the three request shapes a proxy client can send:
/// `CONNECT host:port` (port defaults to 443), an absolute-URI request
/// target (port defaults to the scheme's), and a relative request target
/// with a `Host:` header (port defaults to 80).
pub fn resolve_target(chunk: &[u8]) -> Result<ProxyTarget, TargetError> {
    let header = String::from_utf8_lossy(chunk);
    let mut lines = header.split("\r\n");
    let request_line = lines.next().unwrap_or("");

    let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
    let (method, raw_target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => return Err(TargetError::MalformedRequestLine),
    };

    trace!(method, raw_target, "resolving proxy target");

    if method.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = split_host_port(raw_target, 443)?;
        if host.is_empty() {
            return Err(TargetError::EmptyHost);
        }
        return Ok(ProxyTarget {
            host,
            port,
            is_connect: true,
        });
    }

    if raw_target.starts_with("http://") || raw_target.starts_with("https://") {
        // An unparseable absolute URL falls through to the Host header,
        // matching how lenient proxy clients are treated elsewhere.
        if let Ok(url) = Url::parse(raw_target) {
            let host = url
                .host_str()
                .ok_or_else(|| TargetError::UrlWithoutHost(raw_target.to_string()))?
                .to_string();
            let port = url.port_or_known_default().unwrap_or(80);
            if port == 0 {
                return Err(TargetError::InvalidPort);
            }
            return Ok(ProxyTarget {
                host,
                port,
                is_connect: false,
            });
        }
    }

    let host_value = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("host"))
        .map(|(_, value)| value.trim())
        .ok_or(TargetError::MissingHostHeader)?;

    if host_value.is_empty() {
        return Err(TargetError::MissingHostHeader);
    }

    let (host, port) = split_host_port(host_value, 80)?;
    if host.is_empty() {
        return Err(TargetError::EmptyHost);
    }

    Ok(ProxyTarget {
        host,
        port,
        is_connect: false,
    })
}

/// Split `host[:port]` on the last colon. A missing or non-numeric port
/// yields `default_port`; an explicit port 0 is rejected.
fn split_host_port(value: &str, default_port: u16) -> Result<(String, u16), TargetError> {
    match value.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(0) => Err(TargetError::InvalidPort),
            Ok(port) => Ok((host.to_string(), port)),
            Err(_) => Ok((host.to_string(), default_port)),
        },
        None => Ok((value.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_with_port() {
        let target = resolve_target(b"CONNECT example.com:9443 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(
            target,
            ProxyTarget {
                host: "example.com".to_string(),
                port: 9443,
                is_connect: true,
            }
        );
    }

    #[test]
    fn test_connect_defaults_to_443() {
        let target = resolve_target(b"CONNECT example.com HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
        assert!(target.is_connect);
    }

    #[test]
    fn test_connect_is_case_insensitive() {
        let target = resolve_target(b"connect example.com:8443 HTTP/1.1\r\n\r\n").unwrap();
        assert!(target.is_connect);
        assert_eq!(target.port, 8443);
    }

    #[test]
    fn test_connect_non_numeric_port_defaults() {
        let target = resolve_target(b"CONNECT example.com:abc HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
    }

    #[test]
    fn test_connect_empty_host() {
        let result = resolve_target(b"CONNECT :443 HTTP/1.1\r\n\r\n");
        assert_eq!(result, Err(TargetError::EmptyHost));
    }

    #[test]
    fn test_absolute_url_http() {
        let target = resolve_target(b"GET http://example.com/a HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(
            target,
            ProxyTarget {
                host: "example.com".to_string(),
                port: 80,
                is_connect: false,
            }
        );
    }

    #[test]
    fn test_absolute_url_https_with_port() {
        let target =
            resolve_target(b"GET https://example.com:8443/a HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8443);
        assert!(!target.is_connect);
    }

    #[test]
    fn test_absolute_url_https_default_port() {
        let target = resolve_target(b"GET https://example.com/ HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.port, 443);
    }

    #[test]
    fn test_host_header_with_port() {
        let chunk = b"GET /a HTTP/1.1\r\nHost: example.com:8080\r\n\r\n";
        let target = resolve_target(chunk).unwrap();
        assert_eq!(
            target,
            ProxyTarget {
                host: "example.com".to_string(),
                port: 8080,
                is_connect: false,
            }
        );
    }

    #[test]
    fn test_host_header_default_port() {
        let chunk = b"GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let target = resolve_target(chunk).unwrap();
        assert_eq!(target.port, 80);
    }

    #[test]
    fn test_host_header_name_is_case_insensitive() {
        let chunk = b"GET /a HTTP/1.1\r\nhOsT: example.com\r\n\r\n";
        let target = resolve_target(chunk).unwrap();
        assert_eq!(target.host, "example.com");
    }

    #[test]
    fn test_missing_host_header() {
        let result = resolve_target(b"GET /a HTTP/1.1\r\nAccept: */*\r\n\r\n");
        assert_eq!(result, Err(TargetError::MissingHostHeader));
    }

    #[test]
    fn test_empty_host_header_value() {
        let result = resolve_target(b"GET /a HTTP/1.1\r\nHost:\r\n\r\n");
        assert_eq!(result, Err(TargetError::MissingHostHeader));
    }

    #[test]
    fn test_empty_chunk() {
        assert_eq!(resolve_target(b""), Err(TargetError::MalformedRequestLine));
    }

    #[test]
    fn test_missing_target() {
        assert_eq!(
            resolve_target(b"GET\r\n\r\n"),
            Err(TargetError::MalformedRequestLine)
        );
    }

    #[test]
    fn test_explicit_port_zero_rejected() {
        assert_eq!(
            resolve_target(b"CONNECT example.com:0 HTTP/1.1\r\n\r\n"),
            Err(TargetError::InvalidPort)
        );
    }
}
