//! Argument validation for commands that accept structured input.
//!
//! Arithmetic expressions are limited to a small alphabet. URLs must be
//! http(s) and must not point at localhost or a private/reserved address,
//! since downloaders fetch whatever they are given.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Longest expression accepted by [`validate_expression`].
pub const MAX_EXPRESSION_LEN: usize = 200;

/// What a command's argument text must look like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// No constraint.
    #[default]
    Free,
    /// An arithmetic expression.
    Expression,
    /// An http(s) URL to a public host.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing argument")]
    Missing,
    #[error("expression too long (max {MAX_EXPRESSION_LEN} characters)")]
    ExpressionTooLong,
    #[error("expression contains invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("only http and https URLs are allowed")]
    UnsupportedScheme,
    #[error("URLs pointing to localhost or private addresses are not allowed")]
    PrivateHost,
}

/// Check the argument text of a command against its [`ArgKind`].
pub fn validate_args(kind: ArgKind, rest: &str) -> Result<(), ValidationError> {
    match kind {
        ArgKind::Free => Ok(()),
        ArgKind::Expression => validate_expression(rest),
        ArgKind::Url => {
            let first = rest.split_whitespace().next().ok_or(ValidationError::Missing)?;
            validate_url(first).map(|_| ())
        }
    }
}

pub fn validate_expression(expr: &str) -> Result<(), ValidationError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ValidationError::Missing);
    }
    if expr.chars().count() > MAX_EXPRESSION_LEN {
        return Err(ValidationError::ExpressionTooLong);
    }
    match expr
        .chars()
        .find(|c| !(c.is_ascii_digit() || c.is_whitespace() || "+-*/%^().".contains(*c)))
    {
        Some(bad) => Err(ValidationError::InvalidCharacter(bad)),
        None => Ok(()),
    }
}

/// Parse and vet a URL. Returns the parsed form on success.
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme);
    }
    match parsed.host() {
        None => return Err(ValidationError::InvalidUrl("missing host".into())),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(ValidationError::PrivateHost);
            }
        }
        Some(Host::Ipv4(ip)) => {
            if is_private_ipv4(&ip) {
                return Err(ValidationError::PrivateHost);
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_private_ip(&IpAddr::V6(ip)) {
                return Err(ValidationError::PrivateHost);
            }
        }
    }
    Ok(parsed)
}

fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => is_private_ipv4(ip),
        IpAddr::V6(ip) => is_private_ipv6(ip),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 0.0.0.0/8
        || octets[0] == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&v4);
    }
    let segments = ip.segments();
    // fc00::/7 unique local
    segments[0] & 0xfe00 == 0xfc00
        // fe80::/10 link-local
        || segments[0] & 0xffc0 == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_and_loopback_urls_rejected() {
        assert_eq!(
            validate_url("http://127.0.0.1/evil").unwrap_err(),
            ValidationError::PrivateHost
        );
        assert_eq!(
            validate_url("http://192.168.1.5/x").unwrap_err(),
            ValidationError::PrivateHost
        );
        for url in [
            "http://localhost:8080/",
            "http://api.localhost/",
            "http://10.1.2.3/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://169.254.169.254/latest/meta-data",
        ] {
            assert_eq!(validate_url(url).unwrap_err(), ValidationError::PrivateHost, "{url}");
        }
    }

    #[test]
    fn public_https_url_accepted() {
        let url = validate_url("https://example.com/video").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert!(validate_url("http://8.8.8.8/").is_ok());
    }

    #[test]
    fn non_http_schemes_rejected() {
        assert_eq!(
            validate_url("file:///etc/passwd").unwrap_err(),
            ValidationError::UnsupportedScheme
        );
        assert_eq!(
            validate_url("ftp://example.com/").unwrap_err(),
            ValidationError::UnsupportedScheme
        );
        assert!(matches!(
            validate_url("not a url").unwrap_err(),
            ValidationError::InvalidUrl(_)
        ));
    }

    #[test]
    fn expression_alphabet() {
        assert!(validate_expression("(1 + 2.5) * 3 ^ 2 % 4").is_ok());
        assert_eq!(
            validate_expression("2 + x").unwrap_err(),
            ValidationError::InvalidCharacter('x')
        );
        assert_eq!(validate_expression("  ").unwrap_err(), ValidationError::Missing);
        let long = "1+".repeat(150);
        assert_eq!(
            validate_expression(&long).unwrap_err(),
            ValidationError::ExpressionTooLong
        );
    }

    #[test]
    fn validate_args_dispatches_on_kind() {
        assert!(validate_args(ArgKind::Free, "anything; goes").is_ok());
        assert_eq!(validate_args(ArgKind::Url, "").unwrap_err(), ValidationError::Missing);
        assert!(validate_args(ArgKind::Url, "https://example.com/a extra").is_ok());
        assert!(validate_args(ArgKind::Expression, "1+1").is_ok());
    }
}
