//! Origin parsing and same-origin checks.

use crate::types::RequestHead;
use http::uri::{Authority, Uri};
use std::fmt;

/// A serialized origin: scheme, host and effective port.
///
/// Two origins are equal when all three match. Hosts and schemes compare
/// case-insensitively; an omitted port equals the scheme's default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Parses an `Origin` header value or a configured origin.
    ///
    /// Only `scheme://host[:port]` is accepted. Returns `None` for the opaque
    /// `null` origin and for anything carrying a path, query, fragment or
    /// user info.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (_, rest) = value.split_once("://")?;
        if rest.is_empty() || rest.contains(&['/', '?', '#', '@'][..]) {
            return None;
        }

        let uri: Uri = value.parse().ok()?;
        let scheme = uri.scheme_str()?;
        let authority = uri.authority()?;
        Some(Self::from_parts(scheme, authority))
    }

    /// Returns true if this origin is the one the request was sent to.
    ///
    /// With an absolute request URI the scheme, host and port must all match.
    /// Servers usually see origin-form URIs (`/path`) where the scheme is not
    /// visible; then the host and port from the `Host` header must match and
    /// the origin's scheme may be either `http` or `https`, so the same check
    /// holds behind TLS termination.
    #[must_use]
    pub fn is_same_origin(&self, head: &RequestHead<'_>) -> bool {
        let Some(authority) = request_authority(head) else {
            return false;
        };

        if let Some(scheme) = head.uri().scheme_str() {
            return *self == Self::from_parts(scheme, &authority);
        }

        matches!(self.scheme.as_str(), "http" | "https")
            && self.host.eq_ignore_ascii_case(authority.host())
            && self.port == authority.port_u16().or_else(|| default_port(&self.scheme))
    }

    fn from_parts(scheme: &str, authority: &Authority) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let port = authority.port_u16().or_else(|| default_port(&scheme));
        Self {
            host: authority.host().to_ascii_lowercase(),
            scheme,
            port,
        }
    }

    /// Returns the scheme, lowercased.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the host, lowercased.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the effective port.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }
}

fn request_authority(head: &RequestHead<'_>) -> Option<Authority> {
    if let Some(authority) = head.uri().authority() {
        return Some(authority.clone());
    }
    head.header_str(http::header::HOST)?.parse().ok()
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        match self.port {
            Some(port) if Some(port) != default_port(&self.scheme) => write!(f, ":{port}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let origin = Origin::parse("https://A.Example").unwrap();
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.host(), "a.example");
        assert_eq!(origin.port(), Some(443));
        assert_eq!(origin.to_string(), "https://a.example");
    }

    #[test]
    fn test_default_port_equivalence() {
        assert_eq!(
            Origin::parse("https://a.example:443"),
            Origin::parse("https://a.example")
        );
        assert_ne!(
            Origin::parse("http://a.example"),
            Origin::parse("https://a.example")
        );
        assert_eq!(
            Origin::parse("http://localhost:3000").unwrap().to_string(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for value in [
            "null",
            "",
            "a.example",
            "https://",
            "https://a.example/",
            "https://a.example/path",
            "https://a.example?x=1",
            "https://user@a.example",
            "https://a.example:notaport",
        ] {
            assert_eq!(Origin::parse(value), None, "{value} should be rejected");
        }
    }

    fn head_for<'a>(request: &'a http::Request<()>) -> RequestHead<'a> {
        RequestHead::from_request(request)
    }

    fn origin_form(host: &str) -> http::Request<()> {
        http::Request::builder()
            .method(http::Method::POST)
            .uri("/api/x")
            .header(http::header::HOST, host)
            .body(())
            .unwrap()
    }

    #[test]
    fn test_same_origin_origin_form_accepts_either_scheme() {
        let request = origin_form("api.example");
        let head = head_for(&request);

        assert!(Origin::parse("https://api.example").unwrap().is_same_origin(&head));
        assert!(Origin::parse("http://api.example").unwrap().is_same_origin(&head));
        assert!(!Origin::parse("https://other.example").unwrap().is_same_origin(&head));
        assert!(!Origin::parse("https://api.example:8443").unwrap().is_same_origin(&head));
    }

    #[test]
    fn test_same_origin_origin_form_explicit_port() {
        let request = origin_form("API.example:8443");
        let head = head_for(&request);

        assert!(Origin::parse("https://api.example:8443").unwrap().is_same_origin(&head));
        assert!(!Origin::parse("https://api.example").unwrap().is_same_origin(&head));
    }

    #[test]
    fn test_same_origin_absolute_uri_checks_scheme() {
        let request = http::Request::builder()
            .uri("https://a.example:8443/api")
            .body(())
            .unwrap();
        let head = head_for(&request);

        assert!(Origin::parse("https://a.example:8443").unwrap().is_same_origin(&head));
        assert!(!Origin::parse("http://a.example:8443").unwrap().is_same_origin(&head));
    }

    #[test]
    fn test_same_origin_without_host() {
        let request = http::Request::builder().uri("/").body(()).unwrap();
        assert!(!Origin::parse("https://a.example").unwrap().is_same_origin(&head_for(&request)));
    }
}
