//! Upload URL decomposition
//!
//! The device stores its upload target as a free-form string typed into the
//! provisioning page. This module splits it into the pieces the uploader
//! needs without ever failing: malformed input degrades to empty or default
//! fields.

use std::fmt;

/// Port used when the URL does not carry one
pub const DEFAULT_PORT: u16 = 443;

/// A decomposed upload URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: Option<String>,
    host: String,
    port: u16,
    path: String,
}

impl Url {
    /// Parse a URL with the default port (443)
    pub fn parse(raw: &str) -> Self {
        Self::parse_with_default_port(raw, DEFAULT_PORT)
    }

    /// Parse a URL, using `default_port` when none is given
    ///
    /// A port suffix that is empty, non-numeric or out of range yields 0.
    pub fn parse_with_default_port(raw: &str, default_port: u16) -> Self {
        let (scheme, rest) = match raw.find("://") {
            Some(pos) => (Some(raw[..pos].to_string()), &raw[pos + 3..]),
            None => (None, raw),
        };

        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], rest[slash..].to_string()),
            None => (rest, "/".to_string()),
        };

        let (host, port) = match authority.find(':') {
            Some(colon) => (&authority[..colon], parse_port(&authority[colon + 1..])),
            None => (authority, default_port),
        };

        Url {
            scheme,
            host: host.to_string(),
            port,
            path,
        }
    }

    /// Scheme text before "://", if present
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request target, always starting with "/"
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the connection should use TLS
    ///
    /// Only an explicit `http` scheme selects plain TCP.
    pub fn is_secure(&self) -> bool {
        !matches!(self.scheme.as_deref(), Some(s) if s.eq_ignore_ascii_case("http"))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

/// Leading decimal digits as a port, 0 when there are none or they overflow
fn parse_port(s: &str) -> u16 {
    let digits: &str = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &s[..end],
        None => s,
    };
    digits.parse::<u16>().unwrap_or(0)
}
