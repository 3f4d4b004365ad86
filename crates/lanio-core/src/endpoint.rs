//! Instrument network endpoints.

use std::fmt;

use crate::error::{Error, Result};

/// Host and TCP port of an instrument.
///
/// Construction validates the pair locally, before any socket is created,
/// so a malformed endpoint is reported as [`Error::BadFormat`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Validate and build an endpoint.
    ///
    /// The host must be non-empty and free of whitespace; the port must be
    /// non-zero. Bracketed IPv6 literals (`[::1]`) are unwrapped.
    ///
    /// # Example
    ///
    /// ```
    /// use lanio_core::Endpoint;
    ///
    /// let ep = Endpoint::new("192.168.1.20", 5025).unwrap();
    /// assert_eq!(ep.to_string(), "192.168.1.20:5025");
    /// assert!(Endpoint::new("", 5025).is_err());
    /// ```
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let trimmed = host.trim();
        let host = trimmed
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(trimmed);

        if host.is_empty() {
            return Err(Error::BadFormat("instrument address is empty".into()));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(Error::BadFormat(format!(
                "instrument address contains whitespace: {host:?}"
            )));
        }
        if port == 0 {
            return Err(Error::BadFormat("port 0 is not a valid instrument port".into()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// The host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The same host on a different port.
    pub fn with_port(&self, port: u16) -> Result<Self> {
        Self::new(&self.host, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_hostname_and_ip() {
        assert_eq!(Endpoint::new("scope.lab", 5025).unwrap().host(), "scope.lab");
        assert_eq!(Endpoint::new("10.0.0.7", 5025).unwrap().port(), 5025);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let ep = Endpoint::new("  10.0.0.7 ", 5025).unwrap();
        assert_eq!(ep.host(), "10.0.0.7");
    }

    #[test]
    fn rejects_empty_host() {
        let err = Endpoint::new("   ", 5025).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFormat);
    }

    #[test]
    fn rejects_embedded_whitespace() {
        let err = Endpoint::new("10.0 .0.7", 5025).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFormat);
    }

    #[test]
    fn rejects_port_zero() {
        let err = Endpoint::new("10.0.0.7", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFormat);
    }

    #[test]
    fn ipv6_display_is_bracketed() {
        let ep = Endpoint::new("[::1]", 5025).unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.to_string(), "[::1]:5025");
    }

    #[test]
    fn with_port_keeps_host() {
        let ep = Endpoint::new("10.0.0.7", 5025).unwrap();
        let clear = ep.with_port(5000).unwrap();
        assert_eq!(clear.host(), "10.0.0.7");
        assert_eq!(clear.port(), 5000);
    }
}
