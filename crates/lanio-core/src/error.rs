//! Error types for lanio.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Each variant maps onto one
//! [`ErrorKind`], and every error carries a domain tag ([`ErrorDomain`]) and
//! a numeric code so that a UI layer can branch on them without knowing
//! transport internals.

use std::fmt;
use std::time::Duration;

/// Which layer produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// The byte-level socket layer.
    Transport,
    /// The command/response protocol layer.
    Instrument,
}

impl ErrorDomain {
    /// Short tag used in log output and error reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorDomain::Transport => "transport",
            ErrorDomain::Instrument => "instrument",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`Error`], one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed address/port, or a malformed binary block header.
    BadFormat,
    /// The socket could not be allocated.
    SocketCreate,
    /// The connection was refused, timed out, or could not be resolved.
    Connect,
    /// A write failed or timed out.
    Write,
    /// A read failed or timed out.
    Read,
    /// The operation needs an open primary connection.
    NotConnected,
}

impl ErrorKind {
    /// The domain this kind of error belongs to.
    pub fn domain(self) -> ErrorDomain {
        match self {
            ErrorKind::BadFormat | ErrorKind::NotConnected => ErrorDomain::Instrument,
            ErrorKind::SocketCreate
            | ErrorKind::Connect
            | ErrorKind::Write
            | ErrorKind::Read => ErrorDomain::Transport,
        }
    }

    /// Numeric code, unique within the kind's domain.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::BadFormat => 1,
            ErrorKind::NotConnected => 2,
            ErrorKind::SocketCreate => 1,
            ErrorKind::Connect => 2,
            ErrorKind::Write => 3,
            ErrorKind::Read => 4,
        }
    }
}

/// Why a connect, write, or read failed.
#[derive(Debug, thiserror::Error)]
pub enum Cause {
    /// The operation's timeout budget was exhausted.
    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    PeerClosed,

    /// No terminator was found within the line-length guard.
    #[error("line exceeded {0} bytes without a terminator")]
    LineTooLong(usize),

    /// The host name did not resolve to any address.
    #[error("could not resolve host: {0}")]
    Resolve(String),

    /// An underlying socket error.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// The error type for all lanio operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed address/port, or a malformed definite-length block header.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// No socket could be allocated.
    #[error("unable to create socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    /// The connection could not be established.
    #[error("unable to connect to {addr}: {cause}")]
    Connect {
        /// `host:port` that was being connected to.
        addr: String,
        #[source]
        cause: Cause,
    },

    /// A write failed after `written` bytes had been sent.
    #[error("error writing ({written} bytes sent): {cause}")]
    Write {
        #[source]
        cause: Cause,
        written: usize,
    },

    /// A read failed after `read` bytes had been received.
    #[error("error reading ({read} bytes received): {cause}")]
    Read {
        #[source]
        cause: Cause,
        read: usize,
    },

    /// No primary connection is open.
    #[error("not connected")]
    NotConnected,
}

impl Error {
    /// Build a write error for a timeout after `written` bytes.
    pub fn write_timeout(timeout: Duration, written: usize) -> Self {
        Error::Write {
            cause: Cause::Timeout(timeout),
            written,
        }
    }

    /// Build a read error for a timeout after `read` bytes.
    pub fn read_timeout(timeout: Duration, read: usize) -> Self {
        Error::Read {
            cause: Cause::Timeout(timeout),
            read,
        }
    }

    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadFormat(_) => ErrorKind::BadFormat,
            Error::SocketCreate(_) => ErrorKind::SocketCreate,
            Error::Connect { .. } => ErrorKind::Connect,
            Error::Write { .. } => ErrorKind::Write,
            Error::Read { .. } => ErrorKind::Read,
            Error::NotConnected => ErrorKind::NotConnected,
        }
    }

    /// The layer that produced this error.
    pub fn domain(&self) -> ErrorDomain {
        self.kind().domain()
    }

    /// Numeric code within [`domain`](Self::domain).
    pub fn code(&self) -> u32 {
        self.kind().code()
    }

    /// The underlying cause for connect, write, and read failures.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Error::Connect { cause, .. } | Error::Write { cause, .. } | Error::Read { cause, .. } => {
                Some(cause)
            }
            _ => None,
        }
    }

    /// Whether the failure was the timeout budget running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause(), Some(Cause::Timeout(_)))
    }

    /// Bytes moved before a write or read failed.
    ///
    /// `None` for errors that are not byte transfers.
    pub fn bytes_transferred(&self) -> Option<usize> {
        match self {
            Error::Write { written, .. } => Some(*written),
            Error::Read { read, .. } => Some(*read),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_bad_format() {
        let e = Error::BadFormat("empty address".into());
        assert_eq!(e.to_string(), "bad format: empty address");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_display_connect_timeout() {
        let e = Error::Connect {
            addr: "192.0.2.1:5025".into(),
            cause: Cause::Timeout(Duration::from_millis(250)),
        };
        assert_eq!(
            e.to_string(),
            "unable to connect to 192.0.2.1:5025: timed out after 250 ms"
        );
    }

    #[test]
    fn error_display_read_partial() {
        let e = Error::Read {
            cause: Cause::PeerClosed,
            read: 12,
        };
        assert_eq!(
            e.to_string(),
            "error reading (12 bytes received): connection closed by peer"
        );
    }

    #[test]
    fn kinds_domains_and_codes() {
        let cases = [
            (Error::BadFormat("x".into()), ErrorKind::BadFormat, ErrorDomain::Instrument, 1),
            (Error::NotConnected, ErrorKind::NotConnected, ErrorDomain::Instrument, 2),
            (
                Error::SocketCreate(std::io::Error::other("no fds")),
                ErrorKind::SocketCreate,
                ErrorDomain::Transport,
                1,
            ),
            (
                Error::Connect {
                    addr: "h:1".into(),
                    cause: Cause::PeerClosed,
                },
                ErrorKind::Connect,
                ErrorDomain::Transport,
                2,
            ),
            (
                Error::write_timeout(Duration::ZERO, 0),
                ErrorKind::Write,
                ErrorDomain::Transport,
                3,
            ),
            (
                Error::read_timeout(Duration::ZERO, 0),
                ErrorKind::Read,
                ErrorDomain::Transport,
                4,
            ),
        ];

        for (err, kind, domain, code) in cases {
            assert_eq!(err.kind(), kind, "{err}");
            assert_eq!(err.domain(), domain, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn timeout_detection() {
        assert!(Error::write_timeout(Duration::from_millis(5), 3).is_timeout());
        assert!(Error::read_timeout(Duration::from_millis(5), 0).is_timeout());
        assert!(
            !Error::Read {
                cause: Cause::PeerClosed,
                read: 0
            }
            .is_timeout()
        );
        assert!(!Error::NotConnected.is_timeout());
    }

    #[test]
    fn bytes_transferred_reports_partial_counts() {
        assert_eq!(
            Error::write_timeout(Duration::ZERO, 7).bytes_transferred(),
            Some(7)
        );
        assert_eq!(
            Error::read_timeout(Duration::ZERO, 3).bytes_transferred(),
            Some(3)
        );
        assert_eq!(Error::NotConnected.bytes_transferred(), None);
    }

    #[test]
    fn cause_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let cause: Cause = io_err.into();
        assert!(matches!(cause, Cause::Io(_)));
        assert!(cause.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();

        let e = Error::Write {
            cause: Cause::PeerClosed,
            written: 0,
        };
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn domain_tags() {
        assert_eq!(ErrorDomain::Transport.to_string(), "transport");
        assert_eq!(ErrorDomain::Instrument.as_str(), "instrument");
    }
}
