//! TCP transport for instrument communication.
//!
//! This module provides [`TcpTransport`], which implements the [`Transport`]
//! trait for LAN instruments that expose a raw SCPI socket (conventionally
//! port 5025) or a companion control port.
//!
//! All I/O is non-blocking: each call attempts the socket operation, and
//! when the kernel reports `WouldBlock` it waits for a readiness signal
//! bounded by whatever is left of the call's deadline. The deadline is
//! computed once per call from a monotonic clock, so retries after partial
//! reads or writes never extend the caller's budget.
//!
//! # Example
//!
//! ```no_run
//! use lanio_transport::TcpTransport;
//! use lanio_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> lanio_core::Result<()> {
//! let mut transport =
//!     TcpTransport::open("192.168.1.20", 5025, Duration::from_secs(5)).await?;
//!
//! transport.write_buffer(b"*IDN?\n", Duration::from_secs(1)).await?;
//!
//! let mut line = Vec::new();
//! transport
//!     .read_line(&mut line, b"\n", 4096, Duration::from_secs(2))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use lanio_core::endpoint::Endpoint;
use lanio_core::error::{Cause, Error, Result};
use lanio_core::transport::{self, Transport};
use std::io::ErrorKind as IoErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::Instant;

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the peek window used while searching for a line terminator.
const PEEK_CHUNK: usize = 512;

/// TCP transport for instrument communication.
///
/// Holds at most one connected stream. The stream is released on
/// [`close`](Transport::close) and also dropped when a hard socket error or
/// a peer close is detected, after which [`is_connected`](Transport::is_connected)
/// reports `false`. Timeouts leave the stream open so the caller can retry.
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` once closed or failed.
    stream: Option<TcpStream>,
    /// The address string for logging/debugging.
    addr: String,
}

impl TcpTransport {
    /// Validate `address`/`port` and connect within `timeout`.
    ///
    /// Fails with [`Error::BadFormat`] if the pair is malformed,
    /// [`Error::SocketCreate`] if no socket can be allocated, and
    /// [`Error::Connect`] if resolution fails, the connection is refused,
    /// or the budget runs out.
    pub async fn open(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::new(address, port)?;
        Self::open_endpoint(&endpoint, timeout).await
    }

    /// Connect to an already-validated endpoint within `timeout`.
    ///
    /// Host names are resolved inside the same budget. When a name resolves
    /// to several addresses they are tried in order until one connects or
    /// the deadline passes.
    pub async fn open_endpoint(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let addr = endpoint.to_string();
        let deadline = deadline_after(timeout);

        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to instrument"
        );

        let candidates = resolve(endpoint, deadline, timeout).await.map_err(|cause| {
            tracing::error!(addr = %addr, error = %cause, "Address resolution failed");
            Error::Connect {
                addr: addr.clone(),
                cause,
            }
        })?;

        let mut last_cause = Cause::Resolve(endpoint.host().to_string());
        for target in candidates {
            let socket = match target {
                SocketAddr::V4(_) => TcpSocket::new_v4(),
                SocketAddr::V6(_) => TcpSocket::new_v6(),
            }
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "Failed to create socket");
                Error::SocketCreate(e)
            })?;

            match tokio::time::timeout_at(deadline, socket.connect(target)).await {
                Ok(Ok(stream)) => {
                    // Instrument commands are short; send them without batching delay.
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::warn!(
                            addr = %addr,
                            error = %e,
                            "Failed to set TCP_NODELAY (continuing anyway)"
                        );
                    }

                    tracing::info!(addr = %addr, peer = %target, "TCP connection established");

                    return Ok(Self {
                        stream: Some(stream),
                        addr,
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!(addr = %addr, peer = %target, error = %e, "Connect attempt failed");
                    last_cause = Cause::Io(e);
                }
                Err(_) => {
                    last_cause = Cause::Timeout(timeout);
                    break;
                }
            }
        }

        tracing::error!(addr = %addr, error = %last_cause, "TCP connection failed");
        Err(Error::Connect {
            addr,
            cause: last_cause,
        })
    }

    /// Wrap an existing `TcpStream` as a `TcpTransport`.
    ///
    /// Useful when a connection has been established elsewhere, e.g.
    /// accepted from a listener in tests.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Drop the stream after an unrecoverable failure.
    fn mark_failed(&mut self, cause: &Cause) {
        if matches!(cause, Cause::PeerClosed | Cause::Io(_)) && self.stream.take().is_some() {
            tracing::warn!(addr = %self.addr, error = %cause, "Connection no longer usable");
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_buffer(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let deadline = deadline_after(timeout);
        let stream = self.stream.as_ref().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            timeout_ms = timeout.as_millis(),
            "Writing buffer"
        );

        let mut written = 0;
        match write_until(stream, data, &mut written, deadline, timeout).await {
            Ok(()) => {
                tracing::trace!(addr = %self.addr, bytes = written, "Buffer written");
                Ok(())
            }
            Err(cause) => {
                tracing::error!(
                    addr = %self.addr,
                    written,
                    requested = data.len(),
                    error = %cause,
                    "Failed to write buffer"
                );
                self.mark_failed(&cause);
                Err(Error::Write { cause, written })
            }
        }
    }

    async fn read_buffer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = deadline_after(timeout);
        let stream = self.stream.as_ref().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            buf_len = buf.len(),
            timeout_ms = timeout.as_millis(),
            "Reading buffer"
        );

        let mut read = 0;
        match read_until(stream, buf, &mut read, deadline, timeout).await {
            Ok(()) => {
                tracing::trace!(addr = %self.addr, bytes = read, "Buffer read");
                Ok(read)
            }
            Err(cause) => {
                if matches!(cause, Cause::Timeout(_)) {
                    tracing::debug!(addr = %self.addr, read, error = %cause, "Read timed out");
                } else {
                    tracing::error!(addr = %self.addr, read, error = %cause, "Failed to read buffer");
                }
                self.mark_failed(&cause);
                Err(Error::Read { cause, read })
            }
        }
    }

    async fn read_line(
        &mut self,
        line: &mut Vec<u8>,
        terminator: &[u8],
        max_len: usize,
        timeout: Duration,
    ) -> Result<()> {
        if terminator.is_empty() {
            return Err(Error::BadFormat("line terminator is empty".into()));
        }
        let deadline = deadline_after(timeout);
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let start = line.len();

        match read_line_until(stream, line, terminator, max_len, deadline, timeout).await {
            Ok(()) => {
                tracing::trace!(
                    addr = %self.addr,
                    bytes = line.len() - start,
                    data = ?String::from_utf8_lossy(&line[start..]),
                    "Line read"
                );
                Ok(())
            }
            Err(cause) => {
                let read = line.len() - start;
                if matches!(cause, Cause::Timeout(_)) {
                    tracing::debug!(addr = %self.addr, read, error = %cause, "Line read timed out");
                } else {
                    tracing::error!(addr = %self.addr, read, error = %cause, "Failed to read line");
                }
                self.mark_failed(&cause);
                Err(Error::Read { cause, read })
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");

            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

// Log when the transport is dropped while still connected.
impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped, closing connection");
        }
    }
}

/// The monotonic deadline for a call with the given budget.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Saturate absurdly large budgets instead of overflowing the clock.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Resolve an endpoint to candidate socket addresses before `deadline`.
async fn resolve(
    endpoint: &Endpoint,
    deadline: Instant,
    budget: Duration,
) -> std::result::Result<Vec<SocketAddr>, Cause> {
    if let Ok(ip) = endpoint.host().parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, endpoint.port())]);
    }

    let lookup = tokio::net::lookup_host((endpoint.host(), endpoint.port()));
    let addrs: Vec<SocketAddr> = tokio::time::timeout_at(deadline, lookup)
        .await
        .map_err(|_| Cause::Timeout(budget))?
        .map_err(|e| Cause::Resolve(format!("{}: {}", endpoint.host(), e)))?
        .collect();

    if addrs.is_empty() {
        return Err(Cause::Resolve(endpoint.host().to_string()));
    }
    Ok(addrs)
}

/// Wait until the socket signals `interest`, or fail once `deadline` passes.
///
/// `timeout_at` polls the readiness future before checking the deadline,
/// so with an expired deadline this still picks up readiness the kernel
/// already reported. A zero budget therefore never fails without the
/// socket having been asked.
async fn wait_ready(
    stream: &TcpStream,
    interest: Interest,
    deadline: Instant,
    budget: Duration,
) -> std::result::Result<(), Cause> {
    match tokio::time::timeout_at(deadline, stream.ready(interest)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Cause::Io(e)),
        Err(_) => Err(Cause::Timeout(budget)),
    }
}

async fn write_until(
    stream: &TcpStream,
    data: &[u8],
    written: &mut usize,
    deadline: Instant,
    budget: Duration,
) -> std::result::Result<(), Cause> {
    while *written < data.len() {
        match stream.try_write(&data[*written..]) {
            Ok(0) => return Err(Cause::PeerClosed),
            Ok(n) => *written += n,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {
                wait_ready(stream, Interest::WRITABLE, deadline, budget).await?;
            }
            Err(e) if e.kind() == IoErrorKind::Interrupted => {}
            Err(e) => return Err(map_io_error(e)),
        }
    }
    Ok(())
}

async fn read_until(
    stream: &TcpStream,
    buf: &mut [u8],
    read: &mut usize,
    deadline: Instant,
    budget: Duration,
) -> std::result::Result<(), Cause> {
    while *read < buf.len() {
        match stream.try_read(&mut buf[*read..]) {
            // TCP: 0 bytes read means the peer has closed the connection.
            Ok(0) => return Err(Cause::PeerClosed),
            Ok(n) => *read += n,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {
                wait_ready(stream, Interest::READABLE, deadline, budget).await?;
            }
            Err(e) if e.kind() == IoErrorKind::Interrupted => {}
            Err(e) => return Err(map_io_error(e)),
        }
    }
    Ok(())
}

/// Accumulate into `line` until it ends with `terminator`.
///
/// Data is peeked first and only the bytes up to and including the
/// terminator are consumed. Anything the instrument sent after the
/// terminator stays queued in the socket for the next call.
async fn read_line_until(
    stream: &mut TcpStream,
    line: &mut Vec<u8>,
    terminator: &[u8],
    max_len: usize,
    deadline: Instant,
    budget: Duration,
) -> std::result::Result<(), Cause> {
    let mut chunk = [0u8; PEEK_CHUNK];

    loop {
        let room = max_len.saturating_sub(line.len());
        if room == 0 {
            return Err(Cause::LineTooLong(max_len));
        }
        let window = room.min(PEEK_CHUNK);

        let available = match tokio::time::timeout_at(deadline, stream.peek(&mut chunk[..window])).await
        {
            Ok(Ok(0)) => return Err(Cause::PeerClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(map_io_error(e)),
            Err(_) => return Err(Cause::Timeout(budget)),
        };

        let end = transport::terminator_end(line, &chunk[..available], terminator);
        let take = end.unwrap_or(available);

        // The peeked bytes are already buffered, so this completes at once.
        let consumed = match tokio::time::timeout_at(deadline, stream.read(&mut chunk[..take])).await {
            Ok(Ok(0)) => return Err(Cause::PeerClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(map_io_error(e)),
            Err(_) => return Err(Cause::Timeout(budget)),
        };
        line.extend_from_slice(&chunk[..consumed]);

        if end.is_some() && line.ends_with(terminator) {
            return Ok(());
        }
    }
}

/// Map a data-path I/O error onto a [`Cause`].
fn map_io_error(e: std::io::Error) -> Cause {
    match e.kind() {
        IoErrorKind::ConnectionReset
        | IoErrorKind::BrokenPipe
        | IoErrorKind::NotConnected
        | IoErrorKind::ConnectionAborted
        | IoErrorKind::UnexpectedEof => Cause::PeerClosed,
        _ => Cause::Io(e),
    }
}
