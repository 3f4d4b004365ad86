//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the byte-level link to an
//! instrument. The TCP implementation lives in `lanio-transport`; the
//! scripted in-memory implementation used by protocol tests lives in
//! `lanio-test-harness`.
//!
//! Every blocking method takes its own timeout budget. The budget is a
//! single deadline for the whole call, not a per-chunk allowance, and
//! [`Duration::ZERO`] means a single non-blocking attempt. Buffers are
//! always owned by the caller; a transport keeps no data between calls.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous, timeout-bounded byte transport to an instrument.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` within `timeout`.
    ///
    /// Partial writes are retried until the budget runs out. On failure the
    /// returned [`Error::Write`](crate::error::Error::Write) reports how
    /// many bytes were sent. An empty `data` succeeds immediately.
    async fn write_buffer(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Write the UTF-8 bytes of `text` within `timeout`, without framing.
    async fn write_str(&mut self, text: &str, timeout: Duration) -> Result<()> {
        self.write_buffer(text.as_bytes(), timeout).await
    }

    /// Fill `buf` completely within `timeout`.
    ///
    /// Returns `buf.len()` on success. On failure the returned
    /// [`Error::Read`](crate::error::Error::Read) reports how many bytes
    /// were placed at the front of `buf`, and those bytes stay valid.
    async fn read_buffer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Append bytes to `line` until it ends with `terminator`.
    ///
    /// The terminator is included in `line`. Fails when the budget runs
    /// out, when the peer closes, or when `line` grows past `max_len`
    /// without a terminator. Whatever was read stays in `line`.
    async fn read_line(
        &mut self,
        line: &mut Vec<u8>,
        terminator: &[u8],
        max_len: usize,
        timeout: Duration,
    ) -> Result<()>;

    /// Close the connection. Closing an already-closed transport succeeds.
    ///
    /// After `close()`, I/O calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport still holds a usable connection.
    fn is_connected(&self) -> bool;
}

/// Locate the end of the first terminator that completes inside `chunk`.
///
/// `line` holds bytes already accumulated (known not to end with the
/// terminator); `chunk` holds newly available bytes. A terminator may
/// straddle the boundary between the two. Returns the number of bytes of
/// `chunk` to consume so that the line ends exactly with the terminator,
/// or `None` if `chunk` does not complete one.
///
/// # Example
///
/// ```
/// use lanio_core::transport::terminator_end;
///
/// assert_eq!(terminator_end(b"", b"1.0\nNEXT", b"\n"), Some(4));
/// assert_eq!(terminator_end(b"ABC\r", b"\nXY", b"\r\n"), Some(1));
/// assert_eq!(terminator_end(b"ABC", b"DEF", b"\n"), None);
/// ```
pub fn terminator_end(line: &[u8], chunk: &[u8], terminator: &[u8]) -> Option<usize> {
    if terminator.is_empty() || chunk.is_empty() {
        return None;
    }

    let tail_len = line.len().min(terminator.len() - 1);
    let tail = &line[line.len() - tail_len..];

    // Candidate start positions are measured in the virtual `tail ++ chunk`.
    let total = tail_len + chunk.len();
    if total < terminator.len() {
        return None;
    }
    (0..=total - terminator.len())
        .filter(|&start| start + terminator.len() > tail_len)
        .find(|&start| {
            terminator.iter().enumerate().all(|(i, &b)| {
                let pos = start + i;
                let byte = if pos < tail_len {
                    tail[pos]
                } else {
                    chunk[pos - tail_len]
                };
                byte == b
            })
        })
        .map(|start| start + terminator.len() - tail_len)
}
