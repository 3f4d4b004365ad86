//! In-memory transport for deterministic testing of the protocol layer.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. It never sleeps: a read that cannot be satisfied
//! from queued data fails at once with a timeout error carrying the caller's
//! budget, which keeps protocol tests fast and repeatable.
//!
//! The transport is a cheap handle over shared state, so a test can keep a
//! clone for inspection after moving the original into a client.
//!
//! # Example
//!
//! ```
//! use lanio_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the client writes this request, make this response readable.
//! mock.expect(b"*IDN?\n", b"AGILENT,TEST,0,1.0\n");
//! let handle = mock.clone();
//! assert_eq!(handle.remaining_expectations(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lanio_core::error::{Cause, Error, Result};
use lanio_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be written.
    request: Vec<u8>,
    /// The bytes that become readable once the request is written.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Bytes available to the next read calls.
    inbound: VecDeque<u8>,
    /// Whether the transport is "connected".
    connected: bool,
    /// When set, running out of inbound data looks like a peer close.
    peer_closed: bool,
    /// Number of upcoming writes that should fail.
    failing_writes: usize,
    /// Log of all bytes written through this transport.
    sent_log: Vec<Vec<u8>>,
    /// Number of read calls (buffer or line) made so far.
    read_calls: usize,
    /// Number of close calls made so far.
    close_calls: usize,
}

/// A mock [`Transport`] for testing protocol logic without a socket.
///
/// Expectations are consumed in order. A write must match the next
/// expectation exactly; the corresponding response is then appended to the
/// inbound queue. Data can also be queued directly with
/// [`queue`](MockTransport::queue) to model unsolicited or trailing bytes.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                inbound: VecDeque::new(),
                connected: true,
                peer_closed: false,
                failing_writes: 0,
                sent_log: Vec::new(),
                read_calls: 0,
                close_calls: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panic in another test thread must not cascade into this one.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Make `data` readable immediately, without a triggering write.
    pub fn queue(&mut self, data: &[u8]) {
        self.state().inbound.extend(data.iter().copied());
    }

    /// Make the next write fail with a write error, sending nothing.
    pub fn fail_next_write(&mut self) {
        self.state().failing_writes += 1;
    }

    /// Model a peer that hangs up once the queued data has been read.
    ///
    /// A read that runs out of data then fails with
    /// [`Cause::PeerClosed`] and the transport disconnects.
    pub fn close_when_drained(&mut self) {
        self.state().peer_closed = true;
    }

    /// All data written through this transport, one element per write.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Number of bytes queued for reading.
    pub fn pending_bytes(&self) -> usize {
        self.state().inbound.len()
    }

    /// Number of read calls made so far.
    pub fn read_calls(&self) -> usize {
        self.state().read_calls
    }

    /// Number of close calls made so far.
    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, I/O calls return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.state().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Failure for a read that ran out of data after `read` bytes.
    fn starved(&mut self, timeout: Duration, read: usize) -> Error {
        if self.peer_closed {
            self.connected = false;
            Error::Read {
                cause: Cause::PeerClosed,
                read,
            }
        } else {
            Error::read_timeout(timeout, read)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_buffer(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(Error::Write {
                cause: Cause::Io(std::io::Error::other("simulated write failure")),
                written: 0,
            });
        }

        // Record what was written.
        state.sent_log.push(data.to_vec());

        // Match against the next expectation.
        match state.expectations.pop_front() {
            Some(expectation) if expectation.request == data => {
                state.inbound.extend(expectation.response);
                Ok(())
            }
            Some(expectation) => Err(Error::Write {
                cause: Cause::Io(std::io::Error::other(format!(
                    "unexpected write: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&expectation.request),
                    String::from_utf8_lossy(data)
                ))),
                written: 0,
            }),
            None => Err(Error::Write {
                cause: Cause::Io(std::io::Error::other(
                    "no more expectations in mock transport",
                )),
                written: 0,
            }),
        }
    }

    async fn read_buffer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.read_calls += 1;

        let n = state.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }

        if n < buf.len() {
            return Err(state.starved(timeout, n));
        }
        Ok(n)
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
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.read_calls += 1;

        let start = line.len();
        loop {
            if line.len() >= max_len {
                return Err(Error::Read {
                    cause: Cause::LineTooLong(max_len),
                    read: line.len() - start,
                });
            }
            match state.inbound.pop_front() {
                Some(byte) => {
                    line.push(byte);
                    if line.ends_with(terminator) {
                        return Ok(());
                    }
                }
                None => {
                    let read = line.len() - start;
                    return Err(state.starved(timeout, read));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.connected = false;
        state.inbound.clear();
        state.close_calls += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanio_core::error::ErrorKind;

    const T: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn write_then_read_line() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"AGILENT,TEST,0,1.0\n");

        mock.write_buffer(b"*IDN?\n", T).await.unwrap();

        let mut line = Vec::new();
        mock.read_line(&mut line, b"\n", 1024, T).await.unwrap();
        assert_eq!(line, b"AGILENT,TEST,0,1.0\n");
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn tracks_sent_data_through_clone() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();
        mock.expect(b"*CLS\n", b"");
        mock.expect(b"*RST\n", b"");

        mock.write_buffer(b"*CLS\n", T).await.unwrap();
        mock.write_buffer(b"*RST\n", T).await.unwrap();

        assert_eq!(handle.sent_data(), vec![b"*CLS\n".to_vec(), b"*RST\n".to_vec()]);
    }

    #[tokio::test]
    async fn write_str_sends_text_bytes() {
        let mut mock = MockTransport::new();
        mock.expect(b"*RST\n", b"");

        mock.write_str("*RST\n", T).await.unwrap();
        assert_eq!(mock.sent_data(), vec![b"*RST\n".to_vec()]);
    }

    #[tokio::test]
    async fn wrong_write_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"X\n");

        let err = mock.write_buffer(b"*OPC?\n", T).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
    }

    #[tokio::test]
    async fn no_expectations_errors() {
        let mut mock = MockTransport::new();
        let err = mock.write_buffer(b"*RST\n", T).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
    }

    #[tokio::test]
    async fn forced_write_failure_sends_nothing() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"X\n");
        mock.fail_next_write();

        let err = mock.write_buffer(b"*IDN?\n", T).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(mock.sent_data().is_empty());
        assert_eq!(mock.remaining_expectations(), 1);
    }

    #[tokio::test]
    async fn read_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 4];
        let err = mock.read_buffer(&mut buf, T).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.bytes_transferred(), Some(0));
        assert!(mock.is_connected());
    }

    #[tokio::test]
    async fn partial_read_reports_count() {
        let mut mock = MockTransport::new();
        mock.queue(b"AB");
        let mut buf = [0u8; 4];
        let err = mock.read_buffer(&mut buf, T).await.unwrap_err();
        assert_eq!(err.bytes_transferred(), Some(2));
        assert_eq!(&buf[..2], b"AB");
    }

    #[tokio::test]
    async fn read_line_stops_at_terminator() {
        let mut mock = MockTransport::new();
        mock.queue(b"1\n2\n");
        let mut line = Vec::new();
        mock.read_line(&mut line, b"\n", 64, T).await.unwrap();
        assert_eq!(line, b"1\n");
        assert_eq!(mock.pending_bytes(), 2);
    }

    #[tokio::test]
    async fn read_line_guard() {
        let mut mock = MockTransport::new();
        mock.queue(b"0123456789");
        let mut line = Vec::new();
        let err = mock.read_line(&mut line, b"\n", 4, T).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Read {
                cause: Cause::LineTooLong(4),
                read: 4
            }
        ));
    }

    #[tokio::test]
    async fn close_when_drained_disconnects() {
        let mut mock = MockTransport::new();
        mock.queue(b"PART");
        mock.close_when_drained();

        let mut line = Vec::new();
        let err = mock.read_line(&mut line, b"\n", 64, T).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Read {
                cause: Cause::PeerClosed,
                read: 4
            }
        ));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert_eq!(mock.close_calls(), 1);

        let err = mock.write_buffer(b"*RST\n", T).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn set_connected() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);

        let mut buf = [0u8; 8];
        let err = mock.read_buffer(&mut buf, T).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(mock.read_calls(), 0);
    }
}
