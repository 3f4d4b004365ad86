//! Scripted TCP peer for transport- and protocol-level testing.
//!
//! [`MockTcpServer`] listens on a random loopback port and, once started,
//! accepts a single connection and plays a script against it: expect a
//! request and answer it, push unsolicited bytes, stall, or hang up. This
//! lets timeout, partial-transfer, and framing behavior be tested against
//! a real socket without an instrument on the network.
//!
//! # Example
//!
//! ```
//! use lanio_test_harness::MockTcpServer;
//!
//! # async fn example() -> lanio_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // When the client sends "*IDN?\n", answer with an identification line.
//! server.expect(b"*IDN?\n", b"AGILENT,TEST,0,1.0\n");
//! server.start();
//!
//! let port = server.port();
//! // ... connect a TcpTransport to 127.0.0.1:port and exercise it ...
//! # Ok(())
//! # }
//! ```

use lanio_core::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One step of the server script.
#[derive(Debug, Clone)]
enum Step {
    /// Read exactly `request` from the client, then write `response`.
    Expect { request: Vec<u8>, response: Vec<u8> },
    /// Write bytes without waiting for a request.
    Send(Vec<u8>),
    /// Do nothing for a while, keeping the connection open.
    Stall(Duration),
    /// Close the connection immediately.
    Close,
    /// Wait for the client to close its side, failing if it sends data.
    ExpectClose,
}

/// A scripted TCP peer for tests.
///
/// The listener is bound in [`new`](MockTcpServer::new), so clients may
/// connect as soon as [`start`](MockTcpServer::start) has been called.
/// Steps run in the order they were added. Once the script is exhausted the
/// server drops the connection.
pub struct MockTcpServer {
    /// Bound listener, moved into the server task on start.
    listener: Option<TcpListener>,
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    port: u16,
    /// Ordered script.
    steps: Vec<Step>,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Create a new scripted server listening on a random loopback port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(Error::SocketCreate)?;
        let local = listener.local_addr().map_err(Error::SocketCreate)?;

        Ok(Self {
            listener: Some(listener),
            addr: local.to_string(),
            port: local.port(),
            steps: Vec::new(),
            server_handle: None,
        })
    }

    /// Expect the client to send exactly `request`, then reply with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.steps.push(Step::Expect {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Send `data` without waiting for a request.
    pub fn send(&mut self, data: &[u8]) {
        self.steps.push(Step::Send(data.to_vec()));
    }

    /// Keep the connection open but silent for `duration`.
    pub fn stall(&mut self, duration: Duration) {
        self.steps.push(Step::Stall(duration));
    }

    /// Close the connection at this point of the script.
    pub fn close(&mut self) {
        self.steps.push(Step::Close);
    }

    /// Wait for the client to hang up without sending anything.
    pub fn expect_close(&mut self) {
        self.steps.push(Step::ExpectClose);
    }

    /// Get the address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the server: accept one client and play the script.
    ///
    /// Calling `start` more than once has no effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let steps = std::mem::take(&mut self.steps);

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            tracing::debug!(peer = %peer, steps = steps.len(), "mock server accepted client");

            for (i, step) in steps.into_iter().enumerate() {
                match run_step(&mut stream, step).await {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(e) => return Err(format!("step {i}: {e}")),
                }
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to finish and return any script failure.
    ///
    /// Call this after the client is done to verify every step was met.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?
        } else {
            Ok(())
        }
    }
}

/// Run one step. Returns `Ok(false)` when the connection has been closed.
async fn run_step(stream: &mut TcpStream, step: Step) -> std::result::Result<bool, String> {
    match step {
        Step::Expect { request, response } => {
            let mut buf = vec![0u8; request.len()];
            let mut total_read = 0;

            while total_read < request.len() {
                let n = stream
                    .read(&mut buf[total_read..])
                    .await
                    .map_err(|e| format!("read error: {e}"))?;
                if n == 0 {
                    return Err(format!(
                        "client disconnected after {} bytes (expected {})",
                        total_read,
                        request.len()
                    ));
                }
                total_read += n;
            }

            if buf != request {
                return Err(format!(
                    "request mismatch: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&request),
                    String::from_utf8_lossy(&buf)
                ));
            }

            write_all(stream, &response).await?;
            Ok(true)
        }
        Step::Send(data) => {
            write_all(stream, &data).await?;
            Ok(true)
        }
        Step::Stall(duration) => {
            tokio::time::sleep(duration).await;
            Ok(true)
        }
        Step::Close => {
            let _ = stream.shutdown().await;
            Ok(false)
        }
        Step::ExpectClose => {
            let mut buf = [0u8; 64];
            match stream.read(&mut buf).await {
                Ok(0) => Ok(false),
                Ok(n) => Err(format!(
                    "expected client to close, got {:?}",
                    String::from_utf8_lossy(&buf[..n])
                )),
                // A reset is also a hang-up.
                Err(_) => Ok(false),
            }
        }
    }
}

async fn write_all(stream: &mut TcpStream, data: &[u8]) -> std::result::Result<(), String> {
    stream
        .write_all(data)
        .await
        .map_err(|e| format!("write error: {e}"))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("flush error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_scripted_exchange() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"*IDN?\n", b"AGILENT,TEST,0,1.0\n");
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"*IDN?\n").await.unwrap();
        let mut buf = [0u8; 19];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AGILENT,TEST,0,1.0\n");

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_request_mismatch() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"*IDN?\n", b"X\n");
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"*RST?\n").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "{err}");
    }

    #[tokio::test]
    async fn expect_close_detects_hangup() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_close();
        server.start();

        let client = TcpStream::connect(("127.0.0.1", server.port())).await.unwrap();
        drop(client);

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn expect_close_rejects_data() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_close();
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"DCL\n").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("expected client to close"), "{err}");
    }

    #[tokio::test]
    async fn send_and_close_steps() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.send(b"#13ABC");
        server.close();
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"#13ABC");

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_without_start_is_ok() {
        let server = MockTcpServer::new().await.unwrap();
        server.wait().await.unwrap();
    }
}
