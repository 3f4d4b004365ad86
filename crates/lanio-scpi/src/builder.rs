//! ClientBuilder -- fluent builder for constructing [`InstrumentClient`]
//! instances.
//!
//! Separates configuration from construction so that callers can set
//! timeouts, the newline token, and the device-clear port before the
//! connection is established.
//!
//! # Example
//!
//! ```no_run
//! use lanio_scpi::ClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> lanio_core::Result<()> {
//! let mut client = ClientBuilder::new()
//!     .connect_timeout(Duration::from_secs(2))
//!     .scan_timeout(Duration::from_secs(10))
//!     .device_clear_port(5000)
//!     .connect("192.168.1.20", 5025)
//!     .await?;
//!
//! let idn = client.query("*IDN?").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use lanio_core::endpoint::Endpoint;
use lanio_core::error::Result;
use lanio_core::transport::Transport;

use crate::client::{ClientOptions, InstrumentClient};

/// Fluent builder for [`InstrumentClient`].
///
/// Every setting defaults to [`ClientOptions::default()`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    options: ClientOptions,
}

impl ClientBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options.
    pub fn from_options(options: ClientOptions) -> Self {
        ClientBuilder { options }
    }

    /// Set the connect timeout (default: 5s). Also bounds device clear.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Set the write timeout (default: 5s).
    pub fn print_timeout(mut self, timeout: Duration) -> Self {
        self.options.print_timeout = timeout;
        self
    }

    /// Set the read timeout (default: 5s).
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.options.scan_timeout = timeout;
        self
    }

    /// Set both the write and the read timeout.
    pub fn io_timeout(self, timeout: Duration) -> Self {
        self.print_timeout(timeout).scan_timeout(timeout)
    }

    /// Set the newline token (default: `"\n"`).
    pub fn newline(mut self, newline: &str) -> Self {
        self.options.newline = newline.to_string();
        self
    }

    /// Set the device-clear port (default: 5000).
    pub fn device_clear_port(mut self, port: u16) -> Self {
        self.options.device_clear_port = port;
        self
    }

    /// Set the longest accepted text response (default: 1 MiB).
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.options.max_line_len = len;
        self
    }

    /// Set the largest accepted definite-length block (default: 256 MiB).
    pub fn max_block_len(mut self, len: usize) -> Self {
        self.options.max_block_len = len;
        self
    }

    /// The options configured so far.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Build a disconnected client.
    pub fn build(self) -> InstrumentClient {
        InstrumentClient::new(self.options)
    }

    /// Build a client and open it against `address:port`.
    pub async fn connect(self, address: &str, port: u16) -> Result<InstrumentClient> {
        let mut client = self.build();
        client.open(address, port).await?;
        Ok(client)
    }

    /// Build a client around an already-open transport.
    ///
    /// Primarily useful for testing with a mock transport.
    pub fn build_with_transport(
        self,
        transport: Box<dyn Transport>,
        endpoint: Endpoint,
    ) -> InstrumentClient {
        InstrumentClient::with_transport(transport, endpoint, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanio_core::error::ErrorKind;
    use lanio_test_harness::{MockTcpServer, MockTransport};

    #[test]
    fn defaults() {
        let builder = ClientBuilder::new();
        let options = builder.options();
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.print_timeout, Duration::from_secs(5));
        assert_eq!(options.scan_timeout, Duration::from_secs(5));
        assert_eq!(options.newline, "\n");
        assert_eq!(options.device_clear_port, 5000);
        assert_eq!(options.max_line_len, 1024 * 1024);
    }

    #[test]
    fn setters_chain() {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_millis(750))
            .io_timeout(Duration::from_millis(250))
            .newline("\r\n")
            .device_clear_port(5001)
            .max_line_len(4096)
            .build();

        let options = client.options();
        assert_eq!(options.connect_timeout, Duration::from_millis(750));
        assert_eq!(options.print_timeout, Duration::from_millis(250));
        assert_eq!(options.scan_timeout, Duration::from_millis(250));
        assert_eq!(options.newline, "\r\n");
        assert_eq!(options.device_clear_port, 5001);
        assert_eq!(options.max_line_len, 4096);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn build_with_mock_transport() {
        let mut mock = MockTransport::new();
        mock.expect(b"*OPC?\r\n", b"1\r\n");

        let mut client = ClientBuilder::new()
            .newline("\r\n")
            .build_with_transport(
                Box::new(mock),
                Endpoint::new("10.0.0.5", 5025).unwrap(),
            );

        assert!(client.is_connected());
        assert_eq!(client.query("*OPC?").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn connect_opens_client() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"*IDN?\n", b"AGILENT,TEST,0,1.0\n");
        server.start();

        let mut client = ClientBuilder::new()
            .connect("127.0.0.1", server.port())
            .await
            .unwrap();
        assert_eq!(client.query("*IDN?").await.unwrap(), "AGILENT,TEST,0,1.0");

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn connect_propagates_bad_format() {
        let err = ClientBuilder::new().connect("   ", 5025).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BadFormat);
    }
}
