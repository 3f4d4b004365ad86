//! InstrumentClient -- command/response session with one LAN instrument.
//!
//! The client owns at most one primary [`Transport`] connection and layers
//! SCPI-style framing on top of it: newline-terminated text commands and
//! responses, synchronous queries, definite-length binary blocks, and the
//! out-of-band device clear issued over a short-lived second socket.
//!
//! Every operation that needs the primary connection fails with
//! [`Error::NotConnected`] while the client is disconnected. Transport
//! errors are forwarded with their original kind. A timeout leaves the
//! connection open so the caller may retry; a peer close or hard socket
//! error drops it.
//!
//! # Example
//!
//! ```no_run
//! use lanio_scpi::InstrumentClient;
//!
//! # async fn example() -> lanio_core::Result<()> {
//! let mut client = InstrumentClient::default();
//! client.open("192.168.1.20", 5025).await?;
//!
//! let idn = client.query("*IDN?").await?;
//! println!("connected to {idn}");
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use lanio_core::endpoint::Endpoint;
use lanio_core::error::{Error, Result};
use lanio_core::transport::Transport;
use lanio_transport::TcpTransport;
use tracing::{debug, info, trace, warn};

use crate::protocol::{
    self, HEADER_MARKER, MAX_LEADING_WHITESPACE, encode_line, parse_block_length,
    parse_digit_count, trim_terminator,
};

/// Timeouts and framing settings for an [`InstrumentClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Budget for establishing the primary and device-clear connections.
    pub connect_timeout: Duration,
    /// Budget for each write.
    pub print_timeout: Duration,
    /// Budget for each read.
    pub scan_timeout: Duration,
    /// Token that ends text commands and responses.
    pub newline: String,
    /// Port on the instrument host that triggers a device clear.
    pub device_clear_port: u16,
    /// Longest text response accepted before the read fails.
    pub max_line_len: usize,
    /// Largest definite-length block payload accepted.
    pub max_block_len: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            connect_timeout: Duration::from_secs(5),
            print_timeout: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(5),
            newline: protocol::DEFAULT_NEWLINE.to_string(),
            device_clear_port: 5000,
            max_line_len: 1024 * 1024,
            max_block_len: 256 * 1024 * 1024,
        }
    }
}

/// Outcome of [`InstrumentClient::scan_definite_blocks`].
///
/// Blocks that were read completely are kept even when a later block
/// fails, so the caller can decide whether a partial result is usable.
#[derive(Debug)]
pub struct BlockScan {
    /// Payloads of the blocks read, in arrival order.
    pub blocks: Vec<Vec<u8>>,
    /// The error that stopped the scan early, if any.
    pub failure: Option<Error>,
}

impl BlockScan {
    /// Number of blocks read completely.
    pub fn blocks_read(&self) -> usize {
        self.blocks.len()
    }

    /// Payload size of each block read.
    pub fn sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(Vec::len).collect()
    }

    /// Whether every requested block was read.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Discard partial results, returning the blocks only on full success.
    pub fn into_result(self) -> Result<Vec<Vec<u8>>> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.blocks),
        }
    }
}

/// A command/response session with one instrument.
///
/// Construct with [`InstrumentClient::new`] (or
/// [`ClientBuilder`](crate::builder::ClientBuilder)) and call
/// [`open`](InstrumentClient::open), or attach an existing transport with
/// [`with_transport`](InstrumentClient::with_transport).
///
/// The remembered endpoint is kept separately from the connected flag: it
/// survives [`close`](InstrumentClient::close) and is only replaced by a
/// later successful `open`.
pub struct InstrumentClient {
    transport: Option<Box<dyn Transport>>,
    options: ClientOptions,
    connected: bool,
    endpoint: Option<Endpoint>,
}

impl InstrumentClient {
    /// Create a disconnected client.
    pub fn new(options: ClientOptions) -> Self {
        InstrumentClient {
            transport: None,
            options,
            connected: false,
            endpoint: None,
        }
    }

    /// Attach an already-open transport.
    ///
    /// `endpoint` is remembered as if `open` had succeeded against it, so
    /// [`device_clear`](Self::device_clear) targets its host.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        endpoint: Endpoint,
        options: ClientOptions,
    ) -> Self {
        let connected = transport.is_connected();
        InstrumentClient {
            transport: connected.then_some(transport),
            options,
            connected,
            endpoint: Some(endpoint),
        }
    }

    /// Connect to `address:port`, closing any connection already open.
    ///
    /// The address and port are validated before a socket is created; a
    /// malformed pair fails with [`Error::BadFormat`]. On failure the client
    /// is left disconnected and the previously remembered endpoint is kept.
    pub async fn open(&mut self, address: &str, port: u16) -> Result<()> {
        let endpoint = Endpoint::new(address, port)?;

        if self.transport.is_some() {
            debug!(endpoint = ?self.endpoint, "closing existing connection before reopening");
            if let Err(e) = self.close().await {
                warn!(error = %e, "error closing previous connection");
            }
        }

        let transport =
            TcpTransport::open_endpoint(&endpoint, self.options.connect_timeout).await?;

        info!(addr = %endpoint, "instrument connected");
        self.transport = Some(Box::new(transport));
        self.connected = true;
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Close the primary connection.
    ///
    /// The client is disconnected afterwards whatever the transport reports.
    /// Closing a disconnected client succeeds.
    pub async fn close(&mut self) -> Result<()> {
        self.connected = false;
        match self.transport.take() {
            Some(mut transport) => {
                debug!(endpoint = ?self.endpoint, "closing instrument connection");
                transport.close().await
            }
            None => Ok(()),
        }
    }

    /// Send `message`, followed by the newline token if `append_newline`.
    pub async fn print(&mut self, message: &str, append_newline: bool) -> Result<()> {
        let newline = append_newline.then_some(self.options.newline.as_str());
        let bytes = encode_line(message, newline);
        trace!(message, append_newline, "print");
        self.print_buffer(&bytes).await
    }

    /// Send raw bytes without any framing.
    pub async fn print_buffer(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.options.print_timeout;
        let transport = live(&mut self.transport, self.connected)?;
        let result = transport.write_buffer(data, timeout).await;
        self.settle(result)
    }

    /// Read one text response, up to and including the newline token.
    ///
    /// With `trim_newline` the token is stripped from the result. Bytes that
    /// are not valid UTF-8 are replaced with U+FFFD.
    pub async fn scan(&mut self, trim_newline: bool) -> Result<String> {
        let mut line = Vec::new();
        self.scan_line(&mut line).await?;

        let text = if trim_newline {
            trim_terminator(&line, self.options.newline.as_bytes())
        } else {
            &line
        };
        let response = String::from_utf8_lossy(text).into_owned();
        trace!(response = %response, "scan");
        Ok(response)
    }

    /// Read one raw response line into `line`, terminator included.
    ///
    /// On failure `line` holds whatever arrived before the error.
    pub async fn scan_line(&mut self, line: &mut Vec<u8>) -> Result<()> {
        let transport = live(&mut self.transport, self.connected)?;
        let result = transport
            .read_line(
                line,
                self.options.newline.as_bytes(),
                self.options.max_line_len,
                self.options.scan_timeout,
            )
            .await;
        self.settle(result)
    }

    /// Fill `buf` with raw bytes, bypassing line framing.
    ///
    /// On failure the error's [`bytes_transferred`](Error::bytes_transferred)
    /// tells how much of `buf` is valid.
    pub async fn scan_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        let timeout = self.options.scan_timeout;
        let transport = live(&mut self.transport, self.connected)?;
        let result = transport.read_buffer(buf, timeout).await;
        self.settle(result)
    }

    /// Read `count` consecutive definite-length blocks.
    ///
    /// Each block's header is read first to learn the payload length, then
    /// exactly that many bytes are read. Whitespace left over from a previous
    /// response may precede a header. The scan stops at the first read
    /// failure or malformed header and keeps the blocks read so far.
    pub async fn scan_definite_blocks(&mut self, count: usize) -> BlockScan {
        // `count` comes from the caller unchecked; do not trust it for allocation.
        let mut blocks = Vec::with_capacity(count.min(64));
        let timeout = self.options.scan_timeout;
        let max_block_len = self.options.max_block_len;

        let transport = match live(&mut self.transport, self.connected) {
            Ok(transport) => transport,
            Err(e) => {
                return BlockScan {
                    blocks,
                    failure: Some(e),
                };
            }
        };

        let mut failure = None;
        for index in 0..count {
            match read_block(transport.as_mut(), timeout, max_block_len).await {
                Ok(payload) => {
                    trace!(index, bytes = payload.len(), "definite block read");
                    blocks.push(payload);
                }
                Err(e) => {
                    warn!(index, requested = count, error = %e, "definite block scan stopped");
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_some() {
            self.drop_if_unusable();
        }
        BlockScan { blocks, failure }
    }

    /// Send `query` with a newline and read back the trimmed response.
    ///
    /// If the write fails no read is attempted.
    pub async fn query(&mut self, query: &str) -> Result<String> {
        self.print(query, true).await?;
        self.scan(true).await
    }

    /// Ask the instrument which port it uses for device clear and
    /// remember the answer.
    ///
    /// A reply that is not a TCP port fails with [`Error::BadFormat`] and
    /// leaves the configured port unchanged.
    pub async fn query_device_clear_port(&mut self, query: &str) -> Result<u16> {
        let reply = self.query(query).await?;
        let port = protocol::parse_port(&reply)?;
        debug!(port, "device clear port reported by instrument");
        self.options.device_clear_port = port;
        Ok(port)
    }

    /// Signal a device clear by connecting to the clear port on the
    /// instrument host and closing again at once.
    ///
    /// Requires an open primary connection, which is left untouched.
    pub async fn device_clear(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let endpoint = self.endpoint.as_ref().ok_or(Error::NotConnected)?;
        let target = endpoint.with_port(self.options.device_clear_port)?;

        debug!(addr = %target, "sending device clear");
        let mut secondary =
            TcpTransport::open_endpoint(&target, self.options.connect_timeout).await?;
        secondary.close().await?;
        info!(addr = %target, "device clear sent");
        Ok(())
    }

    /// Whether the primary connection is open.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The endpoint of the last successful open.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Current settings.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The newline token.
    pub fn newline(&self) -> &str {
        &self.options.newline
    }

    /// Change the newline token used by subsequent prints and scans.
    pub fn set_newline(&mut self, newline: impl Into<String>) {
        self.options.newline = newline.into();
    }

    /// Change the connect timeout, which also bounds device clear.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.options.connect_timeout = timeout;
    }

    /// Change the budget for each write.
    pub fn set_print_timeout(&mut self, timeout: Duration) {
        self.options.print_timeout = timeout;
    }

    /// Change the budget for each read.
    pub fn set_scan_timeout(&mut self, timeout: Duration) {
        self.options.scan_timeout = timeout;
    }

    /// Change the port used by [`device_clear`](Self::device_clear).
    pub fn set_device_clear_port(&mut self, port: u16) {
        self.options.device_clear_port = port;
    }

    /// Pass `result` through, disconnecting if the transport died.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.drop_if_unusable();
        }
        result
    }

    fn drop_if_unusable(&mut self) {
        if self.transport.as_ref().is_some_and(|t| !t.is_connected()) {
            warn!(endpoint = ?self.endpoint, "instrument connection lost");
            self.transport = None;
            self.connected = false;
        }
    }
}

impl Default for InstrumentClient {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

/// The primary transport, if the client is connected.
fn live(
    transport: &mut Option<Box<dyn Transport>>,
    connected: bool,
) -> Result<&mut Box<dyn Transport>> {
    match transport {
        Some(transport) if connected => Ok(transport),
        _ => Err(Error::NotConnected),
    }
}

/// Read one definite-length block: header, then exactly the payload.
async fn read_block(
    transport: &mut dyn Transport,
    timeout: Duration,
    max_block_len: usize,
) -> Result<Vec<u8>> {
    let mut byte = [0u8; 1];

    let mut skipped = 0;
    loop {
        transport.read_buffer(&mut byte, timeout).await?;
        match byte[0] {
            HEADER_MARKER => break,
            b if protocol::is_leading_whitespace(b) && skipped < MAX_LEADING_WHITESPACE => {
                skipped += 1;
            }
            b => {
                return Err(Error::BadFormat(format!(
                    "expected block header '#', got 0x{b:02X}"
                )));
            }
        }
    }

    transport.read_buffer(&mut byte, timeout).await?;
    let digits = parse_digit_count(byte[0])?;

    let mut field = [0u8; 9];
    let field = &mut field[..usize::from(digits)];
    transport.read_buffer(field, timeout).await?;
    let length = parse_block_length(field)?;
    if length > max_block_len {
        return Err(Error::BadFormat(format!(
            "block length {length} exceeds limit of {max_block_len} bytes"
        )));
    }

    let mut payload = vec![0u8; length];
    transport.read_buffer(&mut payload, timeout).await?;
    Ok(payload)
}
