//! # lanio -- I/O for LAN Test-and-Measurement Instruments
//!
//! `lanio` talks to bench instruments (oscilloscopes, multimeters, signal
//! generators) that expose a raw SCPI socket over TCP/IP. Every operation is
//! bounded by an explicit timeout, partial transfers are reported alongside
//! failures, and a device clear can be sent over a second socket without
//! disturbing the session.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lanio::ClientBuilder;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = ClientBuilder::new()
//!         .scan_timeout(Duration::from_secs(2))
//!         .connect("192.168.1.20", 5025)
//!         .await?;
//!
//!     println!("{}", client.query("*IDN?").await?);
//!
//!     client.print(":WAV:DATA?", true).await?;
//!     let waveform = client.scan_definite_blocks(1).await.into_result()?;
//!     println!("{} bytes of waveform data", waveform[0].len());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate              | Purpose                                              |
//! |--------------------|------------------------------------------------------|
//! | `lanio-core`       | [`Transport`] trait, [`Endpoint`], errors            |
//! | `lanio-transport`  | [`TcpTransport`](transport::TcpTransport): timeout-bounded TCP |
//! | `lanio-scpi`       | [`InstrumentClient`], framing, [`ClientBuilder`]     |
//! | **`lanio`**        | This facade crate -- re-exports everything           |
//!
//! ## Errors
//!
//! Every fallible call returns [`Result`]. An [`Error`] carries an
//! [`ErrorKind`], a domain tag ([`ErrorDomain`]) and a numeric code, so a UI
//! can branch on failures without knowing socket details.

pub use lanio_core::*;

/// Timeout-bounded TCP transport.
pub mod transport {
    pub use lanio_transport::*;
}

/// SCPI framing and the instrument client.
pub mod scpi {
    pub use lanio_scpi::*;
}

pub use lanio_scpi::{BlockScan, ClientBuilder, ClientOptions, InstrumentClient};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_exposes_client_and_errors() {
        let client = ClientBuilder::new().device_clear_port(5001).build();
        assert!(!client.is_connected());
        assert_eq!(client.options().device_clear_port, 5001);

        let err = Endpoint::new("", 5025).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFormat);
        assert_eq!(err.domain(), ErrorDomain::Instrument);
        assert_eq!(transport::DEFAULT_CONNECT_TIMEOUT.as_secs(), 5);
        assert_eq!(scpi::protocol::DEFAULT_NEWLINE, "\n");
    }
}
