//! Transport implementations for lanio.
//!
//! This crate provides [`TcpTransport`], the concrete implementation of the
//! [`Transport`](lanio_core::Transport) trait from `lanio-core` for
//! instruments reachable over TCP/IP.
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
//! transport.write_buffer(b"*RST\n", Duration::from_secs(1)).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpTransport};
