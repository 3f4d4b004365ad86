//! lanio-scpi: SCPI-style command/response client for LAN instruments.
//!
//! This crate layers instrument framing on top of a byte-level
//! [`Transport`](lanio_core::Transport):
//!
//! - [`protocol`] -- newline framing and IEEE 488.2 definite-length blocks
//! - [`client`] -- [`InstrumentClient`], the open/print/scan/query/device
//!   clear session
//! - [`builder`] -- [`ClientBuilder`] for configuring timeouts and framing

pub mod builder;
pub mod client;
pub mod protocol;

pub use builder::ClientBuilder;
pub use client::{BlockScan, ClientOptions, InstrumentClient};
