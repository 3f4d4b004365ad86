//! lanio-core: error definitions, endpoints, and the transport trait.
//!
//! This crate defines the abstractions shared by the socket layer
//! (`lanio-transport`) and the protocol layer (`lanio-scpi`). Applications
//! that only need to branch on failures depend on these types without
//! pulling in tokio networking.
//!
//! # Key types
//!
//! - [`Transport`] -- timeout-bounded byte-level communication channel
//! - [`Endpoint`] -- validated host/port pair
//! - [`Error`] / [`Result`] -- error handling, with [`ErrorKind`],
//!   [`ErrorDomain`] and numeric codes for UI layers

pub mod endpoint;
pub mod error;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::{Cause, Error, ErrorDomain, ErrorKind, Result};
pub use transport::Transport;
