//! lanio-test-harness: Mock transports and scripted TCP peers for lanio.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the instrument protocol without a socket, and [`MockTcpServer`] for
//! exercising the TCP transport and client against a real loopback peer.

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::MockTransport;
