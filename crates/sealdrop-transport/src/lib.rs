//! # sealdrop Transport
//!
//! Network transport layer for the sealdrop protocol.
//!
//! This crate provides:
//! - [`Connection`] trait: ordered, reliable frame delivery between two peers
//! - TCP connections with length-prefixed framing
//! - In-memory connection pairs for in-process peers and tests
//!
//! The protocol above never retransmits; it relies on the connection to
//! deliver every frame exactly once and in order, or to fail.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod tcp;
pub mod transport;

pub use memory::MemoryConnection;
pub use tcp::{TcpAcceptor, TcpConnection};
pub use transport::{Connection, TransportError, TransportResult, TransportStats};

/// Maximum frame size accepted on any connection (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
