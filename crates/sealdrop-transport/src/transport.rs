//! Connection trait and transport error types.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Outbound connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Listener could not be bound
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Peer closed the connection, or it was closed locally
    #[error("Connection closed")]
    Closed,

    /// Frame exceeds the maximum allowed size
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// No frame arrived within the configured receive timeout
    #[error("Receive timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Per-connection traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Frames received
    pub frames_received: u64,
}

impl TransportStats {
    pub(crate) fn record_send(&mut self, len: usize) {
        self.bytes_sent += len as u64;
        self.frames_sent += 1;
    }

    pub(crate) fn record_recv(&mut self, len: usize) {
        self.bytes_received += len as u64;
        self.frames_received += 1;
    }
}

/// Bidirectional, ordered, reliable frame connection to exactly one peer.
///
/// Both calls suspend the caller: `send_frame` until the frame is handed to
/// the connection, `recv_frame` until a whole frame has arrived or the
/// connection fails.
#[async_trait]
pub trait Connection: Send {
    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the connection is closed, or an
    /// I/O error if delivery fails.
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()>;

    /// Receive the next frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` when the peer has closed the
    /// connection at a frame boundary.
    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>>;

    /// Close the connection. Closing twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an orderly shutdown fails.
    async fn close(&mut self) -> TransportResult<()>;

    /// Remote address, if the connection has one.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Traffic counters.
    fn stats(&self) -> TransportStats;
}
