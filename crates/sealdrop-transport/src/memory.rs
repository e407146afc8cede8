//! In-memory connections.
//!
//! [`MemoryConnection::pair`] returns two connected ends backed by unbounded
//! tokio channels. Delivery is ordered and lossless; closing one end makes
//! the other end's `recv_frame` return `TransportError::Closed` once every
//! frame already sent has been drained.

use crate::MAX_FRAME_SIZE;
use crate::transport::{Connection, TransportError, TransportResult, TransportStats};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// One end of an in-process connection.
pub struct MemoryConnection {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: bool,
    stats: TransportStats,
}

impl MemoryConnection {
    /// Create two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Vec<u8>>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx,
            closed: false,
            stats: TransportStats::default(),
        }
    }

    /// Take the next frame if one is already queued, without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the peer is gone and nothing is queued.
    pub fn try_recv_frame(&mut self) -> TransportResult<Option<Vec<u8>>> {
        match self.rx.try_recv() {
            Ok(frame) => {
                self.stats.record_recv(frame.len());
                Ok(Some(frame))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.to_vec()).map_err(|_| TransportError::Closed)?;
        self.stats.record_send(frame.len());
        Ok(())
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let frame = self.rx.recv().await.ok_or(TransportError::Closed)?;
        self.stats.record_recv(frame.len());
        Ok(frame)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
