//! Message-level view of a transport connection.

use crate::error::Result;
use crate::message::Message;
use sealdrop_transport::{Connection, TransportError, TransportStats};
use std::time::Duration;

/// Sends and receives whole [`Message`]s over a [`Connection`].
///
/// With a receive timeout set, a peer that stays silent for longer than the
/// timeout fails the receive with `TransportError::Timeout`; without one,
/// `receive` waits indefinitely.
pub struct MessageChannel<C> {
    conn: C,
    recv_timeout: Option<Duration>,
}

impl<C: Connection> MessageChannel<C> {
    /// Wrap a connection with no receive timeout.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            recv_timeout: None,
        }
    }

    /// Set or clear the receive timeout.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Encode and send one message.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the underlying send fails.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let frame = msg.encode()?;
        self.conn.send_frame(&frame).await?;
        Ok(())
    }

    /// Receive and decode one message.
    ///
    /// # Errors
    ///
    /// Returns a transport error (including `Timeout`) or a decoding error.
    pub async fn receive(&mut self) -> Result<Message> {
        let frame = match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, self.conn.recv_frame())
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => self.conn.recv_frame().await?,
        };
        Ok(Message::decode(&frame)?)
    }

    /// Close the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the orderly shutdown fails.
    pub async fn close(&mut self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }

    /// Traffic counters of the underlying connection.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        self.conn.stats()
    }

    #[cfg(test)]
    pub(crate) fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}
