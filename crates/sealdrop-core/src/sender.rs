//! Sending side of a transfer.
//!
//! ```text
//! Sender                                Receiver
//!    |-- Start{name, wrapped key, C} ------>|
//!    |<------------------------- Ack{0} ----|
//!    |-- Chunk{0, E(k, p0), crc(p0)} ------>|
//!    |<------------------------- Ack{1} ----|
//!    |   ...                                |
//!    |-- Chunk{n-1, ...} ------------------>|
//!    |<------------------------- Ack{n} ----|
//!    |-- Disconnect ----------------------->|
//! ```
//!
//! Stop-and-wait: at most one chunk is in flight. Any acknowledgment other
//! than the one expected aborts the session; nothing is retransmitted.

use crate::channel::MessageChannel;
use crate::error::{Result, SessionError};
use crate::message::{ACK_REJECT, Message};
use sealdrop_crypto::{PublicKey, SessionKey, encrypt_block, wrap};
use sealdrop_files::{Digest128, FileChunker, FileDigest, MAX_CHUNK_SIZE, checksum};
use sealdrop_transport::{Connection, TransportStats};
use std::path::Path;

/// Sender state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing sent yet
    Idle,
    /// `Start` sent, waiting for `Ack{0}`
    KeyExchangeSent,
    /// Handshake accepted, sending chunks
    Streaming,
    /// Every chunk acknowledged and `Disconnect` sent
    Completed,
    /// Transfer failed or was stopped
    Aborted,
}

impl SenderState {
    /// Whether the session can make no further progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Snapshot passed to the progress callback after each acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Chunks acknowledged so far
    pub chunks_acked: u32,
    /// Total chunks in the file
    pub total_chunks: u32,
    /// Plaintext bytes acknowledged so far
    pub bytes_acked: u64,
    /// Total plaintext bytes
    pub total_bytes: u64,
}

/// Result of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Name announced to the receiver
    pub file_name: String,
    /// Plaintext size in bytes
    pub file_size: u64,
    /// Number of chunks sent
    pub chunk_count: u32,
    /// Digest of the plaintext that was read
    pub digest: Digest128,
    /// Traffic on the connection, `Disconnect` included
    pub transport: TransportStats,
}

type ProgressFn = Box<dyn FnMut(&TransferProgress) + Send>;

/// Drives one transfer from the sending side.
pub struct SenderSession<C> {
    channel: MessageChannel<C>,
    public_key: PublicKey,
    state: SenderState,
    session_key: Option<SessionKey>,
    next_sequence: u32,
    progress: Option<ProgressFn>,
}

impl<C: Connection> SenderSession<C> {
    /// Create a session that wraps its key to `public_key`.
    pub fn new(channel: MessageChannel<C>, public_key: PublicKey) -> Self {
        Self {
            channel,
            public_key,
            state: SenderState::Idle,
            session_key: None,
            next_sequence: 0,
            progress: None,
        }
    }

    /// Call `f` after every acknowledged chunk.
    #[must_use]
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: FnMut(&TransferProgress) + Send + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Sequence number of the next chunk to send.
    #[must_use]
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Mutably borrow the message channel.
    pub fn channel_mut(&mut self) -> &mut MessageChannel<C> {
        &mut self.channel
    }

    /// Send the file at `path` in chunks of `chunk_size` bytes.
    ///
    /// Runs the whole session: handshake, chunk loop and completion. Only the
    /// final path component is announced as the file name.
    ///
    /// # Errors
    ///
    /// Any failure leaves the session `Aborted`: the receiver rejected the
    /// handshake, acknowledged an unexpected sequence, the connection failed
    /// or timed out, or the file could not be read.
    pub async fn send_file(&mut self, path: impl AsRef<Path>, chunk_size: u32) -> Result<TransferReport> {
        self.expect_state(SenderState::Idle)?;
        let result = self.send_file_inner(path.as_ref(), chunk_size).await;
        if let Err(ref e) = result {
            tracing::error!("Transfer aborted: {}", e);
            self.state = SenderState::Aborted;
        }
        result
    }

    async fn send_file_inner(&mut self, path: &Path, chunk_size: u32) -> Result<TransferReport> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(SessionError::InvalidStart(format!(
                "chunk size {chunk_size} outside 1..={MAX_CHUNK_SIZE}"
            )));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SessionError::InvalidStart(format!("{} has no UTF-8 file name", path.display()))
            })?
            .to_string();

        let mut chunker = FileChunker::new(path, chunk_size)?;
        let file_size = chunker.total_size();
        let total_chunks = match u32::try_from(chunker.num_chunks()) {
            Ok(n) if n <= i32::MAX as u32 => n,
            _ => {
                return Err(SessionError::FileTooLarge {
                    chunks: chunker.num_chunks(),
                });
            }
        };

        tracing::info!(
            "Sending {} ({} bytes, {} chunks of {} bytes)",
            file_name,
            file_size,
            total_chunks,
            chunk_size
        );

        self.handshake(&file_name, file_size, chunk_size).await?;

        let mut digest = FileDigest::new();
        while let Some(plaintext) = chunker.read_chunk()? {
            self.send_chunk(&plaintext).await?;
            digest.update(&plaintext);

            if let Some(progress) = self.progress.as_mut() {
                progress(&TransferProgress {
                    chunks_acked: self.next_sequence,
                    total_chunks,
                    bytes_acked: digest.bytes_digested(),
                    total_bytes: file_size,
                });
            }
        }

        if self.next_sequence != total_chunks {
            return Err(SessionError::InvalidState(format!(
                "file changed while sending: {} of {} chunks read",
                self.next_sequence, total_chunks
            )));
        }

        let digest = digest.finalize();
        self.finish().await?;
        let transport = self.channel.stats();
        tracing::info!(
            "Transfer of {} complete ({} bytes on the wire), digest {}",
            file_name,
            transport.bytes_sent,
            digest
        );

        Ok(TransferReport {
            file_name,
            file_size,
            chunk_count: total_chunks,
            digest,
            transport,
        })
    }

    /// Generate and wrap a session key, send `Start` and wait for `Ack{0}`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::HandshakeRejected` for any answer other than
    /// `Ack{0}`; the session is then `Aborted`.
    pub async fn handshake(&mut self, file_name: &str, file_size: u64, chunk_size: u32) -> Result<()> {
        self.expect_state(SenderState::Idle)?;
        let result = self.handshake_inner(file_name, file_size, chunk_size).await;
        self.abort_on_error(result)
    }

    async fn handshake_inner(&mut self, file_name: &str, file_size: u64, chunk_size: u32) -> Result<()> {
        let key = SessionKey::generate();
        let wrapped_key = wrap(&key, &self.public_key)?;

        self.channel
            .send(&Message::Start {
                file_name: file_name.to_string(),
                wrapped_key,
                chunk_size,
                file_size,
            })
            .await?;
        self.state = SenderState::KeyExchangeSent;
        tracing::debug!("Start sent for {}, awaiting Ack{{0}}", file_name);

        match self.channel.receive().await? {
            Message::Ack { next_expected: 0 } => {
                self.session_key = Some(key);
                self.state = SenderState::Streaming;
                tracing::debug!("Handshake accepted");
                Ok(())
            }
            Message::Ack { next_expected } => Err(SessionError::HandshakeRejected(format!(
                "receiver answered Ack{{{next_expected}}}"
            ))),
            other => Err(SessionError::HandshakeRejected(format!(
                "receiver answered {:?}",
                other.tag()
            ))),
        }
    }

    /// Encrypt and send the next chunk, then wait for its acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AckMismatch` if the receiver acknowledges
    /// anything but the next sequence number; the session is then `Aborted`.
    pub async fn send_chunk(&mut self, plaintext: &[u8]) -> Result<()> {
        self.expect_state(SenderState::Streaming)?;
        let result = self.send_chunk_inner(plaintext).await;
        self.abort_on_error(result)
    }

    async fn send_chunk_inner(&mut self, plaintext: &[u8]) -> Result<()> {
        let sequence = self.next_sequence;
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no session key".into()))?;

        let crc = checksum(plaintext);
        let ciphertext = encrypt_block(key, plaintext)?;
        self.channel
            .send(&Message::Chunk {
                sequence,
                ciphertext,
                checksum: crc,
            })
            .await?;

        let expected = i64::from(sequence) + 1;
        match self.channel.receive().await? {
            Message::Ack { next_expected } if i64::from(next_expected) == expected => {
                self.next_sequence += 1;
                tracing::debug!("Chunk {} acknowledged", sequence);
                Ok(())
            }
            Message::Ack { next_expected } => Err(SessionError::AckMismatch {
                expected,
                actual: next_expected,
            }),
            _ => Err(SessionError::UnexpectedMessage("non-Ack reply to chunk")),
        }
    }

    /// Mark the transfer complete and send `Disconnect`.
    ///
    /// The receiver may already have closed its end after the last
    /// acknowledgment, so a failed `Disconnect` does not fail the transfer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Streaming`.
    pub async fn finish(&mut self) -> Result<()> {
        self.expect_state(SenderState::Streaming)?;
        self.state = SenderState::Completed;
        self.session_key = None;

        if let Err(e) = self.channel.send(&Message::Disconnect).await {
            tracing::debug!("Disconnect not delivered: {}", e);
        }
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Close after completion failed: {}", e);
        }
        Ok(())
    }

    /// Ask the receiver to stop and wait for its `Ack{-1}`.
    ///
    /// The session ends `Aborted` either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop could not be delivered or was answered
    /// with anything but `Ack{-1}`.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state.is_terminal() || self.state == SenderState::Idle {
            return Err(SessionError::InvalidState(format!(
                "cannot stop in state {:?}",
                self.state
            )));
        }
        self.state = SenderState::Aborted;
        self.session_key = None;

        self.channel.send(&Message::Stop).await?;
        let reply = self.channel.receive().await;
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Close after stop failed: {}", e);
        }

        match reply? {
            Message::Ack {
                next_expected: ACK_REJECT,
            } => {
                tracing::info!("Transfer stopped at chunk {}", self.next_sequence);
                Ok(())
            }
            Message::Ack { next_expected } => Err(SessionError::AckMismatch {
                expected: i64::from(ACK_REJECT),
                actual: next_expected,
            }),
            _ => Err(SessionError::UnexpectedMessage("non-Ack reply to stop")),
        }
    }

    fn expect_state(&self, expected: SenderState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState(format!(
                "expected {:?}, session is {:?}",
                expected, self.state
            )))
        }
    }

    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = SenderState::Aborted;
            self.session_key = None;
        }
        result
    }
}
