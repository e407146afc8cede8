//! Receiving side of a transfer.
//!
//! The receiver accepts exactly one file per session. After a successful
//! `Start` it acknowledges each chunk whose sequence, decryption and checksum
//! all check out, and silently drops chunks whose sequence, length or
//! checksum is wrong. A chunk that fails to decrypt ends the session with
//! `Ack{-1}`. The completed file never replaces an existing one.

use crate::channel::MessageChannel;
use crate::error::{Result, SessionError};
use crate::message::Message;
use sealdrop_crypto::{PrivateKey, SessionKey, decrypt_block, unwrap};
use sealdrop_files::{
    Digest128, MAX_CHUNK_SIZE, chunk_count, checksum, sanitize_file_name, write_reassembled,
};
use sealdrop_transport::{Connection, TransportStats};
use std::path::PathBuf;
use std::sync::Arc;

/// Receiver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Waiting for `Start`
    AwaitingStart,
    /// Key accepted, receiving chunks
    Transferring,
    /// Every chunk received and the file written
    Done,
    /// Session ended without a complete file
    Aborted,
}

/// Where and how much this receiver accepts.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Directory completed files are written into
    pub output_dir: PathBuf,
    /// Largest chunk size a `Start` may declare
    pub max_chunk_size: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

/// Per-transfer bookkeeping, created once the session key is unwrapped.
///
/// `buffer` always holds exactly `expected_sequence` plaintext chunks, in
/// order, each of the length the declared layout gives it; their total never
/// exceeds `file_size`.
#[derive(Debug)]
pub struct TransferState {
    file_name: String,
    file_size: u64,
    chunk_size: u32,
    expected_sequence: u32,
    total_chunks: u32,
    session_key: Option<SessionKey>,
    accepting_chunks: bool,
    completed: bool,
    buffer: Vec<Vec<u8>>,
}

impl TransferState {
    fn new(file_name: String, file_size: u64, chunk_size: u32, total_chunks: u32, key: SessionKey) -> Self {
        Self {
            file_name,
            file_size,
            chunk_size,
            expected_sequence: 0,
            total_chunks,
            session_key: Some(key),
            accepting_chunks: true,
            completed: false,
            buffer: Vec::new(),
        }
    }

    /// Sanitized name the file will be written under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Declared plaintext size.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Declared chunk size.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Sequence number of the next chunk that will be accepted.
    pub fn expected_sequence(&self) -> u32 {
        self.expected_sequence
    }

    /// Number of chunks the file is made of.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Whether chunks are still being accepted.
    pub fn accepting_chunks(&self) -> bool {
        self.accepting_chunks
    }

    /// Whether every chunk has arrived.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Plaintext chunks accepted so far.
    pub fn buffered_chunks(&self) -> &[Vec<u8>] {
        &self.buffer
    }

    /// Plaintext length chunk `sequence` must have under the declared
    /// layout: `chunk_size` for every chunk but the last, which holds the
    /// remainder.
    #[must_use]
    pub fn expected_chunk_len(&self, sequence: u32) -> u64 {
        let chunk_size = u64::from(self.chunk_size);
        self.file_size
            .saturating_sub(u64::from(sequence) * chunk_size)
            .min(chunk_size)
    }

    fn accept(&mut self, plaintext: Vec<u8>) {
        debug_assert_eq!(self.buffer.len(), self.expected_sequence as usize);
        self.buffer.push(plaintext);
        self.expected_sequence += 1;
        if self.expected_sequence == self.total_chunks {
            self.accepting_chunks = false;
            self.completed = true;
            self.session_key = None;
        }
    }
}

/// A file written by a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Where the file was written
    pub path: PathBuf,
    /// Plaintext size in bytes
    pub file_size: u64,
    /// Number of chunks received
    pub chunk_count: u32,
    /// Digest of the reassembled plaintext
    pub digest: Digest128,
}

/// How a receive session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The whole file arrived and was written
    Completed(ReceivedFile),
    /// The sender stopped the transfer
    Stopped,
    /// The sender disconnected before completing
    Disconnected,
}

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep reading messages
    Continue,
    /// Session is over
    Finished(ReceiveOutcome),
}

/// Drives one transfer from the receiving side.
pub struct ReceiverSession<C> {
    channel: MessageChannel<C>,
    private_key: Arc<PrivateKey>,
    config: ReceiverConfig,
    state: ReceiverState,
    transfer: Option<TransferState>,
}

impl<C: Connection> ReceiverSession<C> {
    /// Create a session that unwraps session keys with `private_key`.
    pub fn new(channel: MessageChannel<C>, private_key: Arc<PrivateKey>, config: ReceiverConfig) -> Self {
        Self {
            channel,
            private_key,
            config,
            state: ReceiverState::AwaitingStart,
            transfer: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Transfer bookkeeping, present from a successful `Start` until the
    /// session is aborted.
    #[must_use]
    pub fn transfer(&self) -> Option<&TransferState> {
        self.transfer.as_ref()
    }

    /// Traffic counters of this session's connection.
    #[must_use]
    pub fn transport_stats(&self) -> TransportStats {
        self.channel.stats()
    }

    /// Read and handle messages until the session ends, then close the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error on key mismatch, decryption failure, an invalid
    /// `Start`, a malformed message, a transport failure, or a failure to
    /// write the completed file. The session is then `Aborted`.
    pub async fn run(&mut self) -> Result<ReceiveOutcome> {
        let result = self.run_inner().await;
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Close after session failed: {}", e);
        }
        result
    }

    async fn run_inner(&mut self) -> Result<ReceiveOutcome> {
        loop {
            let msg = match self.channel.receive().await {
                Ok(msg) => msg,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };
            if let Step::Finished(outcome) = self.handle_message(msg).await? {
                return Ok(outcome);
            }
        }
    }

    /// Apply one message to the session.
    ///
    /// # Errors
    ///
    /// See [`ReceiverSession::run`].
    pub async fn handle_message(&mut self, msg: Message) -> Result<Step> {
        if matches!(self.state, ReceiverState::Done | ReceiverState::Aborted) {
            return Err(SessionError::InvalidState(format!(
                "session already ended ({:?})",
                self.state
            )));
        }

        match msg {
            Message::Start {
                file_name,
                wrapped_key,
                chunk_size,
                file_size,
            } => {
                if self.state != ReceiverState::AwaitingStart {
                    tracing::warn!("Ignoring repeated Start for {}", file_name);
                    return Ok(Step::Continue);
                }
                self.on_start(&file_name, &wrapped_key, chunk_size, file_size)
                    .await
            }
            Message::Chunk {
                sequence,
                ciphertext,
                checksum,
            } => self.on_chunk(sequence, &ciphertext, checksum).await,
            Message::Stop => {
                tracing::info!("Sender stopped the transfer");
                if let Some(t) = self.transfer.as_mut() {
                    t.accepting_chunks = false;
                }
                self.abort();
                self.channel.send(&Message::reject()).await?;
                Ok(Step::Finished(ReceiveOutcome::Stopped))
            }
            Message::Disconnect => {
                if let Some(t) = self.transfer.as_ref() {
                    tracing::warn!(
                        "Sender disconnected after {} of {} chunks of {}",
                        t.expected_sequence,
                        t.total_chunks,
                        t.file_name
                    );
                } else {
                    tracing::info!("Sender disconnected");
                }
                self.abort();
                Ok(Step::Finished(ReceiveOutcome::Disconnected))
            }
            Message::Ack { next_expected } => {
                tracing::warn!("Ignoring unexpected Ack{{{}}} from sender", next_expected);
                Ok(Step::Continue)
            }
        }
    }

    async fn on_start(
        &mut self,
        file_name: &str,
        wrapped_key: &[u8],
        chunk_size: u32,
        file_size: u64,
    ) -> Result<Step> {
        let max_chunk_size = self.config.max_chunk_size;
        if chunk_size == 0 || chunk_size > max_chunk_size {
            return self
                .reject(SessionError::InvalidStart(format!(
                    "chunk size {chunk_size} outside 1..={max_chunk_size}"
                )))
                .await;
        }

        let Some(name) = sanitize_file_name(file_name) else {
            return self
                .reject(SessionError::InvalidStart(format!(
                    "unusable file name {file_name:?}"
                )))
                .await;
        };

        let chunks = chunk_count(file_size, chunk_size);
        let total_chunks = match u32::try_from(chunks) {
            Ok(n) if n <= i32::MAX as u32 => n,
            _ => return self.reject(SessionError::FileTooLarge { chunks }).await,
        };

        let key = match unwrap(wrapped_key, &self.private_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Rejecting {}: session key did not unwrap", name);
                return self.reject(e.into()).await;
            }
        };

        tracing::info!(
            "Receiving {} ({} bytes, {} chunks of {} bytes)",
            name,
            file_size,
            total_chunks,
            chunk_size
        );
        self.transfer = Some(TransferState::new(name, file_size, chunk_size, total_chunks, key));
        self.state = ReceiverState::Transferring;
        self.channel.send(&Message::Ack { next_expected: 0 }).await?;

        if total_chunks == 0 {
            return self.complete();
        }
        Ok(Step::Continue)
    }

    async fn on_chunk(&mut self, sequence: u32, ciphertext: &[u8], crc: u16) -> Result<Step> {
        let Some(transfer) = self.transfer.as_mut().filter(|t| t.accepting_chunks) else {
            tracing::debug!("Ignoring chunk {} outside a transfer", sequence);
            return Ok(Step::Continue);
        };

        if sequence != transfer.expected_sequence {
            tracing::warn!(
                "Dropping chunk {}: expected {}",
                sequence,
                transfer.expected_sequence
            );
            return Ok(Step::Continue);
        }

        let key = transfer
            .session_key
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no session key".into()))?;
        let Ok(plaintext) = decrypt_block(key, ciphertext) else {
            tracing::warn!("Chunk {} failed to decrypt", sequence);
            return self.reject(SessionError::Decryption { sequence }).await;
        };

        let expected_len = transfer.expected_chunk_len(sequence);
        if plaintext.len() as u64 != expected_len {
            tracing::warn!(
                "Dropping chunk {}: {} bytes, expected {}",
                sequence,
                plaintext.len(),
                expected_len
            );
            return Ok(Step::Continue);
        }

        if checksum(&plaintext) != crc {
            tracing::warn!("Dropping chunk {}: checksum mismatch", sequence);
            return Ok(Step::Continue);
        }

        transfer.accept(plaintext);
        let next = transfer.expected_sequence;
        let done = transfer.completed;
        tracing::debug!("Accepted chunk {}", sequence);

        // total_chunks is capped at i32::MAX when the transfer starts
        let next_expected = i32::try_from(next)
            .map_err(|_| SessionError::InvalidState(format!("sequence {next} overflows Ack")))?;
        self.channel.send(&Message::Ack { next_expected }).await?;

        if done {
            return self.complete();
        }
        Ok(Step::Continue)
    }

    fn complete(&mut self) -> Result<Step> {
        let Some(transfer) = self.transfer.as_mut() else {
            return Err(SessionError::InvalidState("no transfer to complete".into()));
        };
        transfer.accepting_chunks = false;
        transfer.completed = true;
        transfer.session_key = None;

        let written = write_reassembled(&self.config.output_dir, &transfer.file_name, &transfer.buffer);
        let (path, digest) = match written {
            Ok(written) => written,
            Err(e) => {
                tracing::error!(
                    "Failed to write {} into {}: {}",
                    transfer.file_name,
                    self.config.output_dir.display(),
                    e
                );
                self.abort();
                return Err(e.into());
            }
        };

        tracing::info!(
            "Received {} ({} bytes), digest {}",
            path.display(),
            transfer.file_size,
            digest
        );
        let received = ReceivedFile {
            path,
            file_size: transfer.file_size,
            chunk_count: transfer.total_chunks,
            digest,
        };
        self.state = ReceiverState::Done;
        Ok(Step::Finished(ReceiveOutcome::Completed(received)))
    }

    /// Answer `Ack{-1}` (best effort), abort and return `err`.
    async fn reject(&mut self, err: SessionError) -> Result<Step> {
        self.abort();
        if let Err(e) = self.channel.send(&Message::reject()).await {
            tracing::debug!("Rejection not delivered: {}", e);
        }
        Err(err)
    }

    fn abort(&mut self) {
        self.state = ReceiverState::Aborted;
        self.transfer = None;
    }
}
