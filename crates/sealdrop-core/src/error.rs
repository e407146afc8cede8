//! Error types for transfer sessions

use crate::message::MessageError;
use sealdrop_crypto::CryptoError;
use sealdrop_transport::TransportError;
use thiserror::Error;

/// Errors that end a transfer session.
///
/// A dropped chunk (sequence or checksum mismatch) is not an error: the
/// receiver discards it and the sender's stop-and-wait stall surfaces it.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wrapped session key could not be opened with the local private key
    #[error("Session key does not match the receiver's key pair")]
    KeyMismatch,

    /// A chunk failed to decrypt
    #[error("Chunk {sequence} failed to decrypt")]
    Decryption {
        /// Sequence number of the chunk
        sequence: u32,
    },

    /// Other cryptographic failure
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    /// Connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Peer sent a frame that is not a valid message
    #[error("Malformed message: {0}")]
    Message(#[from] MessageError),

    /// Receiver did not answer `Start` with `Ack{0}`
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Receiver acknowledged something other than the chunk just sent
    #[error("Unexpected acknowledgment: expected {expected}, got {actual}")]
    AckMismatch {
        /// Value the sender waited for
        expected: i64,
        /// Value the receiver sent
        actual: i32,
    },

    /// `Start` declared parameters this receiver will not accept
    #[error("Invalid start message: {0}")]
    InvalidStart(String),

    /// A message arrived that has no meaning in the current state
    #[error("Unexpected {0} message")]
    UnexpectedMessage(&'static str),

    /// File is too large for a 32-bit chunk sequence
    #[error("File too large: {chunks} chunks exceed the sequence space")]
    FileTooLarge {
        /// Number of chunks required
        chunks: u64,
    },

    /// Operation not valid in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for SessionError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyMismatch => Self::KeyMismatch,
            other => Self::Crypto(other),
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
