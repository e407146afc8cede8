//! Error types for cryptographic operations

use thiserror::Error;

/// Errors raised by the envelope and key handling code.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The wrapped session key was not produced for this key pair, or is malformed
    #[error("Wrapped key does not match this key pair")]
    KeyMismatch,

    /// Block ciphertext is truncated or failed authentication
    #[error("Block decryption failed")]
    DecryptionFailed,

    /// AEAD encryption failed
    #[error("Block encryption failed")]
    EncryptionFailed,

    /// Public key is a low-order point and yields no shared secret
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Raw key material has the wrong length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Key file exists but does not hold a hex-encoded key
    #[error("Invalid key file {path}: {reason}")]
    InvalidKeyFile {
        /// Path of the offending file
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Key file could not be read or written
    #[error("Key file I/O error: {0}")]
    Io(#[from] std::io::Error),
}
