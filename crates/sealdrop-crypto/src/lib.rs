//! # sealdrop Crypto
//!
//! Cryptographic envelope for the sealdrop transfer protocol.
//!
//! This crate provides:
//! - One-time session keys for XChaCha20-Poly1305 block encryption
//! - Session key wrapping to an X25519 public key (sealed-box style)
//! - Independent per-chunk encryption with random 192-bit nonces
//! - X25519 key pairs and a file-backed [`keys::KeyProvider`]
//!
//! Every chunk is a self-contained encryption unit: losing or reordering a
//! chunk never affects decryption of any other chunk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{SessionKey, decrypt_block, encrypt_block, unwrap, wrap};
pub use error::CryptoError;
pub use keys::{FileKeyProvider, KeyPair, KeyProvider, PrivateKey, PublicKey};

/// X25519 public/private key size (32 bytes).
pub const X25519_KEY_SIZE: usize = 32;

/// Session key size (32 bytes / 256 bits).
pub const SESSION_KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size (24 bytes / 192 bits).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// Size of a wrapped session key on the wire.
///
/// `ephemeral public key (32) || nonce (24) || sealed key (32) || tag (16)`
pub const WRAPPED_KEY_SIZE: usize = X25519_KEY_SIZE + NONCE_SIZE + SESSION_KEY_SIZE + TAG_SIZE;

/// Smallest well-formed encrypted block (empty plaintext).
pub const MIN_BLOCK_SIZE: usize = NONCE_SIZE + TAG_SIZE;
