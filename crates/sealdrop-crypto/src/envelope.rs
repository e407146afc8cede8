//! Hybrid encryption envelope.
//!
//! A transfer is protected by a fresh 256-bit [`SessionKey`]. The sender wraps
//! it to the receiver's X25519 public key and encrypts each chunk under it:
//!
//! ```text
//! wrapped key:  eph_pub (32) | nonce (24) | sealed session key (32) | tag (16)
//! block:        nonce (24)   | ciphertext (N)                      | tag (16)
//! ```
//!
//! The wrap key is `BLAKE3-derive_key(WRAP_CONTEXT, dh || eph_pub || recipient_pub)`
//! and the ephemeral public key is bound as associated data, so a wrapped key
//! produced for one key pair cannot be opened with any other.

use crate::keys::{PrivateKey, PublicKey};
use crate::{
    CryptoError, MIN_BLOCK_SIZE, NONCE_SIZE, SESSION_KEY_SIZE, WRAPPED_KEY_SIZE, X25519_KEY_SIZE,
};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use x25519_dalek::EphemeralSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// BLAKE3 context string for the key-wrapping KDF.
const WRAP_CONTEXT: &str = "sealdrop 2024-06 session-key wrap v1";

/// Symmetric key for one transfer session.
///
/// Never persisted and never sent in the clear. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if the slice is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SESSION_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SessionKey {}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; X25519_KEY_SIZE],
    recipient_public: &[u8; X25519_KEY_SIZE],
) -> SessionKey {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    SessionKey(*hasher.finalize().as_bytes())
}

/// Wrap a session key so that only the holder of `recipient`'s private key
/// can recover it.
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` if `recipient` is a low-order point.
pub fn wrap(key: &SessionKey, recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral).to_bytes();
    let recipient_public = recipient.to_bytes();

    let shared = ephemeral.diffie_hellman(recipient.as_dalek());
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }
    let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, &recipient_public);

    let nonce = random_nonce();
    let sealed = wrap_key
        .cipher()
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: key.as_bytes(),
                aad: &ephemeral_public,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(WRAPPED_KEY_SIZE);
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Recover a session key wrapped by [`wrap`].
///
/// # Errors
///
/// Returns `CryptoError::KeyMismatch` if `wrapped` is malformed or was
/// produced for a different key pair.
pub fn unwrap(wrapped: &[u8], private_key: &PrivateKey) -> Result<SessionKey, CryptoError> {
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::KeyMismatch);
    }

    let (ephemeral_public, rest) = wrapped.split_at(X25519_KEY_SIZE);
    let (nonce, sealed) = rest.split_at(NONCE_SIZE);

    let mut eph = [0u8; X25519_KEY_SIZE];
    eph.copy_from_slice(ephemeral_public);
    let shared = private_key
        .as_dalek()
        .diffie_hellman(&x25519_dalek::PublicKey::from(eph));
    if !shared.was_contributory() {
        return Err(CryptoError::KeyMismatch);
    }
    let wrap_key = derive_wrap_key(
        shared.as_bytes(),
        &eph,
        &private_key.public_key().to_bytes(),
    );

    let mut opened = wrap_key
        .cipher()
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: &eph,
            },
        )
        .map_err(|_| CryptoError::KeyMismatch)?;

    let key = SessionKey::from_slice(&opened).map_err(|_| CryptoError::KeyMismatch);
    opened.zeroize();
    key
}

/// Encrypt one block under the session key.
///
/// Output is `nonce || ciphertext || tag`; each call draws a fresh nonce.
///
/// # Errors
///
/// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
pub fn encrypt_block(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = random_nonce();
    let sealed = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a block produced by [`encrypt_block`].
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` on truncated input or
/// authentication failure.
pub fn decrypt_block(key: &SessionKey, block: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if block.len() < MIN_BLOCK_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, sealed) = block.split_at(NONCE_SIZE);

    key.cipher()
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}
