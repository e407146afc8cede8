//! Integration tests for the session-key envelope end-to-end.

use sealdrop_crypto::{
    CryptoError, FileKeyProvider, KeyPair, KeyProvider, SessionKey, WRAPPED_KEY_SIZE,
    decrypt_block, encrypt_block, unwrap, wrap,
};
use tempfile::TempDir;

#[test]
fn persisted_keys_wrap_and_unwrap() {
    let dir = TempDir::new().unwrap();
    let provider = FileKeyProvider::new(
        dir.path().join("public.key"),
        dir.path().join("private.key"),
    );
    provider.generate_key_pair().unwrap();

    // Sender side: only the public key
    let public = provider.load_public_key().unwrap();
    let session = SessionKey::generate();
    let wrapped = wrap(&session, &public).unwrap();
    let block = encrypt_block(&session, b"chunk zero").unwrap();

    // Receiver side: only the private key
    let private = provider.load_private_key().unwrap();
    let recovered = unwrap(&wrapped, &private).unwrap();
    assert_eq!(decrypt_block(&recovered, &block).unwrap(), b"chunk zero");
}

#[test]
fn wrapped_key_has_fixed_size() {
    let pair = KeyPair::generate();
    for _ in 0..8 {
        let wrapped = wrap(&SessionKey::generate(), &pair.public).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);
    }
}

#[test]
fn regenerated_pair_cannot_open_old_wrap() {
    let dir = TempDir::new().unwrap();
    let provider = FileKeyProvider::new(
        dir.path().join("public.key"),
        dir.path().join("private.key"),
    );
    let old = provider.generate_key_pair().unwrap();
    let wrapped = wrap(&SessionKey::generate(), &old.public).unwrap();

    provider.generate_key_pair().unwrap();
    let private = provider.load_private_key().unwrap();
    assert!(matches!(
        unwrap(&wrapped, &private),
        Err(CryptoError::KeyMismatch)
    ));
}

#[test]
fn session_key_from_one_transfer_cannot_read_another() {
    let pair = KeyPair::generate();
    let first = SessionKey::generate();
    let second = SessionKey::generate();
    let _ = wrap(&first, &pair.public).unwrap();

    let block = encrypt_block(&first, b"secret").unwrap();
    assert!(matches!(
        decrypt_block(&second, &block),
        Err(CryptoError::DecryptionFailed)
    ));
}
