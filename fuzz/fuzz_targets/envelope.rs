//! Fuzz target for session key unwrapping and block decryption.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealdrop_crypto::{PrivateKey, SessionKey, decrypt_block, unwrap};
use sealdrop_files::checksum;

#[derive(Debug, Arbitrary)]
struct EnvelopeInput {
    private_key: [u8; 32],
    session_key: [u8; 32],
    wrapped: Vec<u8>,
    block: Vec<u8>,
}

fuzz_target!(|input: EnvelopeInput| {
    let private = PrivateKey::from_bytes(input.private_key);
    let _ = unwrap(&input.wrapped, &private);

    let key = SessionKey::from_bytes(input.session_key);
    let _ = checksum(&input.block);
    let _ = decrypt_block(&key, &input.block);
});
