//! Fuzz target for wire message decoding.
//!
//! Decoding must never panic, and any frame that decodes must re-encode to
//! the exact same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealdrop_core::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = Message::decode(data) {
        let encoded = msg.encode().expect("decoded message must encode");
        assert_eq!(encoded.as_slice(), data);
    }
});
