//! Fuzz target for wire envelope classification
//!
//! # Strategy
//!
//! - Random bytes: completely arbitrary input (general malformation)
//! - Near-misses: valid JSON with mangled control markers, routing fields of
//!   every JSON type, unknown control discriminants
//!
//! # Invariants
//!
//! - Classification is total: every valid JSON value decodes to exactly one
//!   variant, only non-JSON or a broken control envelope is rejected
//! - Decoded application payloads never retain the routing field
//! - A decoded message re-encodes, and the re-encoding decodes to the same
//!   classification
//! - NEVER panic on any input

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomcast_proto::Message;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(message) = Message::decode(raw) else {
        return;
    };

    if let Message::Application { payload, .. } = &message {
        if let Some(map) = payload.as_object() {
            assert!(
                !map.get("room").is_some_and(|v| v.is_string()),
                "routing field survived decoding"
            );
        }
    }

    // Anything that decoded must encode, and the round trip must be stable.
    let encoded = message.encode().expect("decoded message failed to encode");
    let again = Message::decode(&encoded).expect("re-encoded message failed to decode");
    assert_eq!(message, again);
});
