//! Fuzz target for wire message parsing
//!
//! Feeds arbitrary bytes to every message parser, tagged with an arbitrary
//! transport type byte.
//!
//! # Invariants
//!
//! - Parsing never panics, whatever the type byte or body
//! - A parsed message serializes back to exactly the bytes it came from
//! - Re-parsing those bytes yields an equal message

#![no_main]

use arbitrary::Arbitrary;
use axolotl_proto::{CiphertextMessage, CiphertextMessageType};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    message_type: u8,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let Ok(message_type) = CiphertextMessageType::try_from(input.message_type) else {
        return;
    };
    let Ok(message) = CiphertextMessage::deserialize(message_type, &input.body) else {
        return;
    };

    assert_eq!(message.message_type(), message_type);
    assert_eq!(message.serialize(), &input.body[..]);

    let reparsed = CiphertextMessage::deserialize(message_type, message.serialize())
        .expect("serialized message must parse");
    assert_eq!(reparsed, message);
});
