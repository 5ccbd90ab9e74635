//! Fuzz target for group decryption of tampered and replayed messages
//!
//! # Invariants
//!
//! - Decryption never panics
//! - A rejected message leaves the member's sender-key record unchanged
//! - An accepted message yields the plaintext it was encrypted from
//! - Every message decrypts at most once

#![no_main]

use arbitrary::Arbitrary;
use axolotl_core::{SenderKeyName, SenderKeyStore, SessionError};
use axolotl_harness::{Envelope, Party, Received, SimEnv, establish};
use libfuzzer_sys::fuzz_target;

const GROUP: &str = "fuzz group";

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    /// Plaintexts encrypted in order
    messages: Vec<Vec<u8>>,
    /// Delivery steps, each picking a message (mod count) and a tamper
    deliveries: Vec<(u8, Option<Tamper>)>,
}

#[derive(Debug, Arbitrary)]
enum Tamper {
    Flip { index: u16, mask: u8 },
    Truncate(u16),
}

fuzz_target!(|scenario: Scenario| {
    if scenario.messages.is_empty() || scenario.messages.len() > 64 {
        return;
    }

    let env = SimEnv::with_seed(scenario.seed);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();
    establish(&alice, &bob).unwrap();
    let share = alice.share_sender_key(GROUP, bob.address()).unwrap();
    bob.receive(&share).unwrap();

    let envelopes: Vec<Envelope> = scenario
        .messages
        .iter()
        .map(|text| alice.group_encrypt(GROUP, &[bob.address().clone()], text).unwrap().remove(0))
        .collect();

    let name = SenderKeyName::new(GROUP, alice.address().clone());
    let record = || bob.store().load_sender_key(&name).unwrap().serialize().unwrap();
    let mut decrypted = vec![false; envelopes.len()];

    for (pick, tamper) in &scenario.deliveries {
        let index = usize::from(*pick) % envelopes.len();
        let mut envelope = envelopes[index].clone();
        match tamper {
            Some(Tamper::Flip { index, mask }) if !envelope.bytes.is_empty() => {
                let at = usize::from(*index) % envelope.bytes.len();
                envelope.bytes[at] ^= mask;
            },
            Some(Tamper::Truncate(len)) => envelope.bytes.truncate(usize::from(*len)),
            _ => {},
        }

        let before = record();
        match bob.receive(&envelope) {
            Ok(received) => {
                assert!(!decrypted[index], "message {index} decrypted twice");
                assert_eq!(received, Received::Message(scenario.messages[index].clone()));
                decrypted[index] = true;
            },
            Err(err) => {
                assert_eq!(record(), before, "rejected message changed the sender key");
                if envelope.bytes == envelopes[index].bytes {
                    assert!(decrypted[index], "genuine message rejected: {err}");
                    assert!(matches!(err, SessionError::DuplicateMessage { .. }));
                }
            },
        }
    }
});
