//! Fuzz target for pairwise decryption of tampered messages
//!
//! Establishes a real session, encrypts a message, then mutates the wire
//! bytes before handing them to the recipient.
//!
//! # Strategy
//!
//! - Pre-key messages (session not yet acknowledged) and ordinary messages
//! - Bit flips, byte replacement, truncation and trailing garbage
//! - Arbitrary type tags on otherwise valid bytes
//!
//! # Invariants
//!
//! - Decryption never panics
//! - A rejected message leaves the recipient's session record unchanged
//! - An accepted message yields the original plaintext
//! - The untouched message still decrypts after any rejected tampering

#![no_main]

use arbitrary::Arbitrary;
use axolotl_core::SessionStore;
use axolotl_harness::{Envelope, Party, Received, SimEnv, establish};
use axolotl_proto::CiphertextMessageType;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    /// Send before the handshake completes so the message is a pre-key one
    unacknowledged: bool,
    plaintext: Vec<u8>,
    retag: Option<u8>,
    mutations: Vec<Mutation>,
}

#[derive(Debug, Arbitrary)]
enum Mutation {
    Flip { index: u16, mask: u8 },
    Replace { index: u16, byte: u8 },
    Truncate(u16),
    Append(Vec<u8>),
}

impl Mutation {
    fn apply(&self, bytes: &mut Vec<u8>) {
        match self {
            Mutation::Flip { index, mask } => {
                if let Some(byte) = position(bytes, *index) {
                    *byte ^= mask;
                }
            },
            Mutation::Replace { index, byte } => {
                if let Some(slot) = position(bytes, *index) {
                    *slot = *byte;
                }
            },
            Mutation::Truncate(len) => bytes.truncate(usize::from(*len)),
            Mutation::Append(tail) => bytes.extend_from_slice(tail),
        }
    }
}

fn position(bytes: &mut [u8], index: u16) -> Option<&mut u8> {
    if bytes.is_empty() {
        return None;
    }
    let len = bytes.len();
    bytes.get_mut(usize::from(index) % len)
}

fn session_bytes(party: &Party, peer: &Party) -> Vec<u8> {
    party.store().load_session(peer.address()).unwrap().serialize().unwrap()
}

fuzz_target!(|scenario: Scenario| {
    let env = SimEnv::with_seed(scenario.seed);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();

    if scenario.unacknowledged {
        alice.start_session(bob.address(), &bob.publish_bundle().unwrap()).unwrap();
    } else {
        establish(&alice, &bob).unwrap();
    }

    let genuine = alice.encrypt(bob.address(), &scenario.plaintext).unwrap();

    let mut tampered: Envelope = genuine.clone();
    for mutation in &scenario.mutations {
        mutation.apply(&mut tampered.bytes);
    }
    if let Some(tag) = scenario.retag.and_then(|tag| CiphertextMessageType::try_from(tag).ok()) {
        tampered.message_type = tag;
    }

    let before = session_bytes(&bob, &alice);
    match bob.receive(&tampered) {
        Ok(received) => {
            assert_eq!(received, Received::Message(scenario.plaintext.clone()));
        },
        Err(_) => {
            assert_eq!(session_bytes(&bob, &alice), before, "rejected message changed the session");
            assert_eq!(
                bob.receive(&genuine).unwrap(),
                Received::Message(scenario.plaintext.clone())
            );
        },
    }
});
