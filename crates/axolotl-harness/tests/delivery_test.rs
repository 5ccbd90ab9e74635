//! Delivery oracle under loss, duplication and reordering.
//!
//! Every plaintext is unique, so the oracle can tell which envelope a
//! decrypt belongs to: the first copy of every delivered envelope must
//! decrypt to its own plaintext, and any later copy must be reported as a
//! duplicate.

use std::collections::{HashMap, HashSet};

use axolotl_core::{ProtocolAddress, SessionError};
use axolotl_harness::{
    DeliveryPolicy, Envelope, Party, Received, SimEnv, SimNetwork, establish,
};
use proptest::prelude::*;

const GROUP: &str = "night shift";

/// Expected plaintext per envelope, and which copies already arrived.
#[derive(Default)]
struct Oracle {
    expected: HashMap<Vec<u8>, String>,
    delivered: HashSet<(ProtocolAddress, Vec<u8>)>,
}

impl Oracle {
    fn expect(&mut self, bytes: &[u8], text: &str) {
        self.expected.insert(bytes.to_vec(), text.to_owned());
    }

    fn check(
        &mut self,
        envelope: &Envelope,
        result: Result<Received, SessionError>,
    ) -> Result<(), TestCaseError> {
        let text = self.expected[&envelope.bytes].clone();
        if self.delivered.insert((envelope.to.clone(), envelope.bytes.clone())) {
            prop_assert_eq!(result, Ok(Received::Message(text.into_bytes())));
        } else {
            prop_assert!(
                matches!(result, Err(SessionError::DuplicateMessage { .. })),
                "second copy was {:?}",
                result
            );
        }
        Ok(())
    }
}

fn policy() -> impl Strategy<Value = DeliveryPolicy> {
    (0.0..0.4f64, 0.0..0.4f64, any::<bool>()).prop_map(|(drop_rate, duplicate_rate, reorder)| {
        DeliveryPolicy { drop_rate, duplicate_rate, reorder }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Both directions at once, each round flushed before the next.
    #[test]
    fn prop_pairwise_delivery(
        seed in any::<u64>(),
        policy in policy(),
        rounds in prop::collection::vec((0usize..6, 0usize..6), 1..8),
    ) {
        let env = SimEnv::with_seed(seed);
        let alice = Party::new("alice", 1, &env).unwrap();
        let bob = Party::new("bob", 1, &env).unwrap();
        establish(&alice, &bob).unwrap();

        let mut network = SimNetwork::new(policy, seed);
        let mut oracle = Oracle::default();

        for (round, (from_alice, from_bob)) in rounds.into_iter().enumerate() {
            for (sender, recipient, count) in
                [(&alice, &bob, from_alice), (&bob, &alice, from_bob)]
            {
                for i in 0..count {
                    let text = format!("{} {round}.{i}", sender.address());
                    let envelope = sender.encrypt(recipient.address(), text.as_bytes()).unwrap();
                    oracle.expect(&envelope.bytes, &text);
                    network.send(envelope);
                }
            }

            for envelope in network.flush() {
                let recipient = if envelope.to == *alice.address() { &alice } else { &bob };
                oracle.check(&envelope, recipient.receive(&envelope))?;
            }
        }

        let stats = network.stats();
        prop_assert_eq!(oracle.delivered.len(), stats.sent - stats.dropped);
    }

    /// Group traffic from one sender fanned out to three members.
    #[test]
    fn prop_group_delivery(
        seed in any::<u64>(),
        policy in policy(),
        rounds in prop::collection::vec(1usize..8, 1..6),
    ) {
        let env = SimEnv::with_seed(seed);
        let alice = Party::new("alice", 1, &env).unwrap();
        let members: Vec<Party> = ["bob", "carol", "dave"]
            .into_iter()
            .map(|name| Party::new(name, 1, &env).unwrap())
            .collect();
        let addresses: Vec<ProtocolAddress> =
            members.iter().map(|member| member.address().clone()).collect();

        for member in &members {
            establish(&alice, member).unwrap();
            let share = alice.share_sender_key(GROUP, member.address()).unwrap();
            prop_assert_eq!(
                member.receive(&share).unwrap(),
                Received::SenderKey { group: GROUP.to_owned() }
            );
        }

        let mut network = SimNetwork::new(policy, seed);
        let mut oracle = Oracle::default();

        for (round, count) in rounds.into_iter().enumerate() {
            for i in 0..count {
                let text = format!("round {round} message {i}");
                let envelopes = alice.group_encrypt(GROUP, &addresses, text.as_bytes()).unwrap();
                oracle.expect(&envelopes[0].bytes, &text);
                network.send_all(envelopes);
            }

            for envelope in network.flush() {
                let member = members.iter().find(|m| *m.address() == envelope.to).unwrap();
                oracle.check(&envelope, member.receive(&envelope))?;
            }
        }
    }
}

#[test]
fn reordered_burst_decrypts_exactly_once() {
    let env = SimEnv::with_seed(77);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();
    establish(&alice, &bob).unwrap();

    let mut network = SimNetwork::new(DeliveryPolicy::reordering(), 77);
    for i in 0..40 {
        network.send(alice.encrypt(bob.address(), format!("{i}").as_bytes()).unwrap());
    }

    let mut received: Vec<u32> = network
        .flush()
        .iter()
        .map(|envelope| match bob.receive(envelope).unwrap() {
            Received::Message(bytes) => String::from_utf8(bytes).unwrap().parse().unwrap(),
            Received::SenderKey { .. } => unreachable!(),
        })
        .collect();
    received.sort_unstable();
    assert_eq!(received, (0..40).collect::<Vec<_>>());
}

#[test]
fn every_copy_after_the_first_is_a_duplicate() {
    let env = SimEnv::with_seed(78);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();
    establish(&alice, &bob).unwrap();

    let policy = DeliveryPolicy { drop_rate: 0.0, duplicate_rate: 1.0, reorder: true };
    let mut network = SimNetwork::new(policy, 78);
    for i in 0..10 {
        network.send(alice.encrypt(bob.address(), format!("copy {i}").as_bytes()).unwrap());
    }

    let results: Vec<_> = network.flush().iter().map(|envelope| bob.receive(envelope)).collect();
    assert_eq!(results.len(), 20);
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 10);
    assert!(
        results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| matches!(err, SessionError::DuplicateMessage { .. }))
    );
}
