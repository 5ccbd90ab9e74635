//! Failed store commits never corrupt a session.
//!
//! Devices run over a [`ChaoticStore`] that fails session and sender-key
//! writes at random. Every failure must be a storage error, and retrying the
//! same operation must eventually succeed with the expected result.

use axolotl_core::{InMemoryProtocolStore, ProtocolAddress, SessionError, key_helper};
use axolotl_harness::{ChaoticStore, Party, Received, SimEnv, establish};
use proptest::prelude::*;

type ChaoticParty = Party<ChaoticStore<InMemoryProtocolStore>>;

const GROUP: &str = "storage test group";
const MAX_ATTEMPTS: usize = 64;

fn chaotic_party(name: &str, env: &SimEnv, failure_rate: f64, seed: u64) -> ChaoticParty {
    let env = env.fork();
    let store = InMemoryProtocolStore::new(
        key_helper::generate_identity_key_pair(&env),
        key_helper::generate_registration_id(&env),
    );
    let store = ChaoticStore::with_seed(store, failure_rate, seed);
    // Signed pre-key setup does not touch the chaotic writes.
    Party::with_store(ProtocolAddress::new(name, 1), store, env).unwrap()
}

/// Run `op` until it succeeds, checking every failure is a storage failure.
fn retry<T>(mut op: impl FnMut() -> Result<T, SessionError>) -> T {
    for _ in 0..MAX_ATTEMPTS {
        match op() {
            Ok(value) => return value,
            Err(err) => assert!(err.is_fatal(), "non-storage failure: {err}"),
        }
    }
    panic!("operation failed {MAX_ATTEMPTS} times in a row");
}

#[test]
fn handshake_survives_failed_commits() {
    let env = SimEnv::with_seed(404);
    let alice = chaotic_party("alice", &env, 0.5, 1);
    let bob = chaotic_party("bob", &env, 0.5, 2);

    let bundle = bob.publish_bundle().unwrap();
    retry(|| alice.start_session(bob.address(), &bundle));

    let hello = retry(|| alice.encrypt(bob.address(), b"hello"));
    assert_eq!(retry(|| bob.receive(&hello)), Received::Message(b"hello".to_vec()));

    let reply = retry(|| bob.encrypt(alice.address(), b"hi"));
    assert_eq!(retry(|| alice.receive(&reply)), Received::Message(b"hi".to_vec()));

    assert!(alice.store().injected_failures() + bob.store().injected_failures() > 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Pairwise and group traffic with retried commits.
    #[test]
    fn prop_retried_operations_converge(
        seed in any::<u64>(),
        failure_rate in 0.05..0.6f64,
        turns in prop::collection::vec((any::<bool>(), 1usize..4), 1..10),
    ) {
        let env = SimEnv::with_seed(seed);
        let alice = chaotic_party("alice", &env, 0.0, seed);
        let bob = chaotic_party("bob", &env, 0.0, seed ^ 1);
        establish(&alice, &bob).unwrap();

        // Distribution is a pairwise decrypt followed by a sender-key write,
        // two commits that cannot be retried as one.
        let share = alice.share_sender_key(GROUP, bob.address()).unwrap();
        prop_assert_eq!(bob.receive(&share).unwrap(), Received::SenderKey { group: GROUP.to_owned() });

        let alice = Party::with_store(
            alice.address().clone(),
            ChaoticStore::with_seed(alice.store().inner().clone(), failure_rate, seed),
            env.fork(),
        )
        .unwrap();
        let bob = Party::with_store(
            bob.address().clone(),
            ChaoticStore::with_seed(bob.store().inner().clone(), failure_rate, seed ^ 1),
            env.fork(),
        )
        .unwrap();

        for (turn, (alice_speaks, burst)) in turns.into_iter().enumerate() {
            let (from, to) = if alice_speaks { (&alice, &bob) } else { (&bob, &alice) };
            for i in 0..burst {
                let text = format!("{turn}.{i}");
                let envelope = retry(|| from.encrypt(to.address(), text.as_bytes()));
                prop_assert_eq!(retry(|| to.receive(&envelope)), Received::Message(text.into_bytes()));
            }

            let text = format!("group {turn}");
            let group = retry(|| alice.group_encrypt(GROUP, &[bob.address().clone()], text.as_bytes()));
            prop_assert_eq!(retry(|| bob.receive(&group[0])), Received::Message(text.into_bytes()));
        }
    }
}
