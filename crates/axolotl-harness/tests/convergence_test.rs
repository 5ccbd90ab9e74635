//! Two devices talking over a reliable network always stay in sync.

use axolotl_core::SessionStore;
use axolotl_harness::{Party, Received, SimEnv, establish};
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn current_base_key(party: &Party, peer: &Party) -> Vec<u8> {
    let record = party.store().load_session(peer.address()).unwrap();
    record.session_state().unwrap().alice_base_key().serialize().to_vec()
}

fn deliver(from: &Party, to: &Party, text: &str) {
    let envelope = from.encrypt(to.address(), text.as_bytes()).unwrap();
    assert_eq!(to.receive(&envelope).unwrap(), Received::Message(text.as_bytes().to_vec()));
}

#[test]
fn simultaneous_initiation_converges() {
    init_tracing();
    let env = SimEnv::with_seed(0x5eed);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();

    alice.start_session(bob.address(), &bob.publish_bundle().unwrap()).unwrap();
    bob.start_session(alice.address(), &alice.publish_bundle().unwrap()).unwrap();

    let from_alice = alice.encrypt(bob.address(), b"alice first").unwrap();
    let from_bob = bob.encrypt(alice.address(), b"bob first").unwrap();
    assert_eq!(bob.receive(&from_alice).unwrap(), Received::Message(b"alice first".to_vec()));
    assert_eq!(alice.receive(&from_bob).unwrap(), Received::Message(b"bob first".to_vec()));

    for round in 0..3 {
        deliver(&alice, &bob, &format!("alice {round}"));
        deliver(&bob, &alice, &format!("bob {round}"));
    }

    assert_eq!(current_base_key(&alice, &bob), current_base_key(&bob, &alice));
}

#[test]
fn re_established_session_still_reads_old_traffic() {
    let env = SimEnv::with_seed(21);
    let alice = Party::new("alice", 1, &env).unwrap();
    let bob = Party::new("bob", 1, &env).unwrap();
    establish(&alice, &bob).unwrap();

    let stale = alice.encrypt(bob.address(), b"sent before reinstall").unwrap();

    // Bob starts over from a new bundle of Alice's.
    bob.start_session(alice.address(), &alice.publish_bundle().unwrap()).unwrap();
    deliver(&bob, &alice, "new session");

    assert_eq!(bob.receive(&stale).unwrap(), Received::Message(b"sent before reinstall".to_vec()));
    deliver(&alice, &bob, "still talking");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any alternation of bursts decrypts in order on a reliable network.
    #[test]
    fn prop_random_conversation(
        seed in any::<u64>(),
        turns in prop::collection::vec((any::<bool>(), 1usize..6), 1..12),
    ) {
        let env = SimEnv::with_seed(seed);
        let alice = Party::new("alice", 1, &env).unwrap();
        let bob = Party::new("bob", 1, &env).unwrap();
        establish(&alice, &bob).unwrap();

        for (turn, (alice_speaks, burst)) in turns.into_iter().enumerate() {
            let (from, to) = if alice_speaks { (&alice, &bob) } else { (&bob, &alice) };
            let envelopes: Vec<_> = (0..burst)
                .map(|i| from.encrypt(to.address(), format!("{turn}.{i}").as_bytes()).unwrap())
                .collect();

            for (i, envelope) in envelopes.iter().enumerate() {
                let received = to.receive(envelope);
                prop_assert_eq!(
                    received,
                    Ok(Received::Message(format!("{turn}.{i}").into_bytes()))
                );
            }
        }
    }
}
