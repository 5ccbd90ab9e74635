//! Double Ratchet key schedule and X3DH session initialization.
//!
//! Both parties compute the same master secret from three or four
//! Diffie-Hellman agreements:
//!
//! ```text
//! Alice (initiator)                    Bob (responder)
//! DH1 = DH(IK_A,  SPK_B)               DH1 = DH(SPK_B, IK_A)
//! DH2 = DH(EK_A,  IK_B)                DH2 = DH(IK_B,  EK_A)
//! DH3 = DH(EK_A,  SPK_B)               DH3 = DH(SPK_B, EK_A)
//! DH4 = DH(EK_A,  OPK_B)   optional    DH4 = DH(OPK_B, EK_A)
//!
//! root || chain = HKDF(0xFF * 32 || DH1 || DH2 || DH3 [|| DH4], "WhisperText")
//! ```
//!
//! Bob's signed pre-key doubles as his first ratchet key. Alice immediately
//! takes one sending step against it; Bob sends on the initial chain until
//! he sees Alice's ratchet key.

pub mod keys;
pub mod skipped;

use axolotl_crypto::{
    HkdfVersion, IdentityKey, IdentityKeyPair, KeyPair, PrivateKey, PublicKey,
};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

pub use self::{
    keys::{ChainKey, MessageKeys, RootKey},
    skipped::SkippedKeyCache,
};
use crate::{SessionConfig, error::SessionError, state::SessionState};

const MASTER_SECRET_INFO: &[u8] = b"WhisperText";
const DISCONTINUITY_BYTES: [u8; 32] = [0xFF; 32];

/// Session version produced by this engine.
pub const SESSION_VERSION: u8 = 3;

/// What the initiator knows when building a session.
#[derive(Debug, Clone)]
pub struct AliceParameters {
    /// Our long-term identity
    pub our_identity_key_pair: IdentityKeyPair,
    /// Ephemeral base key, sent to Bob in the pre-key message
    pub our_base_key_pair: KeyPair,
    /// Bob's identity key
    pub their_identity_key: IdentityKey,
    /// Bob's signed pre-key
    pub their_signed_pre_key: PublicKey,
    /// Bob's one-time pre-key, if the bundle carried one
    pub their_one_time_pre_key: Option<PublicKey>,
    /// Bob's first ratchet key (his signed pre-key)
    pub their_ratchet_key: PublicKey,
}

/// What the responder knows when a pre-key message arrives.
#[derive(Debug, Clone)]
pub struct BobParameters {
    /// Our long-term identity
    pub our_identity_key_pair: IdentityKeyPair,
    /// The signed pre-key Alice used
    pub our_signed_pre_key_pair: KeyPair,
    /// The one-time pre-key Alice used, if any
    pub our_one_time_pre_key_pair: Option<KeyPair>,
    /// Our first ratchet key pair (the signed pre-key pair)
    pub our_ratchet_key_pair: KeyPair,
    /// Alice's identity key
    pub their_identity_key: IdentityKey,
    /// Alice's base key
    pub their_base_key: PublicKey,
}

/// Build the initiator's session state.
pub fn initialize_alice_session<R: RngCore + CryptoRng>(
    params: &AliceParameters,
    rng: &mut R,
    config: &SessionConfig,
) -> Result<SessionState, SessionError> {
    let our_base = &params.our_base_key_pair.private_key;

    let mut agreements = vec![
        agree(params.our_identity_key_pair.private_key(), &params.their_signed_pre_key)?,
        agree(our_base, params.their_identity_key.public_key())?,
        agree(our_base, &params.their_signed_pre_key)?,
    ];
    if let Some(one_time) = &params.their_one_time_pre_key {
        agreements.push(agree(our_base, one_time)?);
    }
    let (root_key, receiving_chain) = derive_master_keys(&mut agreements);

    let sending_ratchet = KeyPair::generate(rng);
    let (root_key, sending_chain) =
        root_key.create_chain(&params.their_ratchet_key, &sending_ratchet.private_key)?;

    let mut state = SessionState::new(
        SESSION_VERSION,
        *params.our_identity_key_pair.identity_key(),
        params.their_identity_key,
        root_key,
        sending_ratchet,
        sending_chain,
        params.our_base_key_pair.public_key,
    );
    state.add_receiver_chain(params.their_ratchet_key, receiving_chain, config.max_receiver_chains);

    tracing::trace!(
        one_time_pre_key = params.their_one_time_pre_key.is_some(),
        "Initialized initiator session"
    );
    Ok(state)
}

/// Build the responder's session state.
pub fn initialize_bob_session(params: &BobParameters) -> Result<SessionState, SessionError> {
    let our_signed = &params.our_signed_pre_key_pair.private_key;

    let mut agreements = vec![
        agree(our_signed, params.their_identity_key.public_key())?,
        agree(params.our_identity_key_pair.private_key(), &params.their_base_key)?,
        agree(our_signed, &params.their_base_key)?,
    ];
    if let Some(one_time) = &params.our_one_time_pre_key_pair {
        agreements.push(agree(&one_time.private_key, &params.their_base_key)?);
    }
    let (root_key, sending_chain) = derive_master_keys(&mut agreements);

    let state = SessionState::new(
        SESSION_VERSION,
        *params.our_identity_key_pair.identity_key(),
        params.their_identity_key,
        root_key,
        params.our_ratchet_key_pair.clone(),
        sending_chain,
        params.their_base_key,
    );

    tracing::trace!(
        one_time_pre_key = params.our_one_time_pre_key_pair.is_some(),
        "Initialized responder session"
    );
    Ok(state)
}

fn agree(ours: &PrivateKey, theirs: &PublicKey) -> Result<[u8; 32], SessionError> {
    Ok(ours.calculate_agreement(theirs)?)
}

fn derive_master_keys(agreements: &mut [[u8; 32]]) -> (RootKey, ChainKey) {
    let mut secret = Vec::with_capacity(32 * (agreements.len() + 1));
    secret.extend_from_slice(&DISCONTINUITY_BYTES);
    for agreement in agreements.iter_mut() {
        secret.extend_from_slice(agreement);
        agreement.zeroize();
    }

    let mut okm: [u8; 64] = HkdfVersion::V3.derive_array(&secret, None, MASTER_SECRET_INFO);
    let keys = keys::split_root_and_chain(HkdfVersion::V3, &okm);

    secret.zeroize();
    okm.zeroize();
    keys
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    struct Handshake {
        alice: AliceParameters,
        bob: BobParameters,
    }

    fn handshake(with_one_time: bool) -> Handshake {
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let alice_identity = IdentityKeyPair::generate(&mut rng);
        let bob_identity = IdentityKeyPair::generate(&mut rng);
        let base = KeyPair::generate(&mut rng);
        let signed = KeyPair::generate(&mut rng);
        let one_time = with_one_time.then(|| KeyPair::generate(&mut rng));

        Handshake {
            alice: AliceParameters {
                our_identity_key_pair: alice_identity.clone(),
                our_base_key_pair: base.clone(),
                their_identity_key: *bob_identity.identity_key(),
                their_signed_pre_key: signed.public_key,
                their_one_time_pre_key: one_time.as_ref().map(|pair| pair.public_key),
                their_ratchet_key: signed.public_key,
            },
            bob: BobParameters {
                our_identity_key_pair: bob_identity,
                our_signed_pre_key_pair: signed.clone(),
                our_one_time_pre_key_pair: one_time,
                our_ratchet_key_pair: signed,
                their_identity_key: *alice_identity.identity_key(),
                their_base_key: base.public_key,
            },
        }
    }

    #[test]
    fn both_sides_derive_the_same_first_chain() {
        for with_one_time in [false, true] {
            let Handshake { alice, bob } = handshake(with_one_time);
            let mut rng = ChaCha20Rng::seed_from_u64(3);
            let config = SessionConfig::default();

            let alice_state = initialize_alice_session(&alice, &mut rng, &config).unwrap();
            let bob_state = initialize_bob_session(&bob).unwrap();

            // Bob sends on the X3DH chain, Alice receives on it.
            let bob_ratchet = bob_state.sender_ratchet_key();
            assert_eq!(
                alice_state.receiver_chain_key(bob_ratchet),
                bob_state.sender_chain_key()
            );
            assert_eq!(alice_state.alice_base_key(), bob_state.alice_base_key());
            assert_eq!(alice_state.remote_identity_key(), bob_state.local_identity_key());
        }
    }

    #[test]
    fn alice_sending_step_matches_bob_receiving_step() {
        let Handshake { alice, bob } = handshake(true);
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let config = SessionConfig::default();

        let alice_state = initialize_alice_session(&alice, &mut rng, &config).unwrap();
        let bob_state = initialize_bob_session(&bob).unwrap();

        let (_, bob_view) = bob_state
            .root_key()
            .create_chain(
                alice_state.sender_ratchet_key(),
                &bob_state.sender_ratchet_key_pair().private_key,
            )
            .unwrap();
        assert_eq!(Some(&bob_view), alice_state.sender_chain_key());
    }

    #[test]
    fn missing_one_time_key_on_one_side_diverges() {
        let Handshake { alice, mut bob } = handshake(true);
        bob.our_one_time_pre_key_pair = None;
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let config = SessionConfig::default();

        let alice_state = initialize_alice_session(&alice, &mut rng, &config).unwrap();
        let bob_state = initialize_bob_session(&bob).unwrap();

        assert_ne!(
            alice_state.receiver_chain_key(bob_state.sender_ratchet_key()),
            bob_state.sender_chain_key()
        );
    }
}
