//! Generation of the long-term and pre-key material a device publishes.

use axolotl_crypto::{IdentityKeyPair, KeyPair};

use crate::{
    env::{EnvRng, Environment},
    state::{PreKeyRecord, SignedPreKeyRecord},
};

/// Largest registration id handed out (14 bits, never zero).
pub const MAX_REGISTRATION_ID: u32 = 0x3FFF;

/// Pre-key ids wrap below this bound.
pub const PRE_KEY_MEDIUM_MAX_VALUE: u32 = 0x00FF_FFFF;

/// Generate a long-term identity key pair.
pub fn generate_identity_key_pair<E: Environment>(env: &E) -> IdentityKeyPair {
    IdentityKeyPair::generate(&mut EnvRng(env))
}

/// Random registration id in `1..=MAX_REGISTRATION_ID`.
pub fn generate_registration_id<E: Environment>(env: &E) -> u32 {
    (env.random_u32() % MAX_REGISTRATION_ID) + 1
}

/// `count` one-time pre-keys with consecutive ids starting at `start`,
/// wrapping within `1..PRE_KEY_MEDIUM_MAX_VALUE`.
pub fn generate_pre_keys<E: Environment>(env: &E, start: u32, count: u32) -> Vec<PreKeyRecord> {
    let mut rng = EnvRng(env);
    (0..count)
        .map(|offset| {
            let id = (start.wrapping_add(offset).wrapping_sub(1) % (PRE_KEY_MEDIUM_MAX_VALUE - 1)) + 1;
            PreKeyRecord::new(id, KeyPair::generate(&mut rng))
        })
        .collect()
}

/// Signed pre-key: a fresh key pair whose serialized public key is signed by
/// the identity key, stamped with the environment's wall clock.
pub fn generate_signed_pre_key<E: Environment>(
    env: &E,
    identity_key_pair: &IdentityKeyPair,
    signed_pre_key_id: u32,
) -> SignedPreKeyRecord {
    let key_pair = KeyPair::generate(&mut EnvRng(env));
    let signature = identity_key_pair
        .private_key()
        .calculate_signature(&key_pair.public_key.serialize(), &env.random_array());

    SignedPreKeyRecord::new(signed_pre_key_id, env.wall_clock_secs(), key_pair, signature.to_vec())
}
