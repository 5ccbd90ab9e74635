//! Group sender-key chains and the record holding them.

use std::{collections::VecDeque, fmt};

use axolotl_crypto::{HkdfVersion, KeyPair, PrivateKey, PublicKey, hmac_sha256};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{decode, encode};
use crate::{ratchet::SkippedKeyCache, store::StorageError};

const MESSAGE_KEY_SEED: u8 = 0x01;
const CHAIN_KEY_SEED: u8 = 0x02;
const GROUP_INFO: &[u8] = b"WhisperGroup";

/// Per-message key of a sender-key chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderMessageKey {
    iteration: u32,
    iv: [u8; 16],
    cipher_key: [u8; 32],
}

impl SenderMessageKey {
    /// Expand a message-key seed into IV and cipher key.
    pub fn new(iteration: u32, seed: &[u8; 32]) -> Self {
        let mut okm: [u8; 48] = HkdfVersion::V3.derive_array(seed, None, GROUP_INFO);
        let mut iv = [0u8; 16];
        let mut cipher_key = [0u8; 32];
        iv.copy_from_slice(&okm[..16]);
        cipher_key.copy_from_slice(&okm[16..]);
        okm.zeroize();
        Self { iteration, iv, cipher_key }
    }

    /// Chain iteration this key belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// CBC IV.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    /// AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }
}

impl Drop for SenderMessageKey {
    fn drop(&mut self) {
        self.iv.zeroize();
        self.cipher_key.zeroize();
    }
}

impl fmt::Debug for SenderMessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderMessageKey").field("iteration", &self.iteration).finish_non_exhaustive()
    }
}

/// Hash-ratchet chain key of a sender-key state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChainKey {
    iteration: u32,
    chain_key: [u8; 32],
}

impl SenderChainKey {
    /// Chain key at `iteration`.
    pub fn new(iteration: u32, chain_key: [u8; 32]) -> Self {
        Self { iteration, chain_key }
    }

    /// Iteration of the next message.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw chain key.
    pub fn seed(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Key for the message at [`SenderChainKey::iteration`].
    pub fn sender_message_key(&self) -> SenderMessageKey {
        let mut seed = hmac_sha256(&self.chain_key, &[&[MESSAGE_KEY_SEED][..]]);
        let key = SenderMessageKey::new(self.iteration, &seed);
        seed.zeroize();
        key
    }

    /// One step of the hash ratchet, or `None` once the iteration counter
    /// is exhausted.
    pub fn next(&self) -> Option<Self> {
        Some(Self {
            iteration: self.iteration.checked_add(1)?,
            chain_key: hmac_sha256(&self.chain_key, &[&[CHAIN_KEY_SEED][..]]),
        })
    }
}

impl Drop for SenderChainKey {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

impl fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderChainKey").field("iteration", &self.iteration).finish_non_exhaustive()
    }
}

/// One sender-key epoch: chain, signing key and skipped keys.
///
/// Only the sender holds the private signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_key_public: PublicKey,
    signing_key_private: Option<PrivateKey>,
    skipped_keys: SkippedKeyCache<u32, SenderMessageKey>,
}

impl SenderKeyState {
    /// State for a chain, holding the private signing key only if it is ours.
    pub fn new(
        key_id: u32,
        chain_key: SenderChainKey,
        signing_key_public: PublicKey,
        signing_key_private: Option<PrivateKey>,
    ) -> Self {
        Self {
            key_id,
            chain_key,
            signing_key_public,
            signing_key_private,
            skipped_keys: SkippedKeyCache::new(),
        }
    }

    /// Sender-key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Current chain key.
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    /// Public signing key.
    pub fn signing_key_public(&self) -> &PublicKey {
        &self.signing_key_public
    }

    /// Private signing key, present only on the sending side.
    pub fn signing_key_private(&self) -> Option<&PrivateKey> {
        self.signing_key_private.as_ref()
    }

    pub(crate) fn take_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        self.skipped_keys.take(&iteration)
    }

    pub(crate) fn cache_message_key(&mut self, key: SenderMessageKey, max_message_keys: usize) {
        if let Some((evicted, _)) =
            self.skipped_keys.insert(key.iteration(), key, max_message_keys)
        {
            tracing::debug!(evicted_iteration = evicted, "Sender-key cache full, evicted oldest key");
        }
    }

    /// Number of cached skipped keys.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped_keys.len()
    }
}

/// All sender-key states for one `(group, sender)`, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// Whether no state is installed.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Newest state.
    pub fn sender_key_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub(crate) fn sender_key_state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    /// State with the given key id.
    pub fn sender_key_state_by_id(&self, key_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.key_id == key_id)
    }

    pub(crate) fn sender_key_state_by_id_mut(&mut self, key_id: u32) -> Option<&mut SenderKeyState> {
        self.states.iter_mut().find(|state| state.key_id == key_id)
    }

    /// Install a received state as newest. Returns false and leaves the
    /// record untouched if the same `(key_id, signing key)` is already
    /// present.
    pub fn add_sender_key_state(
        &mut self,
        key_id: u32,
        iteration: u32,
        chain_key: [u8; 32],
        signing_key: PublicKey,
        max_states: usize,
    ) -> bool {
        let known = self
            .states
            .iter()
            .any(|state| state.key_id == key_id && state.signing_key_public == signing_key);
        if known {
            return false;
        }

        self.states.push_front(SenderKeyState::new(
            key_id,
            SenderChainKey::new(iteration, chain_key),
            signing_key,
            None,
        ));
        self.states.truncate(max_states.max(1));
        true
    }

    /// Replace every state with our own sending state.
    pub fn set_sender_key_state(
        &mut self,
        key_id: u32,
        iteration: u32,
        chain_key: [u8; 32],
        signing_key: KeyPair,
    ) {
        self.states.clear();
        self.states.push_front(SenderKeyState::new(
            key_id,
            SenderChainKey::new(iteration, chain_key),
            signing_key.public_key,
            Some(signing_key.private_key),
        ));
    }

    /// Number of states held.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Encode for storage.
    pub fn serialize(&self) -> Result<Vec<u8>, StorageError> {
        encode(self)
    }

    /// Decode a stored record.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn message_key_layout_is_iv_then_cipher_key() {
        let seed = [0x42; 32];
        let key = SenderMessageKey::new(3, &seed);
        let okm: [u8; 48] = HkdfVersion::V3.derive_array(&seed, None, b"WhisperGroup");

        assert_eq!(key.iv(), &okm[..16]);
        assert_eq!(key.cipher_key(), &okm[16..]);
        assert_eq!(key.iteration(), 3);
    }

    #[test]
    fn chain_advances_and_keys_differ() {
        let chain = SenderChainKey::new(0, [1; 32]);
        let next = chain.next().unwrap();

        assert_eq!(next.iteration(), 1);
        assert_ne!(next.seed(), chain.seed());
        assert_ne!(chain.sender_message_key().cipher_key(), next.sender_message_key().cipher_key());
        assert_eq!(next.sender_message_key().iteration(), 1);
    }

    #[test]
    fn chain_stops_at_last_iteration() {
        let chain = SenderChainKey::new(u32::MAX, [1; 32]);

        assert!(chain.next().is_none());
        assert_eq!(chain.sender_message_key().iteration(), u32::MAX);
    }

    #[test]
    fn duplicate_distribution_is_ignored() {
        let signing = KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(1)).public_key;
        let mut record = SenderKeyRecord::default();

        assert!(record.add_sender_key_state(7, 0, [1; 32], signing, 5));
        assert!(!record.add_sender_key_state(7, 4, [2; 32], signing, 5));

        assert_eq!(record.len(), 1);
        assert_eq!(record.sender_key_state_by_id(7).unwrap().chain_key().iteration(), 0);
    }

    #[test]
    fn states_are_bounded_newest_first() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let mut record = SenderKeyRecord::default();

        for key_id in 0..4 {
            let signing = KeyPair::generate(&mut rng).public_key;
            record.add_sender_key_state(key_id, 0, [0; 32], signing, 3);
        }

        assert_eq!(record.len(), 3);
        assert_eq!(record.sender_key_state().unwrap().key_id(), 3);
        assert!(record.sender_key_state_by_id(0).is_none());
    }

    #[test]
    fn own_state_keeps_private_key_through_storage() {
        let pair = KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(3));
        let mut record = SenderKeyRecord::default();
        record.set_sender_key_state(11, 0, [5; 32], pair.clone());

        let decoded = SenderKeyRecord::deserialize(&record.serialize().unwrap()).unwrap();
        let state = decoded.sender_key_state().unwrap();
        assert_eq!(state.key_id(), 11);
        assert_eq!(state.signing_key_public(), &pair.public_key);
        assert_eq!(state.signing_key_private().unwrap().public_key(), pair.public_key);
    }
}
