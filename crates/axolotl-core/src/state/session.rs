//! Pairwise session state and the record that archives it.

use std::collections::VecDeque;

use axolotl_crypto::{IdentityKey, KeyPair, PublicKey};
use serde::{Deserialize, Serialize};

use super::{decode, encode};
use crate::{
    ratchet::{ChainKey, MessageKeys, RootKey, SkippedKeyCache},
    store::StorageError,
};

/// Handshake parameters repeated on every outgoing message until the peer
/// answers, so the peer can build the session from whichever message
/// arrives first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnacknowledgedPreKey {
    /// One-time pre-key consumed, if the bundle had one
    pub pre_key_id: Option<u32>,
    /// Signed pre-key used
    pub signed_pre_key_id: u32,
    /// Our ephemeral base key
    pub base_key: PublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReceiverChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
}

/// Ratchet state of one session with one peer device.
///
/// # Invariants
///
/// - At most one receive chain per distinct peer ratchet key
/// - `receiver_chains` is ordered oldest first and bounded by the limit
///   passed to [`SessionState::add_receiver_chain`]
/// - Every cached skipped key belongs to a retained receive chain
/// - `sender_chain_key` is `None` only between receiving a new peer ratchet
///   key and the next send, and `remote_ratchet_key` is then set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    session_version: u8,
    local_identity_key: IdentityKey,
    remote_identity_key: IdentityKey,
    root_key: RootKey,
    sender_ratchet_key_pair: KeyPair,
    sender_chain_key: Option<ChainKey>,
    remote_ratchet_key: Option<PublicKey>,
    receiver_chains: VecDeque<ReceiverChain>,
    skipped_keys: SkippedKeyCache<(PublicKey, u32), MessageKeys>,
    previous_counter: u32,
    unacknowledged_pre_key: Option<UnacknowledgedPreKey>,
    local_registration_id: u32,
    remote_registration_id: u32,
    alice_base_key: PublicKey,
}

impl SessionState {
    /// Fresh state with a sending chain and no receive chains.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_version: u8,
        local_identity_key: IdentityKey,
        remote_identity_key: IdentityKey,
        root_key: RootKey,
        sender_ratchet_key_pair: KeyPair,
        sender_chain_key: ChainKey,
        alice_base_key: PublicKey,
    ) -> Self {
        Self {
            session_version,
            local_identity_key,
            remote_identity_key,
            root_key,
            sender_ratchet_key_pair,
            sender_chain_key: Some(sender_chain_key),
            remote_ratchet_key: None,
            receiver_chains: VecDeque::new(),
            skipped_keys: SkippedKeyCache::new(),
            previous_counter: 0,
            unacknowledged_pre_key: None,
            local_registration_id: 0,
            remote_registration_id: 0,
            alice_base_key,
        }
    }

    /// Protocol version the session was created with.
    pub fn session_version(&self) -> u8 {
        self.session_version
    }

    /// Our identity key.
    pub fn local_identity_key(&self) -> &IdentityKey {
        &self.local_identity_key
    }

    /// Peer's identity key.
    pub fn remote_identity_key(&self) -> &IdentityKey {
        &self.remote_identity_key
    }

    /// Base key of the initiator; identifies the handshake this state came
    /// from.
    pub fn alice_base_key(&self) -> &PublicKey {
        &self.alice_base_key
    }

    /// Our registration id.
    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    /// Peer's registration id.
    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub(crate) fn set_registration_ids(&mut self, local: u32, remote: u32) {
        self.local_registration_id = local;
        self.remote_registration_id = remote;
    }

    /// Our current ratchet public key, as advertised in outgoing messages.
    pub fn sender_ratchet_key(&self) -> &PublicKey {
        &self.sender_ratchet_key_pair.public_key
    }

    pub(crate) fn sender_ratchet_key_pair(&self) -> &KeyPair {
        &self.sender_ratchet_key_pair
    }

    /// Index of the next message on the sending chain, if one is active.
    pub fn sender_chain_index(&self) -> Option<u32> {
        self.sender_chain_key.as_ref().map(ChainKey::index)
    }

    pub(crate) fn sender_chain_key(&self) -> Option<&ChainKey> {
        self.sender_chain_key.as_ref()
    }

    pub(crate) fn set_sender_chain(&mut self, key_pair: KeyPair, chain_key: ChainKey) {
        self.sender_ratchet_key_pair = key_pair;
        self.sender_chain_key = Some(chain_key);
    }

    pub(crate) fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain_key = Some(chain_key);
    }

    /// Retire the sending chain after the peer moved to a new ratchet key.
    /// Its last used counter becomes the `previous_counter` of the next
    /// chain.
    pub(crate) fn retire_sender_chain(&mut self) {
        if let Some(chain_key) = self.sender_chain_key.take() {
            self.previous_counter = chain_key.index().saturating_sub(1);
        }
    }

    pub(crate) fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub(crate) fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    /// Peer's most recent ratchet key.
    pub fn remote_ratchet_key(&self) -> Option<&PublicKey> {
        self.remote_ratchet_key.as_ref()
    }

    pub(crate) fn receiver_chain_key(&self, ratchet_key: &PublicKey) -> Option<&ChainKey> {
        self.receiver_chains
            .iter()
            .find(|chain| chain.ratchet_key == *ratchet_key)
            .map(|chain| &chain.chain_key)
    }

    /// Add the receive chain for a newly seen peer ratchet key, dropping the
    /// oldest chains (and their skipped keys) beyond `max_chains`.
    pub(crate) fn add_receiver_chain(
        &mut self,
        ratchet_key: PublicKey,
        chain_key: ChainKey,
        max_chains: usize,
    ) {
        debug_assert!(self.receiver_chain_key(&ratchet_key).is_none());

        self.receiver_chains.push_back(ReceiverChain { ratchet_key, chain_key });
        self.remote_ratchet_key = Some(ratchet_key);

        while self.receiver_chains.len() > max_chains.max(1) {
            if let Some(stale) = self.receiver_chains.pop_front() {
                tracing::debug!(
                    remaining = self.receiver_chains.len(),
                    "Dropping stale receive chain"
                );
                self.skipped_keys.retain(|(key, _)| *key != stale.ratchet_key);
            }
        }
    }

    pub(crate) fn set_receiver_chain_key(&mut self, ratchet_key: &PublicKey, chain_key: ChainKey) {
        if let Some(chain) =
            self.receiver_chains.iter_mut().find(|chain| chain.ratchet_key == *ratchet_key)
        {
            chain.chain_key = chain_key;
        }
    }

    /// Number of retained receive chains.
    pub fn receiver_chain_count(&self) -> usize {
        self.receiver_chains.len()
    }

    pub(crate) fn take_message_keys(
        &mut self,
        ratchet_key: &PublicKey,
        counter: u32,
    ) -> Option<MessageKeys> {
        self.skipped_keys.take(&(*ratchet_key, counter))
    }

    pub(crate) fn cache_message_keys(
        &mut self,
        ratchet_key: PublicKey,
        keys: MessageKeys,
        max_message_keys: usize,
    ) {
        let counter = keys.counter();
        if let Some(((_, evicted), _)) =
            self.skipped_keys.insert((ratchet_key, counter), keys, max_message_keys)
        {
            tracing::debug!(evicted_counter = evicted, "Skipped-key cache full, evicted oldest key");
        }
    }

    /// Number of cached skipped message keys.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped_keys.len()
    }

    /// Handshake parameters still attached to outgoing messages.
    pub fn unacknowledged_pre_key(&self) -> Option<&UnacknowledgedPreKey> {
        self.unacknowledged_pre_key.as_ref()
    }

    pub(crate) fn set_unacknowledged_pre_key(&mut self, pending: UnacknowledgedPreKey) {
        self.unacknowledged_pre_key = Some(pending);
    }

    pub(crate) fn clear_unacknowledged_pre_key(&mut self) {
        self.unacknowledged_pre_key = None;
    }
}

/// All session states for one peer device: the current one plus archived
/// predecessors.
///
/// Archived states stay decryptable so messages sent on a superseded session
/// (for example during simultaneous initiation) still decrypt.
///
/// # Invariants
///
/// - `previous` is ordered newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// Record holding one current state.
    pub fn new(state: SessionState) -> Self {
        Self { current: Some(state), previous: VecDeque::new() }
    }

    /// Whether the record holds no state at all.
    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    /// Current state.
    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Archived states, newest first.
    pub fn previous_session_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Whether any state (current or archived) came from the handshake with
    /// this version and initiator base key.
    pub fn has_session_state(&self, version: u8, alice_base_key: &PublicKey) -> bool {
        self.current.iter().chain(self.previous.iter()).any(|state| {
            state.session_version() == version && state.alice_base_key() == alice_base_key
        })
    }

    /// Move the current state into the archive.
    pub fn archive_current_state(&mut self, archived_states_max: usize) {
        if let Some(state) = self.current.take() {
            self.previous.push_front(state);
            self.previous.truncate(archived_states_max);
        }
    }

    /// Archive the current state and install `state` as current.
    pub(crate) fn promote_state(&mut self, state: SessionState, archived_states_max: usize) {
        self.archive_current_state(archived_states_max);
        self.current = Some(state);
    }

    /// Replace archived state `index` with `updated` and make it current.
    pub(crate) fn promote_old_session(
        &mut self,
        index: usize,
        updated: SessionState,
        archived_states_max: usize,
    ) {
        let _ = self.previous.remove(index);
        self.promote_state(updated, archived_states_max);
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
