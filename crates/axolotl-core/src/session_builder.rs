//! X3DH session establishment.
//!
//! The initiator builds a session from the responder's published
//! [`PreKeyBundle`]; the responder builds the mirror session when the first
//! [`PreKeySignalMessage`] arrives. Both paths archive whatever session was
//! current before, so a message sent on the old session still decrypts.

use axolotl_crypto::KeyPair;
use axolotl_proto::PreKeySignalMessage;

use crate::{
    SessionConfig,
    address::ProtocolAddress,
    env::{EnvRng, Environment},
    error::SessionError,
    ratchet::{self, AliceParameters, BobParameters},
    state::{PreKeyBundle, SessionRecord, UnacknowledgedPreKey},
    store::{Direction, ProtocolStore},
};

/// Builds sessions with one remote device.
pub struct SessionBuilder<S, E> {
    store: S,
    remote_address: ProtocolAddress,
    env: E,
    config: SessionConfig,
}

impl<S: ProtocolStore, E: Environment> SessionBuilder<S, E> {
    /// Builder with the default limits.
    pub fn new(store: S, remote_address: ProtocolAddress, env: E) -> Self {
        Self::with_config(store, remote_address, env, SessionConfig::default())
    }

    /// Builder with explicit limits.
    pub fn with_config(
        store: S,
        remote_address: ProtocolAddress,
        env: E,
        config: SessionConfig,
    ) -> Self {
        Self { store, remote_address, env, config }
    }

    /// Start a session from the responder's pre-key bundle.
    ///
    /// Until the responder answers, every message encrypted on the new
    /// session is wrapped in a [`PreKeySignalMessage`] carrying the handshake
    /// parameters.
    ///
    /// # Errors
    ///
    /// - `UntrustedIdentity` if the bundle's identity conflicts with the
    ///   one on record
    /// - `InvalidKey` if the signed pre-key signature does not verify, or an
    ///   agreement with a bundle key is degenerate
    pub fn process_pre_key_bundle(&self, bundle: &PreKeyBundle) -> Result<(), SessionError> {
        if !self.store.is_trusted_identity(
            &self.remote_address,
            &bundle.identity_key,
            Direction::Sending,
        )? {
            tracing::warn!(address = %self.remote_address, "Rejected bundle from untrusted identity");
            return Err(SessionError::UntrustedIdentity {
                address: self.remote_address.to_string(),
            });
        }

        if !bundle.has_valid_signature() {
            tracing::warn!(address = %self.remote_address, "Bundle signed pre-key signature invalid");
            return Err(SessionError::InvalidKey {
                reason: "signed pre-key signature does not verify".to_owned(),
            });
        }

        let mut rng = EnvRng(&self.env);
        let our_base_key_pair = KeyPair::generate(&mut rng);
        let base_key = our_base_key_pair.public_key;

        let params = AliceParameters {
            our_identity_key_pair: self.store.get_identity_key_pair()?,
            our_base_key_pair,
            their_identity_key: bundle.identity_key,
            their_signed_pre_key: bundle.signed_pre_key,
            their_one_time_pre_key: bundle.pre_key.map(|(_, key)| key),
            their_ratchet_key: bundle.signed_pre_key,
        };
        let mut state = ratchet::initialize_alice_session(&params, &mut rng, &self.config)?;

        state.set_unacknowledged_pre_key(UnacknowledgedPreKey {
            pre_key_id: bundle.pre_key.map(|(id, _)| id),
            signed_pre_key_id: bundle.signed_pre_key_id,
            base_key,
        });
        state.set_registration_ids(
            self.store.get_local_registration_id()?,
            bundle.registration_id,
        );

        let mut record = self.store.load_session(&self.remote_address)?;
        let replaced = !record.is_fresh();
        record.promote_state(state, self.config.archived_states_max);
        self.store.store_session(&self.remote_address, &record)?;
        self.store.save_identity(&self.remote_address, &bundle.identity_key)?;

        tracing::debug!(
            address = %self.remote_address,
            one_time_pre_key = bundle.pre_key.is_some(),
            replaced,
            "Built session from pre-key bundle"
        );
        Ok(())
    }

    /// Install the responder session for an incoming pre-key message into
    /// `record`.
    ///
    /// Returns the one-time pre-key id the message consumed, which the caller
    /// removes once the message has decrypted. Returns `None` without
    /// touching `record` if the handshake was already processed.
    pub(crate) fn process(
        &self,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>, SessionError> {
        if !self.store.is_trusted_identity(
            &self.remote_address,
            message.identity_key(),
            Direction::Receiving,
        )? {
            tracing::warn!(address = %self.remote_address, "Rejected pre-key message from untrusted identity");
            return Err(SessionError::UntrustedIdentity {
                address: self.remote_address.to_string(),
            });
        }

        if record.has_session_state(message.message_version(), message.base_key()) {
            tracing::debug!(address = %self.remote_address, "Handshake already processed");
            return Ok(None);
        }

        let signed_pre_key = self
            .store
            .load_signed_pre_key(message.signed_pre_key_id())?
            .ok_or(SessionError::InvalidKeyId { id: message.signed_pre_key_id() })?;

        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => Some(
                self.store.load_pre_key(id)?.ok_or(SessionError::InvalidKeyId { id })?,
            ),
            None => None,
        };

        let params = BobParameters {
            our_identity_key_pair: self.store.get_identity_key_pair()?,
            our_signed_pre_key_pair: signed_pre_key.key_pair().clone(),
            our_one_time_pre_key_pair: one_time_pre_key.as_ref().map(|record| record.key_pair().clone()),
            our_ratchet_key_pair: signed_pre_key.key_pair().clone(),
            their_identity_key: *message.identity_key(),
            their_base_key: *message.base_key(),
        };
        let mut state = ratchet::initialize_bob_session(&params)?;
        state.set_registration_ids(
            self.store.get_local_registration_id()?,
            message.registration_id(),
        );

        record.promote_state(state, self.config.archived_states_max);

        tracing::debug!(
            address = %self.remote_address,
            signed_pre_key_id = message.signed_pre_key_id(),
            one_time_pre_key_id = ?message.pre_key_id(),
            "Built session from pre-key message"
        );
        Ok(message.pre_key_id())
    }
}
