use axolotl_crypto::KeyPair;
use axolotl_proto::{CIPHERTEXT_MESSAGE_CURRENT_VERSION, SenderKeyDistributionMessage};

use super::MAX_KEY_ID;
use crate::{
    SessionConfig,
    address::SenderKeyName,
    env::{EnvRng, Environment},
    error::SessionError,
    store::SenderKeyStore,
};

/// Creates our sender keys and installs the ones other members distribute.
pub struct GroupSessionBuilder<S, E> {
    store: S,
    env: E,
    config: SessionConfig,
}

impl<S: SenderKeyStore, E: Environment> GroupSessionBuilder<S, E> {
    /// Builder with the default limits.
    pub fn new(store: S, env: E) -> Self {
        Self::with_config(store, env, SessionConfig::default())
    }

    /// Builder with explicit limits.
    pub fn with_config(store: S, env: E, config: SessionConfig) -> Self {
        Self { store, env, config }
    }

    /// Install a sender key received from another member.
    ///
    /// Re-delivery of a known `(key id, signing key)` is ignored, so a
    /// retransmitted distribution message never rewinds the chain.
    pub fn process(
        &self,
        name: &SenderKeyName,
        message: &SenderKeyDistributionMessage,
    ) -> Result<(), SessionError> {
        let mut record = self.store.load_sender_key(name)?;
        let installed = record.add_sender_key_state(
            message.key_id(),
            message.iteration(),
            *message.chain_key(),
            *message.signing_key(),
            self.config.max_sender_key_states,
        );

        if installed {
            self.store.store_sender_key(name, &record)?;
            tracing::debug!(
                sender_key = %name,
                key_id = message.key_id(),
                iteration = message.iteration(),
                "Installed sender key"
            );
        } else {
            tracing::debug!(sender_key = %name, key_id = message.key_id(), "Sender key already known");
        }
        Ok(())
    }

    /// Distribution message for our own sender key in `name`'s group,
    /// creating the key first if we have none.
    ///
    /// The message carries the chain at its current iteration, so members
    /// who receive it later cannot read earlier messages.
    pub fn create(&self, name: &SenderKeyName) -> Result<SenderKeyDistributionMessage, SessionError> {
        let mut record = self.store.load_sender_key(name)?;

        if record.is_empty() {
            let key_id = self.env.random_u32() & MAX_KEY_ID;
            let signing_key = KeyPair::generate(&mut EnvRng(&self.env));
            record.set_sender_key_state(
                key_id,
                0,
                self.env.random_array(),
                signing_key,
            );
            self.store.store_sender_key(name, &record)?;
            tracing::debug!(sender_key = %name, key_id, "Created sender key");
        }

        let Some(state) = record.sender_key_state() else {
            return Err(SessionError::NoSession { address: name.to_string() });
        };
        Ok(SenderKeyDistributionMessage::new(
            CIPHERTEXT_MESSAGE_CURRENT_VERSION,
            state.key_id(),
            state.chain_key().iteration(),
            *state.chain_key().seed(),
            *state.signing_key_public(),
        ))
    }
}
