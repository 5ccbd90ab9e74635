use axolotl_crypto::{aes_256_cbc_decrypt, aes_256_cbc_encrypt};
use axolotl_proto::{CIPHERTEXT_MESSAGE_CURRENT_VERSION, SenderKeyMessage};

use crate::{
    SessionConfig,
    address::SenderKeyName,
    env::Environment,
    error::SessionError,
    state::{SenderKeyState, SenderMessageKey},
    store::SenderKeyStore,
};

/// Encrypts our messages to a group, or decrypts one member's messages.
pub struct GroupCipher<S, E> {
    store: S,
    name: SenderKeyName,
    env: E,
    config: SessionConfig,
}

impl<S: SenderKeyStore, E: Environment> GroupCipher<S, E> {
    /// Cipher with the default limits.
    pub fn new(store: S, name: SenderKeyName, env: E) -> Self {
        Self::with_config(store, name, env, SessionConfig::default())
    }

    /// Cipher with explicit limits.
    pub fn with_config(store: S, name: SenderKeyName, env: E, config: SessionConfig) -> Self {
        Self { store, name, env, config }
    }

    /// Encrypt and sign `plaintext` with our sender key.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no sender key was created for this group
    /// - `InvalidKey` if the sender key is another member's (no private
    ///   signing key) or its chain has no iterations left
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SenderKeyMessage, SessionError> {
        let mut record = self.store.load_sender_key(&self.name)?;
        let state = record.sender_key_state_mut().ok_or_else(|| self.no_session())?;
        let Some(signing_key) = state.signing_key_private().cloned() else {
            return Err(SessionError::InvalidKey {
                reason: "sender key has no private signing key".to_owned(),
            });
        };
        let Some(next) = state.chain_key().next() else {
            return Err(SessionError::InvalidKey { reason: "sender chain exhausted".to_owned() });
        };

        let message_key = state.chain_key().sender_message_key();
        let ciphertext =
            aes_256_cbc_encrypt(plaintext, message_key.cipher_key(), message_key.iv());
        let message = SenderKeyMessage::new(
            CIPHERTEXT_MESSAGE_CURRENT_VERSION,
            state.key_id(),
            message_key.iteration(),
            &ciphertext,
            &signing_key,
            &self.env.random_array(),
        );

        state.set_chain_key(next);
        self.store.store_sender_key(&self.name, &record)?;

        tracing::trace!(sender_key = %self.name, iteration = message.iteration(), "Encrypted group message");
        Ok(message)
    }

    /// Verify and decrypt a member's message.
    ///
    /// The signature is checked before the chain is touched; nothing is
    /// stored unless the message decrypts.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no sender key with the message's key id is installed
    /// - `InvalidMessage` on a bad signature, an iteration too far ahead or
    ///   past the end of the chain, or an undecryptable body
    /// - `DuplicateMessage` if the iteration was already consumed
    pub fn decrypt(&self, message: &SenderKeyMessage) -> Result<Vec<u8>, SessionError> {
        let mut record = self.store.load_sender_key(&self.name)?;
        let Some(state) = record.sender_key_state_by_id_mut(message.key_id()) else {
            tracing::warn!(sender_key = %self.name, key_id = message.key_id(), "No sender key for message");
            return Err(self.no_session());
        };

        if !message.verify_signature(state.signing_key_public()) {
            tracing::warn!(sender_key = %self.name, "Group message signature invalid");
            return Err(SessionError::invalid_message("sender-key signature does not verify"));
        }

        let message_key = self.sender_message_key(state, message.iteration())?;
        let plaintext =
            aes_256_cbc_decrypt(message.ciphertext(), message_key.cipher_key(), message_key.iv())?;

        self.store.store_sender_key(&self.name, &record)?;
        Ok(plaintext)
    }

    /// Parse and decrypt a serialized [`SenderKeyMessage`].
    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.decrypt(&SenderKeyMessage::try_from(bytes)?)
    }

    fn sender_message_key(
        &self,
        state: &mut SenderKeyState,
        iteration: u32,
    ) -> Result<SenderMessageKey, SessionError> {
        if let Some(key) = state.take_message_key(iteration) {
            return Ok(key);
        }

        let mut chain_key = state.chain_key().clone();
        if iteration < chain_key.iteration() {
            tracing::warn!(sender_key = %self.name, iteration, "Duplicate group message");
            return Err(SessionError::DuplicateMessage {
                chain_index: chain_key.iteration(),
                counter: iteration,
            });
        }
        if iteration - chain_key.iteration() > self.config.max_forward_jumps {
            return Err(SessionError::invalid_message(format!(
                "iteration {iteration} is more than {} past chain iteration {}",
                self.config.max_forward_jumps,
                chain_key.iteration()
            )));
        }

        let exhausted = || SessionError::invalid_message("sender chain has no iterations left");
        while chain_key.iteration() < iteration {
            state.cache_message_key(chain_key.sender_message_key(), self.config.max_message_keys);
            chain_key = chain_key.next().ok_or_else(exhausted)?;
        }

        let key = chain_key.sender_message_key();
        state.set_chain_key(chain_key.next().ok_or_else(exhausted)?);
        Ok(key)
    }

    fn no_session(&self) -> SessionError {
        SessionError::NoSession { address: self.name.to_string() }
    }
}
