//! Pairwise Double Ratchet encryption and decryption.
//!
//! # Decryption
//!
//! A message is tried against the current session state, then against each
//! archived state. Each attempt runs on a copy; only a state that fully
//! authenticates and decrypts the message is written back (and promoted to
//! current if it was archived). A rejected message therefore never changes
//! the stored record.
//!
//! Within one state the message key is resolved as:
//!
//! 1. A cached skipped key for `(ratchet key, counter)` is used and removed
//! 2. Otherwise the receive chain for the ratchet key is found, or created
//!    with a Diffie-Hellman step if the ratchet key is new
//! 3. A counter behind the chain is a duplicate; a counter too far ahead is
//!    rejected; keys for skipped counters are cached
//!
//! # Sending
//!
//! The sending ratchet step is lazy: receiving a new peer ratchet key retires
//! the sending chain, and the next [`SessionCipher::encrypt`] generates a
//! fresh ratchet key pair.

use axolotl_crypto::{KeyPair, PublicKey, aes_256_cbc_decrypt, aes_256_cbc_encrypt};
use axolotl_proto::{CiphertextMessage, PreKeySignalMessage, SignalMessage};

use crate::{
    SessionConfig,
    address::ProtocolAddress,
    env::{EnvRng, Environment},
    error::SessionError,
    ratchet::{ChainKey, MessageKeys},
    session_builder::SessionBuilder,
    state::{SessionRecord, SessionState},
    store::{Direction, ProtocolStore},
};

/// Encrypts to and decrypts from one remote device.
pub struct SessionCipher<S, E> {
    store: S,
    remote_address: ProtocolAddress,
    env: E,
    config: SessionConfig,
}

impl<S: ProtocolStore + Clone, E: Environment> SessionCipher<S, E> {
    /// Cipher with the default limits.
    pub fn new(store: S, remote_address: ProtocolAddress, env: E) -> Self {
        Self::with_config(store, remote_address, env, SessionConfig::default())
    }

    /// Cipher with explicit limits.
    pub fn with_config(
        store: S,
        remote_address: ProtocolAddress,
        env: E,
        config: SessionConfig,
    ) -> Self {
        Self { store, remote_address, env, config }
    }

    /// Encrypt `plaintext` on the current session.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no session exists for the remote address
    /// - `UntrustedIdentity` if the session's identity is no longer trusted
    /// - `InvalidKey` if the sending chain has no indices left
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CiphertextMessage, SessionError> {
        let mut record = self.store.load_session(&self.remote_address)?;
        let state = record.session_state_mut().ok_or_else(|| self.no_session())?;

        if !self.store.is_trusted_identity(
            &self.remote_address,
            state.remote_identity_key(),
            Direction::Sending,
        )? {
            tracing::warn!(address = %self.remote_address, "Refusing to encrypt to untrusted identity");
            return Err(self.untrusted());
        }

        let chain_key = match state.sender_chain_key().cloned() {
            Some(chain_key) => chain_key,
            None => self.sending_ratchet_step(state)?,
        };
        let Some(next_chain_key) = chain_key.next_chain_key() else {
            return Err(SessionError::InvalidKey { reason: "sending chain exhausted".to_owned() });
        };
        let keys = chain_key.message_keys();
        let ciphertext = aes_256_cbc_encrypt(plaintext, keys.cipher_key(), keys.iv());

        let message = SignalMessage::new(
            state.session_version(),
            keys.mac_key(),
            *state.sender_ratchet_key(),
            chain_key.index(),
            state.previous_counter(),
            &ciphertext,
            state.local_identity_key(),
            state.remote_identity_key(),
        );

        let message = match state.unacknowledged_pre_key() {
            Some(pending) => CiphertextMessage::from(PreKeySignalMessage::new(
                state.session_version(),
                state.local_registration_id(),
                pending.pre_key_id,
                pending.signed_pre_key_id,
                pending.base_key,
                *state.local_identity_key(),
                message,
            )),
            None => CiphertextMessage::from(message),
        };

        state.set_sender_chain_key(next_chain_key);
        self.store.store_session(&self.remote_address, &record)?;

        tracing::trace!(
            address = %self.remote_address,
            counter = chain_key.index(),
            message_type = ?message.message_type(),
            "Encrypted message"
        );
        Ok(message)
    }

    /// Decrypt any pairwise message.
    pub fn decrypt(&self, message: &CiphertextMessage) -> Result<Vec<u8>, SessionError> {
        match message {
            CiphertextMessage::Signal(message) => self.decrypt_signal_message(message),
            CiphertextMessage::PreKeySignal(message) => self.decrypt_pre_key_message(message),
            CiphertextMessage::SenderKey(_) | CiphertextMessage::SenderKeyDistribution(_) => {
                Err(SessionError::invalid_message("not a pairwise message"))
            },
        }
    }

    /// Decrypt a session-initiating message, building the responder session
    /// first if needed.
    ///
    /// The consumed one-time pre-key is removed only after the message
    /// decrypts.
    pub fn decrypt_pre_key_message(
        &self,
        message: &PreKeySignalMessage,
    ) -> Result<Vec<u8>, SessionError> {
        let mut record = self.store.load_session(&self.remote_address)?;
        let builder = SessionBuilder::with_config(
            self.store.clone(),
            self.remote_address.clone(),
            self.env.clone(),
            self.config,
        );
        let consumed_pre_key = builder.process(&mut record, message)?;

        let plaintext = self.decrypt_with_record(&mut record, message.message())?;

        self.store.save_identity(&self.remote_address, message.identity_key())?;
        self.store.store_session(&self.remote_address, &record)?;
        if let Some(id) = consumed_pre_key {
            self.store.remove_pre_key(id)?;
        }
        Ok(plaintext)
    }

    /// Decrypt a message on an established session.
    ///
    /// # Errors
    ///
    /// - `NoSession` if nothing is stored for the remote address
    /// - `DuplicateMessage` if the counter was already consumed
    /// - `InvalidMessage` if no session state authenticates the message
    /// - `UntrustedIdentity` if the session's identity is no longer trusted
    pub fn decrypt_signal_message(&self, message: &SignalMessage) -> Result<Vec<u8>, SessionError> {
        let mut record = self.store.load_session(&self.remote_address)?;
        let plaintext = self.decrypt_with_record(&mut record, message)?;

        let Some(state) = record.session_state() else {
            return Err(self.no_session());
        };
        let remote_identity = *state.remote_identity_key();
        if !self.store.is_trusted_identity(
            &self.remote_address,
            &remote_identity,
            Direction::Receiving,
        )? {
            tracing::warn!(address = %self.remote_address, "Message from untrusted identity");
            return Err(self.untrusted());
        }

        self.store.save_identity(&self.remote_address, &remote_identity)?;
        self.store.store_session(&self.remote_address, &record)?;
        Ok(plaintext)
    }

    /// Registration id of the remote device on the current session.
    pub fn remote_registration_id(&self) -> Result<u32, SessionError> {
        self.with_current_state(SessionState::remote_registration_id)
    }

    /// Version of the current session.
    pub fn session_version(&self) -> Result<u8, SessionError> {
        self.with_current_state(SessionState::session_version)
    }

    fn with_current_state<T>(&self, f: impl FnOnce(&SessionState) -> T) -> Result<T, SessionError> {
        let record = self.store.load_session(&self.remote_address)?;
        record.session_state().map(f).ok_or_else(|| self.no_session())
    }

    fn decrypt_with_record(
        &self,
        record: &mut SessionRecord,
        message: &SignalMessage,
    ) -> Result<Vec<u8>, SessionError> {
        if record.is_fresh() {
            return Err(self.no_session());
        }

        let mut first_error = None;

        if let Some(current) = record.session_state() {
            let mut state = current.clone();
            match self.decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    record.set_session_state(state);
                    return Ok(plaintext);
                },
                Err(err @ SessionError::DuplicateMessage { .. }) => return Err(err),
                Err(err) => first_error = Some(err),
            }
        }

        let mut promoted = None;
        for (index, previous) in record.previous_session_states().enumerate() {
            let mut state = previous.clone();
            match self.decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    promoted = Some((index, state, plaintext));
                    break;
                },
                Err(err @ SessionError::DuplicateMessage { .. }) => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                },
            }
        }

        if let Some((index, state, plaintext)) = promoted {
            tracing::debug!(
                address = %self.remote_address,
                archived_index = index,
                "Promoted archived session state"
            );
            record.promote_old_session(index, state, self.config.archived_states_max);
            return Ok(plaintext);
        }

        let err = first_error.unwrap_or_else(|| SessionError::invalid_message("no session state"));
        tracing::warn!(address = %self.remote_address, error = %err, "Rejected message");
        Err(err)
    }

    fn decrypt_with_state(
        &self,
        state: &mut SessionState,
        message: &SignalMessage,
    ) -> Result<Vec<u8>, SessionError> {
        if message.message_version() != state.session_version() {
            return Err(SessionError::invalid_message(format!(
                "message version {} on session version {}",
                message.message_version(),
                state.session_version()
            )));
        }

        let their_ratchet_key = message.sender_ratchet_key();
        let keys = self.message_keys(state, their_ratchet_key, message.counter())?;

        if !message.verify_mac(state.remote_identity_key(), state.local_identity_key(), keys.mac_key())
        {
            return Err(SessionError::invalid_message("MAC verification failed"));
        }

        let plaintext = aes_256_cbc_decrypt(message.body(), keys.cipher_key(), keys.iv())?;
        state.clear_unacknowledged_pre_key();
        Ok(plaintext)
    }

    fn message_keys(
        &self,
        state: &mut SessionState,
        their_ratchet_key: &PublicKey,
        counter: u32,
    ) -> Result<MessageKeys, SessionError> {
        if let Some(keys) = state.take_message_keys(their_ratchet_key, counter) {
            return Ok(keys);
        }

        let mut chain_key = match state.receiver_chain_key(their_ratchet_key).cloned() {
            Some(chain_key) => chain_key,
            None => self.receiving_ratchet_step(state, their_ratchet_key)?,
        };

        if counter < chain_key.index() {
            return Err(SessionError::DuplicateMessage { chain_index: chain_key.index(), counter });
        }
        if counter - chain_key.index() > self.config.max_forward_jumps {
            return Err(SessionError::invalid_message(format!(
                "counter {counter} is more than {} past chain index {}",
                self.config.max_forward_jumps,
                chain_key.index()
            )));
        }

        let exhausted = || SessionError::invalid_message("receive chain has no indices left");
        while chain_key.index() < counter {
            state.cache_message_keys(
                *their_ratchet_key,
                chain_key.message_keys(),
                self.config.max_message_keys,
            );
            chain_key = chain_key.next_chain_key().ok_or_else(exhausted)?;
        }

        let keys = chain_key.message_keys();
        let next_chain_key = chain_key.next_chain_key().ok_or_else(exhausted)?;
        state.set_receiver_chain_key(their_ratchet_key, next_chain_key);
        Ok(keys)
    }

    /// DH step for a new peer ratchet key: derive its receive chain against
    /// our current ratchet key and retire our sending chain.
    fn receiving_ratchet_step(
        &self,
        state: &mut SessionState,
        their_ratchet_key: &PublicKey,
    ) -> Result<ChainKey, SessionError> {
        let (root_key, chain_key) = state
            .root_key()
            .create_chain(their_ratchet_key, &state.sender_ratchet_key_pair().private_key)?;

        state.set_root_key(root_key);
        state.add_receiver_chain(*their_ratchet_key, chain_key.clone(), self.config.max_receiver_chains);
        state.retire_sender_chain();

        tracing::debug!(
            address = %self.remote_address,
            ratchet_key = ?their_ratchet_key,
            "Receiving ratchet step"
        );
        Ok(chain_key)
    }

    /// DH step before the first message after a receiving step: fresh ratchet
    /// key pair, new sending chain.
    fn sending_ratchet_step(&self, state: &mut SessionState) -> Result<ChainKey, SessionError> {
        let Some(their_ratchet_key) = state.remote_ratchet_key().copied() else {
            return Err(SessionError::InvalidKey {
                reason: "session has neither a sending chain nor a peer ratchet key".to_owned(),
            });
        };

        let key_pair = KeyPair::generate(&mut EnvRng(&self.env));
        let (root_key, chain_key) =
            state.root_key().create_chain(&their_ratchet_key, &key_pair.private_key)?;

        state.set_root_key(root_key);
        state.set_sender_chain(key_pair, chain_key.clone());

        tracing::debug!(address = %self.remote_address, "Sending ratchet step");
        Ok(chain_key)
    }

    fn no_session(&self) -> SessionError {
        SessionError::NoSession { address: self.remote_address.to_string() }
    }

    fn untrusted(&self) -> SessionError {
        SessionError::UntrustedIdentity { address: self.remote_address.to_string() }
    }
}
