//! Simulated devices.
//!
//! A [`Party`] owns one device's stores and wraps the session engine behind
//! send/receive calls that produce and consume [`Envelope`]s, the unit the
//! [`SimNetwork`](crate::SimNetwork) moves around.

use std::sync::atomic::{AtomicU32, Ordering};

use axolotl_core::{
    GroupCipher, GroupSessionBuilder, InMemoryProtocolStore, PreKeyBundle,
    ProtocolAddress, ProtocolStore, SenderKeyName, SenderKeyStore, SessionBuilder,
    SessionCipher, SessionConfig, SessionError, key_helper,
};
use axolotl_proto::{CiphertextMessage, CiphertextMessageType, SenderKeyDistributionMessage};

use crate::SimEnv;

/// Id of the one signed pre-key every party publishes.
pub const SIGNED_PRE_KEY_ID: u32 = 1;

/// How an envelope's bytes are to be interpreted by the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Pairwise message carrying application plaintext
    Direct,
    /// Pairwise message carrying our sender key for a group
    SenderKeyDistribution(String),
    /// Group message encrypted under the sender's key for a group
    Group(String),
}

/// One message in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sending device
    pub from: ProtocolAddress,
    /// Receiving device
    pub to: ProtocolAddress,
    /// What the payload carries
    pub channel: Channel,
    /// Transport-level type tag
    pub message_type: CiphertextMessageType,
    /// Serialized message
    pub bytes: Vec<u8>,
}

/// What a successfully received envelope yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Application plaintext, pairwise or group
    Message(Vec<u8>),
    /// A sender key for `group` was installed
    SenderKey {
        /// Group the key belongs to
        group: String,
    },
}

/// One simulated device.
pub struct Party<S = InMemoryProtocolStore> {
    address: ProtocolAddress,
    store: S,
    env: SimEnv,
    config: SessionConfig,
    next_pre_key_id: AtomicU32,
}

impl Party {
    /// Fresh device with in-memory stores and its own RNG stream forked from
    /// `env`.
    pub fn new(name: &str, device_id: u32, env: &SimEnv) -> Result<Self, SessionError> {
        let env = env.fork();
        let identity = key_helper::generate_identity_key_pair(&env);
        let store =
            InMemoryProtocolStore::new(identity, key_helper::generate_registration_id(&env));
        Self::with_store(ProtocolAddress::new(name, device_id), store, env)
    }
}

impl<S: ProtocolStore + SenderKeyStore + Clone> Party<S> {
    /// Device over an existing store. The store must already hold an
    /// identity; a signed pre-key is generated and stored here.
    pub fn with_store(address: ProtocolAddress, store: S, env: SimEnv) -> Result<Self, SessionError> {
        let identity = store.get_identity_key_pair()?;
        let signed = key_helper::generate_signed_pre_key(&env, &identity, SIGNED_PRE_KEY_ID);
        store.store_signed_pre_key(SIGNED_PRE_KEY_ID, &signed)?;

        Ok(Self {
            address,
            store,
            env,
            config: SessionConfig::default(),
            next_pre_key_id: AtomicU32::new(1),
        })
    }

    /// Replace the session limits.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// This device's address.
    pub fn address(&self) -> &ProtocolAddress {
        &self.address
    }

    /// This device's stores.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bundle with a freshly generated one-time pre-key, as a key server
    /// would hand it out.
    pub fn publish_bundle(&self) -> Result<PreKeyBundle, SessionError> {
        let id = self.next_pre_key_id.fetch_add(1, Ordering::Relaxed);
        let mut pre_key = None;
        for record in key_helper::generate_pre_keys(&self.env, id, 1) {
            self.store.store_pre_key(record.id(), &record)?;
            pre_key = Some((record.id(), record.key_pair().public_key));
        }

        let signed = self
            .store
            .load_signed_pre_key(SIGNED_PRE_KEY_ID)?
            .ok_or(SessionError::InvalidKeyId { id: SIGNED_PRE_KEY_ID })?;
        let identity = self.store.get_identity_key_pair()?;

        Ok(PreKeyBundle {
            registration_id: self.store.get_local_registration_id()?,
            device_id: self.address.device_id(),
            pre_key,
            signed_pre_key_id: signed.id(),
            signed_pre_key: signed.key_pair().public_key,
            signed_pre_key_signature: signed.signature().to_vec(),
            identity_key: *identity.identity_key(),
        })
    }

    /// Start a session with `peer` from its bundle.
    pub fn start_session(
        &self,
        peer: &ProtocolAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), SessionError> {
        SessionBuilder::with_config(self.store.clone(), peer.clone(), self.env.clone(), self.config)
            .process_pre_key_bundle(bundle)?;
        tracing::debug!(from = %self.address, to = %peer, "Session started");
        Ok(())
    }

    /// Encrypt application plaintext to `to`.
    pub fn encrypt(&self, to: &ProtocolAddress, plaintext: &[u8]) -> Result<Envelope, SessionError> {
        self.encrypt_on(to, Channel::Direct, plaintext)
    }

    /// Receive an envelope addressed to us.
    pub fn receive(&self, envelope: &Envelope) -> Result<Received, SessionError> {
        match &envelope.channel {
            Channel::Direct => self.decrypt_pairwise(envelope).map(Received::Message),
            Channel::SenderKeyDistribution(group) => {
                let bytes = self.decrypt_pairwise(envelope)?;
                let distribution = SenderKeyDistributionMessage::try_from(bytes.as_slice())?;
                let name = SenderKeyName::new(group.clone(), envelope.from.clone());
                self.group_builder().process(&name, &distribution)?;
                Ok(Received::SenderKey { group: group.clone() })
            },
            Channel::Group(group) => {
                let name = SenderKeyName::new(group.clone(), envelope.from.clone());
                self.group_cipher(name).decrypt_bytes(&envelope.bytes).map(Received::Message)
            },
        }
    }

    /// Our sender key for `group`, wrapped for `to` over the pairwise
    /// session.
    pub fn share_sender_key(
        &self,
        group: &str,
        to: &ProtocolAddress,
    ) -> Result<Envelope, SessionError> {
        let distribution = self.group_builder().create(&self.own_sender_key(group))?;
        self.encrypt_on(
            to,
            Channel::SenderKeyDistribution(group.to_owned()),
            distribution.serialized(),
        )
    }

    /// Encrypt once to `group` and address a copy to every member.
    pub fn group_encrypt(
        &self,
        group: &str,
        members: &[ProtocolAddress],
        plaintext: &[u8],
    ) -> Result<Vec<Envelope>, SessionError> {
        let message = self.group_cipher(self.own_sender_key(group)).encrypt(plaintext)?;
        Ok(members
            .iter()
            .map(|to| Envelope {
                from: self.address.clone(),
                to: to.clone(),
                channel: Channel::Group(group.to_owned()),
                message_type: CiphertextMessageType::SenderKey,
                bytes: message.serialized().to_vec(),
            })
            .collect())
    }

    fn encrypt_on(
        &self,
        to: &ProtocolAddress,
        channel: Channel,
        plaintext: &[u8],
    ) -> Result<Envelope, SessionError> {
        let message = self.session_cipher(to).encrypt(plaintext)?;
        Ok(Envelope {
            from: self.address.clone(),
            to: to.clone(),
            channel,
            message_type: message.message_type(),
            bytes: message.serialize().to_vec(),
        })
    }

    fn decrypt_pairwise(&self, envelope: &Envelope) -> Result<Vec<u8>, SessionError> {
        let message = CiphertextMessage::deserialize(envelope.message_type, &envelope.bytes)?;
        self.session_cipher(&envelope.from).decrypt(&message)
    }

    fn own_sender_key(&self, group: &str) -> SenderKeyName {
        SenderKeyName::new(group, self.address.clone())
    }

    fn session_cipher(&self, peer: &ProtocolAddress) -> SessionCipher<S, SimEnv> {
        SessionCipher::with_config(self.store.clone(), peer.clone(), self.env.clone(), self.config)
    }

    fn group_builder(&self) -> GroupSessionBuilder<S, SimEnv> {
        GroupSessionBuilder::with_config(self.store.clone(), self.env.clone(), self.config)
    }

    fn group_cipher(&self, name: SenderKeyName) -> GroupCipher<S, SimEnv> {
        GroupCipher::with_config(self.store.clone(), name, self.env.clone(), self.config)
    }
}

/// Full handshake: `initiator` builds from `responder`'s bundle and both
/// sides exchange one message, leaving both sessions acknowledged.
pub fn establish<A, B>(initiator: &Party<A>, responder: &Party<B>) -> Result<(), SessionError>
where
    A: ProtocolStore + SenderKeyStore + Clone,
    B: ProtocolStore + SenderKeyStore + Clone,
{
    initiator.start_session(responder.address(), &responder.publish_bundle()?)?;

    let hello = initiator.encrypt(responder.address(), b"hello")?;
    responder.receive(&hello)?;
    let reply = responder.encrypt(initiator.address(), b"hello back")?;
    initiator.receive(&reply)?;
    Ok(())
}
