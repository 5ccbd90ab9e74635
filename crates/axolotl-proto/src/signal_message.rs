//! Pairwise ratchet messages.

use axolotl_crypto::{IdentityKey, PublicKey, constant_time_eq, hmac_sha256};
use bytes::Bytes;
use prost::Message;

use crate::{
    errors::{Result, WireError},
    proto, version_byte, version_from_byte,
};

/// Length of the truncated MAC appended to every [`SignalMessage`].
pub const MAC_LENGTH: usize = 8;

/// An encrypted message on an established session.
///
/// Layout on the wire:
/// `[version: 1 byte] + [protobuf body] + [MAC: 8 bytes]`
///
/// # Invariants
///
/// - `serialized` is exactly the bytes this message was parsed from or built
///   into, so re-serializing never changes the MAC input.
///
/// # Security
///
/// Parsing validates structure only. The MAC covers both identity keys, the
/// version byte and the body, and must be checked with
/// [`SignalMessage::verify_mac`] before the ciphertext is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    message_version: u8,
    sender_ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Bytes,
    serialized: Bytes,
}

impl SignalMessage {
    /// Build and authenticate a message.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_version: u8,
        mac_key: &[u8; 32],
        sender_ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: &[u8],
        sender_identity_key: &IdentityKey,
        receiver_identity_key: &IdentityKey,
    ) -> Self {
        let body = proto::SignalMessage {
            ratchet_key: Some(sender_ratchet_key.serialize().to_vec()),
            counter: Some(counter),
            previous_counter: Some(previous_counter),
            ciphertext: Some(ciphertext.to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + MAC_LENGTH);
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());
        let mac = compute_mac(sender_identity_key, receiver_identity_key, mac_key, &serialized);
        serialized.extend_from_slice(&mac);

        Self {
            message_version,
            sender_ratchet_key,
            counter,
            previous_counter,
            ciphertext: Bytes::copy_from_slice(ciphertext),
            serialized: serialized.into(),
        }
    }

    /// Protocol version of this message.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// Sender's current ratchet public key.
    pub fn sender_ratchet_key(&self) -> &PublicKey {
        &self.sender_ratchet_key
    }

    /// Position of this message in the sender's chain.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Length of the sender's previous sending chain.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// AES-256-CBC ciphertext.
    pub fn body(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Full serialized message.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Check the truncated MAC in constant time.
    pub fn verify_mac(
        &self,
        sender_identity_key: &IdentityKey,
        receiver_identity_key: &IdentityKey,
        mac_key: &[u8; 32],
    ) -> bool {
        let split = self.serialized.len() - MAC_LENGTH;
        let (content, their_mac) = self.serialized.split_at(split);
        let our_mac = compute_mac(sender_identity_key, receiver_identity_key, mac_key, content);
        constant_time_eq(&our_mac, their_mac)
    }
}

fn compute_mac(
    sender_identity_key: &IdentityKey,
    receiver_identity_key: &IdentityKey,
    mac_key: &[u8; 32],
    content: &[u8],
) -> [u8; MAC_LENGTH] {
    let full = hmac_sha256(mac_key, &[
        &sender_identity_key.serialize()[..],
        &receiver_identity_key.serialize()[..],
        content,
    ]);
    let mut mac = [0u8; MAC_LENGTH];
    mac.copy_from_slice(&full[..MAC_LENGTH]);
    mac
}

impl TryFrom<&[u8]> for SignalMessage {
    type Error = WireError;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() < 1 + MAC_LENGTH {
            return Err(WireError::InvalidMessage { reason: "message too short" });
        }
        let message_version = version_from_byte(value[0])?;

        let body = proto::SignalMessage::decode(&value[1..value.len() - MAC_LENGTH])?;
        let ratchet_key = body
            .ratchet_key
            .ok_or(WireError::InvalidMessage { reason: "missing ratchet key" })?;
        let counter = body.counter.ok_or(WireError::InvalidMessage { reason: "missing counter" })?;
        let ciphertext = body
            .ciphertext
            .ok_or(WireError::InvalidMessage { reason: "missing ciphertext" })?;

        Ok(Self {
            message_version,
            sender_ratchet_key: PublicKey::deserialize(&ratchet_key)?,
            counter,
            previous_counter: body.previous_counter.unwrap_or(0),
            ciphertext: ciphertext.into(),
            serialized: Bytes::copy_from_slice(value),
        })
    }
}

/// First message of a session, carrying the X3DH parameters the responder
/// needs to build the session before decrypting the embedded
/// [`SignalMessage`].
///
/// Layout on the wire: `[version: 1 byte] + [protobuf body]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeySignalMessage {
    message_version: u8,
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
    identity_key: IdentityKey,
    message: SignalMessage,
    serialized: Bytes,
}

impl PreKeySignalMessage {
    /// Wrap `message` with the initiator's handshake parameters.
    pub fn new(
        message_version: u8,
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: PublicKey,
        identity_key: IdentityKey,
        message: SignalMessage,
    ) -> Self {
        let body = proto::PreKeySignalMessage {
            registration_id: Some(registration_id),
            pre_key_id,
            signed_pre_key_id: Some(signed_pre_key_id),
            base_key: Some(base_key.serialize().to_vec()),
            identity_key: Some(identity_key.serialize().to_vec()),
            message: Some(message.serialized().to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());

        Self {
            message_version,
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized: serialized.into(),
        }
    }

    /// Protocol version of this message.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// Sender's registration id (0 if absent).
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// One-time pre-key consumed by the initiator, if any.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Signed pre-key used by the initiator.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Initiator's ephemeral base key.
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    /// Initiator's identity key.
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Embedded ratchet message.
    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    /// Full serialized message.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for PreKeySignalMessage {
    type Error = WireError;

    fn try_from(value: &[u8]) -> Result<Self> {
        let Some((&version, rest)) = value.split_first() else {
            return Err(WireError::InvalidMessage { reason: "empty message" });
        };
        let message_version = version_from_byte(version)?;

        let body = proto::PreKeySignalMessage::decode(rest)?;
        let signed_pre_key_id = body
            .signed_pre_key_id
            .ok_or(WireError::InvalidMessage { reason: "missing signed pre-key id" })?;
        let base_key =
            body.base_key.ok_or(WireError::InvalidMessage { reason: "missing base key" })?;
        let identity_key = body
            .identity_key
            .ok_or(WireError::InvalidMessage { reason: "missing identity key" })?;
        let message =
            body.message.ok_or(WireError::InvalidMessage { reason: "missing inner message" })?;

        Ok(Self {
            message_version,
            registration_id: body.registration_id.unwrap_or(0),
            pre_key_id: body.pre_key_id,
            signed_pre_key_id,
            base_key: PublicKey::deserialize(&base_key)?,
            identity_key: IdentityKey::deserialize(&identity_key)?,
            message: SignalMessage::try_from(message.as_slice())?,
            serialized: Bytes::copy_from_slice(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::KeyPair;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::CIPHERTEXT_MESSAGE_CURRENT_VERSION;

    struct Fixture {
        ratchet: KeyPair,
        sender: IdentityKey,
        receiver: IdentityKey,
        mac_key: [u8; 32],
    }

    fn fixture() -> Fixture {
        let mut rng = StdRng::seed_from_u64(42);
        Fixture {
            ratchet: KeyPair::generate(&mut rng),
            sender: IdentityKey::new(KeyPair::generate(&mut rng).public_key),
            receiver: IdentityKey::new(KeyPair::generate(&mut rng).public_key),
            mac_key: [0x5a; 32],
        }
    }

    fn message(f: &Fixture) -> SignalMessage {
        SignalMessage::new(
            CIPHERTEXT_MESSAGE_CURRENT_VERSION,
            &f.mac_key,
            f.ratchet.public_key,
            7,
            3,
            b"ciphertext-bytes",
            &f.sender,
            &f.receiver,
        )
    }

    #[test]
    fn signal_message_parses_back() {
        let f = fixture();
        let original = message(&f);
        assert_eq!(original.serialized()[0], 0x33);

        let parsed = SignalMessage::try_from(original.serialized()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.counter(), 7);
        assert_eq!(parsed.previous_counter(), 3);
        assert_eq!(parsed.body(), b"ciphertext-bytes");
        assert!(parsed.verify_mac(&f.sender, &f.receiver, &f.mac_key));
    }

    #[test]
    fn mac_binds_identities_and_key() {
        let f = fixture();
        let msg = message(&f);

        assert!(!msg.verify_mac(&f.receiver, &f.sender, &f.mac_key));
        assert!(!msg.verify_mac(&f.sender, &f.receiver, &[0u8; 32]));
    }

    #[test]
    fn tampered_body_fails_mac() {
        let f = fixture();
        let mut bytes = message(&f).serialized().to_vec();
        let last_body_byte = bytes.len() - MAC_LENGTH - 1;
        bytes[last_body_byte] ^= 0x01;

        // Flipping a ciphertext byte keeps the protobuf valid.
        let parsed = SignalMessage::try_from(bytes.as_slice()).unwrap();
        assert!(!parsed.verify_mac(&f.sender, &f.receiver, &f.mac_key));
    }

    #[test]
    fn rejects_version_and_length() {
        let f = fixture();
        let mut bytes = message(&f).serialized().to_vec();

        bytes[0] = 0x22;
        assert_eq!(
            SignalMessage::try_from(bytes.as_slice()),
            Err(WireError::LegacyMessage { version: 2 })
        );
        bytes[0] = 0x43;
        assert_eq!(
            SignalMessage::try_from(bytes.as_slice()),
            Err(WireError::UnknownVersion { version: 4 })
        );
        assert!(matches!(
            SignalMessage::try_from(&bytes[..5]),
            Err(WireError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn missing_fields_rejected() {
        let body = proto::SignalMessage {
            ratchet_key: None,
            counter: Some(1),
            previous_counter: None,
            ciphertext: Some(vec![1, 2, 3]),
        };
        let mut bytes = vec![0x33];
        bytes.extend_from_slice(&body.encode_to_vec());
        bytes.extend_from_slice(&[0u8; MAC_LENGTH]);

        assert_eq!(
            SignalMessage::try_from(bytes.as_slice()),
            Err(WireError::InvalidMessage { reason: "missing ratchet key" })
        );
    }

    #[test]
    fn pre_key_message_parses_back() {
        let f = fixture();
        let mut rng = StdRng::seed_from_u64(7);
        let base_key = KeyPair::generate(&mut rng).public_key;

        let original = PreKeySignalMessage::new(
            CIPHERTEXT_MESSAGE_CURRENT_VERSION,
            1234,
            Some(31),
            22,
            base_key,
            f.sender,
            message(&f),
        );
        let parsed = PreKeySignalMessage::try_from(original.serialized()).unwrap();

        assert_eq!(parsed, original);
        assert_eq!(parsed.pre_key_id(), Some(31));
        assert_eq!(parsed.signed_pre_key_id(), 22);
        assert_eq!(parsed.registration_id(), 1234);
        assert!(parsed.message().verify_mac(&f.sender, &f.receiver, &f.mac_key));
    }

    #[test]
    fn pre_key_message_without_one_time_key() {
        let f = fixture();
        let original = PreKeySignalMessage::new(
            CIPHERTEXT_MESSAGE_CURRENT_VERSION,
            1,
            None,
            5,
            f.ratchet.public_key,
            f.sender,
            message(&f),
        );
        let parsed = PreKeySignalMessage::try_from(original.serialized()).unwrap();
        assert_eq!(parsed.pre_key_id(), None);
    }

    #[test]
    fn pre_key_message_rejects_empty() {
        assert!(matches!(
            PreKeySignalMessage::try_from(&[][..]),
            Err(WireError::InvalidMessage { .. })
        ));
    }
}
