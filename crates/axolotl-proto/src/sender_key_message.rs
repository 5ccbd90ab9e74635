//! Group sender-key messages.

use axolotl_crypto::{PrivateKey, PublicKey, xeddsa::SIGNATURE_LENGTH};
use bytes::Bytes;
use prost::Message;

use crate::{
    errors::{Result, WireError},
    proto, version_byte, version_from_byte,
};

/// Length of a sender-key chain key.
pub const CHAIN_KEY_LENGTH: usize = 32;

/// A message encrypted with a group sender key.
///
/// Layout on the wire:
/// `[version: 1 byte] + [protobuf body] + [XEdDSA signature: 64 bytes]`
///
/// # Security
///
/// The signature covers the version byte and the body. Receivers verify it
/// against the sender's signing key before touching the ratchet, so a
/// forged message never advances a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyMessage {
    message_version: u8,
    key_id: u32,
    iteration: u32,
    ciphertext: Bytes,
    serialized: Bytes,
}

impl SenderKeyMessage {
    /// Build and sign a message.
    pub fn new(
        message_version: u8,
        key_id: u32,
        iteration: u32,
        ciphertext: &[u8],
        signing_key: &PrivateKey,
        random: &[u8; 64],
    ) -> Self {
        let body = proto::SenderKeyMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            ciphertext: Some(ciphertext.to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + SIGNATURE_LENGTH);
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());
        let signature = signing_key.calculate_signature(&serialized, random);
        serialized.extend_from_slice(&signature);

        Self {
            message_version,
            key_id,
            iteration,
            ciphertext: Bytes::copy_from_slice(ciphertext),
            serialized: serialized.into(),
        }
    }

    /// Protocol version of this message.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// Sender-key id selecting the state within a record.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Chain iteration the message key was derived at.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// AES-256-CBC ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Full serialized message.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Verify the trailing signature with the sender's signing key.
    pub fn verify_signature(&self, signing_key: &PublicKey) -> bool {
        let split = self.serialized.len() - SIGNATURE_LENGTH;
        let (content, signature) = self.serialized.split_at(split);
        signing_key.verify_signature(content, signature)
    }
}

impl TryFrom<&[u8]> for SenderKeyMessage {
    type Error = WireError;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() < 1 + SIGNATURE_LENGTH {
            return Err(WireError::InvalidMessage { reason: "message too short" });
        }
        let message_version = version_from_byte(value[0])?;

        let body = proto::SenderKeyMessage::decode(&value[1..value.len() - SIGNATURE_LENGTH])?;
        let key_id = body.id.ok_or(WireError::InvalidMessage { reason: "missing key id" })?;
        let iteration =
            body.iteration.ok_or(WireError::InvalidMessage { reason: "missing iteration" })?;
        let ciphertext = body
            .ciphertext
            .ok_or(WireError::InvalidMessage { reason: "missing ciphertext" })?;

        Ok(Self {
            message_version,
            key_id,
            iteration,
            ciphertext: ciphertext.into(),
            serialized: Bytes::copy_from_slice(value),
        })
    }
}

/// Hands a sender's chain key and signing key to group members.
///
/// Layout on the wire: `[version: 1 byte] + [protobuf body]`
///
/// Sent over pairwise sessions, so it is already authenticated and encrypted
/// when it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyDistributionMessage {
    message_version: u8,
    key_id: u32,
    iteration: u32,
    chain_key: [u8; CHAIN_KEY_LENGTH],
    signing_key: PublicKey,
    serialized: Bytes,
}

impl SenderKeyDistributionMessage {
    /// Build a distribution message for the given chain position.
    pub fn new(
        message_version: u8,
        key_id: u32,
        iteration: u32,
        chain_key: [u8; CHAIN_KEY_LENGTH],
        signing_key: PublicKey,
    ) -> Self {
        let body = proto::SenderKeyDistributionMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            chain_key: Some(chain_key.to_vec()),
            signing_key: Some(signing_key.serialize().to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(version_byte(message_version));
        serialized.extend_from_slice(&body.encode_to_vec());

        Self {
            message_version,
            key_id,
            iteration,
            chain_key,
            signing_key,
            serialized: serialized.into(),
        }
    }

    /// Protocol version of this message.
    pub fn message_version(&self) -> u8 {
        self.message_version
    }

    /// Sender-key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Iteration of `chain_key`.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Chain key at `iteration`.
    pub fn chain_key(&self) -> &[u8; CHAIN_KEY_LENGTH] {
        &self.chain_key
    }

    /// Sender's signing public key.
    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }

    /// Full serialized message.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for SenderKeyDistributionMessage {
    type Error = WireError;

    fn try_from(value: &[u8]) -> Result<Self> {
        let Some((&version, rest)) = value.split_first() else {
            return Err(WireError::InvalidMessage { reason: "empty message" });
        };
        let message_version = version_from_byte(version)?;

        let body = proto::SenderKeyDistributionMessage::decode(rest)?;
        let key_id = body.id.ok_or(WireError::InvalidMessage { reason: "missing key id" })?;
        let iteration =
            body.iteration.ok_or(WireError::InvalidMessage { reason: "missing iteration" })?;
        let chain_key = body
            .chain_key
            .ok_or(WireError::InvalidMessage { reason: "missing chain key" })?;
        let chain_key = <[u8; CHAIN_KEY_LENGTH]>::try_from(chain_key.as_slice())
            .map_err(|_| WireError::InvalidMessage { reason: "bad chain key length" })?;
        let signing_key = body
            .signing_key
            .ok_or(WireError::InvalidMessage { reason: "missing signing key" })?;

        Ok(Self {
            message_version,
            key_id,
            iteration,
            chain_key,
            signing_key: PublicKey::deserialize(&signing_key)?,
            serialized: Bytes::copy_from_slice(value),
        })
    }
}
