//! Pre-key records and the bundle a responder publishes.

use axolotl_crypto::{IdentityKey, KeyPair, PublicKey};
use serde::{Deserialize, Serialize};

use super::{decode, encode};
use crate::store::StorageError;

/// A one-time pre-key. Consumed by the first session built against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    /// Create a record.
    pub fn new(id: u32, key_pair: KeyPair) -> Self {
        Self { id, key_pair }
    }

    /// Pre-key id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
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

/// A medium-term pre-key signed by the identity key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: u32,
    timestamp: u64,
    key_pair: KeyPair,
    signature: Vec<u8>,
}

impl SignedPreKeyRecord {
    /// Create a record.
    pub fn new(id: u32, timestamp: u64, key_pair: KeyPair, signature: Vec<u8>) -> Self {
        Self { id, timestamp, key_pair, signature }
    }

    /// Signed pre-key id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Creation time, seconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Identity signature over the serialized public key.
    pub fn signature(&self) -> &[u8] {
        &self.signature
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

/// Public keys a responder publishes so initiators can start sessions
/// without a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyBundle {
    /// Responder's registration id
    pub registration_id: u32,
    /// Device the bundle belongs to
    pub device_id: u32,
    /// One-time pre-key, absent once the server runs out
    pub pre_key: Option<(u32, PublicKey)>,
    /// Signed pre-key id
    pub signed_pre_key_id: u32,
    /// Signed pre-key
    pub signed_pre_key: PublicKey,
    /// Identity signature over the serialized signed pre-key
    pub signed_pre_key_signature: Vec<u8>,
    /// Responder's identity key
    pub identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Whether the signed pre-key signature verifies against the identity
    /// key.
    pub fn has_valid_signature(&self) -> bool {
        self.identity_key
            .public_key()
            .verify_signature(&self.signed_pre_key.serialize(), &self.signed_pre_key_signature)
    }
}
