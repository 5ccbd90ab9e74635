//! Store traits the session engine reads and writes.
//!
//! The traits are synchronous and narrow. A miss is never an error: session
//! and sender-key loads return an empty record, pre-key loads return `None`.
//! Durability and cross-process locking are the implementation's concern;
//! the engine only requires that calls for one address are serialized.

mod error;
mod memory;

use axolotl_crypto::{IdentityKey, IdentityKeyPair};

pub use self::{
    error::StorageError,
    memory::{
        InMemIdentityKeyStore, InMemPreKeyStore, InMemSenderKeyStore, InMemSessionStore,
        InMemSignedPreKeyStore, InMemoryProtocolStore,
    },
};
use crate::{
    address::{ProtocolAddress, SenderKeyName},
    state::{PreKeyRecord, SenderKeyRecord, SessionRecord, SignedPreKeyRecord},
};

/// Which way a message is travelling when an identity is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// We are about to encrypt to the identity
    Sending,
    /// We received a message from the identity
    Receiving,
}

/// Our identity and the identities we have seen for peers.
pub trait IdentityKeyStore: Send + Sync {
    /// Our long-term identity key pair.
    fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError>;

    /// Our registration id.
    fn get_local_registration_id(&self) -> Result<u32, StorageError>;

    /// Remember `identity` for `address`. Returns true if it replaced a
    /// different key.
    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError>;

    /// Whether `identity` may be used for `address` in `direction`.
    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, StorageError>;

    /// Saved identity for `address`, if any.
    fn get_identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StorageError>;
}

/// Session records keyed by peer address.
pub trait SessionStore: Send + Sync {
    /// Record for `address`, or an empty record.
    fn load_session(&self, address: &ProtocolAddress) -> Result<SessionRecord, StorageError>;

    /// Replace the record for `address`.
    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StorageError>;

    /// Whether a record with a current state exists for `address`.
    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StorageError>;

    /// Remove the record for `address`.
    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StorageError>;

    /// Remove the records of every device of `name`.
    fn delete_all_sessions(&self, name: &str) -> Result<(), StorageError>;

    /// Device ids other than 1 with a session for `name`.
    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError>;
}

/// One-time pre-keys keyed by id.
pub trait PreKeyStore: Send + Sync {
    /// Pre-key `id`, if present.
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError>;

    /// Store pre-key `id`.
    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StorageError>;

    /// Whether pre-key `id` is present.
    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError>;

    /// Remove pre-key `id`.
    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError>;
}

/// Signed pre-keys keyed by id.
pub trait SignedPreKeyStore: Send + Sync {
    /// Signed pre-key `id`, if present.
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError>;

    /// Every stored signed pre-key.
    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError>;

    /// Store signed pre-key `id`.
    fn store_signed_pre_key(
        &self,
        id: u32,
        record: &SignedPreKeyRecord,
    ) -> Result<(), StorageError>;

    /// Whether signed pre-key `id` is present.
    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError>;

    /// Remove signed pre-key `id`.
    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError>;
}

/// Sender-key records keyed by `(group, sender)`.
pub trait SenderKeyStore: Send + Sync {
    /// Record for `name`, or an empty record.
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<SenderKeyRecord, StorageError>;

    /// Replace the record for `name`.
    fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StorageError>;
}

/// Everything a pairwise session needs.
pub trait ProtocolStore: IdentityKeyStore + SessionStore + PreKeyStore + SignedPreKeyStore {}

impl<T> ProtocolStore for T where T: IdentityKeyStore + SessionStore + PreKeyStore + SignedPreKeyStore {}
