#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use axolotl_crypto::{IdentityKey, IdentityKeyPair};

use super::{
    Direction, IdentityKeyStore, PreKeyStore, SenderKeyStore, SessionStore, SignedPreKeyStore,
    StorageError,
};
use crate::{
    address::{ProtocolAddress, SenderKeyName},
    state::{PreKeyRecord, SenderKeyRecord, SessionRecord, SignedPreKeyRecord},
};

/// Records are kept in their serialized form, the same bytes a durable
/// store would write.
type Bytes = Vec<u8>;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex.lock().map_err(|_| StorageError::Poisoned)
}

/// In-memory identity store with trust-on-first-use semantics.
///
/// An address with no saved identity trusts any key; afterwards only the
/// saved key is trusted until it is replaced with
/// [`IdentityKeyStore::save_identity`].
#[derive(Clone)]
pub struct InMemIdentityKeyStore {
    identity_key_pair: IdentityKeyPair,
    registration_id: u32,
    known: Arc<Mutex<HashMap<ProtocolAddress, IdentityKey>>>,
}

impl InMemIdentityKeyStore {
    /// Create a store for our identity.
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self { identity_key_pair, registration_id, known: Arc::default() }
    }
}

impl IdentityKeyStore for InMemIdentityKeyStore {
    fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError> {
        Ok(self.identity_key_pair.clone())
    }

    fn get_local_registration_id(&self) -> Result<u32, StorageError> {
        Ok(self.registration_id)
    }

    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError> {
        let previous = lock(&self.known)?.insert(address.clone(), *identity);
        Ok(previous.is_some_and(|previous| previous != *identity))
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> Result<bool, StorageError> {
        Ok(lock(&self.known)?.get(address).is_none_or(|known| known == identity))
    }

    fn get_identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StorageError> {
        Ok(lock(&self.known)?.get(address).copied())
    }
}

/// In-memory session store.
#[derive(Clone, Default)]
pub struct InMemSessionStore {
    sessions: Arc<Mutex<HashMap<ProtocolAddress, Bytes>>>,
}

impl InMemSessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemSessionStore {
    fn load_session(&self, address: &ProtocolAddress) -> Result<SessionRecord, StorageError> {
        match lock(&self.sessions)?.get(address) {
            Some(bytes) => SessionRecord::deserialize(bytes),
            None => Ok(SessionRecord::default()),
        }
    }

    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        let bytes = record.serialize()?;
        lock(&self.sessions)?.insert(address.clone(), bytes);
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StorageError> {
        let Some(bytes) = lock(&self.sessions)?.get(address).cloned() else {
            return Ok(false);
        };
        Ok(SessionRecord::deserialize(&bytes)?.session_state().is_some())
    }

    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StorageError> {
        lock(&self.sessions)?.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<(), StorageError> {
        lock(&self.sessions)?.retain(|address, _| address.name() != name);
        Ok(())
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError> {
        let mut devices: Vec<u32> = lock(&self.sessions)?
            .keys()
            .filter(|address| address.name() == name && address.device_id() != 1)
            .map(ProtocolAddress::device_id)
            .collect();
        devices.sort_unstable();
        Ok(devices)
    }
}

/// In-memory one-time pre-key store.
#[derive(Clone, Default)]
pub struct InMemPreKeyStore {
    pre_keys: Arc<Mutex<HashMap<u32, Bytes>>>,
}

impl InMemPreKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreKeyStore for InMemPreKeyStore {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        lock(&self.pre_keys)?.get(&id).map(|bytes| PreKeyRecord::deserialize(bytes)).transpose()
    }

    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StorageError> {
        let bytes = record.serialize()?;
        lock(&self.pre_keys)?.insert(id, bytes);
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        Ok(lock(&self.pre_keys)?.contains_key(&id))
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        lock(&self.pre_keys)?.remove(&id);
        Ok(())
    }
}

/// In-memory signed pre-key store.
#[derive(Clone, Default)]
pub struct InMemSignedPreKeyStore {
    signed_pre_keys: Arc<Mutex<HashMap<u32, Bytes>>>,
}

impl InMemSignedPreKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignedPreKeyStore for InMemSignedPreKeyStore {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        lock(&self.signed_pre_keys)?
            .get(&id)
            .map(|bytes| SignedPreKeyRecord::deserialize(bytes))
            .transpose()
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError> {
        let mut records = lock(&self.signed_pre_keys)?
            .values()
            .map(|bytes| SignedPreKeyRecord::deserialize(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(SignedPreKeyRecord::id);
        Ok(records)
    }

    fn store_signed_pre_key(
        &self,
        id: u32,
        record: &SignedPreKeyRecord,
    ) -> Result<(), StorageError> {
        let bytes = record.serialize()?;
        lock(&self.signed_pre_keys)?.insert(id, bytes);
        Ok(())
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        Ok(lock(&self.signed_pre_keys)?.contains_key(&id))
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        lock(&self.signed_pre_keys)?.remove(&id);
        Ok(())
    }
}

/// In-memory sender-key store.
#[derive(Clone, Default)]
pub struct InMemSenderKeyStore {
    sender_keys: Arc<Mutex<HashMap<SenderKeyName, Bytes>>>,
}

impl InMemSenderKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SenderKeyStore for InMemSenderKeyStore {
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<SenderKeyRecord, StorageError> {
        match lock(&self.sender_keys)?.get(name) {
            Some(bytes) => SenderKeyRecord::deserialize(bytes),
            None => Ok(SenderKeyRecord::default()),
        }
    }

    fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StorageError> {
        let bytes = record.serialize()?;
        lock(&self.sender_keys)?.insert(name.clone(), bytes);
        Ok(())
    }
}

/// All in-memory stores behind one handle.
///
/// Clones share the same underlying maps.
#[derive(Clone)]
pub struct InMemoryProtocolStore {
    /// Identity store
    pub identity_store: InMemIdentityKeyStore,
    /// Session store
    pub session_store: InMemSessionStore,
    /// One-time pre-key store
    pub pre_key_store: InMemPreKeyStore,
    /// Signed pre-key store
    pub signed_pre_key_store: InMemSignedPreKeyStore,
    /// Sender-key store
    pub sender_key_store: InMemSenderKeyStore,
}

impl InMemoryProtocolStore {
    /// Create empty stores for our identity.
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_store: InMemIdentityKeyStore::new(identity_key_pair, registration_id),
            session_store: InMemSessionStore::new(),
            pre_key_store: InMemPreKeyStore::new(),
            signed_pre_key_store: InMemSignedPreKeyStore::new(),
            sender_key_store: InMemSenderKeyStore::new(),
        }
    }
}

impl IdentityKeyStore for InMemoryProtocolStore {
    fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError> {
        self.identity_store.get_identity_key_pair()
    }

    fn get_local_registration_id(&self) -> Result<u32, StorageError> {
        self.identity_store.get_local_registration_id()
    }

    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError> {
        self.identity_store.save_identity(address, identity)
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, StorageError> {
        self.identity_store.is_trusted_identity(address, identity, direction)
    }

    fn get_identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StorageError> {
        self.identity_store.get_identity(address)
    }
}

impl SessionStore for InMemoryProtocolStore {
    fn load_session(&self, address: &ProtocolAddress) -> Result<SessionRecord, StorageError> {
        self.session_store.load_session(address)
    }

    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        self.session_store.store_session(address, record)
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StorageError> {
        self.session_store.contains_session(address)
    }

    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StorageError> {
        self.session_store.delete_session(address)
    }

    fn delete_all_sessions(&self, name: &str) -> Result<(), StorageError> {
        self.session_store.delete_all_sessions(name)
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError> {
        self.session_store.get_sub_device_sessions(name)
    }
}

impl PreKeyStore for InMemoryProtocolStore {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        self.pre_key_store.load_pre_key(id)
    }

    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StorageError> {
        self.pre_key_store.store_pre_key(id, record)
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.pre_key_store.contains_pre_key(id)
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.pre_key_store.remove_pre_key(id)
    }
}

impl SignedPreKeyStore for InMemoryProtocolStore {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        self.signed_pre_key_store.load_signed_pre_key(id)
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError> {
        self.signed_pre_key_store.load_signed_pre_keys()
    }

    fn store_signed_pre_key(
        &self,
        id: u32,
        record: &SignedPreKeyRecord,
    ) -> Result<(), StorageError> {
        self.signed_pre_key_store.store_signed_pre_key(id, record)
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.signed_pre_key_store.contains_signed_pre_key(id)
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.signed_pre_key_store.remove_signed_pre_key(id)
    }
}

impl SenderKeyStore for InMemoryProtocolStore {
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<SenderKeyRecord, StorageError> {
        self.sender_key_store.load_sender_key(name)
    }

    fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StorageError> {
        self.sender_key_store.store_sender_key(name, record)
    }
}
