//! Store wrapper that fails record commits at random.
//!
//! Only the writes that commit a ratchet step fail: `store_session` and
//! `store_sender_key`. Every other call is delegated untouched. The engine
//! writes nothing else after those, so a failed operation leaves the stores
//! as they were and the caller may retry it.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use axolotl_core::{
    Direction, IdentityKeyStore, PreKeyRecord, PreKeyStore, ProtocolAddress, SenderKeyName,
    SenderKeyRecord, SenderKeyStore, SessionRecord, SessionStore, SignedPreKeyRecord,
    SignedPreKeyStore, StorageError,
};
use axolotl_crypto::{IdentityKey, IdentityKeyPair};

/// Wraps a store and fails commits with probability `failure_rate`.
#[derive(Clone)]
pub struct ChaoticStore<S> {
    inner: S,
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    injected: Arc<Mutex<usize>>,
}

/// LCG so a failing seed replays exactly.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0.0, 1.0)`.
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S> ChaoticStore<S> {
    /// Wrap `inner`, seeding failure injection with `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            injected: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store, for checking state after chaos.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of failures injected so far.
    pub fn injected_failures(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.injected.lock().expect("injected mutex poisoned")
    }

    fn chaos(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;
        if fail {
            #[allow(clippy::expect_used)]
            let mut injected = self.injected.lock().expect("injected mutex poisoned");
            *injected += 1;
            return Err(StorageError::Io("chaotic failure injection".to_owned()));
        }
        Ok(())
    }
}

impl<S: IdentityKeyStore> IdentityKeyStore for ChaoticStore<S> {
    fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError> {
        self.inner.get_identity_key_pair()
    }

    fn get_local_registration_id(&self) -> Result<u32, StorageError> {
        self.inner.get_local_registration_id()
    }

    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError> {
        self.inner.save_identity(address, identity)
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, StorageError> {
        self.inner.is_trusted_identity(address, identity, direction)
    }

    fn get_identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, StorageError> {
        self.inner.get_identity(address)
    }
}

impl<S: SessionStore> SessionStore for ChaoticStore<S> {
    fn load_session(&self, address: &ProtocolAddress) -> Result<SessionRecord, StorageError> {
        self.inner.load_session(address)
    }

    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        self.chaos()?;
        self.inner.store_session(address, record)
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, StorageError> {
        self.inner.contains_session(address)
    }

    fn delete_session(&self, address: &ProtocolAddress) -> Result<(), StorageError> {
        self.inner.delete_session(address)
    }

    fn delete_all_sessions(&self, name: &str) -> Result<(), StorageError> {
        self.inner.delete_all_sessions(name)
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError> {
        self.inner.get_sub_device_sessions(name)
    }
}

impl<S: PreKeyStore> PreKeyStore for ChaoticStore<S> {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        self.inner.load_pre_key(id)
    }

    fn store_pre_key(&self, id: u32, record: &PreKeyRecord) -> Result<(), StorageError> {
        self.inner.store_pre_key(id, record)
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.inner.contains_pre_key(id)
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.inner.remove_pre_key(id)
    }
}

impl<S: SignedPreKeyStore> SignedPreKeyStore for ChaoticStore<S> {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        self.inner.load_signed_pre_key(id)
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError> {
        self.inner.load_signed_pre_keys()
    }

    fn store_signed_pre_key(
        &self,
        id: u32,
        record: &SignedPreKeyRecord,
    ) -> Result<(), StorageError> {
        self.inner.store_signed_pre_key(id, record)
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.inner.contains_signed_pre_key(id)
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.inner.remove_signed_pre_key(id)
    }
}

impl<S: SenderKeyStore> SenderKeyStore for ChaoticStore<S> {
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<SenderKeyRecord, StorageError> {
        self.inner.load_sender_key(name)
    }

    fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StorageError> {
        self.chaos()?;
        self.inner.store_sender_key(name, record)
    }
}

#[cfg(test)]
mod tests {
    use axolotl_core::InMemoryProtocolStore;

    use super::*;
    use crate::SimEnv;

    fn store() -> InMemoryProtocolStore {
        let env = SimEnv::with_seed(5);
        InMemoryProtocolStore::new(axolotl_core::key_helper::generate_identity_key_pair(&env), 7)
    }

    #[test]
    fn zero_rate_never_fails() {
        let chaotic = ChaoticStore::with_seed(store(), 0.0, 1);
        let address = ProtocolAddress::new("bob", 1);
        for _ in 0..100 {
            chaotic.store_session(&address, &SessionRecord::default()).unwrap();
        }
        assert_eq!(chaotic.injected_failures(), 0);
    }

    #[test]
    fn full_rate_always_fails_commits_only() {
        let chaotic = ChaoticStore::with_seed(store(), 1.0, 1);
        let address = ProtocolAddress::new("bob", 1);

        assert!(matches!(
            chaotic.store_session(&address, &SessionRecord::default()),
            Err(StorageError::Io(_))
        ));
        assert!(chaotic.load_session(&address).is_ok());
        assert!(chaotic.get_local_registration_id().is_ok());
        assert_eq!(chaotic.injected_failures(), 1);
    }
}
