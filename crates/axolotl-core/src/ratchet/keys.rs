//! Root, chain and message keys of the pairwise ratchet.

use std::fmt;

use axolotl_crypto::{
    CryptoError, DerivedMessageSecrets, HkdfVersion, PrivateKey, PublicKey, hmac_sha256,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const MESSAGE_KEY_SEED: u8 = 0x01;
const CHAIN_KEY_SEED: u8 = 0x02;

const MESSAGE_KEYS_INFO: &[u8] = b"WhisperMessageKeys";
const RATCHET_INFO: &[u8] = b"WhisperRatchet";

/// Message keys for one message: AES key, MAC key, IV and the chain index
/// they were derived at.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
    iv: [u8; 16],
    counter: u32,
}

impl MessageKeys {
    /// Build from the three-way HKDF split.
    pub fn from_secrets(secrets: &DerivedMessageSecrets, counter: u32) -> Self {
        Self {
            cipher_key: *secrets.cipher_key(),
            mac_key: *secrets.mac_key(),
            iv: *secrets.iv(),
            counter,
        }
    }

    /// AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    /// HMAC-SHA256 key.
    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }

    /// CBC IV.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    /// Chain index of the message these keys belong to.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
        self.iv.zeroize();
    }
}

impl fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageKeys").field("counter", &self.counter).finish_non_exhaustive()
    }
}

/// Symmetric ratchet key for one sending or receiving chain.
///
/// # Invariants
///
/// - A chain key is never reused once advanced: callers replace it with
///   [`ChainKey::next_chain_key`] after deriving the message keys at its
///   index.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    kdf: HkdfVersion,
    key: [u8; 32],
    index: u32,
}

impl ChainKey {
    /// Chain key `key` positioned at `index`.
    pub fn new(kdf: HkdfVersion, key: [u8; 32], index: u32) -> Self {
        Self { kdf, key, index }
    }

    /// Raw key bytes.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Index of the next message on this chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// One step of the hash ratchet, or `None` once the index is exhausted.
    pub fn next_chain_key(&self) -> Option<Self> {
        Some(Self {
            kdf: self.kdf,
            key: self.base_material(CHAIN_KEY_SEED),
            index: self.index.checked_add(1)?,
        })
    }

    /// Message keys for the message at [`ChainKey::index`].
    pub fn message_keys(&self) -> MessageKeys {
        let mut seed = self.base_material(MESSAGE_KEY_SEED);
        let mut okm: [u8; DerivedMessageSecrets::SIZE] =
            self.kdf.derive_array(&seed, None, MESSAGE_KEYS_INFO);
        let keys = MessageKeys::from_secrets(&DerivedMessageSecrets::from_okm(&okm), self.index);

        seed.zeroize();
        okm.zeroize();
        keys
    }

    fn base_material(&self, seed: u8) -> [u8; 32] {
        hmac_sha256(&self.key, &[&[seed][..]])
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKey").field("index", &self.index).finish_non_exhaustive()
    }
}

/// Root of the ratchet. Advanced once per Diffie-Hellman step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKey {
    kdf: HkdfVersion,
    key: [u8; 32],
}

impl RootKey {
    /// Wrap raw root key bytes.
    pub fn new(kdf: HkdfVersion, key: [u8; 32]) -> Self {
        Self { kdf, key }
    }

    /// DH ratchet step: mix `DH(ours, theirs)` into the root to get the next
    /// root key and a fresh chain starting at index 0.
    pub fn create_chain(
        &self,
        their_ratchet_key: &PublicKey,
        our_ratchet_key: &PrivateKey,
    ) -> Result<(RootKey, ChainKey), CryptoError> {
        let mut shared = our_ratchet_key.calculate_agreement(their_ratchet_key)?;
        let mut okm: [u8; 64] = self.kdf.derive_array(&shared, Some(&self.key[..]), RATCHET_INFO);

        let (root, chain) = split_root_and_chain(self.kdf, &okm);
        shared.zeroize();
        okm.zeroize();
        Ok((root, chain))
    }
}

impl Drop for RootKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootKey").finish_non_exhaustive()
    }
}

/// Split 64 bytes of HKDF output into `root[0..32] || chain[32..64]`.
pub(crate) fn split_root_and_chain(kdf: HkdfVersion, okm: &[u8; 64]) -> (RootKey, ChainKey) {
    let mut root = [0u8; 32];
    let mut chain = [0u8; 32];
    root.copy_from_slice(&okm[..32]);
    chain.copy_from_slice(&okm[32..]);
    (RootKey::new(kdf, root), ChainKey::new(kdf, chain, 0))
}
