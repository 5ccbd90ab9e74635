//! Long-term identity keys.

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    curve::{KeyPair, PrivateKey, PublicKey, SERIALIZED_PUBLIC_KEY_LENGTH},
    error::CryptoError,
};

/// A party's long-term public identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    public_key: PublicKey,
}

impl IdentityKey {
    /// Wrap a public key as an identity key.
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    /// Underlying public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Serialized form (type tag + 32 bytes).
    pub fn serialize(&self) -> [u8; SERIALIZED_PUBLIC_KEY_LENGTH] {
        self.public_key.serialize()
    }

    /// Parse a serialized identity key.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CryptoError> {
        PublicKey::deserialize(bytes).map(Self::new)
    }

    /// Hex fingerprint of the serialized key, for logs and display.
    pub fn fingerprint(&self) -> String {
        self.serialize().iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<PublicKey> for IdentityKey {
    fn from(public_key: PublicKey) -> Self {
        Self::new(public_key)
    }
}

/// A party's long-term identity key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    identity_key: IdentityKey,
    private_key: PrivateKey,
}

impl IdentityKeyPair {
    /// Generate a new identity key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        KeyPair::generate(rng).into()
    }

    /// Build from existing halves.
    pub fn new(identity_key: IdentityKey, private_key: PrivateKey) -> Self {
        Self { identity_key, private_key }
    }

    /// Public identity key.
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Public key underlying the identity.
    pub fn public_key(&self) -> &PublicKey {
        self.identity_key.public_key()
    }

    /// Private half.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

impl From<KeyPair> for IdentityKeyPair {
    fn from(pair: KeyPair) -> Self {
        Self { identity_key: IdentityKey::new(pair.public_key), private_key: pair.private_key }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn identity_roundtrip() {
        let pair = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(1));
        let bytes = pair.identity_key().serialize();

        assert_eq!(IdentityKey::deserialize(&bytes).unwrap(), *pair.identity_key());
        assert_eq!(pair.private_key().public_key(), *pair.public_key());
    }

    #[test]
    fn fingerprint_is_serialized_hex() {
        let pair = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(2));
        let fingerprint = pair.identity_key().fingerprint();

        assert_eq!(fingerprint.len(), 66);
        assert!(fingerprint.starts_with("05"));
    }
}
