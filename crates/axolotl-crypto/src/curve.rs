//! Curve25519 keys, Diffie-Hellman agreement and signatures.
//!
//! A serialized public key is a one-byte type tag followed by the 32-byte
//! Montgomery u-coordinate. Only the Curve25519 ("djb") type exists. Private
//! keys are stored clamped so the same scalar serves X25519 agreement and
//! XEdDSA signing.

use std::fmt;

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    xeddsa::{self, SIGNATURE_LENGTH, VRF_SIGNATURE_LENGTH},
};

/// Length of a raw Curve25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of a serialized public key (type tag + raw key).
pub const SERIALIZED_PUBLIC_KEY_LENGTH: usize = PUBLIC_KEY_LENGTH + 1;

/// Length of a private key.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Length of a Diffie-Hellman shared secret.
pub const AGREEMENT_LENGTH: usize = 32;

/// Curve type tag carried in the first byte of a serialized public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Curve25519
    Djb,
}

impl KeyType {
    /// Wire value of this type tag.
    pub fn value(self) -> u8 {
        match self {
            Self::Djb => 0x05,
        }
    }

    /// Parse a wire type tag.
    pub fn from_byte(byte: u8) -> Result<Self, CryptoError> {
        match byte {
            0x05 => Ok(Self::Djb),
            other => Err(CryptoError::BadKeyType(other)),
        }
    }
}

/// Curve25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    key: [u8; PUBLIC_KEY_LENGTH],
}

impl PublicKey {
    /// Wrap a raw 32-byte Montgomery u-coordinate.
    pub fn from_djb_bytes(key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Parse a serialized key (type tag + 32 bytes).
    ///
    /// Trailing bytes beyond the key are ignored, matching the deployed
    /// decoders.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the input is empty
    /// - `BadKeyType` if the type tag is not Curve25519
    /// - `InvalidKeyLength` if the key body is truncated
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CryptoError> {
        let Some((&tag, body)) = bytes.split_first() else {
            return Err(CryptoError::InvalidKey { reason: "no key type identifier" });
        };

        match KeyType::from_byte(tag)? {
            KeyType::Djb => {
                let Some(raw) = body.get(..PUBLIC_KEY_LENGTH) else {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: SERIALIZED_PUBLIC_KEY_LENGTH,
                        actual: bytes.len(),
                    });
                };
                let mut key = [0u8; PUBLIC_KEY_LENGTH];
                key.copy_from_slice(raw);
                Ok(Self { key })
            },
        }
    }

    /// Serialized form: type tag followed by the raw key.
    pub fn serialize(&self) -> [u8; SERIALIZED_PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; SERIALIZED_PUBLIC_KEY_LENGTH];
        out[0] = self.key_type().value();
        out[1..].copy_from_slice(&self.key);
        out
    }

    /// Curve type of this key.
    pub fn key_type(&self) -> KeyType {
        KeyType::Djb
    }

    /// Raw 32-byte u-coordinate.
    pub fn public_key_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.key
    }

    /// Verify an XEdDSA signature made by the matching private key.
    ///
    /// Returns `false` for signatures of the wrong length.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = <&[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
            return false;
        };
        xeddsa::verify(&self.key, &[message], signature)
    }

    /// Verify a VXEdDSA signature and return its VRF output.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature is malformed or does not verify
    pub fn verify_vrf_signature(
        &self,
        message: &[u8],
        signature: &[u8],
    ) -> Result<[u8; 32], CryptoError> {
        let signature = <&[u8; VRF_SIGNATURE_LENGTH]>::try_from(signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        xeddsa::vrf_verify(&self.key, message, signature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for byte in &self.key[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Curve25519 private key (clamped scalar).
#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateKey {
    key: [u8; PRIVATE_KEY_LENGTH],
}

impl PrivateKey {
    /// Build a private key from 32 random bytes, clamping them.
    pub fn from_bytes(mut bytes: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        bytes[0] &= 248;
        bytes[31] &= 127;
        bytes[31] |= 64;
        Self { key: bytes }
    }

    /// Parse a serialized private key.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` unless exactly 32 bytes are given
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw = <[u8; PRIVATE_KEY_LENGTH]>::try_from(bytes).map_err(|_| {
            CryptoError::InvalidKeyLength { expected: PRIVATE_KEY_LENGTH, actual: bytes.len() }
        })?;
        Ok(Self::from_bytes(raw))
    }

    /// Raw clamped scalar bytes.
    pub fn serialize(&self) -> [u8; PRIVATE_KEY_LENGTH] {
        self.key
    }

    /// Curve type of this key.
    pub fn key_type(&self) -> KeyType {
        KeyType::Djb
    }

    /// Public key `k * 9` for this scalar.
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.key);
        PublicKey::from_djb_bytes(X25519PublicKey::from(&secret).to_bytes())
    }

    /// X25519 agreement with a remote public key.
    ///
    /// # Errors
    ///
    /// - `BadKeyType` if the keys are of different curve types
    /// - `InvalidKey` if the remote key is a low-order point (the shared
    ///   secret would be all zeros)
    pub fn calculate_agreement(
        &self,
        their_key: &PublicKey,
    ) -> Result<[u8; AGREEMENT_LENGTH], CryptoError> {
        if their_key.key_type() != self.key_type() {
            return Err(CryptoError::BadKeyType(their_key.key_type().value()));
        }

        let secret = StaticSecret::from(self.key);
        let shared = secret.diffie_hellman(&X25519PublicKey::from(*their_key.public_key_bytes()));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey { reason: "non-contributory agreement" });
        }
        Ok(shared.to_bytes())
    }

    /// XEdDSA signature over `message`. `random` must be fresh secure
    /// randomness for every call.
    pub fn calculate_signature(
        &self,
        message: &[u8],
        random: &[u8; 64],
    ) -> [u8; SIGNATURE_LENGTH] {
        xeddsa::sign(&self.key, &[message], random)
    }

    /// VXEdDSA signature over `message`, returning the signature and the VRF
    /// output. The output depends only on the key and the message.
    pub fn calculate_vrf_signature(
        &self,
        message: &[u8],
        random: &[u8; 64],
    ) -> ([u8; VRF_SIGNATURE_LENGTH], [u8; 32]) {
        xeddsa::vrf_sign(&self.key, message, random)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// Public/private Curve25519 key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    /// Public half
    pub public_key: PublicKey,
    /// Private half
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair from a cryptographically secure RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_LENGTH];
        rng.fill_bytes(&mut bytes);
        let pair = Self::from_private_bytes(bytes);
        bytes.zeroize();
        pair
    }

    /// Derive the key pair for 32 caller-provided random bytes.
    pub fn from_private_bytes(bytes: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        let private_key = PrivateKey::from_bytes(bytes);
        Self { public_key: private_key.public_key(), private_key }
    }

    /// Combine existing halves. The caller vouches that they match.
    pub fn new(public_key: PublicKey, private_key: PrivateKey) -> Self {
        Self { public_key, private_key }
    }

    /// X25519 agreement between our private key and `their_key`.
    pub fn calculate_agreement(
        &self,
        their_key: &PublicKey,
    ) -> Result<[u8; AGREEMENT_LENGTH], CryptoError> {
        self.private_key.calculate_agreement(their_key)
    }

    /// XEdDSA signature with our private key.
    pub fn calculate_signature(
        &self,
        message: &[u8],
        random: &[u8; 64],
    ) -> [u8; SIGNATURE_LENGTH] {
        self.private_key.calculate_signature(message, random)
    }
}

/// Generate a fresh key pair.
pub fn generate_key_pair<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
    KeyPair::generate(rng)
}

/// X25519 agreement between `public_key` and `private_key`.
pub fn calculate_agreement(
    public_key: &PublicKey,
    private_key: &PrivateKey,
) -> Result<[u8; AGREEMENT_LENGTH], CryptoError> {
    private_key.calculate_agreement(public_key)
}

/// XEdDSA signature over `message`.
pub fn calculate_signature(
    private_key: &PrivateKey,
    message: &[u8],
    random: &[u8; 64],
) -> [u8; SIGNATURE_LENGTH] {
    private_key.calculate_signature(message, random)
}

/// Verify an XEdDSA signature.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    public_key.verify_signature(message, signature)
}
