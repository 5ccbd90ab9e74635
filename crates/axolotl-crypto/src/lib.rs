//! Axolotl Cryptographic Primitives
//!
//! Building blocks for the Axolotl session engine. Pure functions with
//! deterministic outputs; callers provide random bytes (or a seeded RNG) so
//! that tests and simulations are reproducible.
//!
//! # Key Hierarchy
//!
//! Every secret used by a session descends from Diffie-Hellman agreements
//! fed through HKDF:
//!
//! ```text
//! X3DH agreements (identity, signed pre-key, one-time pre-key, base key)
//!        │
//!        ▼
//! HKDF "WhisperText" → Root Key ∥ Chain Key
//!        │
//!        ▼
//! HKDF "WhisperRatchet" per DH step → next Root Key ∥ Chain Key
//!        │
//!        ▼
//! HMAC chain step → Message Key Seed
//!        │
//!        ▼
//! HKDF "WhisperMessageKeys" → cipher key ∥ MAC key ∥ IV
//! ```
//!
//! Group sender keys use the same HMAC chain step and expand the seed with
//! HKDF "WhisperGroup" into an IV and cipher key.
//!
//! # Modules
//!
//! - [`kdf`]: HKDF in both session-version flavours plus the fixed-layout
//!   derived secret types
//! - [`curve`]: Curve25519 keys, agreement and XEdDSA signatures
//! - [`xeddsa`]: the signature schemes themselves, including VXEdDSA
//! - [`identity`]: long-term identity keys
//! - [`cipher`]: AES-256-CBC and HMAC-SHA256

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod curve;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod xeddsa;

pub use cipher::{aes_256_cbc_decrypt, aes_256_cbc_encrypt, constant_time_eq, hmac_sha256};
pub use curve::{
    KeyPair, KeyType, PrivateKey, PublicKey, calculate_agreement, calculate_signature,
    generate_key_pair, verify_signature,
};
pub use error::CryptoError;
pub use identity::{IdentityKey, IdentityKeyPair};
pub use kdf::{DerivedMessageSecrets, DerivedSecrets, HkdfVersion};
