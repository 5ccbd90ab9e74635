//! Axolotl Session Engine
//!
//! Pairwise Double Ratchet sessions, X3DH session establishment and group
//! sender keys on top of [`axolotl_crypto`] and the wire formats in
//! [`axolotl_proto`].
//!
//! # Architecture
//!
//! ```text
//! SessionBuilder ──► SessionRecord ◄── SessionCipher
//!      │   (X3DH)         │ CBOR          │ (ratchet)
//!      ▼                  ▼               ▼
//!  ProtocolStore: identity, session, pre-key, signed pre-key
//!
//! GroupSessionBuilder ──► SenderKeyRecord ◄── GroupCipher
//!                              │
//!                              ▼
//!                        SenderKeyStore
//! ```
//!
//! Ciphers and builders are thin: they load a record from the store, run the
//! protocol on a copy, and write the record back only on success. Stores are
//! the only persistence boundary and every record crosses it as CBOR bytes.
//!
//! Randomness comes from an [`Environment`] so simulations can replay a run
//! bit for bit.
//!
//! # Concurrency
//!
//! Nothing here locks. Callers must not run two operations for the same
//! address (or the same group sender) at once, or one update will be lost.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod address;
pub mod config;
pub mod env;
pub mod error;
pub mod group;
pub mod key_helper;
pub mod ratchet;
pub mod session_builder;
pub mod session_cipher;
pub mod state;
pub mod store;

pub use address::{ProtocolAddress, SenderKeyName};
pub use config::SessionConfig;
pub use env::{EnvRng, Environment, SystemEnv};
pub use error::{ErrorKind, SessionError};
pub use group::{GroupCipher, GroupSessionBuilder};
pub use session_builder::SessionBuilder;
pub use session_cipher::SessionCipher;
pub use state::{
    PreKeyBundle, PreKeyRecord, SenderKeyRecord, SessionRecord, SessionState, SignedPreKeyRecord,
};
pub use store::{
    Direction, IdentityKeyStore, InMemoryProtocolStore, PreKeyStore, ProtocolStore,
    SenderKeyStore, SessionStore, SignedPreKeyStore, StorageError,
};
