//! Records the engine persists through the store traits.
//!
//! Every record serializes to CBOR so stores can treat it as opaque bytes.

mod prekey;
mod sender_key;
mod session;

use serde::{Deserialize, Serialize};

pub use self::{
    prekey::{PreKeyBundle, PreKeyRecord, SignedPreKeyRecord},
    sender_key::{SenderChainKey, SenderKeyRecord, SenderKeyState, SenderMessageKey},
    session::{SessionRecord, SessionState, UnacknowledgedPreKey},
};
use crate::store::StorageError;

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut encoded = Vec::new();
    ciborium::ser::into_writer(value, &mut encoded)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(encoded)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::de::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
