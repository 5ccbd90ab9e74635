//! Axolotl Wire Formats
//!
//! Serialized forms of everything the session engine sends: pairwise
//! [`SignalMessage`]s and the session-establishing [`PreKeySignalMessage`],
//! group [`SenderKeyMessage`]s and the [`SenderKeyDistributionMessage`] that
//! hands out a sender key.
//!
//! Every message starts with one version byte, `(version << 4) | current`.
//! The body is protobuf with field numbers shared with deployed peers.
//! Pairwise messages end in an 8-byte truncated HMAC, group messages in a
//! 64-byte XEdDSA signature.
//!
//! Parsing is purely structural. Authentication (MAC or signature) needs
//! key material held by the session layer and is performed there, through
//! [`SignalMessage::verify_mac`] and [`SenderKeyMessage::verify_signature`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ciphertext;
pub mod errors;
mod proto;
pub mod sender_key_message;
pub mod signal_message;

pub use ciphertext::{CiphertextMessage, CiphertextMessageType};
pub use errors::{Result, WireError};
pub use sender_key_message::{SenderKeyDistributionMessage, SenderKeyMessage};
pub use signal_message::{PreKeySignalMessage, SignalMessage};

/// Protocol version written into every new message.
pub const CIPHERTEXT_MESSAGE_CURRENT_VERSION: u8 = 3;

/// Version byte for a message of `message_version`.
pub(crate) fn version_byte(message_version: u8) -> u8 {
    (message_version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION
}

/// Extract and validate the message version from a version byte.
pub(crate) fn version_from_byte(byte: u8) -> Result<u8> {
    let version = byte >> 4;
    if version < CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(WireError::LegacyMessage { version });
    }
    if version > CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(WireError::UnknownVersion { version });
    }
    Ok(version)
}
