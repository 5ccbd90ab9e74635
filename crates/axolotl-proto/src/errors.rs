//! Wire format errors

use axolotl_crypto::CryptoError;
use thiserror::Error;

/// Result alias for wire parsing
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while parsing or validating serialized messages.
///
/// Every variant is a per-message failure: a malformed message never affects
/// the state used to process the next one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Structurally invalid message (truncated, missing field, bad length)
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// What was wrong with the message
        reason: &'static str,
    },

    /// Message uses a protocol version older than we can process
    #[error("legacy message version {version}")]
    LegacyMessage {
        /// Version found in the message
        version: u8,
    },

    /// Message claims a protocol version newer than we know
    #[error("unknown message version {version}")]
    UnknownVersion {
        /// Version found in the message
        version: u8,
    },

    /// Embedded key could not be parsed
    #[error("invalid key: {0}")]
    InvalidKey(#[from] CryptoError),

    /// Protobuf body failed to decode
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Ciphertext message type number is not one we know
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
}

impl WireError {
    /// Whether the message was rejected only because of its version byte.
    pub fn is_version_error(&self) -> bool {
        matches!(self, Self::LegacyMessage { .. } | Self::UnknownVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_classification() {
        assert!(WireError::LegacyMessage { version: 2 }.is_version_error());
        assert!(WireError::UnknownVersion { version: 4 }.is_version_error());
        assert!(!WireError::InvalidMessage { reason: "short" }.is_version_error());
    }

    #[test]
    fn crypto_errors_convert() {
        let err: WireError = CryptoError::BadKeyType(1).into();
        assert_eq!(err.to_string(), "invalid key: bad key type: 0x01");
    }
}
