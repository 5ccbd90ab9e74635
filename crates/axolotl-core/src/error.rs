//! Error types for the session engine.
//!
//! Every failure a caller can observe is a [`SessionError`]. Apart from
//! storage failures they are all per-message: the ratchet state is only
//! written back after a message fully validates, so a rejected message leaves
//! the session exactly as it was.

use axolotl_crypto::CryptoError;
use axolotl_proto::WireError;
use thiserror::Error;

use crate::store::StorageError;

/// Broad failure classes, one retry/UX decision per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or foreign-type key, unsupported message format
    KeyFormat,
    /// MAC or signature mismatch, undecryptable body
    Authentication,
    /// Message index already consumed or unrecoverably skipped
    Ordering,
    /// Identity key changed without being trusted
    Trust,
    /// No handshake state yet
    SessionAbsence,
    /// Store failure
    Storage,
}

/// Errors surfaced by session and group operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Key material is malformed, of a foreign type, or fails its signature
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// A referenced pre-key or signed pre-key does not exist
    #[error("no pre-key with id {id}")]
    InvalidKeyId {
        /// Missing key id
        id: u32,
    },

    /// Message failed MAC/signature verification or is malformed
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// What was wrong with the message
        reason: String,
    },

    /// Message index was already consumed and its key is no longer cached
    #[error("duplicate message: chain at {chain_index}, message counter {counter}")]
    DuplicateMessage {
        /// Next index of the receiving chain
        chain_index: u32,
        /// Counter carried by the message
        counter: u32,
    },

    /// No session or sender key exists for the peer
    #[error("no session for {address}")]
    NoSession {
        /// Peer address or sender-key name
        address: String,
    },

    /// Message uses a protocol version we no longer process
    #[error("legacy message version {version}")]
    LegacyMessage {
        /// Version found in the message
        version: u8,
    },

    /// Peer's identity key is not trusted for this address
    #[error("untrusted identity for {address}")]
    UntrustedIdentity {
        /// Peer address
        address: String,
    },

    /// Store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey { .. } | Self::InvalidKeyId { .. } | Self::LegacyMessage { .. } => {
                ErrorKind::KeyFormat
            },
            Self::InvalidMessage { .. } => ErrorKind::Authentication,
            Self::DuplicateMessage { .. } => ErrorKind::Ordering,
            Self::UntrustedIdentity { .. } => ErrorKind::Trust,
            Self::NoSession { .. } => ErrorKind::SessionAbsence,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the failure is not confined to a single message.
    ///
    /// Only storage failures qualify: the record may not have been persisted,
    /// so the caller must not assume the ratchet advanced.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub(crate) fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage { reason: reason.into() }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed { .. } => Self::InvalidMessage { reason: err.to_string() },
            CryptoError::InvalidKey { .. }
            | CryptoError::BadKeyType(_)
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::InvalidSignature
            | CryptoError::InvalidOutputLength { .. }
            | CryptoError::UnknownKdfVersion(_) => Self::InvalidKey { reason: err.to_string() },
        }
    }
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::LegacyMessage { version } => Self::LegacyMessage { version },
            WireError::InvalidKey(inner) => inner.into(),
            WireError::InvalidMessage { .. }
            | WireError::UnknownVersion { .. }
            | WireError::Decode(_)
            | WireError::UnknownMessageType(_) => Self::InvalidMessage { reason: err.to_string() },
        }
    }
}
