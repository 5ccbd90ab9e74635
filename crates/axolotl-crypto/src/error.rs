//! Error types for cryptographic primitives

use thiserror::Error;

/// Errors from key handling, signatures, key derivation and message ciphers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material is structurally valid but unusable
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: &'static str,
    },

    /// Serialized public key carries a type tag we do not support
    #[error("bad key type: {0:#04x}")]
    BadKeyType(u8),

    /// Key material has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Signature did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Symmetric decryption failed (bad padding, truncated ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for the failure
        reason: &'static str,
    },

    /// Requested more HKDF output than the expand stage can produce
    #[error("invalid HKDF output length: requested {requested}, max {max}")]
    InvalidOutputLength {
        /// Requested length in bytes
        requested: usize,
        /// Maximum supported length in bytes
        max: usize,
    },

    /// No key derivation variant exists for this session version
    #[error("unknown key derivation version: {0}")]
    UnknownKdfVersion(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 33, actual: 12 };
        assert_eq!(err.to_string(), "invalid key length: expected 33, got 12");

        assert_eq!(CryptoError::BadKeyType(0x07).to_string(), "bad key type: 0x07");
    }
}
