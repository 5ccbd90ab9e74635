//! Storage error types

use thiserror::Error;

/// Errors reported by store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// A thread panicked while holding the store's lock
    #[error("store lock poisoned")]
    Poisoned,
}
