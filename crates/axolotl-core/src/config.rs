//! Session engine limits.

use serde::{Deserialize, Serialize};

/// Resource bounds applied by ciphers and builders.
///
/// The defaults are the values deployed peers use. Lowering them is safe for
/// tests; raising `max_forward_jumps` trades memory and CPU for tolerance of
/// long message gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Skipped message keys kept per session state and per sender-key state.
    /// Oldest entries are evicted first. Read on every insert, so lowering it
    /// also trims caches in records stored earlier.
    pub max_message_keys: usize,

    /// Largest counter gap accepted in one decrypt.
    pub max_forward_jumps: u32,

    /// Receive chains kept per session state.
    pub max_receiver_chains: usize,

    /// Archived session states kept per session record.
    pub archived_states_max: usize,

    /// Sender-key states kept per sender-key record.
    pub max_sender_key_states: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_keys: 2000,
            max_forward_jumps: 25_000,
            max_receiver_chains: 5,
            archived_states_max: 40,
            max_sender_key_states: 5,
        }
    }
}
