//! Group messaging with sender keys.
//!
//! Each member creates one sender key per group and hands it to every other
//! member in a [`SenderKeyDistributionMessage`](axolotl_proto::SenderKeyDistributionMessage)
//! over their pairwise sessions. Afterwards a group message is encrypted
//! once with the sender's hash-ratchet chain and signed with the sender's
//! signing key; there is no Diffie-Hellman step, so compromise of a chain key
//! exposes later messages of that sender until the key is rotated.

mod builder;
mod cipher;

pub use self::{builder::GroupSessionBuilder, cipher::GroupCipher};

/// Largest sender-key id (31 bits).
pub const MAX_KEY_ID: u32 = 0x7FFF_FFFF;
