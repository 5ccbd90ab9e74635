//! Addressing of sessions and sender keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One remote endpoint: a user name plus one of that user's devices.
///
/// Sessions are keyed by the full address, never by name alone, so every
/// device of a user gets its own ratchet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolAddress {
    name: String,
    device_id: u32,
}

impl ProtocolAddress {
    /// Create an address.
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self { name: name.into(), device_id }
    }

    /// User name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device id.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// Scope of one sender's key within one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    /// Create a sender-key name.
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self { group_id: group_id.into(), sender }
    }

    /// Group id.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Sending member.
    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group_id, self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let address = ProtocolAddress::new("+14151111111", 1);
        assert_eq!(address.to_string(), "+14151111111.1");

        let name = SenderKeyName::new("nihilist history reading group", address);
        assert_eq!(name.to_string(), "nihilist history reading group::+14151111111.1");
    }

    #[test]
    fn devices_are_distinct() {
        assert_ne!(ProtocolAddress::new("alice", 1), ProtocolAddress::new("alice", 2));
    }
}
