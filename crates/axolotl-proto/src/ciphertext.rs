//! Type-tagged envelope over every serialized message kind.

use crate::{
    PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage, SignalMessage,
    errors::{Result, WireError},
};

/// Message type numbers carried next to the ciphertext by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CiphertextMessageType {
    /// [`SignalMessage`] on an established session
    Whisper = 2,
    /// [`PreKeySignalMessage`] establishing a session
    PreKey = 3,
    /// [`SenderKeyMessage`] to a group
    SenderKey = 4,
    /// [`SenderKeyDistributionMessage`]
    SenderKeyDistribution = 5,
}

impl TryFrom<u8> for CiphertextMessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(Self::Whisper),
            3 => Ok(Self::PreKey),
            4 => Ok(Self::SenderKey),
            5 => Ok(Self::SenderKeyDistribution),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

/// Any serialized message, tagged with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextMessage {
    /// Pairwise message on an established session
    Signal(SignalMessage),
    /// Pairwise message that also establishes the session
    PreKeySignal(PreKeySignalMessage),
    /// Group message
    SenderKey(SenderKeyMessage),
    /// Group key distribution
    SenderKeyDistribution(SenderKeyDistributionMessage),
}

impl CiphertextMessage {
    /// Parse `bytes` as a message of the given type.
    pub fn deserialize(message_type: CiphertextMessageType, bytes: &[u8]) -> Result<Self> {
        Ok(match message_type {
            CiphertextMessageType::Whisper => Self::Signal(SignalMessage::try_from(bytes)?),
            CiphertextMessageType::PreKey => {
                Self::PreKeySignal(PreKeySignalMessage::try_from(bytes)?)
            },
            CiphertextMessageType::SenderKey => {
                Self::SenderKey(SenderKeyMessage::try_from(bytes)?)
            },
            CiphertextMessageType::SenderKeyDistribution => {
                Self::SenderKeyDistribution(SenderKeyDistributionMessage::try_from(bytes)?)
            },
        })
    }

    /// Type tag of this message.
    pub fn message_type(&self) -> CiphertextMessageType {
        match self {
            Self::Signal(_) => CiphertextMessageType::Whisper,
            Self::PreKeySignal(_) => CiphertextMessageType::PreKey,
            Self::SenderKey(_) => CiphertextMessageType::SenderKey,
            Self::SenderKeyDistribution(_) => CiphertextMessageType::SenderKeyDistribution,
        }
    }

    /// Serialized bytes to hand to the transport.
    pub fn serialize(&self) -> &[u8] {
        match self {
            Self::Signal(m) => m.serialized(),
            Self::PreKeySignal(m) => m.serialized(),
            Self::SenderKey(m) => m.serialized(),
            Self::SenderKeyDistribution(m) => m.serialized(),
        }
    }
}

impl From<SignalMessage> for CiphertextMessage {
    fn from(message: SignalMessage) -> Self {
        Self::Signal(message)
    }
}

impl From<PreKeySignalMessage> for CiphertextMessage {
    fn from(message: PreKeySignalMessage) -> Self {
        Self::PreKeySignal(message)
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::KeyPair;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn type_numbers_are_stable() {
        assert_eq!(CiphertextMessageType::Whisper as u8, 2);
        assert_eq!(CiphertextMessageType::PreKey as u8, 3);
        assert_eq!(CiphertextMessageType::SenderKey as u8, 4);
        assert_eq!(CiphertextMessageType::SenderKeyDistribution as u8, 5);

        assert_eq!(CiphertextMessageType::try_from(4), Ok(CiphertextMessageType::SenderKey));
        assert_eq!(CiphertextMessageType::try_from(1), Err(WireError::UnknownMessageType(1)));
    }

    #[test]
    fn envelope_dispatches_on_type() {
        let key = KeyPair::generate(&mut StdRng::seed_from_u64(5)).public_key;
        let distribution = SenderKeyDistributionMessage::new(3, 4, 0, [1u8; 32], key);

        let parsed = CiphertextMessage::deserialize(
            CiphertextMessageType::SenderKeyDistribution,
            distribution.serialized(),
        )
        .unwrap();

        assert_eq!(parsed.message_type(), CiphertextMessageType::SenderKeyDistribution);
        assert_eq!(parsed.serialize(), distribution.serialized());
        assert_eq!(parsed, CiphertextMessage::SenderKeyDistribution(distribution));
    }
}
