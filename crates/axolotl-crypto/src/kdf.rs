//! HKDF key derivation (RFC 5869) and the structured views over its output.
//!
//! Two protocol revisions are deployed and they differ only in the first
//! value of the expand-stage block counter: version 2 starts at `0`, version
//! 3 starts at `1` (the RFC behaviour). Both must stay byte-exact, since
//! sessions created by either revision still exist.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 output size, the size of one expand block
const HASH_OUTPUT_SIZE: usize = 32;

/// Largest output the expand stage can produce (255 blocks).
pub const MAX_OUTPUT_LENGTH: usize = 255 * HASH_OUTPUT_SIZE;

/// HKDF variant selected by session version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HkdfVersion {
    /// Legacy sessions: block counter starts at 0
    V2,
    /// Current sessions: block counter starts at 1
    V3,
}

impl HkdfVersion {
    /// Variant used by sessions of the given message version.
    pub fn for_session_version(version: u8) -> Result<Self, CryptoError> {
        match version {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(CryptoError::UnknownKdfVersion(other)),
        }
    }

    /// First value of the expand-stage block counter.
    pub fn iteration_start_offset(self) -> u8 {
        match self {
            Self::V2 => 0,
            Self::V3 => 1,
        }
    }

    /// Derive `output_length` bytes from `input_key_material`.
    ///
    /// A missing salt is treated as `HashLen` zero bytes. HMAC pads short keys
    /// with zeros, so any all-zero salt up to the block size is equivalent.
    ///
    /// # Errors
    ///
    /// - `InvalidOutputLength` if more than [`MAX_OUTPUT_LENGTH`] bytes are
    ///   requested
    pub fn derive_secrets(
        self,
        input_key_material: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output_length: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut output = vec![0u8; output_length];
        self.derive_into(input_key_material, salt, info, &mut output)?;
        Ok(output)
    }

    /// Derive exactly `output.len()` bytes into a caller-provided buffer.
    pub fn derive_into(
        self,
        input_key_material: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output: &mut [u8],
    ) -> Result<(), CryptoError> {
        let requested = output.len();
        if requested > MAX_OUTPUT_LENGTH {
            return Err(CryptoError::InvalidOutputLength { requested, max: MAX_OUTPUT_LENGTH });
        }

        match self {
            Self::V3 => {
                let hkdf = Hkdf::<Sha256>::new(salt, input_key_material);
                hkdf.expand(info, output)
                    .map_err(|_| CryptoError::InvalidOutputLength { requested, max: MAX_OUTPUT_LENGTH })
            },
            Self::V2 => {
                let (prk, _) = Hkdf::<Sha256>::extract(salt, input_key_material);
                expand(&prk, info, output, self.iteration_start_offset());
                Ok(())
            },
        }
    }

    /// Derive a fixed-size array. `N` is checked against
    /// [`MAX_OUTPUT_LENGTH`] at compile time.
    pub fn derive_array<const N: usize>(
        self,
        input_key_material: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
    ) -> [u8; N] {
        const { assert!(N <= MAX_OUTPUT_LENGTH) };

        let mut output = [0u8; N];
        let Ok(()) = self.derive_into(input_key_material, salt, info, &mut output) else {
            unreachable!("output length is bounded at compile time");
        };
        output
    }
}

/// Expand stage with an explicit counter offset.
///
/// `T(i) = HMAC(PRK, T(i-1) || info || offset + i)`, concatenated until the
/// buffer is full. Caller guarantees at most 255 blocks.
fn expand(prk: &[u8], info: &[u8], output: &mut [u8], offset: u8) {
    let mut previous = [0u8; HASH_OUTPUT_SIZE];

    for (index, block) in output.chunks_mut(HASH_OUTPUT_SIZE).enumerate() {
        let Ok(mut mac) = HmacSha256::new_from_slice(prk) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        if index > 0 {
            mac.update(&previous);
        }
        mac.update(info);
        mac.update(&[offset.wrapping_add(index as u8)]);

        previous.copy_from_slice(&mac.finalize().into_bytes());
        block.copy_from_slice(&previous[..block.len()]);
    }

    previous.zeroize();
}

/// Two-way view over 64 bytes of HKDF output: cipher key and MAC key.
#[derive(Clone)]
pub struct DerivedSecrets {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl DerivedSecrets {
    /// HKDF output length consumed by this layout.
    pub const SIZE: usize = 64;

    /// Split `okm` as `cipher_key[0..32] || mac_key[32..64]`.
    pub fn from_okm(okm: &[u8; Self::SIZE]) -> Self {
        let mut cipher_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        cipher_key.copy_from_slice(&okm[..32]);
        mac_key.copy_from_slice(&okm[32..]);
        Self { cipher_key, mac_key }
    }

    /// 32-byte AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    /// 32-byte HMAC-SHA256 key.
    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }
}

impl Drop for DerivedSecrets {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
    }
}

/// Three-way view over 80 bytes of HKDF output: cipher key, MAC key and IV.
#[derive(Clone)]
pub struct DerivedMessageSecrets {
    secrets: DerivedSecrets,
    iv: [u8; 16],
}

impl DerivedMessageSecrets {
    /// HKDF output length consumed by this layout.
    pub const SIZE: usize = 80;

    /// Split `okm` as `cipher_key[0..32] || mac_key[32..64] || iv[64..80]`.
    pub fn from_okm(okm: &[u8; Self::SIZE]) -> Self {
        let mut pair = [0u8; DerivedSecrets::SIZE];
        pair.copy_from_slice(&okm[..DerivedSecrets::SIZE]);
        let secrets = DerivedSecrets::from_okm(&pair);
        pair.zeroize();

        let mut iv = [0u8; 16];
        iv.copy_from_slice(&okm[DerivedSecrets::SIZE..]);
        Self { secrets, iv }
    }

    /// 32-byte AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        self.secrets.cipher_key()
    }

    /// 32-byte HMAC-SHA256 key.
    pub fn mac_key(&self) -> &[u8; 32] {
        self.secrets.mac_key()
    }

    /// 16-byte CBC initialization vector.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rfc5869_case1() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let ikm = vec![0x0b; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
        (ikm, salt, info)
    }

    /// Straight-line reading of the expand loop, kept independent of
    /// [`expand`] so the two can check each other.
    fn reference_expand(ikm: &[u8], salt: &[u8], info: &[u8], length: usize, offset: u8) -> Vec<u8> {
        let mut extract = HmacSha256::new_from_slice(salt).unwrap();
        extract.update(ikm);
        let prk = extract.finalize().into_bytes();

        let mut output = Vec::new();
        let mut previous: Vec<u8> = Vec::new();
        let mut counter = offset;
        while output.len() < length {
            let mut mac = HmacSha256::new_from_slice(&prk).unwrap();
            mac.update(&previous);
            mac.update(info);
            mac.update(&[counter]);
            previous = mac.finalize().into_bytes().to_vec();
            output.extend_from_slice(&previous);
            counter += 1;
        }
        output.truncate(length);
        output
    }

    #[test]
    fn v3_matches_rfc5869_case1() {
        let (ikm, salt, info) = rfc5869_case1();
        let okm = HkdfVersion::V3.derive_secrets(&ikm, Some(salt.as_slice()), &info, 42).unwrap();

        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn v3_matches_rfc5869_case3_without_salt() {
        let ikm = vec![0x0b; 22];
        let okm = HkdfVersion::V3.derive_secrets(&ikm, None, &[], 42).unwrap();

        assert_eq!(
            hex::encode(okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8"
        );
    }

    #[test]
    fn v2_starts_counter_at_zero() {
        let (ikm, salt, info) = rfc5869_case1();
        let okm = HkdfVersion::V2.derive_secrets(&ikm, Some(salt.as_slice()), &info, 64).unwrap();

        assert_eq!(okm, reference_expand(&ikm, &salt, &info, 64, 0));
    }

    #[test]
    fn offset_one_expand_matches_hkdf_crate() {
        let (ikm, salt, info) = rfc5869_case1();
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt.as_slice()), &ikm);

        let mut ours = [0u8; 100];
        expand(&prk, &info, &mut ours, 1);

        let theirs = HkdfVersion::V3.derive_secrets(&ikm, Some(salt.as_slice()), &info, 100).unwrap();
        assert_eq!(ours.to_vec(), theirs);
    }

    #[test]
    fn versions_disagree() {
        let (ikm, salt, info) = rfc5869_case1();
        let v2 = HkdfVersion::V2.derive_secrets(&ikm, Some(salt.as_slice()), &info, 32).unwrap();
        let v3 = HkdfVersion::V3.derive_secrets(&ikm, Some(salt.as_slice()), &info, 32).unwrap();
        assert_ne!(v2, v3);
    }

    #[test]
    fn missing_salt_equals_zero_salt() {
        let ikm = b"shared secret material";
        for version in [HkdfVersion::V2, HkdfVersion::V3] {
            let implicit = version.derive_secrets(ikm, None, b"info", 80).unwrap();
            let explicit = version.derive_secrets(ikm, Some(&[0u8; 32][..]), b"info", 80).unwrap();
            assert_eq!(implicit, explicit, "{version:?}");
        }
    }

    fn any_version() -> impl Strategy<Value = HkdfVersion> {
        prop_oneof![Just(HkdfVersion::V2), Just(HkdfVersion::V3)]
    }

    proptest! {
        #[test]
        fn prop_shorter_output_is_prefix_of_longer(
            version in any_version(),
            ikm in prop::collection::vec(any::<u8>(), 0..64),
            info in prop::collection::vec(any::<u8>(), 0..32),
            short in 0usize..300,
            extra in 0usize..300,
        ) {
            let short_okm = version.derive_secrets(&ikm, None, &info, short).unwrap();
            let long_okm = version.derive_secrets(&ikm, None, &info, short + extra).unwrap();

            // PROPERTY: output length is exact and longer output extends shorter
            prop_assert_eq!(short_okm.len(), short);
            prop_assert_eq!(long_okm.len(), short + extra);
            prop_assert_eq!(&short_okm[..], &long_okm[..short]);
        }

        #[test]
        fn prop_matches_reference_expand(
            version in any_version(),
            ikm in prop::collection::vec(any::<u8>(), 1..64),
            salt in prop::collection::vec(any::<u8>(), 1..64),
            info in prop::collection::vec(any::<u8>(), 0..32),
            length in 1usize..200,
        ) {
            let okm = version.derive_secrets(&ikm, Some(salt.as_slice()), &info, length).unwrap();

            // PROPERTY: both versions are the RFC expand loop with their own counter start
            prop_assert_eq!(
                okm,
                reference_expand(&ikm, &salt, &info, length, version.iteration_start_offset())
            );
        }
    }

    #[test]
    fn rejects_oversized_output() {
        let result = HkdfVersion::V2.derive_secrets(b"ikm", None, b"", MAX_OUTPUT_LENGTH + 1);
        assert!(matches!(result, Err(CryptoError::InvalidOutputLength { .. })));

        let max = HkdfVersion::V2.derive_secrets(b"ikm", None, b"", MAX_OUTPUT_LENGTH).unwrap();
        assert_eq!(max.len(), MAX_OUTPUT_LENGTH);
    }

    #[test]
    fn version_lookup() {
        assert_eq!(HkdfVersion::for_session_version(2), Ok(HkdfVersion::V2));
        assert_eq!(HkdfVersion::for_session_version(3), Ok(HkdfVersion::V3));
        assert_eq!(HkdfVersion::for_session_version(4), Err(CryptoError::UnknownKdfVersion(4)));
    }

    #[test]
    fn derive_array_matches_vec() {
        let array: [u8; 80] = HkdfVersion::V3.derive_array(b"ikm", Some(&b"salt"[..]), b"info");
        let vec = HkdfVersion::V3.derive_secrets(b"ikm", Some(&b"salt"[..]), b"info", 80).unwrap();
        assert_eq!(array.to_vec(), vec);
    }

    #[test]
    fn message_secrets_layout() {
        let mut okm = [0u8; DerivedMessageSecrets::SIZE];
        for (i, byte) in okm.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let secrets = DerivedMessageSecrets::from_okm(&okm);
        assert_eq!(secrets.cipher_key()[0], 0);
        assert_eq!(secrets.mac_key()[0], 32);
        assert_eq!(secrets.iv()[0], 64);
        assert_eq!(secrets.iv()[15], 79);
    }

    #[test]
    fn two_way_secrets_layout() {
        let mut okm = [0u8; DerivedSecrets::SIZE];
        okm[31] = 0xAA;
        okm[32] = 0xBB;

        let secrets = DerivedSecrets::from_okm(&okm);
        assert_eq!(secrets.cipher_key()[31], 0xAA);
        assert_eq!(secrets.mac_key()[0], 0xBB);
    }
}
