//! Message ciphers: AES-256-CBC with PKCS#7 padding and HMAC-SHA256.
//!
//! Whisper and sender-key messages both encrypt with AES-256-CBC. Pairwise
//! messages are additionally authenticated with a truncated HMAC-SHA256
//! computed by the session layer; group messages carry a signature instead.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// AES-256 key length.
pub const CIPHER_KEY_LENGTH: usize = 32;

/// CBC initialization vector length.
pub const IV_LENGTH: usize = 16;

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// HMAC-SHA256 output length.
pub const MAC_LENGTH: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt `plaintext` with AES-256-CBC and PKCS#7 padding.
///
/// The output is always a non-empty multiple of the block size.
pub fn aes_256_cbc_encrypt(
    plaintext: &[u8],
    key: &[u8; CIPHER_KEY_LENGTH],
    iv: &[u8; IV_LENGTH],
) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt an AES-256-CBC ciphertext and strip PKCS#7 padding.
///
/// # Errors
///
/// - `DecryptionFailed` if the ciphertext is empty, not block aligned, or the
///   padding is malformed
pub fn aes_256_cbc_decrypt(
    ciphertext: &[u8],
    key: &[u8; CIPHER_KEY_LENGTH],
    iv: &[u8; IV_LENGTH],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed { reason: "ciphertext not block aligned" });
    }

    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed { reason: "bad padding" })
}

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; MAC_LENGTH] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).unwrap_or_else(|_| {
        unreachable!("HMAC accepts keys of any length")
    });
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x24; 16];

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let ciphertext = aes_256_cbc_encrypt(b"attack at dawn", &KEY, &IV);
        assert_eq!(ciphertext.len(), 16);

        let plaintext = aes_256_cbc_decrypt(&ciphertext, &KEY, &IV).unwrap();
        assert_eq!(plaintext, b"attack at dawn");
    }

    #[test]
    fn empty_plaintext_pads_to_full_block() {
        let ciphertext = aes_256_cbc_encrypt(b"", &KEY, &IV);
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert!(aes_256_cbc_decrypt(&ciphertext, &KEY, &IV).unwrap().is_empty());

        let aligned = aes_256_cbc_encrypt(&[7u8; 32], &KEY, &IV);
        assert_eq!(aligned.len(), 48);
    }

    #[test]
    fn nist_cbc_vector() {
        // NIST SP 800-38A F.2.5, first block, followed by the padding block.
        let key: [u8; 32] =
            hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
                .unwrap()
                .try_into()
                .unwrap();
        let iv: [u8; 16] =
            hex::decode("000102030405060708090a0b0c0d0e0f").unwrap().try_into().unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ciphertext = aes_256_cbc_encrypt(&plaintext, &key, &iv);
        assert_eq!(hex::encode(&ciphertext[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
    }

    #[test]
    fn rejects_misaligned_and_empty() {
        assert!(matches!(
            aes_256_cbc_decrypt(&[], &KEY, &IV),
            Err(CryptoError::DecryptionFailed { .. })
        ));
        assert!(matches!(
            aes_256_cbc_decrypt(&[0u8; 15], &KEY, &IV),
            Err(CryptoError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn wrong_key_fails_or_garbles() {
        let ciphertext = aes_256_cbc_encrypt(b"secret payload", &KEY, &IV);
        let result = aes_256_cbc_decrypt(&ciphertext, &[0x11; 32], &IV);
        assert_ne!(result.ok().as_deref(), Some(&b"secret payload"[..]));
    }

    #[test]
    fn hmac_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", &[&b"what do ya want "[..], &b"for nothing?"[..]]);
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn constant_time_eq_checks_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
