//! XEdDSA and VXEdDSA signatures over Montgomery-form Curve25519 keys.
//!
//! XEdDSA lets an X25519 key sign: the signer converts its scalar to the
//! twisted Edwards form and produces an Ed25519-style `(R, s)` pair. The
//! Montgomery public key does not carry the Edwards sign bit, so the signer
//! stores it in the otherwise-unused top bit of `s` and the verifier reads it
//! back from there.
//!
//! VXEdDSA is the verifiable-random-function variant. It forces the Edwards
//! sign bit to zero and returns, alongside the 96-byte signature, a 32-byte
//! output that depends only on the key and the message.
//!
//! Domain separation follows the XEdDSA construction: `hash_i(X)` is
//! SHA-512 over a 32-byte prefix `(0xFF - i) || 0xFF * 31` followed by `X`.

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    montgomery::MontgomeryPoint,
    scalar::Scalar,
    traits::IsIdentity,
};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Length of an XEdDSA signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of a VXEdDSA signature (`V || h || s`).
pub const VRF_SIGNATURE_LENGTH: usize = 96;

/// Length of the VRF output.
pub const VRF_OUTPUT_LENGTH: usize = 32;

const SIGN_BIT: u8 = 0b1000_0000;

fn hash_i(i: u8) -> Sha512 {
    let mut prefix = [0xFFu8; 32];
    prefix[0] = 0xFF - i;
    let mut hash = Sha512::new();
    hash.update(prefix);
    hash
}

/// Sign `message` (given as concatenated parts) with a clamped X25519
/// private key.
pub fn sign(private_key: &[u8; 32], message: &[&[u8]], random: &[u8; 64]) -> [u8; SIGNATURE_LENGTH] {
    let mut a = Scalar::from_bytes_mod_order(*private_key);
    let ed_public = (&a * ED25519_BASEPOINT_TABLE).compress();
    let sign_bit = ed_public.as_bytes()[31] & SIGN_BIT;

    let mut nonce_hash = hash_i(1);
    nonce_hash.update(private_key);
    for part in message {
        nonce_hash.update(part);
    }
    nonce_hash.update(random);
    let mut r = Scalar::from_hash(nonce_hash);
    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();

    let mut challenge = Sha512::new();
    challenge.update(cap_r.as_bytes());
    challenge.update(ed_public.as_bytes());
    for part in message {
        challenge.update(part);
    }
    let h = Scalar::from_hash(challenge);
    let s = h * a + r;

    a.zeroize();
    r.zeroize();

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature[SIGNATURE_LENGTH - 1] &= !SIGN_BIT;
    signature[SIGNATURE_LENGTH - 1] |= sign_bit;
    signature
}

/// Verify an XEdDSA signature against a Montgomery public key.
pub fn verify(public_key: &[u8; 32], message: &[&[u8]], signature: &[u8; SIGNATURE_LENGTH]) -> bool {
    let sign = (signature[SIGNATURE_LENGTH - 1] & SIGN_BIT) >> 7;
    let Some(ed_public) = MontgomeryPoint(*public_key).to_edwards(sign) else {
        return false;
    };
    let cap_a = ed_public.compress();

    let mut cap_r = [0u8; 32];
    cap_r.copy_from_slice(&signature[..32]);
    let mut s = [0u8; 32];
    s.copy_from_slice(&signature[32..]);
    s[31] &= !SIGN_BIT;
    if s[31] & 0b1110_0000 != 0 {
        return false;
    }

    let mut challenge = Sha512::new();
    challenge.update(cap_r);
    challenge.update(cap_a.as_bytes());
    for part in message {
        challenge.update(part);
    }
    let h = Scalar::from_hash(challenge);

    let check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &(-ed_public),
        &Scalar::from_bytes_mod_order(s),
    )
    .compress();

    bool::from(check.as_bytes().ct_eq(&cap_r))
}

fn hash_to_point(ed_public: &CompressedEdwardsY, message: &[u8]) -> EdwardsPoint {
    let mut input = Vec::with_capacity(64 + message.len());
    let mut prefix = [0xFFu8; 32];
    prefix[0] = 0xFF - 2;
    input.extend_from_slice(&prefix);
    input.extend_from_slice(ed_public.as_bytes());
    input.extend_from_slice(message);
    #[allow(deprecated)]
    EdwardsPoint::nonspec_map_to_curve::<Sha512>(&input)
}

fn vrf_output(v: &EdwardsPoint) -> [u8; VRF_OUTPUT_LENGTH] {
    let mut hash = hash_i(5);
    hash.update(v.mul_by_cofactor().compress().as_bytes());
    let digest = hash.finalize();
    let mut output = [0u8; VRF_OUTPUT_LENGTH];
    output.copy_from_slice(&digest[..VRF_OUTPUT_LENGTH]);
    output
}

/// Produce a VXEdDSA signature and VRF output for `message`.
pub fn vrf_sign(
    private_key: &[u8; 32],
    message: &[u8],
    random: &[u8; 64],
) -> ([u8; VRF_SIGNATURE_LENGTH], [u8; VRF_OUTPUT_LENGTH]) {
    let mut a = Scalar::from_bytes_mod_order(*private_key);
    let mut ed_public = (&a * ED25519_BASEPOINT_TABLE).compress();
    if ed_public.as_bytes()[31] & SIGN_BIT != 0 {
        a = -a;
        ed_public = (&a * ED25519_BASEPOINT_TABLE).compress();
    }

    let bv = hash_to_point(&ed_public, message);
    let v = a * bv;
    let cap_v = v.compress();

    let mut nonce_hash = hash_i(3);
    nonce_hash.update(a.as_bytes());
    nonce_hash.update(cap_v.as_bytes());
    nonce_hash.update(random);
    let mut r = Scalar::from_hash(nonce_hash);

    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();
    let cap_rv = (r * bv).compress();

    let mut challenge = hash_i(4);
    challenge.update(ed_public.as_bytes());
    challenge.update(cap_v.as_bytes());
    challenge.update(cap_r.as_bytes());
    challenge.update(cap_rv.as_bytes());
    challenge.update(message);
    let h = Scalar::from_hash(challenge);
    let s = r + h * a;

    a.zeroize();
    r.zeroize();

    let mut signature = [0u8; VRF_SIGNATURE_LENGTH];
    signature[..32].copy_from_slice(cap_v.as_bytes());
    signature[32..64].copy_from_slice(h.as_bytes());
    signature[64..].copy_from_slice(s.as_bytes());

    (signature, vrf_output(&v))
}

fn canonical_scalar(bytes: &[u8]) -> Option<Scalar> {
    let mut raw = [0u8; 32];
    raw.copy_from_slice(bytes);
    Option::from(Scalar::from_canonical_bytes(raw))
}

/// Verify a VXEdDSA signature, returning the VRF output on success.
///
/// # Errors
///
/// - `InvalidSignature` if any component is non-canonical, a point is of
///   small order, or the challenge does not match
pub fn vrf_verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; VRF_SIGNATURE_LENGTH],
) -> Result<[u8; VRF_OUTPUT_LENGTH], CryptoError> {
    let invalid = || CryptoError::InvalidSignature;

    let ed_public = MontgomeryPoint(*public_key).to_edwards(0).ok_or_else(invalid)?;
    let cap_a = ed_public.compress();

    let mut v_bytes = [0u8; 32];
    v_bytes.copy_from_slice(&signature[..32]);
    let v = CompressedEdwardsY(v_bytes).decompress().ok_or_else(invalid)?;
    let h = canonical_scalar(&signature[32..64]).ok_or_else(invalid)?;
    let s = canonical_scalar(&signature[64..]).ok_or_else(invalid)?;

    if ed_public.mul_by_cofactor().is_identity() || v.mul_by_cofactor().is_identity() {
        return Err(invalid());
    }

    let bv = hash_to_point(&cap_a, message);
    let cap_r = EdwardsPoint::vartime_double_scalar_mul_basepoint(&(-h), &ed_public, &s).compress();
    let cap_rv = (s * bv - h * v).compress();

    let mut challenge = hash_i(4);
    challenge.update(cap_a.as_bytes());
    challenge.update(v_bytes);
    challenge.update(cap_r.as_bytes());
    challenge.update(cap_rv.as_bytes());
    challenge.update(message);
    let h_check = Scalar::from_hash(challenge);

    if !bool::from(h_check.as_bytes().ct_eq(h.as_bytes())) {
        return Err(invalid());
    }

    Ok(vrf_output(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::KeyPair;

    fn key_pair(seed: u8) -> KeyPair {
        KeyPair::from_private_bytes([seed; 32])
    }

    #[test]
    fn signature_verifies_for_both_sign_bits() {
        // Scan a few keys so both Edwards sign bits are exercised.
        let mut seen = [false; 2];
        for seed in 1..=16u8 {
            let pair = key_pair(seed);
            let private = pair.private_key.serialize();
            let signature = sign(&private, &[&b"hello"[..], &b" world"[..]], &[seed; 64]);
            seen[usize::from(signature[63] >> 7)] = true;

            assert!(verify(pair.public_key.public_key_bytes(), &[&b"hello world"[..]], &signature));
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn tampered_signature_fails() {
        let pair = key_pair(3);
        let private = pair.private_key.serialize();
        let mut signature = sign(&private, &[&b"payload"[..]], &[9u8; 64]);
        signature[5] ^= 0x01;

        assert!(!verify(pair.public_key.public_key_bytes(), &[&b"payload"[..]], &signature));
    }

    #[test]
    fn vrf_output_is_deterministic() {
        let pair = key_pair(11);
        let private = pair.private_key.serialize();

        let (sig_a, out_a) = vrf_sign(&private, b"message", &[1u8; 64]);
        let (sig_b, out_b) = vrf_sign(&private, b"message", &[2u8; 64]);

        assert_ne!(sig_a, sig_b);
        assert_eq!(out_a, out_b);

        let verified = vrf_verify(pair.public_key.public_key_bytes(), b"message", &sig_a).unwrap();
        assert_eq!(verified, out_a);
        assert_eq!(
            pair.public_key.verify_vrf_signature(b"message", &sig_b).unwrap(),
            out_b
        );
    }

    #[test]
    fn vrf_output_depends_on_message() {
        let pair = key_pair(12);
        let private = pair.private_key.serialize();

        let (_, out_a) = vrf_sign(&private, b"first", &[1u8; 64]);
        let (_, out_b) = vrf_sign(&private, b"second", &[1u8; 64]);

        assert_ne!(out_a, out_b);
    }

    #[test]
    fn vrf_rejects_wrong_message_and_key() {
        let pair = key_pair(13);
        let other = key_pair(14);
        let private = pair.private_key.serialize();
        let (signature, _) = vrf_sign(&private, b"message", &[4u8; 64]);

        assert_eq!(
            vrf_verify(pair.public_key.public_key_bytes(), b"massage", &signature),
            Err(CryptoError::InvalidSignature)
        );
        assert_eq!(
            vrf_verify(other.public_key.public_key_bytes(), b"message", &signature),
            Err(CryptoError::InvalidSignature)
        );

        let mut tampered = signature;
        tampered[40] ^= 0x10;
        assert!(vrf_verify(pair.public_key.public_key_bytes(), b"message", &tampered).is_err());
    }

    #[test]
    fn vrf_rejects_wrong_length() {
        let pair = key_pair(15);
        assert_eq!(
            pair.public_key.verify_vrf_signature(b"message", &[0u8; 64]),
            Err(CryptoError::InvalidSignature)
        );
    }
}
