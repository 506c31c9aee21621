//! EdDSA over BabyJubJub, as used for L2 transaction authorization.
//!
//! Public keys travel compressed: 32 bytes holding the little-endian `y`
//! coordinate with the sign of `x` packed into bit 255. The account state
//! hash needs only `(sign, ay)`, which are extracted without decompression;
//! the full (and fallible) point decompression is reserved for signature
//! verification.

use babyjubjub_rs::{decompress_point, decompress_signature, verify, Point, Signature};
use num_bigint::{BigInt, BigUint, Sign};

use crate::CryptoError;

/// Splits a compressed public key into the sign bit and the `y` coordinate.
/// This is a pure bit operation and works for any 32 bytes; validity of the
/// point is only established by [`verify_poseidon`].
pub fn pk_sign_ay(compressed: &[u8; 32]) -> (bool, BigUint) {
    let sign = compressed[31] & 0x80 != 0;
    let mut y = *compressed;
    y[31] &= 0x7f;
    (sign, BigUint::from_bytes_le(&y))
}

pub fn decompress_pk(compressed: &[u8; 32]) -> Result<Point, CryptoError> {
    decompress_point(*compressed).map_err(|_| CryptoError::InvalidPoint)
}

pub fn decompress_sig(compressed: &[u8; 64]) -> Result<Signature, CryptoError> {
    decompress_signature(compressed).map_err(|_| CryptoError::InvalidSignature)
}

/// The `(R8.x, R8.y, s)` components of a compressed signature, as the
/// proving circuit consumes them.
pub fn sig_components(sig: &[u8; 64]) -> Result<(BigUint, BigUint, BigUint), CryptoError> {
    let signature = decompress_sig(sig)?;
    let s = signature
        .s
        .to_biguint()
        .ok_or(CryptoError::InvalidSignature)?;
    Ok((
        crate::fr_to_biguint(&signature.r_b8.x),
        crate::fr_to_biguint(&signature.r_b8.y),
        s,
    ))
}

/// Verifies an EdDSA signature over a Poseidon-hashed message.
pub fn verify_poseidon(
    pk: &[u8; 32],
    sig: &[u8; 64],
    msg: &BigUint,
) -> Result<bool, CryptoError> {
    let point = decompress_pk(pk)?;
    let signature = decompress_sig(sig)?;
    let msg = BigInt::from_biguint(Sign::Plus, msg.clone());
    Ok(verify(point, signature, msg))
}

#[cfg(test)]
mod tests {
    use babyjubjub_rs::PrivateKey;

    use super::*;
    use crate::fr_to_biguint;

    fn test_key(fill: u8) -> PrivateKey {
        PrivateKey::import(vec![fill; 32]).unwrap()
    }

    #[test]
    fn sign_ay_matches_decompressed_point() {
        let pk = test_key(7).public();
        let compressed = pk.compress();
        let (_, ay) = pk_sign_ay(&compressed);
        assert_eq!(ay, fr_to_biguint(&pk.y));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let sk = test_key(3);
        let msg = BigUint::from(123_456_789u64);
        let sig = sk
            .sign(BigInt::from_biguint(Sign::Plus, msg.clone()))
            .unwrap();
        let pk = sk.public().compress();
        assert!(verify_poseidon(&pk, &sig.compress(), &msg).unwrap());

        // Any other message must not verify.
        let other = BigUint::from(987_654_321u64);
        assert!(!verify_poseidon(&pk, &sig.compress(), &other).unwrap());
    }

    #[test]
    fn garbage_point_is_rejected() {
        let garbage = [0xff_u8; 32];
        assert!(decompress_pk(&garbage).is_err());
    }
}
