//! Poseidon hashing over the BN254 scalar field.

use once_cell::sync::Lazy;
use poseidon_rs::Poseidon;

use crate::{fr_from_biguint_reduced, CryptoError, Fr};

static POSEIDON: Lazy<Poseidon> = Lazy::new(Poseidon::new);

/// Bytes absorbed per field element when hashing raw byte strings. 31 bytes
/// always fit below the field modulus.
const CHUNK_SIZE: usize = 31;
/// Field elements absorbed per sponge iteration of [`hash_bytes`].
const FRAME_SIZE: usize = 5;

/// Poseidon hash of up to 6 field elements (the arity supported by the
/// circuit-side constants).
pub fn hash(inputs: &[Fr]) -> Result<Fr, CryptoError> {
    POSEIDON.hash(inputs.to_vec()).map_err(CryptoError::Hash)
}

/// Poseidon hash of an arbitrary byte string.
///
/// The input is split into 31-byte little-endian chunks; chunks are absorbed
/// five at a time together with the running state, so the digest of a message
/// is a fixed function of its bytes only.
pub fn hash_bytes(msg: &[u8]) -> Result<Fr, CryptoError> {
    use ff::Field;

    let mut elems: Vec<Fr> = msg
        .chunks(CHUNK_SIZE)
        .map(|chunk| fr_from_biguint_reduced(&num_bigint::BigUint::from_bytes_le(chunk)))
        .collect();
    // An empty message still absorbs one (zero) element.
    if elems.is_empty() {
        elems.push(Fr::zero());
    }

    let mut state = Fr::zero();
    for frame in elems.chunks(FRAME_SIZE) {
        let mut inputs = Vec::with_capacity(FRAME_SIZE + 1);
        inputs.push(state);
        inputs.extend_from_slice(frame);
        while inputs.len() < FRAME_SIZE + 1 {
            inputs.push(Fr::zero());
        }
        state = hash(&inputs)?;
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fr_from_u64, fr_to_biguint};

    #[test]
    fn hash_is_deterministic() {
        let inputs = [fr_from_u64(1), fr_from_u64(2), fr_from_u64(3)];
        assert_eq!(hash(&inputs).unwrap(), hash(&inputs).unwrap());
    }

    #[test]
    fn hash_depends_on_every_input() {
        let a = hash(&[fr_from_u64(1), fr_from_u64(2)]).unwrap();
        let b = hash(&[fr_from_u64(1), fr_from_u64(3)]).unwrap();
        let c = hash(&[fr_from_u64(2), fr_from_u64(2)]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_bytes_differs_per_length() {
        let short = hash_bytes(b"rollup").unwrap();
        let long = hash_bytes(&[b"rollup".as_slice(), &[0u8; 200]].concat()).unwrap();
        assert_ne!(short, long);
        assert_ne!(fr_to_biguint(&short), num_bigint::BigUint::default());
    }

    #[test]
    fn hash_bytes_of_empty_message() {
        // Must not panic and must be stable.
        assert_eq!(hash_bytes(&[]).unwrap(), hash_bytes(&[]).unwrap());
    }
}
