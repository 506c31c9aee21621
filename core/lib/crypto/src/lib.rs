//! Cryptographic primitives shared by the rollup core: Poseidon hashing over
//! the BN254 scalar field and EdDSA verification on BabyJubJub.
//!
//! Both primitives are protocol collaborators fixed by the on-chain verifier
//! and the proving circuit; this crate wraps the iden3 ecosystem
//! implementations and keeps all byte/field conversions in one place.

use ff::{PrimeField, PrimeFieldRepr};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use thiserror::Error;

pub use poseidon_rs::Fr;

pub mod eddsa;
pub mod poseidon;

/// Order of the BN254 scalar field, i.e. the modulus every hashed element is
/// reduced into.
pub static FIELD_MODULUS: Lazy<BigUint> = Lazy::new(|| {
    "21888242871839275222246405745257275088548364400416034343698204186575808495617"
        .parse()
        .unwrap()
});

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CryptoError {
    #[error("value does not fit into the scalar field")]
    NotInField,
    #[error("invalid BabyJubJub point encoding")]
    InvalidPoint,
    #[error("invalid EdDSA signature encoding")]
    InvalidSignature,
    #[error("Poseidon hashing failed: {0}")]
    Hash(String),
}

/// Converts a non-negative big integer into a field element. Fails if the
/// value is not canonical (≥ field modulus); callers that hash raw byte
/// strings should reduce first via [`fr_from_biguint_reduced`].
pub fn fr_from_biguint(value: &BigUint) -> Result<Fr, CryptoError> {
    if *value >= *FIELD_MODULUS {
        return Err(CryptoError::NotInField);
    }
    Fr::from_str(&value.to_string()).ok_or(CryptoError::NotInField)
}

/// Converts a big integer into a field element, reducing modulo the field
/// order first.
pub fn fr_from_biguint_reduced(value: &BigUint) -> Fr {
    let reduced = value % &*FIELD_MODULUS;
    Fr::from_str(&reduced.to_string()).expect("reduced value is canonical")
}

pub fn fr_from_u64(value: u64) -> Fr {
    Fr::from_str(&value.to_string()).expect("u64 is canonical")
}

pub fn fr_zero() -> Fr {
    use ff::Field;
    Fr::zero()
}

pub fn fr_to_biguint(value: &Fr) -> BigUint {
    let repr = value.into_repr();
    let mut bytes = Vec::with_capacity(32);
    repr.write_le(&mut bytes)
        .expect("writing to a Vec cannot fail");
    BigUint::from_bytes_le(&bytes)
}

/// Interprets up to 32 little-endian bytes as a canonical field element.
pub fn fr_from_bytes_le(bytes: &[u8]) -> Result<Fr, CryptoError> {
    fr_from_biguint(&BigUint::from_bytes_le(bytes))
}

/// 32-byte big-endian encoding, zero-padded; the fixed-width form used in
/// global-data byte strings.
pub fn fr_to_bytes_be(value: &Fr) -> [u8; 32] {
    let raw = fr_to_biguint(value).to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    out
}
