//! Float40: the 40-bit amount encoding shared with the on-chain verifier.
//!
//! Layout is `[ e: 5 bits | m: 35 bits ]` (exponent in the high bits), and
//! the represented value is `m × 10^e`. Only one encoding per value is
//! canonical: the mantissa is divided by 10 exactly as many times as needed
//! to fit 35 bits.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MANTISSA_BITS: u32 = 35;
const MANTISSA_MAX: u64 = (1 << MANTISSA_BITS) - 1;
const EXPONENT_MAX: u64 = 31;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Float40Error {
    #[error("amount loses precision in Float40 encoding")]
    NotEnoughPrecision,
    #[error("amount exceeds the Float40 range")]
    TooLarge,
    #[error("non-canonical Float40 encoding")]
    NonCanonical,
}

/// A canonically encoded 40-bit floating amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Float40(u64);

impl Float40 {
    pub const ZERO: Float40 = Float40(0);

    /// Encodes an arbitrary-precision amount; fails if the value cannot be
    /// represented exactly.
    pub fn encode(amount: &BigUint) -> Result<Self, Float40Error> {
        let mut mantissa = amount.clone();
        let mut exponent = 0u64;
        let ten = BigUint::from(10u8);
        let limit = BigUint::from(MANTISSA_MAX);
        while mantissa > limit {
            if (&mantissa % &ten).is_zero() {
                mantissa /= &ten;
                exponent += 1;
            } else {
                return Err(Float40Error::NotEnoughPrecision);
            }
            if exponent > EXPONENT_MAX {
                return Err(Float40Error::TooLarge);
            }
        }
        let mantissa = u64::try_from(mantissa).expect("mantissa fits 35 bits");
        Ok(Float40(exponent << MANTISSA_BITS | mantissa))
    }

    /// Decodes 40 bits into the represented amount, rejecting non-canonical
    /// encodings (a mantissa that could have stayed larger).
    pub fn decode(&self) -> Result<BigUint, Float40Error> {
        let value = self.decode_unchecked();
        let canonical = Self::encode(&value).map_err(|_| Float40Error::NonCanonical)?;
        if canonical != *self {
            return Err(Float40Error::NonCanonical);
        }
        Ok(value)
    }

    /// The represented value without the canonicality check; used where the
    /// bits were produced by [`Float40::encode`] in-process.
    pub fn decode_unchecked(&self) -> BigUint {
        let mantissa = self.0 & MANTISSA_MAX;
        let exponent = (self.0 >> MANTISSA_BITS) as u32;
        BigUint::from(mantissa) * BigUint::from(10u8).pow(exponent)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let be = self.0.to_be_bytes();
        be[3..8].try_into().expect("5-byte slice")
    }

    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        let mut be = [0u8; 8];
        be[3..].copy_from_slice(&bytes);
        Float40(u64::from_be_bytes(be))
    }
}
