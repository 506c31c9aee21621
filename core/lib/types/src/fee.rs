//! The protocol fee schedule.
//!
//! An L2 transaction carries an 8-bit fee selector. Selector 0 charges
//! nothing; for `1 ≤ i ≤ 255` the multiplier applied to the transfer amount
//! is `2^((i − 159) / 10)` — a geometric schedule that doubles every ten
//! selectors and crosses 100% at selector 159. Multipliers are materialized
//! as exact fixed-point integers scaled by `2^79`, derived from the ten
//! tenth-root-of-two constants below by binary shifts, so every
//! implementation of the table agrees bit-for-bit.

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// `floor(2^(79 + d/10))` for `d = 0..10`.
const ROOT_LSH79: [u128; 10] = [
    604_462_909_807_314_587_353_088,
    647_847_305_818_948_634_760_486,
    694_345_550_152_383_405_041_935,
    744_181_134_483_487_361_721_585,
    797_593_591_259_554_086_865_364,
    854_839_645_001_009_215_068_541,
    916_194_446_236_027_298_040_227,
    981_952_893_998_908_664_953_382,
    1_052_431_053_248_743_988_689_678,
    1_127_967_674_021_124_271_572_421,
];

const SCALE_BITS: u32 = 79;
/// Selector at which the multiplier reaches exactly 1.0.
const UNIT_SELECTOR: i32 = 159;

/// The full 256-entry table of `2^79`-scaled multipliers.
static FACTOR_LSH79: Lazy<[BigUint; 256]> = Lazy::new(|| {
    std::array::from_fn(|i| {
        if i == 0 {
            return BigUint::default();
        }
        let exp = i as i32 - UNIT_SELECTOR;
        let (q, d) = (exp.div_euclid(10), exp.rem_euclid(10));
        let root = BigUint::from(ROOT_LSH79[d as usize]);
        if q >= 0 {
            root << q as u32
        } else {
            root >> (-q) as u32
        }
    })
});

/// Index into the protocol fee table carried by every L2 transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FeeSelector(pub u8);

impl FeeSelector {
    pub const NONE: FeeSelector = FeeSelector(0);

    /// The `2^79`-scaled multiplier for this selector.
    pub fn factor_lsh79(self) -> &'static BigUint {
        &FACTOR_LSH79[self.0 as usize]
    }

    /// Fee charged on `amount`: `floor(amount × factor)`.
    pub fn fee_amount(self, amount: &BigUint) -> BigUint {
        (amount * self.factor_lsh79()) >> SCALE_BITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee(amount: u64, selector: u8) -> u64 {
        u64::try_from(FeeSelector(selector).fee_amount(&BigUint::from(amount))).unwrap()
    }

    #[test]
    fn selector_zero_charges_nothing() {
        assert_eq!(fee(u64::MAX, 0), 0);
    }

    #[test]
    fn pinned_values() {
        assert_eq!(fee(1000, 126), 101);
        assert_eq!(fee(1000, 159), 1000);
        assert_eq!(fee(16_000_000, 126), 1_624_504);
        assert_eq!(fee(1000, 137), 217);
    }

    #[test]
    fn schedule_is_strictly_monotone() {
        for i in 1..255u8 {
            assert!(
                FeeSelector(i).factor_lsh79() < FeeSelector(i + 1).factor_lsh79(),
                "selector {i}"
            );
        }
    }

    #[test]
    fn doubles_every_ten_selectors() {
        for i in 1..=245u8 {
            assert_eq!(
                FeeSelector(i).factor_lsh79() * 2u8,
                *FeeSelector(i + 10).factor_lsh79()
            );
        }
    }
}
