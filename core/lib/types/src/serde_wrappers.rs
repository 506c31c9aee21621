//! Serde adapters for circuit-facing JSON: big integers are serialized as
//! decimal strings, byte strings as hex.

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serializer};

pub mod biguint_dec {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

pub mod biguint_dec_vec {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[BigUint], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<BigUint>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|s| s.parse().map_err(de::Error::custom))
            .collect()
    }
}

pub mod biguint_dec_mat {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &[Vec<BigUint>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            value
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect::<Vec<_>>()),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<BigUint>>, D::Error> {
        let raw = Vec::<Vec<String>>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| s.parse().map_err(de::Error::custom))
                    .collect()
            })
            .collect()
    }
}

pub mod fee_map {
    use std::collections::BTreeMap;

    use super::*;
    use crate::TokenId;

    pub fn serialize<S: Serializer>(
        value: &BTreeMap<TokenId, BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(value.iter().map(|(token, fee)| (token.to_string(), fee.to_string())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<TokenId, BigUint>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(token, fee)| {
                Ok((
                    token.parse().map_err(de::Error::custom)?,
                    fee.parse().map_err(de::Error::custom)?,
                ))
            })
            .collect()
    }
}

fn serialize_hex<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(value)))
}

fn deserialize_hex<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> Result<[u8; N], D::Error> {
    let raw = String::deserialize(deserializer)?;
    let raw = raw.strip_prefix("0x").unwrap_or(&raw);
    let bytes = hex::decode(raw).map_err(de::Error::custom)?;
    bytes
        .try_into()
        .map_err(|_| de::Error::custom("unexpected byte string length"))
}

pub mod hex_bytes32 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        deserialize_hex::<_, 32>(deserializer)
    }
}

pub mod hex_bytes64 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        deserialize_hex::<_, 64>(deserializer)
    }
}
