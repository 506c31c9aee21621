//! Rollup accounts and their Merkle-leaf encoding.

use std::fmt;

use ethereum_types::Address;
use num_bigint::BigUint;
use rollup_crypto::{eddsa, fr_from_biguint, poseidon, CryptoError, Fr};
use serde::{Deserialize, Serialize};

use crate::{serde_wrappers, CodecError, Idx, Nonce, TokenId};

/// A compressed BabyJubJub public key: little-endian `y` with the sign of
/// `x` in bit 255.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BjjPubKey(#[serde(with = "serde_wrappers::hex_bytes32")] pub [u8; 32]);

impl BjjPubKey {
    pub const EMPTY: BjjPubKey = BjjPubKey([0u8; 32]);

    /// Sign bit and `y` coordinate, as hashed into the account leaf.
    pub fn sign_ay(&self) -> (bool, BigUint) {
        eddsa::pk_sign_ay(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Debug for BjjPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BjjPubKey(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for BjjPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One leaf of the rollup state: the full account record.
///
/// `(eth_addr, bjj, token_id)` is unique across the state, and so is `idx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub idx: Idx,
    pub token_id: TokenId,
    pub nonce: Nonce,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub balance: BigUint,
    pub bjj: BjjPubKey,
    pub eth_addr: Address,
}

/// Fixed-width account record stored in the state KV store:
/// `token_id(4) || nonce(5) || balance(32) || bjj(32) || eth_addr(20)`,
/// integers big-endian.
pub const ACCOUNT_RECORD_LEN: usize = 93;

/// Balances wider than 192 bits cannot be committed to the leaf encoding.
pub const BALANCE_BITS: u64 = 192;

impl Account {
    /// The four field elements hashed into the Merkle leaf value:
    /// `[token_id | nonce·2^32 | sign·2^72, balance, ay, eth_addr]`.
    pub fn hash_elements(&self) -> Result<[Fr; 4], CryptoError> {
        let (sign, ay) = self.bjj.sign_ay();
        let mut e0 = BigUint::from(*self.token_id);
        e0 += BigUint::from(*self.nonce) << 32;
        if sign {
            e0 += BigUint::from(1u8) << 72;
        }
        Ok([
            fr_from_biguint(&e0)?,
            fr_from_biguint(&self.balance)?,
            fr_from_biguint(&ay)?,
            fr_from_biguint(&BigUint::from_bytes_be(self.eth_addr.as_bytes()))?,
        ])
    }

    /// Poseidon hash of the account record; the value committed under `idx`
    /// in the state tree.
    pub fn state_hash(&self) -> Result<Fr, CryptoError> {
        poseidon::hash(&self.hash_elements()?)
    }

    pub fn to_bytes(&self) -> Result<[u8; ACCOUNT_RECORD_LEN], CodecError> {
        if self.balance.bits() > BALANCE_BITS {
            return Err(CodecError::BalanceOverflow);
        }
        if *self.nonce > *Nonce::MAX {
            return Err(CodecError::NonceOverflow);
        }
        let mut out = [0u8; ACCOUNT_RECORD_LEN];
        out[0..4].copy_from_slice(&self.token_id.to_be_bytes());
        out[4..9].copy_from_slice(&self.nonce.to_be_bytes()[3..]);
        let balance = self.balance.to_bytes_be();
        out[9 + 32 - balance.len()..41].copy_from_slice(&balance);
        out[41..73].copy_from_slice(&self.bjj.0);
        out[73..93].copy_from_slice(self.eth_addr.as_bytes());
        Ok(out)
    }

    pub fn from_bytes(idx: Idx, bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != ACCOUNT_RECORD_LEN {
            return Err(CodecError::Truncated {
                expected: ACCOUNT_RECORD_LEN,
                got: bytes.len(),
            });
        }
        let token_id = TokenId(u32::from_be_bytes(bytes[0..4].try_into().unwrap()));
        let mut nonce_be = [0u8; 8];
        nonce_be[3..].copy_from_slice(&bytes[4..9]);
        Ok(Account {
            idx,
            token_id,
            nonce: Nonce(u64::from_be_bytes(nonce_be)),
            balance: BigUint::from_bytes_be(&bytes[9..41]),
            bjj: BjjPubKey(bytes[41..73].try_into().unwrap()),
            eth_addr: Address::from_slice(&bytes[73..93]),
        })
    }
}
