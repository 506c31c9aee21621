//! Shared domain types of the rollup node.
//!
//! Everything that crosses a component boundary lives here: accounts and
//! their Merkle-leaf encoding, L1/L2 transactions with their wire formats,
//! batches, base-chain blocks and per-block smart-contract data, the L1
//! user-tx queue machinery, the Float40 amount encoding, the protocol fee
//! table and the `ZkInputs` witness structure consumed by the proving
//! circuit.

use std::{
    fmt,
    num::ParseIntError,
    ops::{Add, Deref, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[macro_use]
mod macros;

pub mod account;
pub mod batch;
pub mod block;
pub mod contracts;
pub mod fee;
pub mod float40;
pub mod queues;
pub mod serde_wrappers;
pub mod tx;
pub mod zk_inputs;

pub use ethereum_types::{Address, H256};

pub use self::{
    account::{Account, BjjPubKey},
    batch::{Batch, Bid, Coordinator, Slot},
    block::{AuctionData, BatchData, Block, BlockData, RollupData, Token, WDelayerData},
    contracts::{
        AuctionConstants, AuctionVariables, Bucket, RollupConstants, RollupVariables,
        ScConstants, ScVariables, WDelayerConstants, WDelayerVariables,
    },
    fee::FeeSelector,
    float40::Float40,
    queues::L1UserTxQueues,
    tx::{EddsaSignature, ExitInfo, L1Tx, L2Tx, PoolL2Tx, TxId, TxType},
    zk_inputs::ZkInputs,
};

basic_type!(
    /// Numeric identity of an account inside the rollup state tree (48 bits).
    Idx,
    u64
);

basic_type!(
    /// Identifier of a token registered in the rollup contract.
    TokenId,
    u32
);

basic_type!(
    /// Account nonce (40 bits), incremented once per processed L2 tx.
    Nonce,
    u64
);

basic_type!(
    /// Sequential number of a forged batch.
    BatchNum,
    u64
);

basic_type!(
    /// Sequential number of a forging auction slot.
    SlotNum,
    u64
);

impl Idx {
    /// The null index; `FromIdx = 0` on an L1 tx means "create an account".
    pub const NULL: Idx = Idx(0);
    /// The exit pseudo-account sinking Exit/ForceExit amounts.
    pub const EXIT: Idx = Idx(1);
    /// First index assignable to a user account; 0..256 are reserved.
    pub const USER_START: Idx = Idx(256);
    /// Largest index representable in the 48-bit wire encoding.
    pub const MAX: Idx = Idx((1 << 48) - 1);

    pub fn is_user(self) -> bool {
        self >= Self::USER_START
    }
}

impl Nonce {
    /// Largest nonce representable in the 40-bit wire encoding.
    pub const MAX: Nonce = Nonce((1 << 40) - 1);
}

impl TokenId {
    /// TokenID 0 is the native (ether-equivalent) token, registered at
    /// contract deployment.
    pub const NATIVE: TokenId = TokenId(0);
}

/// Chain identifier baked into every L2 signature, preventing cross-chain
/// replay.
pub type ChainId = u16;

/// Destination address marker meaning "any address": a `TransferToBjj`
/// carrying it is resolved by BJJ key and token only.
pub fn any_eth_addr() -> Address {
    Address::repeat_byte(0xff)
}

/// Errors of the fixed-width wire codecs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("truncated input: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("balance exceeds the 192-bit encoding width")]
    BalanceOverflow,
    #[error("index exceeds the 48-bit encoding width")]
    IdxOverflow,
    #[error("nonce exceeds the 40-bit encoding width")]
    NonceOverflow,
    #[error(transparent)]
    Float40(#[from] float40::Float40Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_idx_space() {
        assert!(!Idx::NULL.is_user());
        assert!(!Idx::EXIT.is_user());
        assert!(!Idx(255).is_user());
        assert!(Idx::USER_START.is_user());
        assert_eq!(*Idx::MAX, 0xffff_ffff_ffff);
    }

    #[test]
    fn basic_type_arithmetic() {
        let batch = BatchNum(41);
        assert_eq!(batch.next(), BatchNum(42));
        assert_eq!(batch + 2, BatchNum(43));
        assert_eq!("41".parse::<BatchNum>().unwrap(), batch);
        assert_eq!(batch.to_string(), "41");
    }
}
