//! Batches, auction bids and forging slots.

use std::collections::BTreeMap;

use ethereum_types::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{serde_wrappers, BatchNum, Idx, SlotNum, TokenId};

/// One forged batch, as reconstructed from the `ForgeBatch` call data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_num: BatchNum,
    pub eth_block_num: u64,
    pub forger_addr: Address,
    #[serde(with = "serde_wrappers::fee_map")]
    pub collected_fees: BTreeMap<TokenId, BigUint>,
    pub fee_idxs_coordinator: Vec<Idx>,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub state_root: BigUint,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub exit_root: BigUint,
    /// Highest account index after this batch.
    pub last_idx: Idx,
    /// Number of the L1 user-tx queue consumed, when this is an L1 batch.
    pub forge_l1_txs_num: Option<u64>,
    pub slot_num: SlotNum,
}

/// A bid placed in the forging auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub slot_num: SlotNum,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub bid_value: BigUint,
    pub bidder: Address,
    pub eth_block_num: u64,
}

/// A registered coordinator (bidder/forger key pair plus its public URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinator {
    pub bidder: Address,
    pub forger: Address,
    pub url: String,
    pub eth_block_num: u64,
}

/// The forging slot the synchronizer currently tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_num: SlotNum,
    pub from_block: u64,
    pub to_block: u64,
    /// True when the boot coordinator forges this slot (no bid, or the
    /// winner missed the slot deadline).
    pub boot_coordinator: bool,
    pub forger: Address,
    pub bidder: Address,
    pub url: String,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub bid_value: BigUint,
    /// First block of the slot in which a batch was forged, if any.
    pub batches_from_block: Option<u64>,
}
