//! Smart-contract constants (immutable post-deploy) and variables
//! (mutable, versioned per block).
//!
//! Variables are never mutated in place: every on-chain change produces a
//! fresh snapshot attached to the block it happened in, so a reorg can
//! restore the exact variable state of any height.

use ethereum_types::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::serde_wrappers;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupConstants {
    pub contract_addr: Address,
    /// Upper bound the contract enforces on `forge_l1_l2_batch_timeout`.
    pub absolute_max_l1_l2_batch_timeout: i64,
    /// Hard cap of user txs per L1 queue; overflow opens a new queue.
    pub max_l1_user_txs: usize,
    /// Circuit bounds, shared with the verifier.
    pub max_tx: usize,
    pub max_l1_tx: usize,
    pub max_fee_tx: usize,
    pub n_levels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionConstants {
    pub contract_addr: Address,
    /// First base-chain block of slot 0.
    pub genesis_block_num: u64,
    pub blocks_per_slot: u64,
    pub initial_minimal_bidding: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WDelayerConstants {
    pub contract_addr: Address,
    pub max_withdrawal_delay: u64,
    pub max_emergency_mode_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScConstants {
    pub rollup: RollupConstants,
    pub auction: AuctionConstants,
    pub wdelayer: WDelayerConstants,
}

impl AuctionConstants {
    pub fn slot_num(&self, block_num: u64) -> u64 {
        if block_num < self.genesis_block_num {
            return 0;
        }
        (block_num - self.genesis_block_num) / self.blocks_per_slot
    }

    pub fn slot_from_block(&self, slot_num: u64) -> u64 {
        self.genesis_block_num + slot_num * self.blocks_per_slot
    }
}

/// Withdrawal rate-limiting bucket parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub ceil_usd: BigUint,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub withdrawals: BigUint,
    pub block_stamp: u64,
    pub rate_blocks: u64,
    pub rate_withdrawals: u64,
    pub max_withdrawals: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupVariables {
    pub eth_block_num: u64,
    pub forge_l1_l2_batch_timeout: i64,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub fee_add_token: BigUint,
    pub buckets: Vec<Bucket>,
    pub safe_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionVariables {
    pub eth_block_num: u64,
    pub boot_coordinator: Address,
    pub boot_coordinator_url: String,
    /// Bid that a slot of each of the six slot sets opens at.
    pub default_slot_set_bid: [BiddableAmount; 6],
    pub closed_auction_slots: u16,
    pub open_auction_slots: u16,
    pub slot_deadline: u8,
}

/// `BigUint` carried with decimal-string serde, usable inside arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiddableAmount(#[serde(with = "serde_wrappers::biguint_dec")] pub BigUint);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WDelayerVariables {
    pub eth_block_num: u64,
    pub withdrawal_delay: u64,
    pub emergency_mode_starting_block: u64,
    pub emergency_mode: bool,
}

/// The variable state in force at some block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScVariables {
    pub rollup: RollupVariables,
    pub auction: AuctionVariables,
    pub wdelayer: WDelayerVariables,
}
