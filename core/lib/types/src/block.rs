//! Base-chain blocks and the per-block smart-contract data persisted into
//! the history store.

use ethereum_types::{Address, H256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    account::Account,
    batch::{Batch, Bid, Coordinator},
    contracts::{AuctionVariables, RollupVariables, WDelayerVariables},
    serde_wrappers,
    tx::{ExitInfo, L1Tx, L2Tx},
    BatchNum, Idx, TokenId,
};

/// A base-chain block header, as much of it as the core reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub num: u64,
    pub hash: H256,
    pub parent_hash: H256,
    pub timestamp: u64,
}

/// A token registered in the rollup contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: TokenId,
    pub eth_addr: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub eth_block_num: u64,
}

/// Everything one `ForgeBatch` event contributed: the txs that were applied,
/// the accounts they created, the exits they opened, and the batch header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchData {
    pub l1_user_txs: Vec<L1Tx>,
    pub l1_coordinator_txs: Vec<L1Tx>,
    pub l2_txs: Vec<L2Tx>,
    pub created_accounts: Vec<Account>,
    pub exit_tree: Vec<ExitInfo>,
    pub batch: Batch,
}

/// A rollup `Withdraw` event, annotated (for delayed withdrawals) with the
/// owner/token of the matching withdrawal-delayer deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawInfo {
    pub idx: Idx,
    pub num_exit_root: BatchNum,
    pub instant_withdraw: bool,
    pub tx_hash: H256,
    pub owner: Option<Address>,
    pub token: Option<Address>,
}

/// A deposit into (or withdrawal from) the withdrawal delayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WDelayerTransfer {
    pub owner: Address,
    pub token: Address,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub amount: BigUint,
    pub tx_hash: H256,
}

/// Rollup-contract section of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupData {
    pub l1_user_txs: Vec<L1Tx>,
    pub batches: Vec<BatchData>,
    pub added_tokens: Vec<Token>,
    pub withdrawals: Vec<WithdrawInfo>,
    /// Set when any rollup variable changed in this block.
    pub vars: Option<RollupVariables>,
}

/// Auction-contract section of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionData {
    pub bids: Vec<Bid>,
    pub coordinators: Vec<Coordinator>,
    pub vars: Option<AuctionVariables>,
}

/// Withdrawal-delayer section of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WDelayerData {
    pub deposits: Vec<WDelayerTransfer>,
    pub withdrawals: Vec<WDelayerTransfer>,
    pub vars: Option<WDelayerVariables>,
}

/// The full per-block record appended to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub block: Block,
    pub rollup: RollupData,
    pub auction: AuctionData,
    pub wdelayer: WDelayerData,
}

impl BlockData {
    pub fn new(block: Block) -> Self {
        BlockData {
            block,
            rollup: RollupData::default(),
            auction: AuctionData::default(),
            wdelayer: WDelayerData::default(),
        }
    }
}

impl Default for BatchData {
    fn default() -> Self {
        BatchData {
            l1_user_txs: Vec::new(),
            l1_coordinator_txs: Vec::new(),
            l2_txs: Vec::new(),
            created_accounts: Vec::new(),
            exit_tree: Vec::new(),
            batch: Batch {
                batch_num: BatchNum(0),
                eth_block_num: 0,
                forger_addr: Address::zero(),
                collected_fees: Default::default(),
                fee_idxs_coordinator: Vec::new(),
                state_root: BigUint::default(),
                exit_root: BigUint::default(),
                last_idx: Idx::NULL,
                forge_l1_txs_num: None,
                slot_num: crate::SlotNum(0),
            },
        }
    }
}
