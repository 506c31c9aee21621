//! The history store interface: an append-only typed log of blocks, batches
//! and contract-variable snapshots. The SQL (or other) implementation lives
//! outside the core; an in-memory reference implementation for tests is in
//! [`crate::testonly`].

use std::fmt;

use num_bigint::BigUint;
use rollup_types::{
    Address, BatchNum, Block, BlockData, Coordinator, L1Tx, ScVariables, SlotNum, TokenId,
};
use thiserror::Error;

pub type HistoryStoreResult<T> = Result<T, HistoryStoreError>;

#[derive(Debug, Clone, Error)]
pub enum HistoryStoreError {
    /// Retryable I/O failure; the synchronizer surfaces it without mutating
    /// state.
    #[error("history store unavailable: {0}")]
    Transient(String),
    #[error("history store invariant broken: {0}")]
    Corrupted(String),
}

/// The best bid placed for a slot, joined with its coordinator registration.
#[derive(Debug, Clone, PartialEq)]
pub struct BidCoordinator {
    pub slot_num: SlotNum,
    pub bid_value: BigUint,
    pub bidder: Address,
    pub forger: Address,
    pub url: String,
}

/// Append-only persistence consumed by the synchronizer. `add_block_sc_data`
/// must be transactional: a block is either fully visible or absent.
#[async_trait::async_trait]
pub trait HistoryStore: 'static + fmt::Debug + Send + Sync {
    async fn get_last_block(&self) -> HistoryStoreResult<Option<Block>>;
    async fn get_block(&self, num: u64) -> HistoryStoreResult<Option<Block>>;
    async fn get_last_batch_num(&self) -> HistoryStoreResult<Option<BatchNum>>;
    /// Queue number of the newest L1 batch forged, if any.
    async fn get_last_l1_txs_num(&self) -> HistoryStoreResult<Option<u64>>;
    async fn get_last_l1_batch_block_num(&self) -> HistoryStoreResult<Option<u64>>;
    /// User txs of the given queue that no batch has consumed yet.
    async fn get_unforged_l1_user_txs(
        &self,
        to_forge_l1_txs_num: u64,
    ) -> HistoryStoreResult<Vec<L1Tx>>;
    async fn get_first_batch_block_num_by_slot(
        &self,
        slot_num: SlotNum,
    ) -> HistoryStoreResult<Option<u64>>;
    /// Variable state in force at the last stored block.
    async fn get_sc_vars(&self) -> HistoryStoreResult<Option<ScVariables>>;
    async fn get_best_bid_coordinator(
        &self,
        slot_num: SlotNum,
    ) -> HistoryStoreResult<Option<BidCoordinator>>;
    async fn get_last_token_id(&self) -> HistoryStoreResult<Option<TokenId>>;

    async fn set_initial_sc_vars(&self, vars: &ScVariables) -> HistoryStoreResult<()>;
    async fn add_block_sc_data(&self, data: &BlockData) -> HistoryStoreResult<()>;
    async fn add_coordinators(&self, coordinators: &[Coordinator]) -> HistoryStoreResult<()>;
    /// Truncates everything above `last_valid_block`; returns how many
    /// blocks were discarded.
    async fn reorg(&self, last_valid_block: u64) -> HistoryStoreResult<u64>;
}
