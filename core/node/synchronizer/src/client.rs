//! The base-chain client interface the synchronizer consumes, and the typed
//! events it yields. Implementations wrap an RPC client; the core only sees
//! decoded contract data.

use std::fmt;

use num_bigint::BigUint;
use rollup_types::{
    AuctionConstants, AuctionVariables, BatchNum, Block, Idx, L1Tx, L2Tx, RollupConstants,
    RollupVariables, SlotNum, TokenId, WDelayerConstants, WDelayerVariables,
};
use rollup_types::{contracts::Bucket, Address, H256};
use thiserror::Error;

pub type EthClientResult<T> = Result<T, EthClientError>;

/// Client failures are transient by definition: the synchronizer surfaces
/// them without mutating state and retries on the next poll.
#[derive(Debug, Clone, Error)]
pub enum EthClientError {
    #[error("base chain unreachable: {0}")]
    Transient(String),
    #[error("malformed chain data: {0}")]
    Malformed(String),
}

/// ERC-20 metadata probed from the token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Consts {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

// ---- rollup contract events ----

#[derive(Debug, Clone, PartialEq)]
pub struct RollupEventL1UserTx {
    pub l1_tx: L1Tx,
    pub to_forge_l1_txs_num: u64,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupEventAddToken {
    pub token_addr: Address,
    pub token_id: TokenId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupEventForgeBatch {
    pub batch_num: BatchNum,
    pub eth_tx_hash: H256,
    /// Count of L1 user txs consumed, straight from the event; used to
    /// decode the forge call data.
    pub l1_user_txs_len: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollupEventWithdraw {
    pub idx: Idx,
    pub num_exit_root: BatchNum,
    pub amount: BigUint,
    pub instant_withdraw: bool,
    pub tx_hash: H256,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollupEvents {
    pub l1_user_txs: Vec<RollupEventL1UserTx>,
    pub add_tokens: Vec<RollupEventAddToken>,
    pub forge_batches: Vec<RollupEventForgeBatch>,
    pub withdraws: Vec<RollupEventWithdraw>,
    pub update_forge_l1_l2_batch_timeout: Vec<i64>,
    pub update_buckets_parameters: Vec<Vec<Bucket>>,
    pub safe_mode: Vec<bool>,
}

// ---- auction contract events ----

#[derive(Debug, Clone, PartialEq)]
pub struct AuctionEventNewBid {
    pub slot: SlotNum,
    pub bid_amount: BigUint,
    pub bidder: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionEventSetCoordinator {
    pub bidder: Address,
    pub forger: Address,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionEvents {
    pub new_bids: Vec<AuctionEventNewBid>,
    pub set_coordinators: Vec<AuctionEventSetCoordinator>,
    pub new_boot_coordinator: Vec<(Address, String)>,
    pub new_slot_deadline: Vec<u8>,
    pub new_closed_auction_slots: Vec<u16>,
    /// `(slot set, new opening bid)`.
    pub new_default_slot_set_bid: Vec<(u8, BigUint)>,
}

// ---- withdrawal delayer events ----

#[derive(Debug, Clone, PartialEq)]
pub struct WDelayerEventTransfer {
    pub owner: Address,
    pub token: Address,
    pub amount: BigUint,
    pub tx_hash: H256,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WDelayerEvents {
    pub deposits: Vec<WDelayerEventTransfer>,
    pub withdraws: Vec<WDelayerEventTransfer>,
    pub new_withdrawal_delay: Vec<u64>,
    pub emergency_mode: Vec<bool>,
}

/// Decoded `forgeBatch` call data.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupForgeBatchArgs {
    pub l1_batch: bool,
    pub l1_coordinator_txs: Vec<L1Tx>,
    pub l2_txs_data: Vec<L2Tx>,
    pub fee_idx_coordinator: Vec<Idx>,
    pub new_last_idx: u64,
    pub new_st_root: BigUint,
    pub new_exit_root: BigUint,
}

/// Base-chain access used by the [`Synchronizer`](crate::Synchronizer).
///
/// `*_events_by_block` returns the events of one block together with that
/// block's hash (when any events fired); the synchronizer cross-checks the
/// hash against the fetched header to catch mid-poll reorgs.
#[async_trait::async_trait]
pub trait EthClient: 'static + fmt::Debug + Send + Sync {
    async fn eth_current_block(&self) -> EthClientResult<u64>;
    async fn eth_block_by_number(&self, num: u64) -> EthClientResult<Option<Block>>;
    async fn eth_erc20_consts(&self, addr: Address) -> EthClientResult<Erc20Consts>;
    async fn chain_id(&self) -> EthClientResult<u16>;

    async fn rollup_constants(&self) -> EthClientResult<RollupConstants>;
    async fn auction_constants(&self) -> EthClientResult<AuctionConstants>;
    async fn wdelayer_constants(&self) -> EthClientResult<WDelayerConstants>;

    /// Variable state at contract deployment, plus the deployment block.
    async fn rollup_event_init(&self) -> EthClientResult<(RollupVariables, u64)>;
    async fn auction_event_init(&self) -> EthClientResult<(AuctionVariables, u64)>;
    async fn wdelayer_event_init(&self) -> EthClientResult<(WDelayerVariables, u64)>;

    async fn rollup_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(RollupEvents, H256)>>;
    async fn auction_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(AuctionEvents, H256)>>;
    async fn wdelayer_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(WDelayerEvents, H256)>>;

    /// Decodes the forge call data of the given tx; returns the args and the
    /// forger (tx sender).
    async fn rollup_forge_batch_args(
        &self,
        tx_hash: H256,
        l1_user_txs_len: u16,
    ) -> EthClientResult<(RollupForgeBatchArgs, Address)>;

    async fn auction_can_forge(&self, forger: Address, block_num: u64) -> EthClientResult<bool>;
}
