//! The chain synchronizer drives the rollup core forward one base-chain
//! block at a time: it decodes rollup/auction/withdrawal-delayer events,
//! replays every `ForgeBatch` through the transaction processor against the
//! StateDB, detects and recovers from reorganizations, and persists the
//! resulting block data into the history store.
//!
//! Concurrency model: one mutex serializes the whole sync call; readers get
//! a consistent view through [`Stats`] snapshots and the history store's
//! read queries. A batch commit writes the state checkpoint first and the
//! block row second; any failure in between rolls the state back to the
//! batch that was current when the block started.

use std::time::Duration;

use rollup_state::{StateDb, StateError};
use rollup_tx_processor::{TxProcessor, TxProcessorConfig, TxProcessorError};
use rollup_types::{
    Batch, BatchData, Block, BlockData, Coordinator, H256, L2Tx, PoolL2Tx, ScConstants,
    ScVariables, SlotNum, Token, TokenId,
};
use rollup_types::{batch::Slot, block::WDelayerTransfer, block::WithdrawInfo, Address, Bid};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

pub mod client;
pub mod history;
mod metrics;
mod stats;
pub mod testonly;
#[cfg(test)]
mod tests;

use self::metrics::{SyncStage, METRICS};
pub use self::{
    client::{EthClient, EthClientError, Erc20Consts},
    history::{HistoryStore, HistoryStoreError},
    stats::{Stats, StatsHolder},
};

/// ERC-20 metadata recorded when the on-chain probe fails.
const TOKEN_NAME_FALLBACK: &str = "ERC20_ETH_ERROR";
const TOKEN_SYMBOL_FALLBACK: &str = "ERROR";
const TOKEN_NAME_MAX: usize = 20;
const TOKEN_SYMBOL_MAX: usize = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("event stream block hash mismatch at block {block}")]
    BlockHashMismatch { block: u64 },
    #[error("forged batch {got} does not follow local batch chain (expected {expected})")]
    BatchNumMismatch { expected: rollup_types::BatchNum, got: rollup_types::BatchNum },
    #[error("state root mismatch replaying batch {batch}")]
    StateRootMismatch { batch: rollup_types::BatchNum },
    #[error("exit root mismatch replaying batch {batch}")]
    ExitRootMismatch { batch: rollup_types::BatchNum },
    #[error("last idx mismatch replaying batch {batch}")]
    LastIdxMismatch { batch: rollup_types::BatchNum },
    #[error("token {0} not registered")]
    TokenNotRegistered(TokenId),
    #[error("coordinator {forger} may not forge at block {block}")]
    CanForgeDenied { forger: Address, block: u64 },
    #[error("non-instant withdraw has no matching delayer deposit in tx {0:?}")]
    MissingWDelayerPairing(H256),
    #[error("no common ancestor found while handling a reorg")]
    NoCommonAncestor,
    #[error("sync canceled")]
    Canceled,
    #[error(transparent)]
    Client(#[from] EthClientError),
    #[error(transparent)]
    History(#[from] HistoryStoreError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Processor(#[from] TxProcessorError),
}

impl SyncError {
    /// Transient errors leave no state behind and are retried on the next
    /// poll; everything else means chain data disagrees with core rules.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Client(EthClientError::Transient(_))
                | SyncError::History(HistoryStoreError::Transient(_))
                | SyncError::Canceled
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// First base-chain block to sync on a cold start (contract deployment
    /// height).
    pub start_block_num: u64,
    /// Head poll interval of the [`Synchronizer::run`] loop, milliseconds.
    #[serde(default = "SyncConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    fn default_poll_interval_ms() -> u64 {
        500
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// What one `sync_next_block` call did.
#[derive(Debug)]
pub enum SyncOutcome {
    /// One more block ingested and persisted.
    Synced(Box<BlockData>),
    /// The head is already reached; nothing to do.
    Idle,
    /// A reorganization was detected and rolled back; `discarded` blocks
    /// were dropped from the history store.
    Reorg { discarded: u64 },
}

struct Inner {
    client: Box<dyn EthClient>,
    history: Box<dyn HistoryStore>,
    state: StateDb,
    vars: ScVariables,
    initial_vars: ScVariables,
}

pub struct Synchronizer {
    consts: ScConstants,
    chain_id: u16,
    start_block_num: u64,
    stats: StatsHolder,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("chain_id", &self.chain_id)
            .field("start_block_num", &self.start_block_num)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    pub async fn new(
        client: Box<dyn EthClient>,
        history: Box<dyn HistoryStore>,
        state: StateDb,
        config: SyncConfig,
    ) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let consts = ScConstants {
            rollup: client.rollup_constants().await.context("rollup constants")?,
            auction: client
                .auction_constants()
                .await
                .context("auction constants")?,
            wdelayer: client
                .wdelayer_constants()
                .await
                .context("wdelayer constants")?,
        };
        let chain_id = client.chain_id().await.context("chain id")?;

        let (vars, initial) = match history.get_sc_vars().await? {
            Some(vars) => (vars.clone(), vars),
            None => {
                let (rollup, _) = client.rollup_event_init().await.context("rollup init")?;
                let (auction, _) = client.auction_event_init().await.context("auction init")?;
                let (wdelayer, _) = client
                    .wdelayer_event_init()
                    .await
                    .context("wdelayer init")?;
                let vars = ScVariables { rollup, auction, wdelayer };
                history.set_initial_sc_vars(&vars).await?;
                (vars.clone(), vars)
            }
        };

        tracing::info!(
            chain_id,
            start_block = config.start_block_num,
            "initialized synchronizer"
        );
        Ok(Synchronizer {
            consts,
            chain_id,
            start_block_num: config.start_block_num,
            stats: StatsHolder::new(),
            inner: Mutex::new(Inner {
                client,
                history,
                state,
                vars,
                initial_vars: initial,
            }),
        })
    }

    /// Smart-contract constants (immutable post-deploy).
    pub fn consts(&self) -> &ScConstants {
        &self.consts
    }

    /// A consistent snapshot of the sync progress; never blocks on an
    /// in-flight sync.
    pub fn stats(&self) -> Stats {
        self.stats.load()
    }

    /// Variable state in force after the last synced block.
    pub async fn sc_vars(&self) -> ScVariables {
        self.inner.lock().await.vars.clone()
    }

    /// Polls the head and syncs until idle; returns on stop signal.
    pub async fn run(
        &self,
        mut stop_receiver: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> anyhow::Result<()> {
        let mut timer = tokio::time::interval(poll_interval);
        while !*stop_receiver.borrow_and_update() {
            tokio::select! {
                _ = timer.tick() => { /* continue iterations */ }
                _ = stop_receiver.changed() => break,
            }
            loop {
                match self.sync_next_block(Some(&stop_receiver)).await {
                    Ok(SyncOutcome::Synced(data)) => {
                        tracing::debug!(block = data.block.num, "synced block");
                    }
                    Ok(SyncOutcome::Idle) => break,
                    Ok(SyncOutcome::Reorg { discarded }) => {
                        tracing::warn!(discarded, "handled chain reorganization");
                    }
                    Err(SyncError::Canceled) => break,
                    Err(err) if err.is_transient() => {
                        tracing::warn!("transient sync error: {err}");
                        break;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        tracing::info!("Stop signal received, synchronizer is shutting down");
        Ok(())
    }

    /// Ingests the next base-chain block, if mined. At most one block (and
    /// all batches forged in it) is processed per call.
    pub async fn sync_next_block(
        &self,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut inner = self.inner.lock().await;
        self.sync_block(&mut inner, stop).await
    }

    async fn sync_block(
        &self,
        inner: &mut Inner,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<SyncOutcome, SyncError> {
        let last_block = inner.history.get_last_block().await?;
        let next_num = match &last_block {
            Some(block) => block.num + 1,
            None => self.start_block_num,
        };
        let head = inner.client.eth_current_block().await?;
        self.stats.update(|stats| stats.eth.last_block_num = head);
        if next_num > head {
            return Ok(SyncOutcome::Idle);
        }
        let Some(block) = inner.client.eth_block_by_number(next_num).await? else {
            return Ok(SyncOutcome::Idle);
        };

        if let Some(last) = &last_block {
            if block.parent_hash != last.hash {
                tracing::warn!(block = block.num, "parent hash mismatch, handling reorg");
                let discarded = self.handle_reorg(inner, last.num).await?;
                METRICS.reorgs.inc();
                return Ok(SyncOutcome::Reorg { discarded });
            }
        }

        check_cancel(stop)?;
        let stage = METRICS.sync_stage[&SyncStage::FetchEvents].start();
        let rollup_events = inner.client.rollup_events_by_block(block.num).await?;
        let auction_events = inner.client.auction_events_by_block(block.num).await?;
        let wdelayer_events = inner.client.wdelayer_events_by_block(block.num).await?;
        stage.observe();

        for hash in [
            rollup_events.as_ref().map(|(_, hash)| *hash),
            auction_events.as_ref().map(|(_, hash)| *hash),
            wdelayer_events.as_ref().map(|(_, hash)| *hash),
        ]
        .into_iter()
        .flatten()
        {
            if hash != block.hash {
                return Err(SyncError::BlockHashMismatch { block: block.num });
            }
        }
        check_cancel(stop)?;

        let start_batch = inner.state.current_batch();
        let result = self
            .ingest_block(
                inner,
                &block,
                rollup_events.map(|(events, _)| events).unwrap_or_default(),
                auction_events.map(|(events, _)| events).unwrap_or_default(),
                wdelayer_events.map(|(events, _)| events).unwrap_or_default(),
            )
            .await;
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                if inner.state.current_batch() != start_batch {
                    if let Err(reset_err) = inner.state.reset(start_batch) {
                        tracing::error!("failed to roll back state after sync error: {reset_err}");
                    }
                }
                return Err(err);
            }
        };

        self.update_stats(inner, &data, head).await?;
        METRICS.blocks_synced.inc();
        tracing::info!(
            block = data.block.num,
            batches = data.rollup.batches.len(),
            l1_user_txs = data.rollup.l1_user_txs.len(),
            "synced block"
        );
        Ok(SyncOutcome::Synced(Box::new(data)))
    }

    /// Decodes, processes and persists one block's worth of contract data.
    /// Persistence is last; a failure anywhere leaves the caller to reset.
    async fn ingest_block(
        &self,
        inner: &mut Inner,
        block: &Block,
        rollup_events: client::RollupEvents,
        auction_events: client::AuctionEvents,
        wdelayer_events: client::WDelayerEvents,
    ) -> Result<BlockData, SyncError> {
        let mut data = BlockData::new(block.clone());

        let stage = METRICS.sync_stage[&SyncStage::ProcessBatches].start();
        self.rollup_sync(inner, block, rollup_events, &mut data).await?;
        self.auction_sync(inner, block, auction_events, &mut data);
        self.wdelayer_sync(inner, block, wdelayer_events, &mut data);
        pair_withdrawals(&mut data)?;
        stage.observe();

        let stage = METRICS.sync_stage[&SyncStage::Persist].start();
        inner.history.add_block_sc_data(&data).await?;
        if !data.auction.coordinators.is_empty() {
            inner.history.add_coordinators(&data.auction.coordinators).await?;
        }
        stage.observe();
        Ok(data)
    }

    async fn rollup_sync(
        &self,
        inner: &mut Inner,
        block: &Block,
        events: client::RollupEvents,
        data: &mut BlockData,
    ) -> Result<(), SyncError> {
        // Tokens first: a tx later in this block may reference a token
        // registered earlier in it.
        let mut last_token_id = inner
            .history
            .get_last_token_id()
            .await?
            .map(|token| *token)
            .unwrap_or(*TokenId::NATIVE);
        for evt in &events.add_tokens {
            let consts = match inner.client.eth_erc20_consts(evt.token_addr).await {
                Ok(consts) => consts,
                Err(err) => {
                    tracing::warn!(token = ?evt.token_addr, "ERC-20 probe failed: {err}");
                    Erc20Consts {
                        name: TOKEN_NAME_FALLBACK.to_string(),
                        symbol: TOKEN_SYMBOL_FALLBACK.to_string(),
                        decimals: 1,
                    }
                }
            };
            let mut name = consts.name;
            name.truncate(TOKEN_NAME_MAX);
            let mut symbol = consts.symbol;
            symbol.truncate(TOKEN_SYMBOL_MAX);
            data.rollup.added_tokens.push(Token {
                token_id: evt.token_id,
                eth_addr: evt.token_addr,
                name,
                symbol,
                decimals: consts.decimals,
                eth_block_num: block.num,
            });
            last_token_id = last_token_id.max(*evt.token_id);
        }

        for evt in &events.l1_user_txs {
            let mut tx = evt.l1_tx.clone();
            tx.to_forge_l1_txs_num = Some(evt.to_forge_l1_txs_num);
            tx.position = evt.position;
            tx.user_origin = true;
            tx.eth_block_num = block.num;
            if *tx.token_id > last_token_id {
                return Err(SyncError::TokenNotRegistered(tx.token_id));
            }
            data.rollup.l1_user_txs.push(tx);
        }

        let mut next_forge_l1_txs_num = inner
            .history
            .get_last_l1_txs_num()
            .await?
            .map(|num| num + 1)
            .unwrap_or(0);
        for evt in &events.forge_batches {
            let (args, sender) = inner
                .client
                .rollup_forge_batch_args(evt.eth_tx_hash, evt.l1_user_txs_len)
                .await?;
            if !inner.client.auction_can_forge(sender, block.num).await? {
                return Err(SyncError::CanForgeDenied { forger: sender, block: block.num });
            }
            let batch_data =
                self.forge_batch(inner, block, data, evt, args, sender, &mut next_forge_l1_txs_num)
                    .await?;
            data.rollup.batches.push(batch_data);
        }

        for evt in &events.withdraws {
            data.rollup.withdrawals.push(WithdrawInfo {
                idx: evt.idx,
                num_exit_root: evt.num_exit_root,
                instant_withdraw: evt.instant_withdraw,
                tx_hash: evt.tx_hash,
                owner: None,
                token: None,
            });
        }

        let has_var_updates = !events.update_forge_l1_l2_batch_timeout.is_empty()
            || !events.update_buckets_parameters.is_empty()
            || !events.safe_mode.is_empty();
        if has_var_updates {
            let mut vars = inner.vars.rollup.clone();
            if let Some(timeout) = events.update_forge_l1_l2_batch_timeout.last() {
                vars.forge_l1_l2_batch_timeout = *timeout;
            }
            if let Some(buckets) = events.update_buckets_parameters.last() {
                vars.buckets = buckets.clone();
            }
            if let Some(safe_mode) = events.safe_mode.last() {
                vars.safe_mode = *safe_mode;
            }
            vars.eth_block_num = block.num;
            inner.vars.rollup = vars.clone();
            data.rollup.vars = Some(vars);
        }
        Ok(())
    }

    /// Replays one `ForgeBatch` through the tx processor and checkpoints the
    /// state under its batch number.
    #[allow(clippy::too_many_arguments)]
    async fn forge_batch(
        &self,
        inner: &mut Inner,
        block: &Block,
        data: &BlockData,
        evt: &client::RollupEventForgeBatch,
        args: client::RollupForgeBatchArgs,
        sender: Address,
        next_forge_l1_txs_num: &mut u64,
    ) -> Result<BatchData, SyncError> {
        let expected = inner.state.current_batch().next();
        if evt.batch_num != expected {
            return Err(SyncError::BatchNumMismatch { expected, got: evt.batch_num });
        }

        let mut batch_data = BatchData::default();
        let forge_l1_txs_num = if args.l1_batch {
            let mut queue = inner
                .history
                .get_unforged_l1_user_txs(*next_forge_l1_txs_num)
                .await?;
            // Txs queued within this very block are not persisted yet; a
            // queue that only ever existed in-block resolves to what this
            // block collected (possibly nothing, if it froze empty).
            queue.extend(
                data.rollup
                    .l1_user_txs
                    .iter()
                    .filter(|tx| tx.to_forge_l1_txs_num == Some(*next_forge_l1_txs_num))
                    .cloned(),
            );
            batch_data.l1_user_txs = queue;
            let num = *next_forge_l1_txs_num;
            *next_forge_l1_txs_num += 1;
            Some(num)
        } else {
            None
        };

        for tx in &mut batch_data.l1_user_txs {
            tx.batch_num = Some(evt.batch_num);
        }
        let position0 = batch_data.l1_user_txs.len();
        for (i, mut tx) in args.l1_coordinator_txs.iter().cloned().enumerate() {
            tx.position = position0 + i;
            tx.to_forge_l1_txs_num = forge_l1_txs_num;
            tx.user_origin = false;
            tx.eth_block_num = block.num;
            tx.batch_num = Some(evt.batch_num);
            batch_data.l1_coordinator_txs.push(tx);
        }

        let mut pool_txs: Vec<PoolL2Tx> = args
            .l2_txs_data
            .iter()
            .cloned()
            .map(L2Tx::into_pool_tx)
            .collect();

        let config = TxProcessorConfig {
            n_levels: self.consts.rollup.n_levels,
            max_tx: self.consts.rollup.max_tx,
            max_l1_tx: self.consts.rollup.max_l1_tx,
            max_fee_tx: self.consts.rollup.max_fee_tx,
            chain_id: self.chain_id,
        };
        let mut processor = TxProcessor::new(&mut inner.state, config);
        let out = processor.process_txs(
            &args.fee_idx_coordinator,
            &batch_data.l1_user_txs,
            &batch_data.l1_coordinator_txs,
            &mut pool_txs,
        )?;

        // The replayed state must agree bit-for-bit with what was committed
        // on-chain; a mismatch means the core disagrees with the verifier.
        if out.new_state_root != args.new_st_root {
            return Err(SyncError::StateRootMismatch { batch: evt.batch_num });
        }
        if out.new_exit_root != args.new_exit_root {
            return Err(SyncError::ExitRootMismatch { batch: evt.batch_num });
        }
        if *out.new_last_idx != args.new_last_idx {
            return Err(SyncError::LastIdxMismatch { batch: evt.batch_num });
        }
        inner.state.checkpoint(evt.batch_num)?;

        batch_data.l2_txs = pool_txs
            .iter()
            .enumerate()
            .map(|(i, tx)| L2Tx {
                from_idx: tx.from_idx,
                to_idx: tx.to_idx,
                token_id: tx.token_id,
                amount: tx.amount.clone(),
                fee: tx.fee,
                nonce: tx.nonce,
                tx_type: tx.tx_type,
                batch_num: Some(evt.batch_num),
                eth_block_num: block.num,
                position: position0 + batch_data.l1_coordinator_txs.len() + i,
            })
            .collect();
        batch_data.created_accounts = out.created_accounts;
        batch_data.exit_tree = out.exit_infos;
        batch_data.batch = Batch {
            batch_num: evt.batch_num,
            eth_block_num: block.num,
            forger_addr: sender,
            collected_fees: out.collected_fees,
            fee_idxs_coordinator: args.fee_idx_coordinator,
            state_root: out.new_state_root,
            exit_root: out.new_exit_root,
            last_idx: out.new_last_idx,
            forge_l1_txs_num,
            slot_num: SlotNum(self.consts.auction.slot_num(block.num)),
        };
        Ok(batch_data)
    }

    fn auction_sync(
        &self,
        inner: &mut Inner,
        block: &Block,
        events: client::AuctionEvents,
        data: &mut BlockData,
    ) {
        for evt in &events.new_bids {
            data.auction.bids.push(Bid {
                slot_num: evt.slot,
                bid_value: evt.bid_amount.clone(),
                bidder: evt.bidder,
                eth_block_num: block.num,
            });
        }
        for evt in &events.set_coordinators {
            data.auction.coordinators.push(Coordinator {
                bidder: evt.bidder,
                forger: evt.forger,
                url: evt.url.clone(),
                eth_block_num: block.num,
            });
        }

        let has_var_updates = !events.new_boot_coordinator.is_empty()
            || !events.new_slot_deadline.is_empty()
            || !events.new_closed_auction_slots.is_empty()
            || !events.new_default_slot_set_bid.is_empty();
        if has_var_updates {
            let mut vars = inner.vars.auction.clone();
            if let Some((addr, url)) = events.new_boot_coordinator.last() {
                vars.boot_coordinator = *addr;
                vars.boot_coordinator_url = url.clone();
            }
            if let Some(deadline) = events.new_slot_deadline.last() {
                vars.slot_deadline = *deadline;
            }
            if let Some(closed) = events.new_closed_auction_slots.last() {
                vars.closed_auction_slots = *closed;
            }
            for (slot_set, bid) in &events.new_default_slot_set_bid {
                if let Some(entry) = vars.default_slot_set_bid.get_mut(*slot_set as usize) {
                    entry.0 = bid.clone();
                }
            }
            vars.eth_block_num = block.num;
            inner.vars.auction = vars.clone();
            data.auction.vars = Some(vars);
        }
    }

    fn wdelayer_sync(
        &self,
        inner: &mut Inner,
        block: &Block,
        events: client::WDelayerEvents,
        data: &mut BlockData,
    ) {
        let to_transfer = |evt: &client::WDelayerEventTransfer| WDelayerTransfer {
            owner: evt.owner,
            token: evt.token,
            amount: evt.amount.clone(),
            tx_hash: evt.tx_hash,
        };
        data.wdelayer.deposits = events.deposits.iter().map(to_transfer).collect();
        data.wdelayer.withdrawals = events.withdraws.iter().map(to_transfer).collect();

        let has_var_updates =
            !events.new_withdrawal_delay.is_empty() || !events.emergency_mode.is_empty();
        if has_var_updates {
            let mut vars = inner.vars.wdelayer.clone();
            if let Some(delay) = events.new_withdrawal_delay.last() {
                vars.withdrawal_delay = *delay;
            }
            if let Some(true) = events.emergency_mode.last() {
                vars.emergency_mode = true;
                vars.emergency_mode_starting_block = block.num;
            }
            vars.eth_block_num = block.num;
            inner.vars.wdelayer = vars.clone();
            data.wdelayer.vars = Some(vars);
        }
    }

    /// Walks the stored chain backwards until a block whose hash matches
    /// the base chain, truncates everything above it, and resets state and
    /// variables to that height.
    async fn handle_reorg(&self, inner: &mut Inner, from: u64) -> Result<u64, SyncError> {
        let mut num = from;
        loop {
            let stored = inner
                .history
                .get_block(num)
                .await?
                .ok_or(SyncError::NoCommonAncestor)?;
            let on_chain = inner.client.eth_block_by_number(num).await?;
            if on_chain.map(|b| b.hash) == Some(stored.hash) {
                tracing::info!(common_ancestor = num, "found last valid block");
                let discarded = inner.history.reorg(num).await?;
                let batch = inner
                    .history
                    .get_last_batch_num()
                    .await?
                    .unwrap_or(rollup_types::BatchNum(0));
                inner.state.reset(batch)?;
                inner.vars = match inner.history.get_sc_vars().await? {
                    Some(vars) => vars,
                    None => inner.initial_vars.clone(),
                };
                self.stats.update(|stats| {
                    stats.sync.last_block = stored;
                    stats.sync.last_batch_num = *batch;
                });
                return Ok(discarded);
            }
            if num == 0 || num <= self.start_block_num {
                return Err(SyncError::NoCommonAncestor);
            }
            num -= 1;
        }
    }

    async fn update_stats(
        &self,
        inner: &mut Inner,
        data: &BlockData,
        head: u64,
    ) -> Result<(), SyncError> {
        let slot = self.current_slot(inner, data.block.num).await?;
        self.stats.update(|stats| {
            stats.eth.last_block_num = head;
            stats.sync.updated = true;
            stats.sync.last_block = data.block.clone();
            if let Some(batch) = data.rollup.batches.last() {
                stats.eth.last_batch_num = *batch.batch.batch_num;
                stats.sync.last_batch_num = *batch.batch.batch_num;
                if batch.batch.forge_l1_txs_num.is_some() {
                    stats.sync.last_forge_l1_txs_num = batch.batch.forge_l1_txs_num;
                }
            }
            stats.sync.current_slot = slot;
        });
        Ok(())
    }

    /// The slot the synced block belongs to, with the forger resolved per
    /// the deadline rule: the best bidder, unless no batch landed before the
    /// slot deadline, in which case the boot coordinator takes over.
    async fn current_slot(&self, inner: &mut Inner, block_num: u64) -> Result<Slot, SyncError> {
        let slot_num = SlotNum(self.consts.auction.slot_num(block_num));
        let from_block = self.consts.auction.slot_from_block(*slot_num);
        let to_block = from_block + self.consts.auction.blocks_per_slot - 1;
        let first_batch_block = inner
            .history
            .get_first_batch_block_num_by_slot(slot_num)
            .await?;
        let mut slot = Slot {
            slot_num,
            from_block,
            to_block,
            boot_coordinator: true,
            forger: inner.vars.auction.boot_coordinator,
            bidder: inner.vars.auction.boot_coordinator,
            url: inner.vars.auction.boot_coordinator_url.clone(),
            bid_value: Default::default(),
            batches_from_block: first_batch_block,
        };
        if let Some(bid) = inner.history.get_best_bid_coordinator(slot_num).await? {
            let deadline = from_block + u64::from(inner.vars.auction.slot_deadline);
            let missed = match first_batch_block {
                Some(first) => first > deadline,
                None => block_num > deadline,
            };
            if !missed {
                slot.boot_coordinator = false;
                slot.forger = bid.forger;
                slot.bidder = bid.bidder;
                slot.url = bid.url;
                slot.bid_value = bid.bid_value;
            }
        }
        Ok(slot)
    }
}

/// Annotates every non-instant withdraw with the earliest delayer deposit of
/// the same base-chain tx.
fn pair_withdrawals(data: &mut BlockData) -> Result<(), SyncError> {
    for withdrawal in &mut data.rollup.withdrawals {
        if withdrawal.instant_withdraw {
            continue;
        }
        let deposit = data
            .wdelayer
            .deposits
            .iter()
            .find(|deposit| deposit.tx_hash == withdrawal.tx_hash)
            .ok_or(SyncError::MissingWDelayerPairing(withdrawal.tx_hash))?;
        withdrawal.owner = Some(deposit.owner);
        withdrawal.token = Some(deposit.token);
    }
    Ok(())
}

fn check_cancel(stop: Option<&watch::Receiver<bool>>) -> Result<(), SyncError> {
    match stop {
        Some(stop) if *stop.borrow() => Err(SyncError::Canceled),
        _ => Ok(()),
    }
}
