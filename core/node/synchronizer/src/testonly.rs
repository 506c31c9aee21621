//! Test doubles: a scriptable base-chain client and an in-memory history
//! store. The store doubles as the reference implementation of the
//! [`HistoryStore`] transactional semantics.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use rollup_types::{
    AuctionConstants, AuctionVariables, BatchNum, Block, BlockData, Coordinator, L1Tx,
    RollupConstants, RollupVariables, ScVariables, SlotNum, TokenId, WDelayerConstants,
    WDelayerVariables,
};
use rollup_types::{Address, H256};

use crate::{
    client::{
        AuctionEvents, Erc20Consts, EthClient, EthClientError, EthClientResult,
        RollupEvents, RollupForgeBatchArgs, WDelayerEvents,
    },
    history::{BidCoordinator, HistoryStore, HistoryStoreError, HistoryStoreResult},
};

/// Deterministic fake block hash: number plus a fork salt.
pub fn block_hash(num: u64, fork: u64) -> H256 {
    H256::from_low_u64_be(num.wrapping_mul(1000).wrapping_add(fork + 1))
}

#[derive(Debug, Default)]
struct MockChain {
    head: u64,
    blocks: HashMap<u64, Block>,
    rollup_events: HashMap<u64, RollupEvents>,
    auction_events: HashMap<u64, AuctionEvents>,
    wdelayer_events: HashMap<u64, WDelayerEvents>,
    forge_args: HashMap<H256, (RollupForgeBatchArgs, Address)>,
    erc20: HashMap<Address, Erc20Consts>,
    events_hash_override: HashMap<u64, H256>,
    deny_forge: Vec<Address>,
    rollup_constants: Option<RollupConstants>,
    auction_constants: Option<AuctionConstants>,
    chain_id: u16,
}

/// A scriptable [`EthClient`]: tests append blocks (optionally with events)
/// and can rewrite the chain tail to exercise reorg handling.
#[derive(Debug, Clone, Default)]
pub struct MockEthClient {
    inner: Arc<RwLock<MockChain>>,
}

impl MockEthClient {
    pub fn new(chain_id: u16) -> Self {
        let client = Self::default();
        client.inner.write().unwrap().chain_id = chain_id;
        client
    }

    pub fn set_rollup_constants(&self, constants: RollupConstants) {
        self.inner.write().unwrap().rollup_constants = Some(constants);
    }

    pub fn set_auction_constants(&self, constants: AuctionConstants) {
        self.inner.write().unwrap().auction_constants = Some(constants);
    }

    /// Appends the next block, chained onto the current head with the given
    /// fork salt, and returns it.
    pub fn push_block(&self, fork: u64) -> Block {
        let mut chain = self.inner.write().unwrap();
        let num = if chain.blocks.is_empty() { 0 } else { chain.head + 1 };
        let parent_hash = chain
            .blocks
            .get(&num.wrapping_sub(1))
            .map(|parent| parent.hash)
            .unwrap_or_default();
        let block = Block {
            num,
            hash: block_hash(num, fork),
            parent_hash,
            timestamp: 1_700_000_000 + num,
        };
        chain.blocks.insert(num, block.clone());
        chain.head = num;
        block
    }

    /// Drops every block above `num`; a following `push_block` with a new
    /// fork salt produces a competing chain.
    pub fn rewind_to(&self, num: u64) {
        let mut chain = self.inner.write().unwrap();
        chain.blocks.retain(|&n, _| n <= num);
        chain.rollup_events.retain(|&n, _| n <= num);
        chain.auction_events.retain(|&n, _| n <= num);
        chain.wdelayer_events.retain(|&n, _| n <= num);
        chain.events_hash_override.retain(|&n, _| n <= num);
        chain.head = num;
    }

    pub fn set_rollup_events(&self, block_num: u64, events: RollupEvents) {
        self.inner.write().unwrap().rollup_events.insert(block_num, events);
    }

    pub fn set_auction_events(&self, block_num: u64, events: AuctionEvents) {
        self.inner.write().unwrap().auction_events.insert(block_num, events);
    }

    pub fn set_wdelayer_events(&self, block_num: u64, events: WDelayerEvents) {
        self.inner.write().unwrap().wdelayer_events.insert(block_num, events);
    }

    pub fn set_forge_args(&self, tx_hash: H256, args: RollupForgeBatchArgs, sender: Address) {
        self.inner.write().unwrap().forge_args.insert(tx_hash, (args, sender));
    }

    pub fn set_erc20(&self, addr: Address, consts: Erc20Consts) {
        self.inner.write().unwrap().erc20.insert(addr, consts);
    }

    pub fn deny_forge(&self, forger: Address) {
        self.inner.write().unwrap().deny_forge.push(forger);
    }

    /// Tags the block's rollup events with a bogus hash, simulating a reorg
    /// landing between the header fetch and the event fetch.
    pub fn corrupt_rollup_events_hash(&self, block_num: u64) {
        let mut chain = self.inner.write().unwrap();
        chain.rollup_events.entry(block_num).or_default();
        chain.events_hash_override.insert(block_num, block_hash(block_num, 0xdead));
    }
}

#[async_trait::async_trait]
impl EthClient for MockEthClient {
    async fn eth_current_block(&self) -> EthClientResult<u64> {
        Ok(self.inner.read().unwrap().head)
    }

    async fn eth_block_by_number(&self, num: u64) -> EthClientResult<Option<Block>> {
        Ok(self.inner.read().unwrap().blocks.get(&num).cloned())
    }

    async fn eth_erc20_consts(&self, addr: Address) -> EthClientResult<Erc20Consts> {
        self.inner
            .read()
            .unwrap()
            .erc20
            .get(&addr)
            .cloned()
            .ok_or_else(|| EthClientError::Transient("no ERC20 contract".into()))
    }

    async fn chain_id(&self) -> EthClientResult<u16> {
        Ok(self.inner.read().unwrap().chain_id)
    }

    async fn rollup_constants(&self) -> EthClientResult<RollupConstants> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .rollup_constants
            .clone()
            .unwrap_or(RollupConstants {
                contract_addr: Address::repeat_byte(0x70),
                absolute_max_l1_l2_batch_timeout: 240,
                max_l1_user_txs: 128,
                max_tx: 16,
                max_l1_tx: 8,
                max_fee_tx: 2,
                n_levels: 16,
            }))
    }

    async fn auction_constants(&self) -> EthClientResult<AuctionConstants> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .auction_constants
            .clone()
            .unwrap_or(AuctionConstants {
                contract_addr: Address::repeat_byte(0xa0),
                genesis_block_num: 0,
                blocks_per_slot: 40,
                initial_minimal_bidding: 10,
            }))
    }

    async fn wdelayer_constants(&self) -> EthClientResult<WDelayerConstants> {
        Ok(WDelayerConstants {
            contract_addr: Address::repeat_byte(0xd0),
            max_withdrawal_delay: 2 * 7 * 24 * 3600,
            max_emergency_mode_time: 26 * 7 * 24 * 3600,
        })
    }

    async fn rollup_event_init(&self) -> EthClientResult<(RollupVariables, u64)> {
        Ok((
            RollupVariables {
                forge_l1_l2_batch_timeout: 10,
                ..Default::default()
            },
            0,
        ))
    }

    async fn auction_event_init(&self) -> EthClientResult<(AuctionVariables, u64)> {
        Ok((
            AuctionVariables {
                boot_coordinator: Address::repeat_byte(0xbc),
                boot_coordinator_url: "https://boot.coordinator".into(),
                slot_deadline: 20,
                closed_auction_slots: 2,
                open_auction_slots: 4320,
                ..Default::default()
            },
            0,
        ))
    }

    async fn wdelayer_event_init(&self) -> EthClientResult<(WDelayerVariables, u64)> {
        Ok((
            WDelayerVariables {
                withdrawal_delay: 60,
                ..Default::default()
            },
            0,
        ))
    }

    async fn rollup_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(RollupEvents, H256)>> {
        let chain = self.inner.read().unwrap();
        let Some(block) = chain.blocks.get(&num) else {
            return Ok(None);
        };
        let hash = chain
            .events_hash_override
            .get(&num)
            .copied()
            .unwrap_or(block.hash);
        Ok(chain
            .rollup_events
            .get(&num)
            .cloned()
            .map(|events| (events, hash)))
    }

    async fn auction_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(AuctionEvents, H256)>> {
        let chain = self.inner.read().unwrap();
        let Some(block) = chain.blocks.get(&num) else {
            return Ok(None);
        };
        Ok(chain
            .auction_events
            .get(&num)
            .cloned()
            .map(|events| (events, block.hash)))
    }

    async fn wdelayer_events_by_block(
        &self,
        num: u64,
    ) -> EthClientResult<Option<(WDelayerEvents, H256)>> {
        let chain = self.inner.read().unwrap();
        let Some(block) = chain.blocks.get(&num) else {
            return Ok(None);
        };
        Ok(chain
            .wdelayer_events
            .get(&num)
            .cloned()
            .map(|events| (events, block.hash)))
    }

    async fn rollup_forge_batch_args(
        &self,
        tx_hash: H256,
        _l1_user_txs_len: u16,
    ) -> EthClientResult<(RollupForgeBatchArgs, Address)> {
        self.inner
            .read()
            .unwrap()
            .forge_args
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| EthClientError::Malformed(format!("no forge args for {tx_hash:?}")))
    }

    async fn auction_can_forge(&self, forger: Address, _block_num: u64) -> EthClientResult<bool> {
        Ok(!self.inner.read().unwrap().deny_forge.contains(&forger))
    }
}

#[derive(Debug, Default)]
struct MemHistory {
    blocks: Vec<BlockData>,
    coordinators: Vec<Coordinator>,
    initial_vars: Option<ScVariables>,
}

/// In-memory [`HistoryStore`]: blocks are fully visible or absent, reorg
/// truncates strictly above the given height.
#[derive(Debug, Clone, Default)]
pub struct MemHistoryStore {
    inner: Arc<RwLock<MemHistory>>,
}

impl MemHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().unwrap().blocks.len()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemHistoryStore {
    async fn get_last_block(&self) -> HistoryStoreResult<Option<Block>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .last()
            .map(|data| data.block.clone()))
    }

    async fn get_block(&self, num: u64) -> HistoryStoreResult<Option<Block>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .find(|data| data.block.num == num)
            .map(|data| data.block.clone()))
    }

    async fn get_last_batch_num(&self) -> HistoryStoreResult<Option<BatchNum>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .rev()
            .find_map(|data| data.rollup.batches.last().map(|b| b.batch.batch_num)))
    }

    async fn get_last_l1_txs_num(&self) -> HistoryStoreResult<Option<u64>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .flat_map(|data| &data.rollup.batches)
            .filter_map(|batch| batch.batch.forge_l1_txs_num)
            .max())
    }

    async fn get_last_l1_batch_block_num(&self) -> HistoryStoreResult<Option<u64>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .rev()
            .find(|data| {
                data.rollup
                    .batches
                    .iter()
                    .any(|batch| batch.batch.forge_l1_txs_num.is_some())
            })
            .map(|data| data.block.num))
    }

    async fn get_unforged_l1_user_txs(
        &self,
        to_forge_l1_txs_num: u64,
    ) -> HistoryStoreResult<Vec<L1Tx>> {
        let inner = self.inner.read().unwrap();
        let forged = inner
            .blocks
            .iter()
            .flat_map(|data| &data.rollup.batches)
            .any(|batch| batch.batch.forge_l1_txs_num == Some(to_forge_l1_txs_num));
        if forged {
            return Ok(Vec::new());
        }
        Ok(inner
            .blocks
            .iter()
            .flat_map(|data| &data.rollup.l1_user_txs)
            .filter(|tx| tx.to_forge_l1_txs_num == Some(to_forge_l1_txs_num))
            .cloned()
            .collect())
    }

    async fn get_first_batch_block_num_by_slot(
        &self,
        slot_num: SlotNum,
    ) -> HistoryStoreResult<Option<u64>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .find(|data| {
                data.rollup
                    .batches
                    .iter()
                    .any(|batch| batch.batch.slot_num == slot_num)
            })
            .map(|data| data.block.num))
    }

    async fn get_sc_vars(&self) -> HistoryStoreResult<Option<ScVariables>> {
        let inner = self.inner.read().unwrap();
        let Some(initial) = &inner.initial_vars else {
            return Ok(None);
        };
        let mut vars = initial.clone();
        for data in &inner.blocks {
            if let Some(rollup) = &data.rollup.vars {
                vars.rollup = rollup.clone();
            }
            if let Some(auction) = &data.auction.vars {
                vars.auction = auction.clone();
            }
            if let Some(wdelayer) = &data.wdelayer.vars {
                vars.wdelayer = wdelayer.clone();
            }
        }
        Ok(Some(vars))
    }

    async fn get_best_bid_coordinator(
        &self,
        slot_num: SlotNum,
    ) -> HistoryStoreResult<Option<BidCoordinator>> {
        let inner = self.inner.read().unwrap();
        let best = inner
            .blocks
            .iter()
            .flat_map(|data| &data.auction.bids)
            .filter(|bid| bid.slot_num == slot_num)
            .max_by_key(|bid| bid.bid_value.clone());
        let Some(bid) = best else {
            return Ok(None);
        };
        let coordinator = inner
            .coordinators
            .iter()
            .rev()
            .find(|c| c.bidder == bid.bidder)
            .ok_or_else(|| {
                HistoryStoreError::Corrupted(format!(
                    "bid from unregistered coordinator {:?}",
                    bid.bidder
                ))
            })?;
        Ok(Some(BidCoordinator {
            slot_num,
            bid_value: bid.bid_value.clone(),
            bidder: bid.bidder,
            forger: coordinator.forger,
            url: coordinator.url.clone(),
        }))
    }

    async fn get_last_token_id(&self) -> HistoryStoreResult<Option<TokenId>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .blocks
            .iter()
            .flat_map(|data| &data.rollup.added_tokens)
            .map(|token| token.token_id)
            .max())
    }

    async fn set_initial_sc_vars(&self, vars: &ScVariables) -> HistoryStoreResult<()> {
        self.inner.write().unwrap().initial_vars = Some(vars.clone());
        Ok(())
    }

    async fn add_block_sc_data(&self, data: &BlockData) -> HistoryStoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(last) = inner.blocks.last() {
            if data.block.num != last.block.num + 1 {
                return Err(HistoryStoreError::Corrupted(format!(
                    "non-consecutive block {} after {}",
                    data.block.num, last.block.num
                )));
            }
        }
        inner.blocks.push(data.clone());
        Ok(())
    }

    async fn add_coordinators(&self, coordinators: &[Coordinator]) -> HistoryStoreResult<()> {
        self.inner
            .write()
            .unwrap()
            .coordinators
            .extend_from_slice(coordinators);
        Ok(())
    }

    async fn reorg(&self, last_valid_block: u64) -> HistoryStoreResult<u64> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.blocks.len();
        inner.blocks.retain(|data| data.block.num <= last_valid_block);
        Ok((before - inner.blocks.len()) as u64)
    }
}
