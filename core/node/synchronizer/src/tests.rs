use num_bigint::BigUint;
use rollup_state::{StateDb, StateDbConfig, StateDbKind};
use rollup_tx_processor::{TxProcessor, TxProcessorConfig};
use rollup_types::{Address, BatchNum, BjjPubKey, H256, Idx, L1Tx, TokenId, TxType};

use super::*;
use crate::{
    client::{
        RollupEventAddToken, RollupEventForgeBatch, RollupEventL1UserTx, RollupEventWithdraw,
        RollupEvents, RollupForgeBatchArgs, WDelayerEventTransfer, WDelayerEvents,
    },
    testonly::{MemHistoryStore, MockEthClient},
};

fn forger() -> Address {
    Address::repeat_byte(0x0f)
}

fn processor_config() -> TxProcessorConfig {
    TxProcessorConfig {
        n_levels: 16,
        max_tx: 16,
        max_l1_tx: 8,
        max_fee_tx: 2,
        chain_id: 0,
    }
}

struct TestNode {
    sync: Synchronizer,
    client: MockEthClient,
    history: MemHistoryStore,
    /// Plays the forger: computes the state commitments that go into the
    /// mocked forge call data.
    shadow: StateDb,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

impl TestNode {
    async fn new() -> Self {
        let client = MockEthClient::new(0);
        let history = MemHistoryStore::new();
        let state_dir = tempfile::tempdir().unwrap();
        let shadow_dir = tempfile::tempdir().unwrap();
        let state = StateDb::open(StateDbConfig {
            path: state_dir.path().to_owned(),
            kind: StateDbKind::Synchronizer,
            n_levels: 16,
        })
        .unwrap();
        let shadow = StateDb::open(StateDbConfig {
            path: shadow_dir.path().to_owned(),
            kind: StateDbKind::Synchronizer,
            n_levels: 16,
        })
        .unwrap();
        let sync = Synchronizer::new(
            Box::new(client.clone()),
            Box::new(history.clone()),
            state,
            SyncConfig { start_block_num: 0, poll_interval_ms: 10 },
        )
        .await
        .unwrap();
        TestNode {
            sync,
            client,
            history,
            shadow,
            _dirs: (state_dir, shadow_dir),
        }
    }

    /// Forges a batch on the shadow state and returns call-data args whose
    /// commitments the synchronizer's replay must reproduce.
    fn forge_args(
        &mut self,
        l1_batch: bool,
        l1_user_txs: &[L1Tx],
        l1_coordinator_txs: Vec<L1Tx>,
        l2_txs: Vec<rollup_types::L2Tx>,
        fee_idx_coordinator: Vec<Idx>,
    ) -> RollupForgeBatchArgs {
        let mut pool_txs: Vec<_> = l2_txs
            .iter()
            .cloned()
            .map(rollup_types::L2Tx::into_pool_tx)
            .collect();
        let mut processor = TxProcessor::new(&mut self.shadow, processor_config());
        let out = processor
            .process_txs(
                &fee_idx_coordinator,
                l1_user_txs,
                &l1_coordinator_txs,
                &mut pool_txs,
            )
            .unwrap();
        self.shadow.checkpoint(out.batch_num).unwrap();
        RollupForgeBatchArgs {
            l1_batch,
            l1_coordinator_txs,
            l2_txs_data: l2_txs,
            fee_idx_coordinator,
            new_last_idx: *out.new_last_idx,
            new_st_root: out.new_state_root,
            new_exit_root: out.new_exit_root,
        }
    }

    async fn sync_one(&self) -> SyncOutcome {
        self.sync.sync_next_block(None).await.unwrap()
    }
}

fn create_deposit_tx(tag: u8, token: u32, deposit: u64) -> L1Tx {
    L1Tx {
        from_idx: Idx::NULL,
        to_idx: Idx::NULL,
        token_id: TokenId(token),
        amount: BigUint::default(),
        deposit_amount: BigUint::from(deposit),
        from_bjj: BjjPubKey([tag; 32]),
        from_eth_addr: Address::repeat_byte(tag),
        tx_type: TxType::CreateAccountDeposit,
        position: 0,
        to_forge_l1_txs_num: None,
        user_origin: true,
        batch_num: None,
        eth_block_num: 0,
    }
}

fn user_tx_event(tx: L1Tx, queue: u64, position: usize) -> RollupEventL1UserTx {
    RollupEventL1UserTx { l1_tx: tx, to_forge_l1_txs_num: queue, position }
}

fn forge_event(batch_num: u64, salt: u64) -> RollupEventForgeBatch {
    RollupEventForgeBatch {
        batch_num: BatchNum(batch_num),
        eth_tx_hash: H256::from_low_u64_be(0xf000 + salt),
        l1_user_txs_len: 0,
    }
}

#[tokio::test]
async fn idle_when_chain_has_no_blocks() {
    let node = TestNode::new().await;
    assert!(matches!(node.sync_one().await, SyncOutcome::Idle));
    assert_eq!(node.history.block_count(), 0);
}

#[tokio::test]
async fn syncs_blocks_one_at_a_time() {
    let node = TestNode::new().await;
    for _ in 0..3 {
        node.client.push_block(1);
    }
    for expected in 0..3u64 {
        let SyncOutcome::Synced(data) = node.sync_one().await else {
            panic!("expected a synced block");
        };
        assert_eq!(data.block.num, expected);
    }
    assert!(matches!(node.sync_one().await, SyncOutcome::Idle));
    assert_eq!(node.history.block_count(), 3);

    let stats = node.sync.stats();
    assert!(stats.synced());
    assert_eq!(stats.sync.last_block.num, 2);
}

#[tokio::test]
async fn replays_forged_batch_and_persists_it() {
    let mut node = TestNode::new().await;

    // Block 0: two users queue deposits into queue 0.
    node.client.push_block(1);
    let deposits = vec![create_deposit_tx(1, 0, 16_000_000), create_deposit_tx(2, 0, 16_000_000)];
    node.client.set_rollup_events(
        0,
        RollupEvents {
            l1_user_txs: vec![
                user_tx_event(deposits[0].clone(), 0, 0),
                user_tx_event(deposits[1].clone(), 0, 1),
            ],
            ..Default::default()
        },
    );
    node.sync_one().await;

    // Block 1: an L1 batch consumes queue 0.
    node.client.push_block(1);
    let evt = forge_event(1, 1);
    let queue: Vec<L1Tx> = deposits
        .iter()
        .cloned()
        .enumerate()
        .map(|(position, mut tx)| {
            tx.to_forge_l1_txs_num = Some(0);
            tx.position = position;
            tx
        })
        .collect();
    let args = node.forge_args(true, &queue, vec![], vec![], vec![]);
    let expected_root = args.new_st_root.clone();
    node.client.set_forge_args(evt.eth_tx_hash, args, forger());
    node.client.set_rollup_events(
        1,
        RollupEvents { forge_batches: vec![evt], ..Default::default() },
    );

    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    let batch = &data.rollup.batches[0];
    assert_eq!(batch.batch.batch_num, BatchNum(1));
    assert_eq!(batch.batch.state_root, expected_root);
    assert_eq!(batch.batch.forge_l1_txs_num, Some(0));
    assert_eq!(batch.batch.last_idx, Idx(257));
    assert_eq!(batch.created_accounts.len(), 2);
    assert_eq!(batch.l1_user_txs.len(), 2);

    let stats = node.sync.stats();
    assert_eq!(stats.sync.last_batch_num, 1);
    assert_eq!(stats.sync.last_forge_l1_txs_num, Some(0));
    assert_eq!(
        node.history.get_last_batch_num().await.unwrap(),
        Some(BatchNum(1))
    );
}

#[tokio::test]
async fn two_l1_batches_in_one_block_use_the_in_block_queue() {
    let mut node = TestNode::new().await;
    node.client.push_block(1);

    // Queue 0 is filled and frozen within this very block; queue 1 freezes
    // empty.
    let deposit = create_deposit_tx(3, 0, 1_000_000);
    let evt1 = forge_event(1, 1);
    let evt2 = forge_event(2, 2);
    let mut queued = deposit.clone();
    queued.to_forge_l1_txs_num = Some(0);
    queued.position = 0;
    let args1 = node.forge_args(true, &[queued.clone()], vec![], vec![], vec![]);
    let args2 = node.forge_args(true, &[], vec![], vec![], vec![]);
    node.client.set_forge_args(evt1.eth_tx_hash, args1, forger());
    node.client.set_forge_args(evt2.eth_tx_hash, args2, forger());
    node.client.set_rollup_events(
        0,
        RollupEvents {
            l1_user_txs: vec![user_tx_event(deposit, 0, 0)],
            forge_batches: vec![evt1, evt2],
            ..Default::default()
        },
    );

    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    assert_eq!(data.rollup.batches.len(), 2);
    assert_eq!(data.rollup.batches[0].l1_user_txs.len(), 1);
    assert_eq!(data.rollup.batches[0].batch.forge_l1_txs_num, Some(0));
    assert!(data.rollup.batches[1].l1_user_txs.is_empty());
    assert_eq!(data.rollup.batches[1].batch.forge_l1_txs_num, Some(1));
}

#[tokio::test]
async fn reorg_truncates_resets_and_replays_to_the_same_root() {
    let mut node = TestNode::new().await;

    // Block 0 queues a deposit; block 1 forges it; block 2 is empty.
    node.client.push_block(1);
    let deposit = create_deposit_tx(1, 0, 16_000_000);
    node.client.set_rollup_events(
        0,
        RollupEvents {
            l1_user_txs: vec![user_tx_event(deposit.clone(), 0, 0)],
            ..Default::default()
        },
    );
    node.client.push_block(1);
    let evt = forge_event(1, 1);
    let mut queued = deposit;
    queued.to_forge_l1_txs_num = Some(0);
    let args = node.forge_args(true, &[queued.clone()], vec![], vec![], vec![]);
    node.client.set_forge_args(evt.eth_tx_hash, args.clone(), forger());
    node.client.set_rollup_events(
        1,
        RollupEvents { forge_batches: vec![evt.clone()], ..Default::default() },
    );
    node.client.push_block(1);
    for _ in 0..3 {
        node.sync_one().await;
    }
    let root_before = args.new_st_root.clone();

    // The chain rewrites blocks 1 and 2: the batch now lands in block 2.
    node.client.rewind_to(0);
    node.client.push_block(7);
    node.client.push_block(7);
    let evt2 = forge_event(1, 9);
    node.client.set_forge_args(evt2.eth_tx_hash, args, forger());
    node.client.set_rollup_events(
        2,
        RollupEvents { forge_batches: vec![evt2], ..Default::default() },
    );
    node.client.push_block(7);

    let SyncOutcome::Reorg { discarded } = node.sync_one().await else {
        panic!("expected a reorg");
    };
    assert_eq!(discarded, 2);
    assert_eq!(node.history.block_count(), 1);
    assert_eq!(node.history.get_last_batch_num().await.unwrap(), None);

    // Resyncing the new chain reproduces the same state commitment.
    let mut forged_root = None;
    for _ in 0..3 {
        if let SyncOutcome::Synced(data) = node.sync_one().await {
            if let Some(batch) = data.rollup.batches.last() {
                forged_root = Some(batch.batch.state_root.clone());
            }
        }
    }
    assert_eq!(node.history.block_count(), 4);
    assert_eq!(
        node.history.get_last_batch_num().await.unwrap(),
        Some(BatchNum(1))
    );
    assert_eq!(forged_root, Some(root_before));
    assert_eq!(node.sync.stats().sync.last_batch_num, 1);
}

#[tokio::test]
async fn event_stream_hash_mismatch_aborts_the_block() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    node.client.corrupt_rollup_events_hash(0);

    let err = node.sync.sync_next_block(None).await.unwrap_err();
    assert!(matches!(err, SyncError::BlockHashMismatch { block: 0 }));
    assert_eq!(node.history.block_count(), 0);
}

#[tokio::test]
async fn token_registration_probes_and_truncates_erc20_metadata() {
    let node = TestNode::new().await;
    node.client.push_block(1);

    let good = Address::repeat_byte(0xaa);
    let bad = Address::repeat_byte(0xbb);
    node.client.set_erc20(
        good,
        Erc20Consts {
            name: "A very long token name that keeps going".into(),
            symbol: "LONGSYMBOL123".into(),
            decimals: 18,
        },
    );
    node.client.set_rollup_events(
        0,
        RollupEvents {
            add_tokens: vec![
                RollupEventAddToken { token_addr: good, token_id: TokenId(1) },
                RollupEventAddToken { token_addr: bad, token_id: TokenId(2) },
            ],
            ..Default::default()
        },
    );

    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    let tokens = &data.rollup.added_tokens;
    assert_eq!(tokens[0].name, "A very long token na");
    assert_eq!(tokens[0].symbol, "LONGSYMBOL");
    assert_eq!(tokens[0].decimals, 18);
    assert_eq!(tokens[1].name, "ERC20_ETH_ERROR");
    assert_eq!(tokens[1].symbol, "ERROR");
    assert_eq!(tokens[1].decimals, 1);
    assert_eq!(
        node.history.get_last_token_id().await.unwrap(),
        Some(TokenId(2))
    );
}

#[tokio::test]
async fn unregistered_token_is_a_protocol_violation() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    node.client.set_rollup_events(
        0,
        RollupEvents {
            l1_user_txs: vec![user_tx_event(create_deposit_tx(1, 5, 100), 0, 0)],
            ..Default::default()
        },
    );
    let err = node.sync.sync_next_block(None).await.unwrap_err();
    assert!(matches!(err, SyncError::TokenNotRegistered(TokenId(5))));
    assert_eq!(node.history.block_count(), 0);
}

#[tokio::test]
async fn withdrawals_pair_with_delayer_deposits() {
    let node = TestNode::new().await;
    node.client.push_block(1);

    let tx_hash = H256::from_low_u64_be(0x77);
    let owner = Address::repeat_byte(0x11);
    let token = Address::repeat_byte(0x22);
    node.client.set_rollup_events(
        0,
        RollupEvents {
            withdraws: vec![RollupEventWithdraw {
                idx: Idx(256),
                num_exit_root: BatchNum(1),
                amount: BigUint::from(500u32),
                instant_withdraw: false,
                tx_hash,
            }],
            ..Default::default()
        },
    );
    node.client.set_wdelayer_events(
        0,
        WDelayerEvents {
            deposits: vec![WDelayerEventTransfer {
                owner,
                token,
                amount: BigUint::from(500u32),
                tx_hash,
            }],
            ..Default::default()
        },
    );

    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    let withdrawal = &data.rollup.withdrawals[0];
    assert_eq!(withdrawal.owner, Some(owner));
    assert_eq!(withdrawal.token, Some(token));
}

#[tokio::test]
async fn unpaired_withdrawal_is_fatal() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    node.client.set_rollup_events(
        0,
        RollupEvents {
            withdraws: vec![RollupEventWithdraw {
                idx: Idx(256),
                num_exit_root: BatchNum(1),
                amount: BigUint::from(500u32),
                instant_withdraw: false,
                tx_hash: H256::from_low_u64_be(0x88),
            }],
            ..Default::default()
        },
    );
    let err = node.sync.sync_next_block(None).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingWDelayerPairing(_)));
}

#[tokio::test]
async fn denied_forger_is_a_protocol_violation() {
    let mut node = TestNode::new().await;
    node.client.push_block(1);
    node.client.deny_forge(forger());

    let evt = forge_event(1, 1);
    let args = node.forge_args(false, &[], vec![], vec![], vec![]);
    node.client.set_forge_args(evt.eth_tx_hash, args, forger());
    node.client.set_rollup_events(
        0,
        RollupEvents { forge_batches: vec![evt], ..Default::default() },
    );

    let err = node.sync.sync_next_block(None).await.unwrap_err();
    assert!(matches!(err, SyncError::CanForgeDenied { .. }));
    assert_eq!(node.history.block_count(), 0);
}

#[tokio::test]
async fn cancellation_aborts_before_any_mutation() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    let (stop_sender, stop_receiver) = tokio::sync::watch::channel(true);

    let err = node
        .sync
        .sync_next_block(Some(&stop_receiver))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Canceled));
    assert_eq!(node.history.block_count(), 0);
    drop(stop_sender);
}

#[tokio::test]
async fn variable_changes_produce_snapshots() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    node.client.set_rollup_events(
        0,
        RollupEvents {
            update_forge_l1_l2_batch_timeout: vec![55],
            ..Default::default()
        },
    );
    node.client.push_block(1);

    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    let vars = data.rollup.vars.as_ref().expect("snapshot emitted");
    assert_eq!(vars.forge_l1_l2_batch_timeout, 55);
    assert_eq!(node.sync.sc_vars().await.rollup.forge_l1_l2_batch_timeout, 55);

    // No variable events: no snapshot.
    let SyncOutcome::Synced(data) = node.sync_one().await else {
        panic!("expected a synced block");
    };
    assert!(data.rollup.vars.is_none());
}

#[tokio::test]
async fn run_loop_stops_on_signal() {
    let node = TestNode::new().await;
    node.client.push_block(1);
    let (stop_sender, stop_receiver) = tokio::sync::watch::channel(false);
    stop_sender.send(true).unwrap();
    node.sync
        .run(stop_receiver, std::time::Duration::from_millis(5))
        .await
        .unwrap();
}
