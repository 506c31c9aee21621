use assert_matches::assert_matches;
use num_bigint::BigUint;
use rollup_types::{Account, Address, BatchNum, BjjPubKey, Idx, Nonce, TokenId};

use super::*;

fn open(kind: StateDbKind) -> (tempfile::TempDir, StateDb) {
    let dir = tempfile::tempdir().unwrap();
    let state = StateDb::open(StateDbConfig {
        path: dir.path().to_owned(),
        kind,
        n_levels: 16,
    })
    .unwrap();
    (dir, state)
}

fn account(tag: u8, token_id: u32) -> Account {
    Account {
        idx: Idx::NULL,
        token_id: TokenId(token_id),
        nonce: Nonce(0),
        balance: BigUint::from(16_000_000u64),
        bjj: BjjPubKey([tag; 32]),
        eth_addr: Address::repeat_byte(tag),
    }
}

#[test]
fn idx_assignment_is_sequential_from_256() {
    let (_dir, mut state) = open(StateDbKind::Synchronizer);
    assert_eq!(state.last_idx(), Idx(255));
    for i in 0..4u8 {
        let (idx, _) = state.create_account(&account(i + 1, 0)).unwrap();
        assert_eq!(idx, Idx(256 + i as u64));
    }
    assert_eq!(state.last_idx(), Idx(259));
}

#[test]
fn duplicate_triple_is_rejected() {
    let (_dir, mut state) = open(StateDbKind::Synchronizer);
    state.create_account(&account(1, 0)).unwrap();
    assert_matches!(
        state.create_account(&account(1, 0)),
        Err(StateError::AccountAlreadyExists(Idx(256)))
    );
    // Same keys under a different token are a different account.
    state.create_account(&account(1, 1)).unwrap();
}

#[test]
fn reverse_lookups_resolve_to_first_account() {
    let (_dir, mut state) = open(StateDbKind::Synchronizer);
    let first = account(1, 0);
    state.create_account(&first).unwrap();
    let mut second = account(1, 0);
    second.bjj = BjjPubKey([9; 32]);
    state.create_account(&second).unwrap();

    let by_triple = state
        .get_idx_by_eth_addr_bjj(&second.eth_addr, &second.bjj, TokenId(0))
        .unwrap();
    assert_eq!(by_triple, Some(Idx(257)));
    // Address-only resolution keeps pointing at the first account.
    let by_addr = state.get_idx_by_eth_addr(&first.eth_addr, TokenId(0)).unwrap();
    assert_eq!(by_addr, Some(Idx(256)));
}

#[test]
fn update_changes_root_and_record() {
    let (_dir, mut state) = open(StateDbKind::BatchBuilder);
    let (idx, update) = state.create_account(&account(1, 0)).unwrap();
    let root_after_create = state.root();
    assert_eq!(update.unwrap().new_root, root_after_create);

    let mut changed = state.get_account(idx).unwrap();
    changed.balance += 5u8;
    changed.nonce = Nonce(1);
    let update = state.update_account(idx, &changed).unwrap().unwrap();
    assert_eq!(update.old_root, root_after_create);
    assert_ne!(update.new_root, root_after_create);
    assert_eq!(state.get_account(idx).unwrap().balance, changed.balance);
}

#[test]
fn missing_account_is_not_found() {
    let (_dir, state) = open(StateDbKind::Synchronizer);
    assert_matches!(
        state.get_account(Idx(256)),
        Err(StateError::AccountNotFound(Idx(256)))
    );
}

#[test]
fn selector_flavor_keeps_no_tree() {
    let (_dir, mut state) = open(StateDbKind::TxSelector);
    let (_, update) = state.create_account(&account(1, 0)).unwrap();
    assert!(update.is_none());
    assert_eq!(state.root_biguint(), BigUint::default());
}

#[test]
fn checkpoint_requires_consecutive_batch() {
    let (_dir, mut state) = open(StateDbKind::Synchronizer);
    assert_matches!(
        state.checkpoint(BatchNum(2)),
        Err(StateError::InvalidCheckpoint { .. })
    );
    state.checkpoint(BatchNum(1)).unwrap();
    assert_eq!(state.current_batch(), BatchNum(1));
}

#[test]
fn reset_restores_accounts_root_and_last_idx() {
    let (_dir, mut state) = open(StateDbKind::BatchBuilder);
    state.create_account(&account(1, 0)).unwrap();
    state.checkpoint(BatchNum(1)).unwrap();
    let root_batch1 = state.root();

    let (idx2, _) = state.create_account(&account(2, 0)).unwrap();
    let mut changed = state.get_account(Idx(256)).unwrap();
    changed.balance = BigUint::from(1u8);
    state.update_account(Idx(256), &changed).unwrap();
    state.checkpoint(BatchNum(2)).unwrap();

    state.reset(BatchNum(1)).unwrap();
    assert_eq!(state.current_batch(), BatchNum(1));
    assert_eq!(state.last_idx(), Idx(256));
    assert_eq!(state.root(), root_batch1);
    assert_eq!(
        state.get_account(Idx(256)).unwrap().balance,
        BigUint::from(16_000_000u64)
    );
    assert_matches!(
        state.get_account(idx2),
        Err(StateError::AccountNotFound(_))
    );
    // The tree is usable after a reset.
    state.create_account(&account(3, 0)).unwrap();
    state.checkpoint(BatchNum(2)).unwrap();
}

#[test]
fn uncommitted_writes_are_discarded_by_reset() {
    let (_dir, mut state) = open(StateDbKind::Synchronizer);
    state.checkpoint(BatchNum(1)).unwrap();
    state.create_account(&account(1, 0)).unwrap();
    state.reset(BatchNum(1)).unwrap();
    assert_eq!(state.last_idx(), Idx(255));
    assert_matches!(
        state.get_account(Idx(256)),
        Err(StateError::AccountNotFound(_))
    );
}

#[test]
fn reopening_preserves_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = StateDbConfig {
        path: dir.path().to_owned(),
        kind: StateDbKind::BatchBuilder,
        n_levels: 16,
    };
    let root = {
        let mut state = StateDb::open(config.clone()).unwrap();
        state.create_account(&account(1, 0)).unwrap();
        state.checkpoint(BatchNum(1)).unwrap();
        state.root()
    };
    let state = StateDb::open(config).unwrap();
    assert_eq!(state.current_batch(), BatchNum(1));
    assert_eq!(state.root(), root);
    assert_eq!(state.get_account(Idx(256)).unwrap().bjj, BjjPubKey([1; 32]));
}
