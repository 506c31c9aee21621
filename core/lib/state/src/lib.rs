//! The rollup StateDB: the account store plus the Merkle tree committing it,
//! checkpointed per batch over RocksDB.
//!
//! Three flavors exist, differing in what they materialize:
//! - [`StateDbKind::BatchBuilder`] keeps the full tree and hands out update
//!   witnesses for the circuit;
//! - [`StateDbKind::Synchronizer`] keeps the tree (roots must be validated
//!   against forged batches) but no consumer of witnesses;
//! - [`StateDbKind::TxSelector`] mirrors accounts only — tentative mutation
//!   plus `reset` gives the coordinator's selector cheap trial runs.
//!
//! Durability model: account records and tree nodes are written through to
//! the live RocksDB immediately; `checkpoint(batch)` snapshots the whole
//! database under the batch number and `reset(batch)` reopens from such a
//! snapshot, discarding everything newer.

use std::path::PathBuf;

use num_bigint::BigUint;
use rollup_crypto::{CryptoError, Fr};
use rollup_merkle_tree::{Db as _, MemoryDb, MerkleTree, Node, TreeError, TreeUpdate};
use rollup_storage::{rocksdb::WriteBatch, CheckpointedDb, StorageError};
use rollup_types::{Account, Address, BatchNum, BjjPubKey, CodecError, Idx, TokenId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX_ACCOUNT: &[u8] = b"a:";
const PREFIX_IDX_BY_TRIPLE: &[u8] = b"e:";
const PREFIX_IDX_BY_ADDR: &[u8] = b"h:";
const PREFIX_IDX_BY_BJJ: &[u8] = b"b:";
const PREFIX_NODE: &[u8] = b"n:";
const KEY_LAST_IDX: &[u8] = b"m:last_idx";
const KEY_CURRENT_BATCH: &[u8] = b"m:current_batch";
const KEY_ROOT: &[u8] = b"m:root";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("account {0} not found")]
    AccountNotFound(Idx),
    #[error("account with the same (EthAddr, BJJ, TokenID) already exists at {0}")]
    AccountAlreadyExists(Idx),
    #[error("account index space exhausted")]
    IdxOverflow,
    #[error("corrupted state: {0}")]
    CorruptedState(String),
    #[error("checkpoint must advance the batch by one: current {current}, requested {requested}")]
    InvalidCheckpoint { current: BatchNum, requested: BatchNum },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDbKind {
    BatchBuilder,
    Synchronizer,
    TxSelector,
}

impl StateDbKind {
    fn with_tree(self) -> bool {
        !matches!(self, StateDbKind::TxSelector)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDbConfig {
    pub path: PathBuf,
    pub kind: StateDbKind,
    pub n_levels: u32,
}

#[derive(Debug)]
pub struct StateDb {
    store: CheckpointedDb,
    tree: Option<MerkleTree<MemoryDb>>,
    kind: StateDbKind,
    n_levels: u32,
    current_batch: BatchNum,
    last_idx: Idx,
}

impl StateDb {
    pub fn open(config: StateDbConfig) -> Result<Self, StateError> {
        let store = CheckpointedDb::open(&config.path)?;
        let fresh = store.get(KEY_CURRENT_BATCH)?.is_none();
        let mut state = StateDb {
            store,
            tree: None,
            kind: config.kind,
            n_levels: config.n_levels,
            current_batch: BatchNum(0),
            last_idx: Idx(*Idx::USER_START - 1),
        };
        if fresh {
            state.persist_meta()?;
            if !state.store.has_checkpoint(0) {
                state.store.make_checkpoint(0)?;
            }
        }
        state.load()?;
        // Writes that postdate the last committed batch (a crash mid-batch)
        // must not leak into the reopened state.
        if !fresh && state.store.has_checkpoint(*state.current_batch) {
            state.reset(state.current_batch)?;
        }
        tracing::info!(
            kind = ?config.kind,
            batch = %state.current_batch,
            "opened state DB"
        );
        Ok(state)
    }

    /// Reloads metadata and the tree node cache from the live store.
    fn load(&mut self) -> Result<(), StateError> {
        self.current_batch = BatchNum(self.read_meta_u64(KEY_CURRENT_BATCH)?);
        self.last_idx = Idx(self.read_meta_u64(KEY_LAST_IDX)?);
        if self.kind.with_tree() {
            let mut db = MemoryDb::new();
            for (key, value) in self.store.prefix_scan(PREFIX_NODE)? {
                let node = Node::from_bytes(&value).ok_or_else(|| {
                    StateError::CorruptedState(format!("bad node record at {}", hex_key(&key)))
                })?;
                let hash: [u8; 32] = key[PREFIX_NODE.len()..]
                    .try_into()
                    .map_err(|_| StateError::CorruptedState("bad node key".into()))?;
                db.put(hash, node);
            }
            db.drain_dirty();
            let root = match self.store.get(KEY_ROOT)? {
                Some(bytes) => rollup_crypto::fr_from_bytes_le(&bytes)?,
                None => rollup_crypto::fr_zero(),
            };
            self.tree = Some(MerkleTree::with_root(db, self.n_levels, root));
        }
        Ok(())
    }

    fn read_meta_u64(&self, key: &[u8]) -> Result<u64, StateError> {
        match self.store.get(key)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| StateError::CorruptedState("bad meta record".into()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => match key {
                k if k == KEY_LAST_IDX => Ok(*Idx::USER_START - 1),
                _ => Ok(0),
            },
        }
    }

    fn persist_meta(&self) -> Result<(), StateError> {
        self.store
            .put(KEY_CURRENT_BATCH, &self.current_batch.to_be_bytes())?;
        self.store.put(KEY_LAST_IDX, &self.last_idx.to_be_bytes())?;
        if let Some(tree) = &self.tree {
            self.store
                .put(KEY_ROOT, &rollup_crypto::fr_to_biguint(&tree.root()).to_bytes_le())?;
        }
        Ok(())
    }

    pub fn kind(&self) -> StateDbKind {
        self.kind
    }

    pub fn n_levels(&self) -> u32 {
        self.n_levels
    }

    pub fn current_batch(&self) -> BatchNum {
        self.current_batch
    }

    pub fn last_idx(&self) -> Idx {
        self.last_idx
    }

    /// Current state root; zero for the tree-less selector flavor.
    pub fn root(&self) -> Fr {
        self.tree
            .as_ref()
            .map(|t| t.root())
            .unwrap_or_else(rollup_crypto::fr_zero)
    }

    pub fn root_biguint(&self) -> BigUint {
        rollup_crypto::fr_to_biguint(&self.root())
    }

    fn account_key(idx: Idx) -> Vec<u8> {
        let mut key = PREFIX_ACCOUNT.to_vec();
        key.extend_from_slice(&idx.to_be_bytes()[2..]);
        key
    }

    fn triple_key(addr: &Address, bjj: &BjjPubKey, token_id: TokenId) -> Vec<u8> {
        let mut key = PREFIX_IDX_BY_TRIPLE.to_vec();
        key.extend_from_slice(addr.as_bytes());
        key.extend_from_slice(&bjj.0);
        key.extend_from_slice(&token_id.to_be_bytes());
        key
    }

    fn addr_key(addr: &Address, token_id: TokenId) -> Vec<u8> {
        let mut key = PREFIX_IDX_BY_ADDR.to_vec();
        key.extend_from_slice(addr.as_bytes());
        key.extend_from_slice(&token_id.to_be_bytes());
        key
    }

    fn bjj_key(bjj: &BjjPubKey, token_id: TokenId) -> Vec<u8> {
        let mut key = PREFIX_IDX_BY_BJJ.to_vec();
        key.extend_from_slice(&bjj.0);
        key.extend_from_slice(&token_id.to_be_bytes());
        key
    }

    fn read_idx(&self, key: &[u8]) -> Result<Option<Idx>, StateError> {
        match self.store.get(key)? {
            Some(bytes) => {
                let mut be = [0u8; 8];
                let tail: [u8; 6] = bytes
                    .try_into()
                    .map_err(|_| StateError::CorruptedState("bad idx record".into()))?;
                be[2..].copy_from_slice(&tail);
                Ok(Some(Idx(u64::from_be_bytes(be))))
            }
            None => Ok(None),
        }
    }

    pub fn get_account(&self, idx: Idx) -> Result<Account, StateError> {
        match self.store.get(&Self::account_key(idx))? {
            Some(bytes) => Ok(Account::from_bytes(idx, &bytes)?),
            None => Err(StateError::AccountNotFound(idx)),
        }
    }

    pub fn get_idx_by_eth_addr_bjj(
        &self,
        addr: &Address,
        bjj: &BjjPubKey,
        token_id: TokenId,
    ) -> Result<Option<Idx>, StateError> {
        self.read_idx(&Self::triple_key(addr, bjj, token_id))
    }

    /// Lowest account index registered for `(addr, token)`; the resolution
    /// target of `TransferToEthAddr`.
    pub fn get_idx_by_eth_addr(
        &self,
        addr: &Address,
        token_id: TokenId,
    ) -> Result<Option<Idx>, StateError> {
        self.read_idx(&Self::addr_key(addr, token_id))
    }

    /// Lowest account index registered for `(bjj, token)`; the resolution
    /// target of `TransferToBjj` when the destination address is the "any"
    /// marker.
    pub fn get_idx_by_bjj(
        &self,
        bjj: &BjjPubKey,
        token_id: TokenId,
    ) -> Result<Option<Idx>, StateError> {
        self.read_idx(&Self::bjj_key(bjj, token_id))
    }

    /// Creates the account at the next sequential index. Returns the index
    /// and, when a tree is kept, the update witness.
    pub fn create_account(
        &mut self,
        account: &Account,
    ) -> Result<(Idx, Option<TreeUpdate>), StateError> {
        let triple_key = Self::triple_key(&account.eth_addr, &account.bjj, account.token_id);
        if let Some(existing) = self.read_idx(&triple_key)? {
            return Err(StateError::AccountAlreadyExists(existing));
        }
        if self.last_idx >= Idx::MAX {
            return Err(StateError::IdxOverflow);
        }
        let idx = self.last_idx.next();

        let mut stored = account.clone();
        stored.idx = idx;
        let record = stored.to_bytes()?;
        let idx_be = idx.to_be_bytes();
        let idx_bytes = &idx_be[2..];

        self.store.put(&Self::account_key(idx), &record)?;
        self.store.put(&triple_key, idx_bytes)?;
        let addr_key = Self::addr_key(&account.eth_addr, account.token_id);
        if self.store.get(&addr_key)?.is_none() {
            self.store.put(&addr_key, idx_bytes)?;
        }
        let bjj_key = Self::bjj_key(&account.bjj, account.token_id);
        if self.store.get(&bjj_key)?.is_none() {
            self.store.put(&bjj_key, idx_bytes)?;
        }
        self.last_idx = idx;
        self.store.put(KEY_LAST_IDX, &self.last_idx.to_be_bytes())?;

        let update = self.put_leaf(idx, &stored)?;
        Ok((idx, update))
    }

    /// Overwrites the account record at `idx` and recommits its leaf.
    pub fn update_account(
        &mut self,
        idx: Idx,
        account: &Account,
    ) -> Result<Option<TreeUpdate>, StateError> {
        if self.store.get(&Self::account_key(idx))?.is_none() {
            return Err(StateError::AccountNotFound(idx));
        }
        let mut stored = account.clone();
        stored.idx = idx;
        self.store.put(&Self::account_key(idx), &stored.to_bytes()?)?;
        self.put_leaf(idx, &stored)
    }

    fn put_leaf(&mut self, idx: Idx, account: &Account) -> Result<Option<TreeUpdate>, StateError> {
        let Some(tree) = &mut self.tree else {
            return Ok(None);
        };
        let update = tree.put(*idx, account.state_hash()?)?;
        Ok(Some(update))
    }

    /// Commits the in-flight batch under `batch_num` (which must be
    /// `current_batch + 1`) and snapshots the database.
    pub fn checkpoint(&mut self, batch_num: BatchNum) -> Result<(), StateError> {
        if batch_num != self.current_batch.next() {
            return Err(StateError::InvalidCheckpoint {
                current: self.current_batch,
                requested: batch_num,
            });
        }
        self.current_batch = batch_num;

        let mut batch = WriteBatch::default();
        if let Some(tree) = &mut self.tree {
            for (hash, node) in tree.db_mut().drain_dirty() {
                let mut key = PREFIX_NODE.to_vec();
                key.extend_from_slice(&hash);
                batch.put(&key, node.to_bytes());
            }
        }
        self.store.write(batch)?;
        self.persist_meta()?;
        self.store.make_checkpoint(*batch_num)?;
        Ok(())
    }

    /// Rolls the whole state back to the snapshot of `batch_num`.
    pub fn reset(&mut self, batch_num: BatchNum) -> Result<(), StateError> {
        self.store.reset_to_checkpoint(*batch_num)?;
        self.load()?;
        if self.current_batch != batch_num {
            return Err(StateError::CorruptedState(format!(
                "checkpoint {batch_num} carries batch number {}",
                self.current_batch
            )));
        }
        Ok(())
    }
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests;
