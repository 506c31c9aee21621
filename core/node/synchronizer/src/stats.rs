//! Synchronization statistics, published through a read-locked snapshot so
//! API readers never block (or observe) an in-flight sync.

use std::sync::RwLock;

use rollup_types::{Block, Slot};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EthStats {
    pub last_block_num: u64,
    pub last_batch_num: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSideStats {
    pub updated: bool,
    pub last_block: Block,
    pub last_batch_num: u64,
    pub last_forge_l1_txs_num: Option<u64>,
    pub current_slot: Slot,
}

/// A fully-initialized snapshot of where the chain head and the local sync
/// currently stand.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub eth: EthStats,
    pub sync: SyncSideStats,
}

impl Stats {
    pub fn synced(&self) -> bool {
        self.sync.updated && self.sync.last_block.num >= self.eth.last_block_num
    }
}

#[derive(Debug, Default)]
pub struct StatsHolder {
    inner: RwLock<Stats>,
}

impl StatsHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Stats {
        self.inner.read().expect("stats lock poisoned").clone()
    }

    pub(crate) fn update(&self, update: impl FnOnce(&mut Stats)) {
        let mut stats = self.inner.write().expect("stats lock poisoned");
        update(&mut stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_initialized_and_unsynced() {
        let holder = StatsHolder::new();
        let stats = holder.load();
        assert!(!stats.synced());
        assert_eq!(stats.sync.last_batch_num, 0);
    }

    #[test]
    fn updates_become_visible_atomically() {
        let holder = StatsHolder::new();
        holder.update(|stats| {
            stats.eth.last_block_num = 10;
            stats.sync.last_block.num = 10;
            stats.sync.updated = true;
        });
        assert!(holder.load().synced());
    }
}
