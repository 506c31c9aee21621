//! RocksDB wrapper with checkpoint-by-batch-number.
//!
//! The live database sits in `<base>/current`; every committed batch takes a
//! RocksDB checkpoint into `<base>/checkpoints/<batch_num>`. Resetting
//! rebuilds `current` from a checkpoint directory and discards all newer
//! checkpoints, which is exactly the rollback primitive the StateDB needs
//! for batch atomicity and reorg recovery.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rocksdb::{checkpoint::Checkpoint, Direction, IteratorMode, Options, WriteBatch, DB};
use thiserror::Error;

pub use rocksdb;

const CURRENT_DIR: &str = "current";
const CHECKPOINTS_DIR: &str = "checkpoints";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no checkpoint for batch {0}")]
    CheckpointNotFound(u64),
    #[error("checkpoint for batch {0} already exists")]
    CheckpointExists(u64),
}

/// A RocksDB instance plus its checkpoint directory.
#[derive(Debug)]
pub struct CheckpointedDb {
    base: PathBuf,
    // `None` only transiently while the live DB is being swapped in `reset`.
    db: Option<DB>,
}

impl CheckpointedDb {
    pub fn open(base: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(base.join(CHECKPOINTS_DIR))?;
        let db = DB::open(&Self::options(), base.join(CURRENT_DIR))?;
        Ok(CheckpointedDb {
            base: base.to_owned(),
            db: Some(db),
        })
    }

    fn options() -> Options {
        let mut options = Options::default();
        options.create_if_missing(true);
        options
    }

    fn db(&self) -> &DB {
        self.db.as_ref().expect("live DB is open")
    }

    fn checkpoint_path(&self, batch_num: u64) -> PathBuf {
        self.base.join(CHECKPOINTS_DIR).join(batch_num.to_string())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db().get(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Ok(self.db().put(key, value)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        Ok(self.db().delete(key)?)
    }

    pub fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        Ok(self.db().write(batch)?)
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    pub fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut out = Vec::new();
        let iter = self
            .db()
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.into_vec(), value.into_vec()));
        }
        Ok(out)
    }

    /// Flushes and snapshots the live DB under the given batch number.
    pub fn make_checkpoint(&self, batch_num: u64) -> Result<(), StorageError> {
        let path = self.checkpoint_path(batch_num);
        if path.exists() {
            return Err(StorageError::CheckpointExists(batch_num));
        }
        self.db().flush()?;
        Checkpoint::new(self.db())?.create_checkpoint(&path)?;
        tracing::debug!("created state checkpoint for batch {batch_num}");
        Ok(())
    }

    pub fn has_checkpoint(&self, batch_num: u64) -> bool {
        self.checkpoint_path(batch_num).exists()
    }

    /// Highest checkpointed batch number, if any.
    pub fn last_checkpoint(&self) -> Result<Option<u64>, StorageError> {
        Ok(self.checkpoint_numbers()?.into_iter().max())
    }

    fn checkpoint_numbers(&self) -> Result<Vec<u64>, StorageError> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(self.base.join(CHECKPOINTS_DIR))? {
            let entry = entry?;
            if let Some(num) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                numbers.push(num);
            }
        }
        Ok(numbers)
    }

    /// Replaces the live DB with the checkpoint of `batch_num` and deletes
    /// every newer checkpoint.
    pub fn reset_to_checkpoint(&mut self, batch_num: u64) -> Result<(), StorageError> {
        let checkpoint = self.checkpoint_path(batch_num);
        if !checkpoint.exists() {
            return Err(StorageError::CheckpointNotFound(batch_num));
        }
        let current = self.base.join(CURRENT_DIR);

        // Materialize a fresh copy of the checkpoint before touching the
        // live DB, so a failure leaves the current state intact.
        let staging = self.base.join("current.reset");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        {
            let source = DB::open_for_read_only(&Options::default(), &checkpoint, false)?;
            Checkpoint::new(&source)?.create_checkpoint(&staging)?;
        }

        self.db = None;
        fs::remove_dir_all(&current)?;
        fs::rename(&staging, &current)?;
        self.db = Some(DB::open(&Self::options(), &current)?);

        for num in self.checkpoint_numbers()? {
            if num > batch_num {
                fs::remove_dir_all(self.checkpoint_path(num))?;
            }
        }
        tracing::info!("state storage reset to batch {batch_num}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, CheckpointedDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = CheckpointedDb::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn get_put_round_trip() {
        let (_dir, db) = open();
        assert_eq!(db.get(b"k").unwrap(), None);
        db.put(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
        db.delete(b"k").unwrap();
        assert_eq!(db.get(b"k").unwrap(), None);
    }

    #[test]
    fn prefix_scan_is_bounded() {
        let (_dir, db) = open();
        db.put(b"a:1", b"1").unwrap();
        db.put(b"a:2", b"2").unwrap();
        db.put(b"b:1", b"3").unwrap();
        let scanned = db.prefix_scan(b"a:").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, b"a:1");
    }

    #[test]
    fn reset_restores_checkpointed_state() {
        let (_dir, mut db) = open();
        db.put(b"k", b"batch1").unwrap();
        db.make_checkpoint(1).unwrap();
        db.put(b"k", b"batch2").unwrap();
        db.make_checkpoint(2).unwrap();
        db.put(b"k", b"uncommitted").unwrap();

        db.reset_to_checkpoint(1).unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"batch1".to_vec()));
        // Newer checkpoints are gone; the restored one survives.
        assert!(!db.has_checkpoint(2));
        assert!(db.has_checkpoint(1));
        assert_eq!(db.last_checkpoint().unwrap(), Some(1));
    }

    #[test]
    fn duplicate_checkpoint_is_rejected() {
        let (_dir, db) = open();
        db.make_checkpoint(1).unwrap();
        assert!(matches!(
            db.make_checkpoint(1),
            Err(StorageError::CheckpointExists(1))
        ));
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let (_dir, mut db) = open();
        assert!(matches!(
            db.reset_to_checkpoint(9),
            Err(StorageError::CheckpointNotFound(9))
        ));
    }
}
