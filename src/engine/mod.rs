//! STOWAGE - Storage Engine Module
//! The `Engine` trait is everything a `Store` needs from durable storage.
//! `LsmEngine` is the default implementation: a WAL plus an in-memory sorted table.

pub mod memtable;
pub mod wal;

use crate::config::EngineConfig;
use crate::error::{Result, StorageError};
use crate::types::{BatchOp, Key, KeyRange, Value};

use self::memtable::MemTable;
use self::wal::WriteAheadLog;

/// Sorted iteration over an engine, yielding entries or an iteration failure.
pub type Cursor<'a> = Box<dyn Iterator<Item = Result<(Key, Value)>> + 'a>;

/// Durable ordered key-value storage owned by exactly one `Store`.
pub trait Engine: Send {
    /// Acquire the underlying resources. Opening an open engine is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Release the underlying resources. Closing a closed engine is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Close if open, then permanently remove all persisted data.
    fn destroy(&mut self) -> Result<()>;

    /// Point lookup; `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    fn put(&mut self, key: Key, value: Value) -> Result<()> {
        self.batch(vec![BatchOp::Put { key, value }])
    }

    /// Apply every op or none of them.
    fn batch(&mut self, ops: Vec<BatchOp>) -> Result<()>;

    /// Iterate `range` in key order, descending when `reverse` is set.
    fn cursor<'a>(&'a self, range: &KeyRange, reverse: bool) -> Result<Cursor<'a>>;
}

/// Name of the log file inside a store's data directory.
pub const WAL_FILE: &str = "store.wal";

struct OpenState {
    memtable: MemTable,
    wal: WriteAheadLog,
}

/// Default engine: one directory per store holding a write-ahead log,
/// replayed into a MemTable on open and compacted on close.
pub struct LsmEngine {
    config: EngineConfig,
    state: Option<OpenState>,
    destroyed: bool,
}

impl LsmEngine {
    /// Create a closed engine for the configured directory. Nothing touches disk until `open`.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: None,
            destroyed: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the number of live entries, or 0 when closed.
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.memtable.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> Result<&OpenState> {
        if self.destroyed {
            return Err(StorageError::Destroyed);
        }
        self.state.as_ref().ok_or(StorageError::Closed)
    }

    fn state_mut(&mut self) -> Result<&mut OpenState> {
        if self.destroyed {
            return Err(StorageError::Destroyed);
        }
        self.state.as_mut().ok_or(StorageError::Closed)
    }
}

impl Engine for LsmEngine {
    fn open(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(StorageError::Destroyed);
        }
        if self.state.is_some() {
            return Ok(());
        }
        self.config.ensure_dirs()?;

        let wal_path = self.config.data_dir.join(WAL_FILE);
        let recovery = WriteAheadLog::recover(&wal_path)?;
        let wal = WriteAheadLog::open(wal_path, self.config.sync_writes, recovery.records)?;

        log::info!(
            "Engine opened at {:?} ({} entries recovered from {} records)",
            self.config.data_dir,
            recovery.memtable.len(),
            recovery.records
        );

        self.state = Some(OpenState {
            memtable: recovery.memtable,
            wal,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        // A log with more records than live entries carries overwritten or
        // deleted history; rewrite it as a snapshot.
        if state.wal.records() > 1 && state.wal.records() > state.memtable.len() {
            state.wal.compact(&state.memtable)?;
        } else {
            state.wal.sync()?;
        }
        log::debug!("Engine closed at {:?}", self.config.data_dir);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn destroy(&mut self) -> Result<()> {
        // Dropping the handles is enough; there is no point compacting a log about to be deleted.
        self.state = None;
        match std::fs::remove_dir_all(&self.config.data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.destroyed = true;
        log::info!("Engine destroyed at {:?}", self.config.data_dir);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        Ok(self.state()?.memtable.get(key).cloned())
    }

    /// The write path: WAL (disk) -> MemTable (memory).
    fn batch(&mut self, ops: Vec<BatchOp>) -> Result<()> {
        let state = self.state_mut()?;
        state.wal.append_batch(&ops)?;
        state.memtable.apply(ops);
        Ok(())
    }

    fn cursor<'a>(&'a self, range: &KeyRange, reverse: bool) -> Result<Cursor<'a>> {
        let state = self.state()?;
        Ok(Box::new(
            state
                .memtable
                .range(range, reverse)
                .map(|(k, v)| Ok((k.clone(), v.clone()))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListQuery;

    fn engine(dir: &tempfile::TempDir) -> LsmEngine {
        LsmEngine::new(EngineConfig::new(dir.path().join("db")))
    }

    #[test]
    fn test_operations_require_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        assert!(matches!(engine.get(b"k"), Err(StorageError::Closed)));
        assert!(matches!(
            engine.put(b"k".to_vec(), b"v".to_vec()),
            Err(StorageError::Closed)
        ));
        assert!(!dir.path().join("db").exists());
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        engine.open().unwrap();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.open().unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_close_then_reopen_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        engine.open().unwrap();
        for i in 0..5 {
            engine.put(b"same".to_vec(), vec![i]).unwrap();
        }
        engine.close().unwrap();
        engine.close().unwrap();
        assert!(!engine.is_open());

        engine.open().unwrap();
        assert_eq!(engine.get(b"same").unwrap(), Some(vec![4]));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_cursor_reverse_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        engine.open().unwrap();
        engine
            .batch(
                ["a", "b", "c", "d"]
                    .iter()
                    .map(|k| BatchOp::put(k.as_bytes().to_vec(), Vec::new()))
                    .collect(),
            )
            .unwrap();
        let range = ListQuery::new().gte("b").key_range();
        let keys: Vec<Key> = engine
            .cursor(&range, true)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_destroy_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        engine.open().unwrap();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.destroy().unwrap();
        assert!(!dir.path().join("db").exists());
        assert!(matches!(engine.open(), Err(StorageError::Destroyed)));

        let mut fresh = LsmEngine::new(EngineConfig::new(dir.path().join("db")));
        fresh.open().unwrap();
        assert!(fresh.is_empty());
    }
}
