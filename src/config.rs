//! STOWAGE - Configuration
//! Tunable parameters for the pool and for each store's engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StorageError};

/// Default idle-sweep interval (and idle threshold).
pub const DEFAULT_MANAGER_INTERVAL: Duration = Duration::from_millis(10_000);

/// Configuration for a `Pool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Directory under which each store gets its own subdirectory.
    pub root_path: PathBuf,

    /// Sweep period. A store idle for at least this long is closed on the next sweep.
    pub manager_interval: Duration,

    /// Whether engines fsync every WAL append.
    pub sync_writes: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("./data"),
            manager_interval: DEFAULT_MANAGER_INTERVAL,
            sync_writes: true,
        }
    }
}

impl PoolConfig {
    /// Create a new PoolConfig with a custom root directory.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }

    /// Set the sweep interval in milliseconds.
    pub fn with_manager_interval(mut self, millis: u64) -> Self {
        self.manager_interval = Duration::from_millis(millis);
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Read `STOWAGE_ROOT` and `STOWAGE_MANAGER_INTERVAL_MS` over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("STOWAGE_ROOT") {
            Ok(root) if !root.is_empty() => Self::new(root),
            _ => Self::default(),
        };
        if let Ok(raw) = std::env::var("STOWAGE_MANAGER_INTERVAL_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                StorageError::Config(format!("STOWAGE_MANAGER_INTERVAL_MS={raw:?}: {e}"))
            })?;
            config = config.with_manager_interval(millis);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.manager_interval.is_zero() {
            return Err(StorageError::Config(
                "manager interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Ensure the root directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root_path)
    }

    /// Engine configuration for the store called `name`.
    pub fn engine_config(&self, name: &str) -> EngineConfig {
        EngineConfig {
            data_dir: self.root_path.join(name),
            sync_writes: self.sync_writes,
        }
    }
}

/// Configuration for a single `LsmEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding this store's files. Removed entirely on destroy.
    pub data_dir: PathBuf,

    /// Whether to sync WAL writes to disk immediately (fsync).
    pub sync_writes: bool,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_writes: true,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
