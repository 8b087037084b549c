//! STOWAGE - Pooled Key-Value Stores
//!
//! Many independent, durable, ordered key-value stores addressed by name.
//! Stores are opened lazily on first use, cached, and closed again once idle.
//!
//! ## Features
//! - **Pool**: name -> store registry with an idle sweep and keepalive pinning
//! - **Store**: point get/put, batch delete, bounded range scans, export/import, destroy
//! - **Events**: one subscriber per store notified of writes, deletes, imports, destroy
//! - **Engine**: WAL-backed ordered storage with CRC32-checked atomic batches
//! - **Metrics**: lock-free per-store operation counters
//!
//! ## Example
//! ```no_run
//! use stowage::{config::PoolConfig, pool::Pool, types::ListQuery};
//!
//! let pool = Pool::new(PoolConfig::new("./data")).unwrap();
//! let users = pool.store("users");
//!
//! users.put("alice", serde_json::json!({"age": 31})).unwrap();
//! assert!(users.get("alice").unwrap().value.is_some());
//! assert!(users.get("bob").unwrap().value.is_none());
//!
//! let keys = users.list(&ListQuery::new().gte("a").limit(10)).unwrap();
//! assert_eq!(keys.len(), 1);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pool;
pub mod store;
pub mod types;

pub use config::PoolConfig;
pub use error::{StorageError, StoreError};
pub use event::StoreEvent;
pub use pool::{Pool, StoreOptions};
pub use store::Store;
