//! STOWAGE - Store
//! One named, ordered key-value database wrapping exactly one `Engine`.
//!
//! ## Lifecycle
//! ```text
//! Closed --open--> Open --close--> Closed
//! Closed | Open --destroy--> Destroyed (terminal)
//! ```
//! Every data operation opens a closed store implicitly.
//!
//! ## Concurrency
//! Engine calls are serialized by a mutex. The event subscriber is called after
//! that mutex is released, so a subscriber may call back into the store.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::engine::Engine;
use crate::error::{StorageError, StoreError};
use crate::event::{StoreEvent, Subscriber};
use crate::metrics::StoreMetrics;
use crate::types::{now_ms, BatchOp, ListItem, ListQuery, Lookup, Record};

/// Observable lifecycle state of a `Store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Closed,
    Open,
    Destroyed,
}

struct EngineSlot {
    engine: Box<dyn Engine>,
    destroyed: bool,
}

/// A named key-value store. Shared between threads as `Arc<Store>`.
pub struct Store {
    name: String,
    slot: Mutex<EngineSlot>,
    subscriber: RwLock<Option<Subscriber>>,
    metrics: StoreMetrics,
}

impl Store {
    /// Wrap a closed engine. The engine is opened on first use.
    pub fn new(name: impl Into<String>, engine: Box<dyn Engine>) -> Self {
        Self {
            name: name.into(),
            slot: Mutex::new(EngineSlot {
                engine,
                destroyed: false,
            }),
            subscriber: RwLock::new(None),
            metrics: StoreMetrics::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub fn state(&self) -> StoreState {
        let slot = self.lock();
        if slot.destroyed {
            StoreState::Destroyed
        } else if slot.engine.is_open() {
            StoreState::Open
        } else {
            StoreState::Closed
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the engine if it is not open yet.
    fn ensure_open(&self, slot: &mut EngineSlot) -> Result<(), StoreError> {
        if slot.destroyed {
            return Err(StoreError::engine(
                "Database has been destroyed",
                StorageError::Destroyed,
            ));
        }
        if !slot.engine.is_open() {
            slot.engine
                .open()
                .map_err(|e| StoreError::engine("Error opening database", e))?;
            self.metrics.record_open();
        }
        Ok(())
    }

    /// Replace the event subscriber. Only the latest subscriber receives events.
    pub fn on_event<F>(&self, subscriber: F)
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.set_subscriber(Some(std::sync::Arc::new(subscriber)));
    }

    /// Install or clear the subscriber slot.
    pub fn set_subscriber(&self, subscriber: Option<Subscriber>) {
        *self
            .subscriber
            .write()
            .unwrap_or_else(PoisonError::into_inner) = subscriber;
    }

    fn emit(&self, event: &StoreEvent) {
        let subscriber = self
            .subscriber
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(subscriber) = subscriber {
            subscriber(event);
        }
    }

    /// Acquire the engine. A no-op when already open.
    pub fn open(&self) -> Result<(), StoreError> {
        let mut slot = self.lock();
        self.ensure_open(&mut slot)
    }

    /// Release the engine. A no-op when already closed or destroyed.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut slot = self.lock();
        if slot.destroyed || !slot.engine.is_open() {
            return Ok(());
        }
        slot.engine
            .close()
            .map_err(|e| StoreError::engine("Error closing database", e))?;
        self.metrics.record_close();
        Ok(())
    }

    /// Write `value` at `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: serde_json::Value) -> Result<StoreEvent, StoreError> {
        if key.is_empty() {
            return Err(StoreError::validation("A non-empty key is required."));
        }
        let encoded = serde_json::to_vec(&value)
            .map_err(|e| StoreError::write(StorageError::Serialization(e.to_string())))?;
        let value_len = encoded.len();
        {
            let mut slot = self.lock();
            self.ensure_open(&mut slot)?;
            slot.engine
                .put(key.as_bytes().to_vec(), encoded)
                .map_err(StoreError::write)?;
        }
        self.metrics.record_put(key.len(), value_len);

        let event = StoreEvent::Write {
            key: key.to_string(),
            timestamp: now_ms(),
        };
        self.emit(&event);
        Ok(event)
    }

    /// Read the value at `key`. An absent key is a successful lookup with no value.
    pub fn get(&self, key: &str) -> Result<Lookup, StoreError> {
        let raw = {
            let mut slot = self.lock();
            self.ensure_open(&mut slot)?;
            slot.engine.get(key.as_bytes()).map_err(StoreError::read)?
        };
        self.metrics.record_get(raw.as_ref().map(Vec::len));

        let value = match raw {
            Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::read(StorageError::Serialization(format!("key {key:?}: {e}")))
            })?),
            None => None,
        };
        Ok(Lookup {
            key: key.to_string(),
            value,
        })
    }

    /// Delete one or more keys in a single atomic batch.
    pub fn del<K: AsRef<str>>(&self, keys: &[K]) -> Result<StoreEvent, StoreError> {
        if keys.is_empty() || keys.iter().any(|k| k.as_ref().is_empty()) {
            return Err(StoreError::validation(
                "A key or an array of keys is required.",
            ));
        }
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let ops = keys
            .iter()
            .map(|k| BatchOp::delete(k.as_bytes().to_vec()))
            .collect();
        {
            let mut slot = self.lock();
            self.ensure_open(&mut slot)?;
            slot.engine.batch(ops).map_err(StoreError::delete)?;
        }
        self.metrics.record_delete(keys.len());

        let event = StoreEvent::Delete {
            keys,
            timestamp: now_ms(),
        };
        self.emit(&event);
        Ok(event)
    }

    /// Range scan. Yields bare keys, or records when `query.values` is set.
    ///
    /// The scan is all-or-nothing: an iteration failure discards what was collected.
    pub fn list(&self, query: &ListQuery) -> Result<Vec<ListItem>, StoreError> {
        let entries = self.scan(query)?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => ListItem::Record(Record { key, value }),
                None => ListItem::Key(key),
            })
            .collect())
    }

    /// Every record in ascending key order.
    pub fn export_all(&self) -> Result<Vec<Record>, StoreError> {
        let entries = self.scan(&ListQuery::new().values(true))?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| Record {
                key,
                value: value.unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    fn scan(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<(String, Option<serde_json::Value>)>, StoreError> {
        let range = query.key_range();
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut results = Vec::new();
        let mut bytes_read = 0;
        {
            let mut slot = self.lock();
            self.ensure_open(&mut slot)?;
            let cursor = slot
                .engine
                .cursor(&range, query.reverse)
                .map_err(StoreError::scan)?;
            for item in cursor.take(limit) {
                let (raw_key, raw_value) = item.map_err(StoreError::scan)?;
                let key = String::from_utf8(raw_key).map_err(|e| {
                    StoreError::scan(StorageError::Serialization(format!("non UTF-8 key: {e}")))
                })?;
                let value = if query.values {
                    bytes_read += raw_value.len();
                    Some(serde_json::from_slice(&raw_value).map_err(|e| {
                        StoreError::scan(StorageError::Serialization(format!(
                            "key {key:?}: {e}"
                        )))
                    })?)
                } else {
                    None
                };
                results.push((key, value));
            }
        }
        self.metrics.record_scan(bytes_read);
        Ok(results)
    }

    /// Write all records in a single atomic batch.
    pub fn import_all(&self, records: &[Record]) -> Result<StoreEvent, StoreError> {
        if records.is_empty() {
            return Err(StoreError::validation("Database is empty."));
        }
        if records.iter().any(|r| r.key.is_empty()) {
            return Err(StoreError::validation("Every record needs a non-empty key."));
        }
        let mut ops = Vec::with_capacity(records.len());
        let mut bytes = 0;
        for record in records {
            let encoded = serde_json::to_vec(&record.value).map_err(|e| {
                StoreError::import(StorageError::Serialization(format!(
                    "key {:?}: {e}",
                    record.key
                )))
            })?;
            bytes += record.key.len() + encoded.len();
            ops.push(BatchOp::put(record.key.as_bytes().to_vec(), encoded));
        }
        {
            let mut slot = self.lock();
            self.ensure_open(&mut slot)?;
            slot.engine.batch(ops).map_err(StoreError::import)?;
        }
        self.metrics.record_import(records.len(), bytes);

        let event = StoreEvent::Import {
            keys: records.iter().map(|r| r.key.clone()).collect(),
            timestamp: now_ms(),
        };
        self.emit(&event);
        Ok(event)
    }

    /// Close the store and permanently remove its data. The store cannot be used afterwards.
    pub fn destroy(&self) -> Result<StoreEvent, StoreError> {
        {
            let mut slot = self.lock();
            if slot.destroyed {
                return Err(StoreError::engine(
                    "Database has been destroyed",
                    StorageError::Destroyed,
                ));
            }
            slot.engine
                .destroy()
                .map_err(|e| StoreError::engine("Error destroying database", e))?;
            slot.destroyed = true;
        }

        let event = StoreEvent::Destroy {
            timestamp: now_ms(),
        };
        self.emit(&event);
        Ok(event)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
