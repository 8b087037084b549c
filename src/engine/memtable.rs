//! STOWAGE - MemTable (In-Memory Sorted Map)
//! Holds the live contents of an open store; rebuilt from the WAL on open.

use std::collections::BTreeMap;

use crate::types::{BatchOp, Key, KeyRange, Value};

/// In-memory sorted key-value map backed by a BTreeMap.
pub struct MemTable {
    /// Live entries in key order.
    entries: BTreeMap<Key, Value>,
}

impl MemTable {
    /// Create a new, empty MemTable.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the number of entries in the MemTable.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the MemTable is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a key-value pair, replacing any previous value.
    pub fn insert(&mut self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    /// Get a value by key.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    /// Apply a batch in order.
    pub fn apply(&mut self, ops: Vec<BatchOp>) {
        for op in ops {
            match op {
                BatchOp::Put { key, value } => self.insert(key, value),
                BatchOp::Delete { key } => self.delete(&key),
            }
        }
    }

    /// Iterate the entries inside `range`, ascending or descending.
    pub fn range<'a>(
        &'a self,
        range: &KeyRange,
        reverse: bool,
    ) -> Box<dyn Iterator<Item = (&'a Key, &'a Value)> + 'a> {
        if !range.is_satisfiable() {
            return Box::new(std::iter::empty());
        }
        let iter = self.entries.range::<[u8], _>(range.bounds());
        if reverse {
            Box::new(iter.rev())
        } else {
            Box::new(iter)
        }
    }

    /// Returns a reference to the inner BTreeMap for iteration.
    pub fn entries(&self) -> &BTreeMap<Key, Value> {
        &self.entries
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
