//! STOWAGE - Core Type Definitions
//! Defines the key, value, batch and query types shared by the engine and stores.

use std::ops::Bound;

use serde::{Deserialize, Serialize};

/// Engine-level key. Keys sort byte-lexicographically.
pub type Key = Vec<u8>;

/// Engine-level value: an encoded payload.
pub type Value = Vec<u8>;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl BatchOp {
    pub fn put(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Key>) -> Self {
        BatchOp::Delete { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Half-open or closed key interval used by engine cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    /// The whole keyspace.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Returns false when no key can satisfy both bounds.
    ///
    /// `BTreeMap::range` panics on such ranges, so cursors check this first.
    pub fn is_satisfiable(&self) -> bool {
        let (lo, lo_inclusive) = match &self.lower {
            Bound::Unbounded => return true,
            Bound::Included(k) => (k, true),
            Bound::Excluded(k) => (k, false),
        };
        let (hi, hi_inclusive) = match &self.upper {
            Bound::Unbounded => return true,
            Bound::Included(k) => (k, true),
            Bound::Excluded(k) => (k, false),
        };
        match lo.cmp(hi) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => lo_inclusive && hi_inclusive,
            std::cmp::Ordering::Greater => false,
        }
    }

    pub fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_slice_bound(&self.lower), as_slice_bound(&self.upper))
    }
}

fn as_slice_bound(bound: &Bound<Key>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Range scan parameters for `Store::list`.
///
/// `gt` takes precedence over `gte`, and `lt` over `lte`, when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub limit: Option<usize>,
    pub reverse: bool,
    pub values: bool,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, key: impl Into<String>) -> Self {
        self.gt = Some(key.into());
        self
    }

    pub fn gte(mut self, key: impl Into<String>) -> Self {
        self.gte = Some(key.into());
        self
    }

    pub fn lt(mut self, key: impl Into<String>) -> Self {
        self.lt = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<String>) -> Self {
        self.lte = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn values(mut self, values: bool) -> Self {
        self.values = values;
        self
    }

    /// Translate the string bounds into an engine key range.
    pub fn key_range(&self) -> KeyRange {
        let lower = match (&self.gt, &self.gte) {
            (Some(k), _) => Bound::Excluded(k.clone().into_bytes()),
            (None, Some(k)) => Bound::Included(k.clone().into_bytes()),
            (None, None) => Bound::Unbounded,
        };
        let upper = match (&self.lt, &self.lte) {
            (Some(k), _) => Bound::Excluded(k.clone().into_bytes()),
            (None, Some(k)) => Bound::Included(k.clone().into_bytes()),
            (None, None) => Bound::Unbounded,
        };
        KeyRange { lower, upper }
    }
}

/// A key paired with its decoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
}

impl Record {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Result of a point lookup. `value` is `None` when the key is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    pub key: String,
    pub value: Option<serde_json::Value>,
}

/// One element of a range scan: a bare key, or a key with its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListItem {
    Key(String),
    Record(Record),
}

impl ListItem {
    pub fn key(&self) -> &str {
        match self {
            ListItem::Key(key) => key,
            ListItem::Record(record) => &record.key,
        }
    }
}
