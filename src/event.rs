//! STOWAGE - Store Events
//! Mutation and lifecycle notifications delivered to a store's single subscriber.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A change to a store. Serializes with an `event` tag:
/// `write`, `delete`, `importDB` or `deleteDB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StoreEvent {
    #[serde(rename = "write")]
    Write { key: String, timestamp: u64 },

    #[serde(rename = "delete")]
    Delete { keys: Vec<String>, timestamp: u64 },

    #[serde(rename = "importDB")]
    Import { keys: Vec<String>, timestamp: u64 },

    #[serde(rename = "deleteDB")]
    Destroy { timestamp: u64 },
}

impl StoreEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            StoreEvent::Write { timestamp, .. }
            | StoreEvent::Delete { timestamp, .. }
            | StoreEvent::Import { timestamp, .. }
            | StoreEvent::Destroy { timestamp } => *timestamp,
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::Write { .. } => "write",
            StoreEvent::Delete { .. } => "delete",
            StoreEvent::Import { .. } => "importDB",
            StoreEvent::Destroy { .. } => "deleteDB",
        }
    }
}

/// Event callback. Runs synchronously on the thread that performed the mutation.
pub type Subscriber = Arc<dyn Fn(&StoreEvent) + Send + Sync>;
