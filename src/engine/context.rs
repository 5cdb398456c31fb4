//! Shared run context for inter-node data passing
//!
//! One attribute bag per node id, created lazily on first write and never
//! removed during a run. The context is the single piece of mutable state
//! shared across concurrent branches; by convention a process function only
//! writes to its own slot, which keeps sibling branches from racing on keys.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

type Slots = HashMap<String, Map<String, Value>>;

/// The per-run key/value store shared by all branches.
///
/// Cloning is cheap and yields a handle to the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    inner: Arc<RwLock<Slots>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one key into `node_id`'s slot, creating the slot if absent.
    pub async fn set(&self, node_id: &str, key: &str, value: Value) {
        let mut slots = self.inner.write().await;
        slots
            .entry(node_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// The full attribute bag for `node_id`, if it has ever been written.
    pub async fn get(&self, node_id: &str) -> Option<Map<String, Value>> {
        self.inner.read().await.get(node_id).cloned()
    }

    /// One value out of `node_id`'s slot.
    pub async fn get_value(&self, node_id: &str, key: &str) -> Option<Value> {
        self.inner
            .read()
            .await
            .get(node_id)
            .and_then(|slot| slot.get(key))
            .cloned()
    }

    /// Copy of the whole context, for template rendering and diagnostics.
    pub async fn snapshot(&self) -> Slots {
        self.inner.read().await.clone()
    }
}
