// Persistence: key-value backends and the typed wallet/trade accessor
pub mod memory;
pub mod redis_store;
#[cfg(test)]
pub(crate) mod scripted;
pub mod store;

use crate::models::Trade;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{keys, Store, HISTORY_CAP};

/// Plain get/set of JSON-encoded values
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Merge this writer's own changes into a freshly read collection.
///
/// Trades in `removed` are dropped and trades in `added` are appended unless
/// an entry with the same id is already present. Everything else in
/// `baseline` is left untouched, so trades opened or closed elsewhere since
/// our last read survive the write. Applying the same deltas twice gives the
/// same result.
pub fn reconcile(baseline: Vec<Trade>, added: &[Trade], removed: &[String]) -> Vec<Trade> {
    let removed: HashSet<&str> = removed.iter().map(String::as_str).collect();

    let mut merged: Vec<Trade> = baseline
        .into_iter()
        .filter(|t| !removed.contains(t.id.as_str()))
        .collect();

    for trade in added {
        if removed.contains(trade.id.as_str()) {
            continue;
        }
        if !merged.iter().any(|t| t.id == trade.id) {
            merged.push(trade.clone());
        }
    }

    merged
}
