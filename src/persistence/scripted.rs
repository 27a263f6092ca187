use super::{KeyValueStore, MemoryStore};
use crate::{BotError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Another writer's value, written once `reads_left` reads of `key` have happened
struct Injection {
    key: String,
    reads_left: usize,
    value: String,
}

/// Memory store with scripted misbehaviour: failing writes, foreign writes
/// landing between our read and our write, and reads that yield to the
/// scheduler so concurrent callers interleave.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    inner: MemoryStore,
    failing_sets: Mutex<HashMap<String, usize>>,
    injections: Mutex<Vec<Injection>>,
    yield_on_get: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn yielding() -> Self {
        Self {
            yield_on_get: true,
            ..Self::default()
        }
    }

    /// The next `count` writes to `key` fail
    pub fn fail_next_sets(&self, key: &str, count: usize) {
        self.failing_sets
            .lock()
            .unwrap()
            .insert(key.to_string(), count);
    }

    /// Overwrite `key` with `value` right after its `reads`-th read from now
    pub fn inject_after_reads(&self, key: &str, reads: usize, value: String) {
        self.injections.lock().unwrap().push(Injection {
            key: key.to_string(),
            reads_left: reads,
            value,
        });
    }
}

#[async_trait]
impl KeyValueStore for ScriptedStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.yield_on_get {
            tokio::task::yield_now().await;
        }
        let value = self.inner.get(key).await?;

        let due: Vec<String> = {
            let mut injections = self.injections.lock().unwrap();
            let mut due = Vec::new();
            injections.retain_mut(|injection| {
                if injection.key != key {
                    return true;
                }
                injection.reads_left = injection.reads_left.saturating_sub(1);
                if injection.reads_left == 0 {
                    due.push(injection.value.clone());
                    false
                } else {
                    true
                }
            });
            due
        };
        for foreign in due {
            self.inner.set(key, foreign).await?;
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        {
            let mut failing = self.failing_sets.lock().unwrap();
            if let Some(left) = failing.get_mut(key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(BotError::StoreTimeout(format!("write to {} failed", key)));
                }
            }
        }
        self.inner.set(key, value).await
    }
}
