//! In-memory counter store - used when no shared backend is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use quota_core::domain::{CounterKey, QuotaCounter};
use quota_core::ports::{CasOutcome, CounterStore, CounterStoreError, CounterWrite};

/// In-memory counter store using a HashMap behind an async RwLock.
///
/// Compare-and-swap runs entirely under the write lock.
/// Note: Counters are per-process and lost on restart.
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<CounterKey, QuotaCounter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Number of buckets currently held.
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn load(
        &self,
        keys: &[CounterKey],
    ) -> Result<Vec<Option<QuotaCounter>>, CounterStoreError> {
        let counters = self.counters.read().await;
        Ok(keys.iter().map(|k| counters.get(k).cloned()).collect())
    }

    async fn compare_and_swap(
        &self,
        writes: &[CounterWrite],
    ) -> Result<CasOutcome, CounterStoreError> {
        let mut counters = self.counters.write().await;

        let stale = writes
            .iter()
            .any(|w| counters.get(&w.counter.key).map(|c| c.count) != w.expected);
        if stale {
            return Ok(CasOutcome::Conflict);
        }

        for write in writes {
            counters.insert(write.counter.key.clone(), write.counter.clone());
        }

        Ok(CasOutcome::Committed)
    }
}
