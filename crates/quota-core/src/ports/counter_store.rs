//! Counter store port - keyed quota buckets with atomic compare-and-swap.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::{CounterKey, QuotaCounter};

/// A conditional write of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterWrite {
    /// Count the store must still hold; `None` means the counter must still be absent.
    pub expected: Option<u64>,
    /// Value to store when every expectation in the batch holds.
    pub counter: QuotaCounter,
}

/// Outcome of a compare-and-swap batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed,
    /// Another writer got there first. Nothing was written.
    Conflict,
}

/// Counter store trait - abstraction over transactional counter backends.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current state of each key, in order. Missing counters are `None`.
    async fn load(
        &self,
        keys: &[CounterKey],
    ) -> Result<Vec<Option<QuotaCounter>>, CounterStoreError>;

    /// Apply every write or none of them.
    async fn compare_and_swap(
        &self,
        writes: &[CounterWrite],
    ) -> Result<CasOutcome, CounterStoreError>;
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}
