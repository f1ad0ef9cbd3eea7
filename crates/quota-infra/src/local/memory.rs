//! In-memory local store - state is lost when the process exits.

use std::collections::HashMap;
use std::sync::RwLock;

use quota_core::ports::{LocalStore, LocalStoreError};

/// In-memory local store using a HashMap behind a RwLock.
pub struct InMemoryLocalStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> LocalStoreError {
    LocalStoreError::Unavailable("local store lock poisoned".to_string())
}

impl LocalStore for InMemoryLocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let values = self.values.read().map_err(poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        let mut values = self.values.write().map_err(poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        let mut values = self.values.write().map_err(poisoned)?;
        values.remove(key);
        Ok(())
    }
}
