//! Local durable key-value store port, used by the client gauge.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Local store trait - abstraction over client-side durable storage.
///
/// Values are opaque strings; [`LocalStoreExt`] layers typed JSON access on top.
pub trait LocalStore: Send + Sync {
    /// Get a raw value.
    fn get_raw(&self, key: &str) -> Result<Option<String>, LocalStoreError>;

    /// Set a raw value.
    fn set_raw(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), LocalStoreError>;
}

/// Typed get/set over any [`LocalStore`].
pub trait LocalStoreExt: LocalStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LocalStoreError> {
        match self.get_raw(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| LocalStoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), LocalStoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;
        self.set_raw(key, &raw)
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}

/// Local store errors.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}
