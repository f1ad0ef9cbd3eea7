//! File-backed local store.
//!
//! All keys live in one JSON object, e.g.
//! `{"call_history":[1760000000000],"cooldown_until":1760000060000}`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use quota_core::ports::{LocalStore, LocalStoreError};

/// Durable local store that survives process restarts on the same machine.
///
/// A missing or unparsable file reads as empty. Writes go to a sibling temp
/// file first and are renamed into place. Concurrent writers from other
/// processes are last-write-wins.
pub struct FileLocalStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store under `$QUOTA_GAUGE_FILE`, or `quota-gauge.json` in the system temp dir.
    pub fn from_env() -> Self {
        let path = std::env::var("QUOTA_GAUGE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("quota-gauge.json"));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, LocalStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(LocalStoreError::Unavailable(e.to_string())),
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                tracing::debug!(path = %self.path.display(), "Ignoring unreadable gauge file");
                Ok(Map::new())
            }
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), LocalStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LocalStoreError::Unavailable(e.to_string()))?;
        }

        let body = serde_json::to_string(map)
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| LocalStoreError::Unavailable(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| LocalStoreError::Unavailable(e.to_string()))
    }

    fn update<F>(&self, f: F) -> Result<(), LocalStoreError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LocalStoreError::Unavailable("local store lock poisoned".to_string()))?;
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl LocalStore for FileLocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let map = self.read_map()?;
        Ok(map.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        // JSON values are stored inline so the file stays readable; anything else as a string.
        let value = serde_json::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_string())
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}
