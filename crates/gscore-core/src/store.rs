//! Keyed persistence for named configuration blobs.
//!
//! A [`ConfigStore`] maps `(namespace, key)` to an opaque JSON blob. Callers
//! own the blob layout; the store only reads and writes whole values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Persistence backend for configuration blobs.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads the blob stored under `(namespace, key)`.
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Value>>;

    /// Replaces the blob stored under `(namespace, key)`.
    ///
    /// A failed write leaves the previously stored blob in place.
    async fn set(&self, namespace: &str, key: &str, value: Value) -> StoreResult<()>;
}

/// Shared, type-erased store.
pub type BoxedConfigStore = Arc<dyn ConfigStore>;

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store. Contents live as long as the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .entries
            .lock()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Value) -> StoreResult<()> {
        self.entries
            .lock()
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}

// =============================================================================
// JsonFileStore
// =============================================================================

/// Store backed by a single JSON document on disk.
///
/// The document has the shape `{namespace: {key: blob}}`. Every write
/// replaces the whole file through a temporary sibling and a rename, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: tokio::sync::Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    /// Creates a store for the document at `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: tokio::sync::Mutex::new(None),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(Value::Object(map)) => {
                    debug!(path = %self.path.display(), "Loaded configuration document");
                    Ok(map)
                }
                Ok(_) => Err(StoreError::Corrupt(format!(
                    "{}: top level is not an object",
                    self.path.display()
                ))),
                Err(e) => Err(StoreError::Corrupt(format!("{}: {e}", self.path.display()))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Configuration document not found, starting empty");
                Ok(Map::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, document: &Map<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Value>> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard
            .as_ref()
            .and_then(|doc| doc.get(namespace))
            .and_then(|section| section.get(key))
            .cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Value) -> StoreResult<()> {
        let mut guard = self.document.lock().await;
        let mut next = match guard.as_ref() {
            Some(doc) => doc.clone(),
            None => self.load().await?,
        };

        let section = next
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match section {
            Value::Object(entries) => {
                entries.insert(key.to_string(), value);
            }
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "namespace '{namespace}' is not an object"
                )));
            }
        }

        self.persist(&next).await?;
        *guard = Some(next);
        debug!(namespace, key, "Configuration blob written");
        Ok(())
    }
}
