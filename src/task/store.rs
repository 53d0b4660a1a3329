//! Persistence of finished task records.
//!
//! The JSON store keeps every record in a single object keyed by task id.
//! Concurrent writers inside one process are serialised by a mutex; across
//! processes the semantics are last-writer-wins.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::StoreError;

use super::record::{TaskId, TaskRecord};

/// Storage backend for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a record.
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Fetch a record, `None` if unknown.
    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;
}

// =============================================================================
// JSON File Store
// =============================================================================

/// Flat JSON file of `{ "<task_id>": { ...record } }`.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, TaskRecord>, StoreError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&contents).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn write_all(&self, records: &BTreeMap<String, TaskRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        // Write-then-rename so readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let mut records = self.read_all().await?;
        records.insert(record.task_id.to_string(), record.clone());
        self.write_all(&records).await?;

        debug!(task_id = %record.task_id, path = %self.path.display(), "Saved task record");
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        Ok(records.remove(&task_id.to_string()))
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Non-persistent store, for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.task_id, record.clone());
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.read().await.get(task_id).cloned())
    }
}
