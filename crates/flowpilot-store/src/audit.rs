//! Audit record stores.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use flowpilot_protocols::audit::{AuditStatus, AuditStore, ExecutionAuditRecord};
use flowpilot_protocols::error::StoreError;

use crate::file_name;

/// In-memory audit store.
pub struct MemoryAuditStore {
    records: RwLock<HashMap<String, ExecutionAuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn create(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.execution_id) {
            return Err(StoreError::AlreadyExists(record.execution_id.clone()));
        }
        records.insert(record.execution_id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.execution_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.execution_id.clone())),
        }
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionAuditRecord>, StoreError> {
        Ok(self.records.read().await.get(execution_id).cloned())
    }
}

/// Lookup order: terminal statuses first, so a leftover `running` copy never
/// shadows the completed record.
const STATUSES: [AuditStatus; 4] = [
    AuditStatus::Completed,
    AuditStatus::Failed,
    AuditStatus::Cancelled,
    AuditStatus::Running,
];

/// File system based audit store.
///
/// Records are stored as individual JSON files organized by status:
/// ```text
/// {storage_path}/
/// └── executions/
///     ├── running/
///     │   └── {execution_id}.json
///     ├── completed/
///     ├── failed/
///     └── cancelled/
/// ```
pub struct FileAuditStore {
    storage_path: PathBuf,
}

impl FileAuditStore {
    /// Create the store, creating all status directories.
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        let store = Self { storage_path };
        for status in STATUSES {
            fs::create_dir_all(store.status_dir(status)).await?;
        }
        debug!("FileAuditStore initialized at {:?}", store.storage_path);
        Ok(store)
    }

    fn status_dir(&self, status: AuditStatus) -> PathBuf {
        self.storage_path.join("executions").join(status.as_str())
    }

    fn record_path(&self, execution_id: &str, status: AuditStatus) -> PathBuf {
        self.status_dir(status).join(file_name(execution_id))
    }

    async fn find_record_file(&self, execution_id: &str) -> Option<(PathBuf, AuditStatus)> {
        for status in STATUSES {
            let path = self.record_path(execution_id, status);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some((path, status));
            }
        }
        None
    }

    async fn write(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.execution_id, record.status);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content).await?;
        debug!("Saved audit record '{}' to {:?}", record.execution_id, path);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn create(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        if self.find_record_file(&record.execution_id).await.is_some() {
            return Err(StoreError::AlreadyExists(record.execution_id.clone()));
        }
        self.write(record).await
    }

    async fn update(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        let Some((old_path, old_status)) = self.find_record_file(&record.execution_id).await
        else {
            return Err(StoreError::NotFound(record.execution_id.clone()));
        };
        self.write(record).await?;
        if old_status != record.status {
            if let Err(e) = fs::remove_file(&old_path).await {
                warn!(
                    execution_id = %record.execution_id,
                    error = %e,
                    "Failed to remove previous audit record at {:?}",
                    old_path
                );
            }
        }
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionAuditRecord>, StoreError> {
        let Some((path, _)) = self.find_record_file(execution_id).await else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
