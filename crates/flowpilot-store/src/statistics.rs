//! Rolling statistics stores.
//!
//! `record` is a read-modify-write. Both stores hold a lock across the whole
//! sequence so concurrent writers cannot lose updates.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use flowpilot_protocols::audit::{AdapterStatistics, StatisticsStore};
use flowpilot_protocols::error::StoreError;

use crate::file_name;

/// In-memory statistics store.
#[derive(Default)]
pub struct MemoryStatisticsStore {
    stats: Mutex<HashMap<String, AdapterStatistics>>,
}

impl MemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatisticsStore for MemoryStatisticsStore {
    async fn record(
        &self,
        subject_id: &str,
        success: bool,
        duration_ms: f64,
    ) -> Result<AdapterStatistics, StoreError> {
        let mut stats = self.stats.lock().await;
        let entry = stats
            .entry(subject_id.to_string())
            .or_insert_with(|| AdapterStatistics::new(subject_id));
        entry.record(success, duration_ms, Utc::now());
        Ok(entry.clone())
    }

    async fn get(&self, subject_id: &str) -> Result<Option<AdapterStatistics>, StoreError> {
        Ok(self.stats.lock().await.get(subject_id).cloned())
    }
}

/// File system based statistics store, one JSON file per subject:
/// ```text
/// {storage_path}/
/// └── statistics/
///     └── {subject_id}.json
/// ```
pub struct FileStatisticsStore {
    storage_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStatisticsStore {
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        fs::create_dir_all(storage_path.join("statistics")).await?;
        debug!("FileStatisticsStore initialized at {:?}", storage_path);
        Ok(Self {
            storage_path,
            write_lock: Mutex::new(()),
        })
    }

    fn stats_path(&self, subject_id: &str) -> PathBuf {
        self.storage_path.join("statistics").join(file_name(subject_id))
    }

    /// Move an unreadable statistics file out of the way, keeping its content.
    async fn quarantine(&self, subject_id: &str) -> Result<PathBuf, StoreError> {
        let path = self.stats_path(subject_id);
        let mut aside = path.clone().into_os_string();
        aside.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        let aside = PathBuf::from(aside);
        fs::rename(&path, &aside).await?;
        Ok(aside)
    }

    async fn load(&self, subject_id: &str) -> Result<Option<AdapterStatistics>, StoreError> {
        let path = self.stats_path(subject_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StatisticsStore for FileStatisticsStore {
    async fn record(
        &self,
        subject_id: &str,
        success: bool,
        duration_ms: f64,
    ) -> Result<AdapterStatistics, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut stats = match self.load(subject_id).await {
            Ok(Some(stats)) => stats,
            Ok(None) => AdapterStatistics::new(subject_id),
            Err(StoreError::Serialization(e)) => {
                let aside = self.quarantine(subject_id).await?;
                warn!(
                    "Unreadable statistics for '{}' moved to {:?}, starting over: {}",
                    subject_id, aside, e
                );
                AdapterStatistics::new(subject_id)
            }
            Err(e) => return Err(e),
        };
        stats.record(success, duration_ms, Utc::now());
        let content = serde_json::to_string_pretty(&stats)?;
        fs::write(self.stats_path(subject_id), content).await?;
        Ok(stats)
    }

    async fn get(&self, subject_id: &str) -> Result<Option<AdapterStatistics>, StoreError> {
        self.load(subject_id).await
    }
}
