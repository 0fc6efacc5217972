//! Configuration schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Inference backends keyed by backend id.
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run timeout applied to contexts created by the CLI.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Base delay between step retries; doubles after each failure.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Attempts made for adapter reads and writes.
    #[serde(default = "default_adapter_retry_attempts")]
    pub adapter_retry_attempts: u32,

    #[serde(default)]
    pub condition_policy: ConditionMode,

    /// Capacity of the execution event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_adapter_retry_attempts() -> u32 {
    1
}

fn default_event_buffer() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            adapter_retry_attempts: default_adapter_retry_attempts(),
            condition_policy: ConditionMode::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// How decision conditions are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    /// Unparseable conditions take the true branch.
    #[default]
    AssumeTrue,
    /// Unparseable conditions fail the step.
    Reject,
}

/// One inference backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKindConfig,

    /// Model warmed up before dependent runs.
    pub model: String,

    /// Overrides the kind's default readiness policy.
    #[serde(default)]
    pub readiness: Option<ReadinessMode>,

    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKindConfig {
    LocalDaemon,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessMode {
    FailFast,
    BestEffort,
}

/// Where audit records and statistics are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the file backend.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolled log files; stderr only when unset.
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
