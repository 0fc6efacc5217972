//! Per-run execution context.
//!
//! One `ExecutionContext` exists per workflow or orchestration run. Components
//! holding a shared reference append logs and breadcrumbs, read and write
//! variables, and raise tool events; the context is discarded when the run
//! ends and only a snapshot of its variables and transcript is persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use flowpilot_protocols::types::{LogLevel, Metadata};

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One line of the run transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Timestamped progress marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub data: serde_json::Value,
    /// Time since the previous breadcrumb, zero for the first.
    pub since_previous: Duration,
}

/// Sub-operation notifications raised while a run invokes tools.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    Started {
        tool_id: String,
        tool_name: String,
        parameters: serde_json::Value,
        at: DateTime<Utc>,
    },
    Completed {
        tool_id: String,
        tool_name: String,
        success: bool,
        duration: Duration,
        parameters: serde_json::Value,
        result: serde_json::Value,
        error: Option<String>,
        at: DateTime<Utc>,
    },
}

impl ToolEvent {
    pub fn tool_id(&self) -> &str {
        match self {
            Self::Started { tool_id, .. } | Self::Completed { tool_id, .. } => tool_id,
        }
    }
}

/// Receiver of [`ToolEvent`]s.
pub trait ToolEventListener: Send + Sync {
    fn on_tool_event(&self, event: &ToolEvent);
}

impl<F> ToolEventListener for F
where
    F: Fn(&ToolEvent) + Send + Sync,
{
    fn on_tool_event(&self, event: &ToolEvent) {
        self(event)
    }
}

/// Handle returned by [`ExecutionContext::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Serializable overview of a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub execution_id: String,
    pub user_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub log_count: usize,
    pub breadcrumb_count: usize,
    pub variable_count: usize,
    pub last_breadcrumb: Option<String>,
}

#[derive(Default)]
struct BreadcrumbTrail {
    items: Vec<Breadcrumb>,
    last_at: Option<Instant>,
}

/// Per-run mutable state.
pub struct ExecutionContext {
    execution_id: String,
    user_id: String,
    session_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    timeout: Option<Duration>,
    variables: RwLock<Metadata>,
    metadata: RwLock<Metadata>,
    logs: Mutex<Vec<LogEntry>>,
    breadcrumbs: Mutex<BreadcrumbTrail>,
    should_continue: AtomicBool,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ToolEventListener>)>>,
    next_listener: AtomicU64,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id and the default timeout.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            started_at: Utc::now(),
            clock: Instant::now(),
            timeout: Some(DEFAULT_TIMEOUT),
            variables: RwLock::new(Metadata::new()),
            metadata: RwLock::new(Metadata::new()),
            logs: Mutex::new(Vec::new()),
            breadcrumbs: Mutex::new(BreadcrumbTrail::default()),
            should_continue: AtomicBool::new(true),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove the time budget entirely.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_variables(self, variables: Metadata) -> Self {
        self.variables.write().extend(variables);
        self
    }

    /// A fresh context for a sub-run: new execution id, same user, session
    /// and timeout, copies of variables and metadata.
    pub fn child(&self) -> Self {
        let mut child = Self::new(self.user_id.clone(), self.session_id.clone());
        child.timeout = self.timeout;
        *child.variables.get_mut() = self.variables.read().clone();
        *child.metadata.get_mut() = self.metadata.read().clone();
        child
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// True once the run has exceeded its time budget.
    pub fn is_timed_out(&self) -> bool {
        self.timeout.is_some_and(|t| self.elapsed() > t)
    }

    /// Remaining time budget, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout.map(|t| t.saturating_sub(self.elapsed()))
    }

    // ---- logs -------------------------------------------------------------

    pub fn add_log(&self, message: impl Into<String>, level: LogLevel) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        self.logs.lock().push(entry.clone());
        entry
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().clone()
    }

    pub fn last_log(&self) -> Option<LogEntry> {
        self.logs.lock().last().cloned()
    }

    /// Newline-joined transcript of every log entry.
    pub fn transcript(&self) -> String {
        self.logs
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ---- breadcrumbs ------------------------------------------------------

    pub fn add_breadcrumb(&self, label: impl Into<String>, data: serde_json::Value) {
        let label = label.into();
        let now = Instant::now();
        let mut trail = self.breadcrumbs.lock();
        let since_previous = trail
            .last_at
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        trail.last_at = Some(now);
        debug!(execution_id = %self.execution_id, "[Breadcrumb] {}", label);
        trail.items.push(Breadcrumb {
            timestamp: Utc::now(),
            label,
            data,
            since_previous,
        });
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs.lock().items.clone()
    }

    // ---- variables --------------------------------------------------------

    pub fn set_variable<T: Serialize>(&self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.variables.write().insert(key.into(), v);
        }
    }

    pub fn get_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.variables.read().get(key).cloned()
    }

    /// Typed read; `None` when missing or of another type.
    pub fn get_variable_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_variable(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Typed read falling back to `default` when missing or of another type.
    pub fn get_variable_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_variable_as(key).unwrap_or(default)
    }

    pub fn has_variable(&self, key: &str) -> bool {
        self.variables.read().contains_key(key)
    }

    pub fn variables(&self) -> Metadata {
        self.variables.read().clone()
    }

    // ---- metadata ---------------------------------------------------------

    pub fn set_metadata<T: Serialize>(&self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.write().insert(key.into(), v);
        }
    }

    pub fn get_metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.metadata.read().get(key).cloned()
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata.read().clone()
    }

    // ---- continuation -----------------------------------------------------

    pub fn should_continue(&self) -> bool {
        self.should_continue.load(Ordering::Acquire)
    }

    /// Ask the run to stop before its next step.
    pub fn stop(&self) {
        self.should_continue.store(false, Ordering::Release);
    }

    // ---- tool events ------------------------------------------------------

    pub fn subscribe(&self, listener: Arc<dyn ToolEventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn emit_tool_event(&self, event: ToolEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_tool_event(&event);
        }
    }

    pub fn summary(&self) -> ContextSummary {
        let trail = self.breadcrumbs.lock();
        ContextSummary {
            execution_id: self.execution_id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            elapsed_ms: self.elapsed().as_millis() as u64,
            timed_out: self.is_timed_out(),
            log_count: self.logs.lock().len(),
            breadcrumb_count: trail.items.len(),
            variable_count: self.variables.read().len(),
            last_breadcrumb: trail.items.last().map(|b| b.label.clone()),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("started_at", &self.started_at)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
