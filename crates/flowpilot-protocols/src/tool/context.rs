//! Tool execution context.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::types::Metadata;

/// Context for a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Execution the invocation belongs to.
    pub execution_id: String,

    /// User on whose behalf the tool runs.
    pub user_id: String,

    /// Session ID for the current session.
    pub session_id: String,

    /// Time budget for this invocation, if any.
    pub timeout: Option<Duration>,

    /// Snapshot of the run's variables at invocation time.
    pub variables: Metadata,

    /// Cancellation signal for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Create a new tool context with a fresh cancellation token.
    pub fn new(execution_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            user_id: user_id.into(),
            session_id: String::new(),
            timeout: None,
            variables: Metadata::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the session ID.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Set the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the variables snapshot.
    pub fn with_variables(mut self, variables: Metadata) -> Self {
        self.variables = variables;
        self
    }

    /// Replace the cancellation signal.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Check if the invocation should stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Get a typed variable from the snapshot.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.variables
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
