//! Inference-backend readiness checks run before an orchestration executes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use flowpilot_core::BackendRegistry;
use flowpilot_protocols::backend::{BackendKind, BackendTarget, InferenceBackend};
use flowpilot_protocols::error::ExecutionError;

/// What to do when a backend cannot be made ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Abort the run with an execution error.
    FailFast,
    /// Log a warning and let the run proceed.
    BestEffort,
}

impl ReadinessPolicy {
    /// Local daemons have no fallback, so they fail fast; remote services
    /// may still answer and are checked on a best-effort basis.
    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::LocalDaemon => Self::FailFast,
            BackendKind::Remote => Self::BestEffort,
        }
    }
}

/// Ensures the backend and model a request depends on are up.
pub struct DependencyReadiness {
    backends: Arc<BackendRegistry>,
    overrides: HashMap<String, ReadinessPolicy>,
}

impl DependencyReadiness {
    pub fn new(backends: Arc<BackendRegistry>) -> Self {
        Self {
            backends,
            overrides: HashMap::new(),
        }
    }

    /// Use `policy` for `backend_id` instead of the kind default.
    pub fn with_policy(mut self, backend_id: impl Into<String>, policy: ReadinessPolicy) -> Self {
        self.overrides.insert(backend_id.into(), policy);
        self
    }

    pub fn policy_for(&self, backend: &dyn InferenceBackend) -> ReadinessPolicy {
        self.overrides
            .get(backend.id())
            .copied()
            .unwrap_or_else(|| ReadinessPolicy::for_kind(backend.kind()))
    }

    /// Start the backend if needed and make sure the model is loaded.
    pub async fn ensure_ready(&self, target: &BackendTarget) -> Result<(), ExecutionError> {
        let Some(backend) = self.backends.get(&target.backend_id) else {
            return Err(ExecutionError::configuration(format!(
                "Inference backend '{}' is not configured",
                target.backend_id
            )));
        };

        let policy = self.policy_for(backend.as_ref());
        match prepare(backend.as_ref(), &target.model_id).await {
            Ok(()) => Ok(()),
            Err(problem) => match policy {
                ReadinessPolicy::FailFast => {
                    error!(backend = %target.backend_id, model = %target.model_id, "{}", problem);
                    Err(ExecutionError::execution(problem))
                }
                ReadinessPolicy::BestEffort => {
                    warn!(
                        backend = %target.backend_id,
                        model = %target.model_id,
                        "{}; continuing without readiness guarantee",
                        problem
                    );
                    Ok(())
                }
            },
        }
    }
}

async fn prepare(backend: &dyn InferenceBackend, model_id: &str) -> Result<(), String> {
    let running = match backend.check_running().await {
        Ok(running) => running,
        Err(e) => {
            debug!(
                backend = %backend.id(),
                error = %e,
                "Readiness probe failed, treating as stopped"
            );
            false
        }
    };

    if !running {
        info!(backend = %backend.id(), "Backend not running, starting it");
        let (started, message) = backend.start().await;
        if !started {
            return Err(format!("Failed to start backend '{}': {}", backend.id(), message));
        }
    }

    let loaded = match backend.list_running_models().await {
        Ok(models) => models.iter().any(|m| m == model_id),
        Err(e) => {
            debug!(backend = %backend.id(), error = %e, "Could not list running models");
            false
        }
    };

    if !loaded {
        info!(backend = %backend.id(), model = %model_id, "Warming up model");
        backend.warm_up_model(model_id).await.map_err(|e| {
            format!(
                "Failed to load model '{}' on backend '{}': {}",
                model_id,
                backend.id(),
                e
            )
        })?;
    }
    Ok(())
}
