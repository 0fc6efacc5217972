//! Engine assembly: registries, stores and runtime components built from
//! configuration, plus the built-in registration table.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use flowpilot_config::{
    BackendKindConfig, ConditionMode, Config, ConfigLoader, ReadinessMode, StorageBackend,
};
use flowpilot_core::{
    AdapterRegistry, BackendRegistry, BroadcastEventSink, RetryPolicy, ToolRegistry,
};
use flowpilot_monitor::{MetricsRegistry, PipelineMetrics};
use flowpilot_protocols::adapter::Adapter;
use flowpilot_protocols::audit::{AuditStore, StatisticsStore};
use flowpilot_protocols::backend::BackendKind;
use flowpilot_protocols::error::RegistryError;
use flowpilot_protocols::tool::Tool;
use flowpilot_runtime::{
    AdapterExecutionPort, ConditionPolicy, DependencyReadiness, ExecutionPipeline, ReadinessPolicy,
    RegistryToolExecutor, StepDispatcher, WorkflowExecutor,
};
use flowpilot_store::{FileAuditStore, FileStatisticsStore, MemoryAuditStore, MemoryStatisticsStore};

use crate::builtins::{DelayTool, EchoTool, JsonFileAdapter, ProbeBackend};

/// Built-in tools, in registration order.
fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(EchoTool::new()), Arc::new(DelayTool::new())]
}

/// Built-in adapters, in registration order.
fn builtin_adapters() -> Vec<Arc<dyn Adapter>> {
    vec![Arc::new(JsonFileAdapter::new())]
}

/// Everything a command needs, wired from one [`Config`].
pub(crate) struct Engine {
    pub config: Config,
    pub tools: Arc<ToolRegistry>,
    pub adapters: Arc<AdapterRegistry>,
    pub backends: Arc<BackendRegistry>,
    pub audit: Arc<dyn AuditStore>,
    pub statistics: Arc<dyn StatisticsStore>,
    pub events: Arc<BroadcastEventSink>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let tools = Arc::new(ToolRegistry::new());
        tools
            .initialize_with(|registry| register_all(builtin_tools(), |t| registry.register(t)))
            .context("Failed to register built-in tools")?;

        let adapters = Arc::new(AdapterRegistry::new());
        adapters
            .initialize_with(|registry| register_all(builtin_adapters(), |a| registry.register(a)))
            .context("Failed to register built-in adapters")?;

        let backends = Arc::new(BackendRegistry::new());
        for (id, backend) in &config.backends {
            let Some(base_url) = backend.base_url.as_deref() else {
                warn!(
                    backend = %id,
                    "Backend has no base_url, skipping readiness probe registration"
                );
                continue;
            };
            let probe = ProbeBackend::new(id.clone(), backend_kind(backend.kind), base_url);
            backends
                .register(Arc::new(probe))
                .with_context(|| format!("Failed to register backend '{}'", id))?;
        }

        let (audit, statistics) = stores(&config).await?;
        let events = Arc::new(BroadcastEventSink::new(config.engine.event_buffer));

        info!(
            tools = tools.len(),
            adapters = adapters.len(),
            backends = config.backends.len(),
            "Engine assembled"
        );

        Ok(Self {
            config,
            tools,
            adapters,
            backends,
            audit,
            statistics,
            events,
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.config.engine.timeout_seconds)
    }

    pub fn executor(&self) -> WorkflowExecutor {
        let tools = Arc::new(RegistryToolExecutor::new(self.tools.clone()));
        let dispatcher = StepDispatcher::new(tools)
            .with_retry_base_delay(Duration::from_millis(self.config.engine.retry_base_delay_ms))
            .with_condition_policy(condition_policy(self.config.engine.condition_policy));
        WorkflowExecutor::new(dispatcher, self.audit.clone())
            .with_statistics(self.statistics.clone())
            .with_events(self.events.clone())
    }

    pub async fn pipeline(&self) -> ExecutionPipeline {
        let mut readiness = DependencyReadiness::new(self.backends.clone());
        for (id, backend) in &self.config.backends {
            if let Some(mode) = backend.readiness {
                readiness = readiness.with_policy(id.clone(), readiness_policy(mode));
            }
        }
        ExecutionPipeline::new()
            .with_readiness(Arc::new(readiness))
            .with_metrics(Arc::new(PipelineMetrics::new(self.metrics.clone()).await))
    }

    pub fn adapter_port(&self) -> AdapterExecutionPort {
        let retry = RetryPolicy::new(
            self.config.engine.adapter_retry_attempts,
            Duration::from_millis(self.config.engine.retry_base_delay_ms),
        );
        let statistics = self.statistics.clone();
        AdapterExecutionPort::new(self.adapters.clone(), self.audit.clone(), statistics)
            .with_retry(retry)
    }
}

fn register_all<T: ?Sized>(
    items: Vec<Arc<T>>,
    mut register: impl FnMut(Arc<T>) -> Result<(), RegistryError>,
) -> Result<(), RegistryError> {
    for item in items {
        register(item)?;
    }
    Ok(())
}

async fn stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn AuditStore>, Arc<dyn StatisticsStore>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            debug!("Using in-memory audit and statistics stores");
            Ok((Arc::new(MemoryAuditStore::new()), Arc::new(MemoryStatisticsStore::new())))
        }
        StorageBackend::File => {
            let root = config
                .storage
                .path
                .as_deref()
                .map(|p| PathBuf::from(ConfigLoader::expand_path(p)))
                .context("storage.path is required for the file backend")?;
            let audit = FileAuditStore::new(&root)
                .await
                .with_context(|| format!("Failed to open audit store at {}", root.display()))?;
            let statistics = FileStatisticsStore::new(&root)
                .await
                .with_context(|| format!("Failed to open statistics store at {}", root.display()))?;
            info!("Using file stores at {}", root.display());
            Ok((Arc::new(audit), Arc::new(statistics)))
        }
    }
}

fn condition_policy(mode: ConditionMode) -> ConditionPolicy {
    match mode {
        ConditionMode::AssumeTrue => ConditionPolicy::AssumeTrue,
        ConditionMode::Reject => ConditionPolicy::Reject,
    }
}

fn readiness_policy(mode: ReadinessMode) -> ReadinessPolicy {
    match mode {
        ReadinessMode::FailFast => ReadinessPolicy::FailFast,
        ReadinessMode::BestEffort => ReadinessPolicy::BestEffort,
    }
}

fn backend_kind(kind: BackendKindConfig) -> BackendKind {
    match kind {
        BackendKindConfig::LocalDaemon => BackendKind::LocalDaemon,
        BackendKindConfig::Remote => BackendKind::Remote,
    }
}
