//! FlowPilot - workflow and orchestration execution engine.
//!
//! Main entry point for the FlowPilot CLI.

mod builtins;
mod cli;
mod register;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use flowpilot_config::{ConfigLoader, ConfigValidator, LoggingConfig};
use flowpilot_core::{ExecutionContext, SessionCancellations, ToolEvent};
use flowpilot_protocols::backend::BackendTarget;
use flowpilot_protocols::events::ExecutionEvent;
use flowpilot_protocols::types::ConfigMap;
use flowpilot_protocols::workflow::WorkflowDefinition;
use flowpilot_runtime::{
    WorkflowOrchestration, WorkflowRequest, WorkflowRunRequest, build_execution_order,
};

use cli::{Cli, Commands, parse_pair};
use register::Engine;

/// Session key of the single run a CLI process drives.
const CLI_SESSION: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let _guard = init_tracing(&config.logging)?;

    let report = ConfigValidator::validate(&config);
    for warning in &report.warnings {
        warn!("Config warning at {}: {}", warning.path, warning.message);
    }
    if !report.is_valid() {
        for err in &report.errors {
            error!("Config error at {}: {}", err.path, err.message);
        }
        bail!("Configuration is invalid ({} errors)", report.errors.len());
    }

    let succeeded = match cli.command {
        Commands::Validate { file } => validate_definition(&file).await?,
        Commands::Run {
            file,
            params,
            workflow_id,
            project_id,
            backend,
            user,
            metrics,
        } => {
            let engine = Engine::build(config).await?;
            let mut run = WorkflowRunRequest::new().with_initiator(user);
            if let Some(id) = workflow_id {
                run = run.with_workflow_id(id);
            }
            if let Some(id) = project_id {
                run = run.with_project_id(id);
            }
            for pair in &params {
                let (key, value) = parse_pair(pair).map_err(anyhow::Error::msg)?;
                run = run.with_parameter(key, value);
            }
            let succeeded = run_workflow(&engine, &file, run, backend.as_deref()).await?;
            if metrics {
                print!("{}", engine.metrics.export().await);
            }
            succeeded
        }
        Commands::Status { execution_id } => {
            let engine = Engine::build(config).await?;
            show_status(&engine, &execution_id).await?
        }
        Commands::Adapter {
            adapter_id,
            settings,
            write,
        } => {
            let engine = Engine::build(config).await?;
            run_adapter(&engine, &adapter_id, &settings, write.as_deref()).await?
        }
    };

    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Console logging to stderr plus an optional daily-rotated file.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    let (file_layer, guard) = match logging.directory.as_deref() {
        Some(dir) => {
            let dir = ConfigLoader::expand_path(dir);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("flowpilot")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let text_layer = (!logging.json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(true)
    });
    let json_layer = logging
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

async fn read_definition(file: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    WorkflowDefinition::from_json(&content)
        .with_context(|| format!("Failed to parse workflow definition {}", file.display()))
}

async fn validate_definition(file: &Path) -> anyhow::Result<bool> {
    let definition = read_definition(file).await?;
    let report = definition.validate();

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for err in &report.errors {
        println!("error: {}", err);
    }
    if !report.is_valid() {
        println!("Workflow '{}' is invalid", definition.name);
        return Ok(false);
    }

    let order = build_execution_order(&definition);
    println!("Workflow '{}' is valid", definition.name);
    println!("Execution order: {}", order.join(" -> "));
    Ok(true)
}

async fn run_workflow(
    engine: &Engine,
    file: &Path,
    run: WorkflowRunRequest,
    backend: Option<&str>,
) -> anyhow::Result<bool> {
    let definition = read_definition(file).await?;
    let mut request = WorkflowRequest::new(definition, run);
    if let Some(id) = backend {
        let Some(config) = engine.config.backends.get(id) else {
            bail!("Backend '{}' is not configured", id);
        };
        request = request.with_backend(BackendTarget::new(id, config.model.clone()));
    }

    let ctx = ExecutionContext::new(
        request.run.initiated_by.clone().unwrap_or_else(|| CLI_SESSION.to_string()),
        CLI_SESSION,
    )
    .with_timeout(engine.run_timeout());
    ctx.subscribe(Arc::new(|event: &ToolEvent| match event {
        ToolEvent::Started { tool_id, .. } => debug!(tool = %tool_id, "Tool started"),
        ToolEvent::Completed {
            tool_id,
            success,
            duration,
            error,
            ..
        } => info!(tool = %tool_id, success, ?duration, error = ?error, "Tool completed"),
    }));

    let sessions = Arc::new(SessionCancellations::new());
    let handle = sessions.register(CLI_SESSION);
    let interrupt = {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                sessions.stop(CLI_SESSION);
            }
        })
    };
    let events = forward_events(engine);

    let orchestration = WorkflowOrchestration::new(Arc::new(engine.executor()));
    let pipeline = engine.pipeline().await;
    let result = pipeline.run(&orchestration, &request, &ctx, &handle.token).await;

    interrupt.abort();
    events.abort();
    sessions.release(&handle);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

/// Log lifecycle events as they are published.
fn forward_events(engine: &Engine) -> JoinHandle<()> {
    let mut receiver = engine.events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::WorkflowStarted { workflow_name, .. } => {
            info!(workflow = %workflow_name, "Workflow started")
        }
        ExecutionEvent::StepStarted { step_id, step_name, .. } => {
            info!(step = %step_id, name = %step_name, "Step started")
        }
        ExecutionEvent::StepCompleted {
            step_id,
            success,
            duration_ms,
            ..
        } => info!(step = %step_id, success, duration_ms, "Step completed"),
        ExecutionEvent::WorkflowCompleted { duration_ms, .. } => {
            info!(duration_ms, "Workflow completed")
        }
        ExecutionEvent::WorkflowFailed { error, .. } => warn!(error = %error, "Workflow failed"),
        ExecutionEvent::WorkflowCancelled { .. } => warn!("Workflow cancelled"),
        ExecutionEvent::LogAppended { level, message, .. } => {
            debug!(level = %level, "{}", message)
        }
    }
}

async fn show_status(engine: &Engine, execution_id: &str) -> anyhow::Result<bool> {
    match engine.executor().status(execution_id).await? {
        Some(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(true)
        }
        None => {
            println!("Execution '{}' not found", execution_id);
            Ok(false)
        }
    }
}

async fn run_adapter(
    engine: &Engine,
    adapter_id: &str,
    settings: &[String],
    write: Option<&str>,
) -> anyhow::Result<bool> {
    let mut configuration = ConfigMap::new();
    for pair in settings {
        let (key, value) = parse_pair(pair).map_err(anyhow::Error::msg)?;
        configuration.insert(key, value);
    }

    let port = engine.adapter_port();
    if let Err(e) = port.validate_configuration(adapter_id, &configuration).await {
        println!("{}: {}", e.code(), e.message());
        return Ok(false);
    }

    let ctx = ExecutionContext::new(CLI_SESSION, CLI_SESSION).with_timeout(engine.run_timeout());
    let cancel = tokio_util::sync::CancellationToken::new();
    let result = match write {
        Some(json) => {
            let data = serde_json::from_str(json).context("--write expects a JSON document")?;
            port.execute_output(adapter_id, data, &configuration, &ctx, &cancel).await
        }
        None => port.execute_input(adapter_id, &configuration, &ctx, &cancel).await,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(stats) = port.statistics(adapter_id).await? {
        info!(
            adapter = %adapter_id,
            executions = stats.execution_count,
            success_rate = stats.success_rate(),
            average_ms = ?stats.average_duration_ms,
            "Adapter statistics"
        );
    }
    Ok(result.success)
}
