//! CLI definitions for FlowPilot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// FlowPilot CLI.
#[derive(Parser)]
#[command(name = "flowpilot")]
#[command(about = "Workflow and orchestration execution engine for AI-agent pipelines")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "FLOWPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a workflow definition (JSON) through the execution pipeline
    Run {
        /// Workflow definition file
        file: PathBuf,

        /// Input parameter as key=value; values are parsed as JSON when possible
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Workflow id recorded in the audit trail and statistics
        #[arg(long)]
        workflow_id: Option<String>,

        /// Project id attached to lifecycle events
        #[arg(long)]
        project_id: Option<String>,

        /// Configured inference backend the workflow depends on
        #[arg(long)]
        backend: Option<String>,

        /// User recorded as the initiator
        #[arg(long, env = "USER", default_value = "cli")]
        user: String,

        /// Print metrics in Prometheus text format after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Validate a workflow definition and print its execution order
    Validate {
        /// Workflow definition file
        file: PathBuf,
    },

    /// Show the status of an execution from the audit store
    Status {
        /// Execution id
        execution_id: String,
    },

    /// Read from or write to an adapter
    Adapter {
        /// Adapter id
        adapter_id: String,

        /// Configuration entry as key=value; values are parsed as JSON when possible
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        settings: Vec<String>,

        /// Write this JSON document instead of reading
        #[arg(long, value_name = "JSON")]
        write: Option<String>,
    },
}

/// Split `key=value`, parsing the value as JSON and falling back to a string.
pub(crate) fn parse_pair(pair: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", pair))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", pair));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
