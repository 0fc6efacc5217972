//! Built-in tools, adapters and inference backend probes.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use flowpilot_protocols::adapter::{Adapter, AdapterDefinition, AdapterDirection, AdapterOutput};
use flowpilot_protocols::backend::{BackendKind, InferenceBackend};
use flowpilot_protocols::error::{AdapterError, BackendError, ToolError};
use flowpilot_protocols::tool::{Tool, ToolContext, ToolDefinition, ToolResult};
use flowpilot_protocols::types::ConfigMap;

/// Echo tool: returns its parameters unchanged.
pub struct EchoTool {
    definition: ToolDefinition,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new("echo", "Echo", "Return the parameters unchanged")
                .with_category("builtin"),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, params: ConfigMap, _ctx: ToolContext) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::success(Value::Object(params)))
    }
}

#[derive(Debug, Deserialize)]
struct DelayParams {
    /// Milliseconds to wait.
    ms: u64,
    #[serde(default)]
    output: Value,
}

/// Delay tool: waits, then returns `output`. Honours cancellation.
pub struct DelayTool {
    definition: ToolDefinition,
}

impl DelayTool {
    pub fn new() -> Self {
        let schema = json!({
            "type": "object",
            "properties": {
                "ms": { "type": "integer", "description": "Milliseconds to wait" },
                "output": { "description": "Value returned after the wait" }
            },
            "required": ["ms"]
        });
        Self {
            definition: ToolDefinition::new("delay", "Delay", "Wait for a number of milliseconds")
                .with_category("builtin")
                .with_parameters_schema(schema),
        }
    }
}

#[async_trait]
impl Tool for DelayTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, params: ConfigMap, ctx: ToolContext) -> Result<ToolResult, ToolError> {
        let params: DelayParams = serde_json::from_value(Value::Object(params))
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(ToolError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(params.ms)) => {
                Ok(ToolResult::success(params.output))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonFileConfig {
    path: String,
    #[serde(default)]
    pretty: bool,
}

impl JsonFileConfig {
    fn parse(config: &ConfigMap) -> Result<Self, AdapterError> {
        serde_json::from_value(Value::Object(config.clone()))
            .map_err(|e| AdapterError::InvalidConfiguration(e.to_string()))
    }

    fn path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

/// Reads a JSON document from, or writes one to, a file.
pub struct JsonFileAdapter {
    definition: AdapterDefinition,
}

impl JsonFileAdapter {
    pub fn new() -> Self {
        Self {
            definition: AdapterDefinition::new(
                "json-file",
                "JSON file",
                AdapterDirection::Bidirectional,
            )
            .with_category("file"),
        }
    }
}

#[async_trait]
impl Adapter for JsonFileAdapter {
    fn definition(&self) -> &AdapterDefinition {
        &self.definition
    }

    async fn read(
        &self,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        let config = JsonFileConfig::parse(config)?;
        let content = tokio::select! {
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            content = tokio::fs::read(config.path()) => content?,
        };
        let data: Value = serde_json::from_slice(&content)?;
        let items = data.as_array().map_or(1, Vec::len) as u64;
        Ok(AdapterOutput::new(data).with_metrics(items, content.len() as u64))
    }

    async fn write(
        &self,
        data: Value,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        let config = JsonFileConfig::parse(config)?;
        let content = if config.pretty {
            serde_json::to_vec_pretty(&data)?
        } else {
            serde_json::to_vec(&data)?
        };
        let items = data.as_array().map_or(1, Vec::len) as u64;
        let bytes = content.len() as u64;
        tokio::select! {
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            written = tokio::fs::write(config.path(), content) => written?,
        }
        Ok(AdapterOutput::new(json!({ "path": config.path })).with_metrics(items, bytes))
    }

    async fn validate_configuration(&self, config: &ConfigMap) -> Result<(), AdapterError> {
        let config = JsonFileConfig::parse(config)?;
        if config.path.trim().is_empty() {
            return Err(AdapterError::InvalidConfiguration("path must not be empty".into()));
        }
        Ok(())
    }
}

/// Backend readiness probed with a TCP connection to its base URL.
///
/// The probe cannot start processes or load models: `start` reports failure
/// and models are assumed to load on first request once the endpoint answers.
pub struct ProbeBackend {
    id: String,
    kind: BackendKind,
    address: String,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

impl ProbeBackend {
    pub fn new(id: impl Into<String>, kind: BackendKind, base_url: &str) -> Self {
        Self {
            id: id.into(),
            kind,
            address: socket_address(base_url),
        }
    }

    async fn reachable(&self) -> Result<(), BackendError> {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BackendError::Unreachable(format!("{}: {}", self.address, e))),
            Err(_) => Err(BackendError::Unreachable(format!(
                "{}: connect timed out",
                self.address
            ))),
        }
    }
}

#[async_trait]
impl InferenceBackend for ProbeBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn check_running(&self) -> Result<bool, BackendError> {
        Ok(self.reachable().await.is_ok())
    }

    async fn start(&self) -> (bool, String) {
        (
            false,
            format!("nothing is listening on {}; start the backend and retry", self.address),
        )
    }

    async fn warm_up_model(&self, _model_id: &str) -> Result<(), BackendError> {
        self.reachable().await
    }

    async fn list_running_models(&self) -> Result<Vec<String>, BackendError> {
        Err(BackendError::RequestFailed("model listing is not available over a TCP probe".into()))
    }
}

/// `host:port` of a base URL, with the scheme's default port when absent.
fn socket_address(base_url: &str) -> String {
    let (default_port, rest) = match base_url.split_once("://") {
        Some(("https", rest)) => (443, rest),
        Some((_, rest)) => (80, rest),
        None => (80, base_url),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        authority.to_string()
    } else {
        format!("{}:{}", authority, default_port)
    }
}
