//! Scripted tool executor, adapter and inference backend for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use flowpilot_protocols::adapter::{Adapter, AdapterDefinition, AdapterDirection, AdapterOutput};
use flowpilot_protocols::backend::{BackendKind, InferenceBackend};
use flowpilot_protocols::error::{AdapterError, BackendError};
use flowpilot_protocols::tool::{ToolContext, ToolExecutor, ToolResult};
use flowpilot_protocols::types::ConfigMap;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(Value),
    Failure(String),
    /// Succeed with the value after sleeping, unless cancelled first.
    Delayed(Duration, Value),
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub id: String,
    pub params: ConfigMap,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<MockResponse>>,
    fallback: HashMap<String, MockResponse>,
}

impl Script {
    fn next(&mut self, id: &str) -> Option<MockResponse> {
        self.queued
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.fallback.get(id).cloned())
    }
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<MockCall>>,
}

impl Recorder {
    fn record(&self, id: &str, params: &ConfigMap) {
        self.calls.lock().push(MockCall {
            id: id.to_string(),
            params: params.clone(),
            at: Instant::now(),
        });
    }

    fn calls(&self, id: &str) -> Vec<MockCall> {
        self.calls.lock().iter().filter(|c| c.id == id).cloned().collect()
    }

    fn total(&self) -> usize {
        self.calls.lock().len()
    }
}

async fn play(response: MockResponse, cancel: &CancellationToken) -> Result<Value, String> {
    match response {
        MockResponse::Success(value) => Ok(value),
        MockResponse::Failure(error) => Err(error),
        MockResponse::Delayed(delay, value) => {
            tokio::select! {
                _ = cancel.cancelled() => Err("cancelled".to_string()),
                _ = tokio::time::sleep(delay) => Ok(value),
            }
        }
    }
}

/// Tool executor returning pre-configured responses.
///
/// Queued responses are consumed first, then the sticky response; a tool with
/// neither echoes its parameters back.
#[derive(Default)]
pub struct MockToolExecutor {
    script: RwLock<Script>,
    recorder: Recorder,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned for every call once the queue is empty.
    pub async fn set_response(&self, tool_id: &str, response: MockResponse) {
        self.script
            .write()
            .await
            .fallback
            .insert(tool_id.to_string(), response);
    }

    /// Responses returned for the next calls, in order.
    pub async fn push_responses(&self, tool_id: &str, responses: Vec<MockResponse>) {
        self.script
            .write()
            .await
            .queued
            .entry(tool_id.to_string())
            .or_default()
            .extend(responses);
    }

    pub fn calls(&self, tool_id: &str) -> Vec<MockCall> {
        self.recorder.calls(tool_id)
    }

    pub fn call_count(&self, tool_id: &str) -> usize {
        self.calls(tool_id).len()
    }

    pub fn total_calls(&self) -> usize {
        self.recorder.total()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, tool_id: &str, params: ConfigMap, ctx: ToolContext) -> ToolResult {
        self.recorder.record(tool_id, &params);
        let response = self.script.write().await.next(tool_id);
        match response {
            Some(response) => match play(response, &ctx.cancellation).await {
                Ok(value) => ToolResult::success(value),
                Err(error) => ToolResult::error(error),
            },
            None => ToolResult::success(serde_json::json!({
                "tool": tool_id,
                "params": params,
            })),
        }
    }

    fn tool_name(&self, tool_id: &str) -> Option<String> {
        Some(format!("Mock {}", tool_id))
    }
}

/// Adapter returning pre-configured responses for reads and writes.
pub struct MockAdapter {
    definition: AdapterDefinition,
    script: RwLock<VecDeque<MockResponse>>,
    recorder: Recorder,
    written: Mutex<Vec<Value>>,
}

impl MockAdapter {
    pub fn new(id: &str, direction: AdapterDirection) -> Self {
        Self {
            definition: AdapterDefinition::new(id, format!("Mock {}", id), direction),
            script: RwLock::new(VecDeque::new()),
            recorder: Recorder::default(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn with_definition(mut self, definition: AdapterDefinition) -> Self {
        self.definition = definition;
        self
    }

    pub async fn push_responses(&self, responses: Vec<MockResponse>) {
        self.script.write().await.extend(responses);
    }

    pub fn call_count(&self) -> usize {
        self.recorder.total()
    }

    pub fn last_params(&self) -> Option<ConfigMap> {
        self.recorder.calls(&self.definition.id).last().map(|c| c.params.clone())
    }

    pub fn written(&self) -> Vec<Value> {
        self.written.lock().clone()
    }

    async fn respond(
        &self,
        config: &ConfigMap,
        cancel: &CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        self.recorder.record(&self.definition.id, config);
        let response = self.script.write().await.pop_front();
        match response {
            Some(response) => match play(response, cancel).await {
                Ok(value) => Ok(AdapterOutput::new(value).with_metrics(1, 0)),
                Err(error) if error == "cancelled" => Err(AdapterError::Cancelled),
                Err(error) => Err(AdapterError::OperationFailed(error)),
            },
            None => Ok(AdapterOutput::new(Value::Object(config.clone())).with_metrics(1, 0)),
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn definition(&self) -> &AdapterDefinition {
        &self.definition
    }

    async fn read(
        &self,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        self.respond(config, &cancel).await
    }

    async fn write(
        &self,
        data: Value,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        self.written.lock().push(data);
        self.respond(config, &cancel).await
    }

    async fn validate_configuration(&self, config: &ConfigMap) -> Result<(), AdapterError> {
        if config.contains_key("invalid") {
            return Err(AdapterError::InvalidConfiguration("'invalid' key is not allowed".into()));
        }
        Ok(())
    }
}

/// Inference backend with scriptable readiness behaviour.
pub struct MockBackend {
    id: String,
    kind: BackendKind,
    running: AtomicBool,
    check_fails: bool,
    start_succeeds: bool,
    warm_up_fails: bool,
    models: Mutex<Vec<String>>,
    actions: Mutex<Vec<String>>,
}

impl MockBackend {
    /// A running backend with no models loaded.
    pub fn new(id: &str, kind: BackendKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            running: AtomicBool::new(true),
            check_fails: false,
            start_succeeds: true,
            warm_up_fails: false,
            models: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn stopped(self) -> Self {
        self.running.store(false, Ordering::SeqCst);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.check_fails = true;
        self.running.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.start_succeeds = false;
        self
    }

    pub fn failing_warm_up(mut self) -> Self {
        self.warm_up_fails = true;
        self
    }

    pub fn with_loaded_model(self, model_id: &str) -> Self {
        self.models.lock().push(model_id.to_string());
        self
    }

    /// Readiness operations invoked so far, e.g. `start` or `warm_up:llama3`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn check_running(&self) -> Result<bool, BackendError> {
        self.actions.lock().push("check".into());
        if self.check_fails {
            return Err(BackendError::Unreachable(format!("{} is not answering", self.id)));
        }
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> (bool, String) {
        self.actions.lock().push("start".into());
        if self.start_succeeds {
            self.running.store(true, Ordering::SeqCst);
            (true, "started".into())
        } else {
            (false, "executable not found".into())
        }
    }

    async fn warm_up_model(&self, model_id: &str) -> Result<(), BackendError> {
        self.actions.lock().push(format!("warm_up:{}", model_id));
        if self.warm_up_fails {
            return Err(BackendError::ModelUnavailable(model_id.to_string()));
        }
        self.models.lock().push(model_id.to_string());
        Ok(())
    }

    async fn list_running_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.models.lock().clone())
    }
}
