//! Execution dispatcher: backend seam, resource preconditions, and the
//! local→cloud fallback policy.
//!
//! Backends implement a uniform invocation contract so the dispatcher never
//! cares whether a worker is a subprocess or an HTTP API. Preconditions for
//! local workers (free disk, estimated context size) are recovered from
//! automatically by rerouting to a cloud worker — they are not surfaced as
//! errors. Every outcome is reported to the circuit registry and appended to
//! the performance log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::breaker::CircuitRegistry;
use crate::classifier::TaskCategory;
use crate::config::EngineConfig;
use crate::error::{BackendError, EngineError};
use crate::perf::{PerformanceLog, PerformanceRecord};
use crate::task::{TaskRequest, ToolSpec, WorkerReply};
use crate::worker::{WorkerCatalog, WorkerDescriptor, WorkerId, WorkerKind};

/// Uniform worker invocation contract.
///
/// Implementations may spawn a subprocess or call a remote API; both return
/// the same reply shape so the dispatcher stays implementation-agnostic.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &WorkerDescriptor,
        prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<WorkerReply, BackendError>;
}

/// Gauge for free disk space. A `None` reading is treated as healthy — a
/// broken gauge must not ground the local fleet.
pub trait DiskGauge: Send + Sync {
    fn available_gb(&self, path: &Path) -> Option<f64>;
}

/// Gauge backed by `df -Pk`.
pub struct DfGauge;

impl DiskGauge for DfGauge {
    fn available_gb(&self, path: &Path) -> Option<f64> {
        let output = std::process::Command::new("df")
            .arg("-Pk")
            .arg(path)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        // POSIX format: header line, then "<fs> <blocks> <used> <avail> ...".
        let line = stdout.lines().nth(1)?;
        let avail_kb: f64 = line.split_whitespace().nth(3)?.parse().ok()?;
        Some(avail_kb / 1024.0 / 1024.0)
    }
}

/// Fixed-reading gauge for tests and constrained deployments.
pub struct FixedGauge(pub f64);

impl DiskGauge for FixedGauge {
    fn available_gb(&self, _path: &Path) -> Option<f64> {
        Some(self.0)
    }
}

/// Local worker backend: spawns a model runner subprocess and captures
/// stdout. Nonzero exit or timeout is a backend error, which the dispatcher
/// turns into a cloud fallback.
pub struct LocalProcessBackend {
    program: String,
    model_dir: Option<PathBuf>,
    timeout: Duration,
}

impl LocalProcessBackend {
    pub fn new() -> Self {
        Self {
            program: "ollama".to_string(),
            model_dir: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Override the model storage directory passed to the runner.
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for LocalProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerBackend for LocalProcessBackend {
    async fn invoke(
        &self,
        descriptor: &WorkerDescriptor,
        prompt: &str,
        _tools: &[ToolSpec],
    ) -> Result<WorkerReply, BackendError> {
        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("run")
            .arg(descriptor.id.api_name())
            .arg(prompt)
            .kill_on_drop(true);
        if let Some(dir) = &self.model_dir {
            cmd.env("OLLAMA_MODELS", dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(BackendError::Spawn(e)),
            Err(_) => return Err(BackendError::Timeout(self.timeout.as_secs())),
        };

        if !output.status.success() {
            return Err(BackendError::Process {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(WorkerReply {
            worker: descriptor.id,
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
            function_calls: Vec::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// Cloud worker backend: OpenAI-compatible completions endpoint.
pub struct HttpApiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpApiBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl WorkerBackend for HttpApiBackend {
    async fn invoke(
        &self,
        descriptor: &WorkerDescriptor,
        prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<WorkerReply, BackendError> {
        let start = Instant::now();
        let mut body = serde_json::json!({
            "model": descriptor.id.api_name(),
            "prompt": prompt,
            "max_tokens": descriptor.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)
                .map_err(|e| BackendError::Protocol(e.to_string()))?;
        }

        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| BackendError::Protocol("empty choices array".to_string()))?;

        Ok(WorkerReply {
            worker: descriptor.id,
            text,
            latency_ms: start.elapsed().as_millis() as u64,
            function_calls: Vec::new(),
        })
    }
}

/// The dispatcher: applies preconditions, invokes the backend for the
/// worker's kind, falls back local→cloud once, and reports every outcome.
pub struct ExecutionDispatcher {
    catalog: WorkerCatalog,
    registry: Arc<CircuitRegistry>,
    perf: PerformanceLog,
    local: Arc<dyn WorkerBackend>,
    cloud: Arc<dyn WorkerBackend>,
    gauge: Box<dyn DiskGauge>,
    project_root: PathBuf,
    storage_threshold_gb: f64,
    local_context_tokens: usize,
}

impl ExecutionDispatcher {
    pub fn new(
        catalog: WorkerCatalog,
        registry: Arc<CircuitRegistry>,
        perf: PerformanceLog,
        local: Arc<dyn WorkerBackend>,
        cloud: Arc<dyn WorkerBackend>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            perf,
            local,
            cloud,
            gauge: Box::new(DfGauge),
            project_root: config.project_root.clone(),
            storage_threshold_gb: config.storage_threshold_gb,
            local_context_tokens: config.local_context_tokens,
        }
    }

    pub fn with_gauge(mut self, gauge: Box<dyn DiskGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Invoke `worker` for `task`, recording the outcome.
    pub async fn invoke(
        &self,
        worker: WorkerId,
        task: &TaskRequest,
        category: Option<TaskCategory>,
    ) -> Result<WorkerReply, EngineError> {
        self.invoke_with_tools(worker, task, category, &[]).await
    }

    /// Invoke with tool definitions exposed to the backend.
    pub async fn invoke_with_tools(
        &self,
        worker: WorkerId,
        task: &TaskRequest,
        category: Option<TaskCategory>,
        tools: &[ToolSpec],
    ) -> Result<WorkerReply, EngineError> {
        let chosen = self.apply_preconditions(worker, task);
        let descriptor = self.descriptor(chosen)?;

        match self.call_backend(descriptor, task, tools).await {
            Ok(reply) => {
                self.report(chosen, task, category, reply.latency_ms, true);
                Ok(reply)
            }
            Err(primary_err) => {
                self.report(chosen, task, category, 0, false);
                if descriptor.kind != WorkerKind::Local {
                    return Err(primary_err.into());
                }

                // Local invocation failed: retry once against the cloud
                // fallback before surfacing anything.
                let fallback = self.catalog.cloud_fallback_for(chosen).ok_or_else(|| {
                    EngineError::WorkerUnavailable(
                        "local worker failed and no cloud fallback is configured".to_string(),
                    )
                })?;
                tracing::warn!(
                    worker = %chosen,
                    fallback = %fallback,
                    error = %primary_err,
                    "local invocation failed, retrying on cloud fallback"
                );
                let fb_descriptor = self.descriptor(fallback)?;
                match self.call_backend(fb_descriptor, task, tools).await {
                    Ok(reply) => {
                        self.report(fallback, task, category, reply.latency_ms, true);
                        Ok(reply)
                    }
                    Err(fallback_err) => {
                        self.report(fallback, task, category, 0, false);
                        Err(fallback_err.into())
                    }
                }
            }
        }
    }

    /// Local-resource preconditions. Violations reroute to a cloud worker;
    /// they are never surfaced as errors.
    fn apply_preconditions(&self, worker: WorkerId, task: &TaskRequest) -> WorkerId {
        let Some(descriptor) = self.catalog.get(worker) else {
            return worker;
        };
        if descriptor.kind != WorkerKind::Local {
            return worker;
        }

        if let Some(free_gb) = self.gauge.available_gb(&self.project_root) {
            if free_gb < self.storage_threshold_gb {
                let fallback = self
                    .catalog
                    .cloud_fallback_for(worker)
                    .unwrap_or(WorkerId::GeminiFlash);
                tracing::warn!(
                    worker = %worker,
                    free_gb,
                    fallback = %fallback,
                    "local storage below threshold, forcing cloud fallback"
                );
                return fallback;
            }
        }

        if task.estimated_tokens() > self.local_context_tokens {
            let fallback = self
                .catalog
                .largest_context_cloud()
                .map(|d| d.id)
                .unwrap_or(WorkerId::GeminiPro);
            tracing::info!(
                worker = %worker,
                tokens = task.estimated_tokens(),
                fallback = %fallback,
                "prompt exceeds local context, forcing large-context cloud worker"
            );
            return fallback;
        }

        worker
    }

    async fn call_backend(
        &self,
        descriptor: &WorkerDescriptor,
        task: &TaskRequest,
        tools: &[ToolSpec],
    ) -> Result<WorkerReply, BackendError> {
        let backend = match descriptor.kind {
            WorkerKind::Local => &self.local,
            WorkerKind::Cloud => &self.cloud,
        };
        backend.invoke(descriptor, &task.prompt, tools).await
    }

    fn descriptor(&self, worker: WorkerId) -> Result<&WorkerDescriptor, EngineError> {
        self.catalog.get(worker).ok_or_else(|| {
            EngineError::WorkerUnavailable(format!("worker '{worker}' not in catalog"))
        })
    }

    fn report(
        &self,
        worker: WorkerId,
        task: &TaskRequest,
        category: Option<TaskCategory>,
        latency_ms: u64,
        success: bool,
    ) {
        if success {
            self.registry.record_success(worker);
        } else {
            self.registry.record_failure(worker);
        }
        self.perf.append(
            PerformanceRecord::new(worker, latency_ms, success)
                .with_category(category)
                .with_extension(task.extension()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted backend: pops canned results and records every call.
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, String>>>,
        pub calls: Mutex<Vec<(WorkerId, String)>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WorkerBackend for ScriptedBackend {
        async fn invoke(
            &self,
            descriptor: &WorkerDescriptor,
            prompt: &str,
            _tools: &[ToolSpec],
        ) -> Result<WorkerReply, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((descriptor.id, prompt.to_string()));
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok("ok".to_string()));
            match next {
                Ok(text) => Ok(WorkerReply {
                    worker: descriptor.id,
                    text,
                    latency_ms: 5,
                    function_calls: Vec::new(),
                }),
                Err(message) => Err(BackendError::Protocol(message)),
            }
        }
    }

    fn dispatcher_with(
        local: Arc<ScriptedBackend>,
        cloud: Arc<ScriptedBackend>,
        gauge_gb: f64,
    ) -> (ExecutionDispatcher, Arc<CircuitRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(CircuitRegistry::new(3, 60));
        let config = EngineConfig::for_project(dir.path());
        let dispatcher = ExecutionDispatcher::new(
            WorkerCatalog::builtin(),
            registry.clone(),
            PerformanceLog::new(config.perf_history_path(), 100),
            local,
            cloud,
            &config,
        )
        .with_gauge(Box::new(FixedGauge(gauge_gb)));
        (dispatcher, registry, dir)
    }

    #[tokio::test]
    async fn test_cloud_worker_success_records_perf() {
        let local = ScriptedBackend::new(vec![]);
        let cloud = ScriptedBackend::new(vec![Ok("answer".to_string())]);
        let (dispatcher, registry, _dir) = dispatcher_with(local, cloud.clone(), 100.0);

        let task = TaskRequest::new("explain this").with_file("a.rs");
        let reply = dispatcher
            .invoke(WorkerId::GeminiFlash, &task, Some(TaskCategory::Docs))
            .await
            .unwrap();
        assert_eq!(reply.text, "answer");
        assert_eq!(cloud.call_count(), 1);
        assert_eq!(registry.failure_count(WorkerId::GeminiFlash), 0);

        let history = dispatcher.perf.load();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].extension.as_deref(), Some("rs"));
    }

    #[tokio::test]
    async fn test_local_failure_falls_back_to_cloud_once() {
        let local = ScriptedBackend::new(vec![Err("model crashed".to_string())]);
        let cloud = ScriptedBackend::new(vec![Ok("rescued".to_string())]);
        let (dispatcher, registry, _dir) =
            dispatcher_with(local.clone(), cloud.clone(), 100.0);

        let task = TaskRequest::new("generate something");
        let reply = dispatcher
            .invoke(WorkerId::QwenCoder7b, &task, None)
            .await
            .unwrap();
        assert_eq!(reply.text, "rescued");
        assert_eq!(local.call_count(), 1);
        assert_eq!(cloud.call_count(), 1);
        // Failure recorded for the local worker, success for the fallback.
        assert_eq!(registry.failure_count(WorkerId::QwenCoder7b), 1);
        assert_eq!(registry.failure_count(WorkerId::GeminiFlash), 0);
    }

    #[tokio::test]
    async fn test_low_storage_forces_cloud_before_invoking_local() {
        let local = ScriptedBackend::new(vec![]);
        let cloud = ScriptedBackend::new(vec![Ok("from cloud".to_string())]);
        let (dispatcher, _registry, _dir) = dispatcher_with(local.clone(), cloud.clone(), 1.0);

        let task = TaskRequest::new("quick fix");
        let reply = dispatcher
            .invoke(WorkerId::QwenCoder7b, &task, None)
            .await
            .unwrap();
        assert_eq!(reply.worker, WorkerId::GeminiFlash);
        assert_eq!(local.call_count(), 0);
        assert_eq!(cloud.call_count(), 1);
    }

    #[tokio::test]
    async fn test_context_overflow_routes_to_largest_cloud() {
        let local = ScriptedBackend::new(vec![]);
        let cloud = ScriptedBackend::new(vec![Ok("big context".to_string())]);
        let (dispatcher, _registry, _dir) = dispatcher_with(local.clone(), cloud.clone(), 100.0);

        // 32k tokens * 4 chars: anything longer must leave the local fleet.
        let task = TaskRequest::new("x".repeat(32_001 * 4));
        let reply = dispatcher
            .invoke(WorkerId::QwenCoder14b, &task, None)
            .await
            .unwrap();
        assert_eq!(reply.worker, WorkerId::GeminiPro);
        assert_eq!(local.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cloud_failure_surfaces_without_retry() {
        let local = ScriptedBackend::new(vec![]);
        let cloud = ScriptedBackend::new(vec![Err("rate limited".to_string())]);
        let (dispatcher, registry, _dir) = dispatcher_with(local, cloud.clone(), 100.0);

        let task = TaskRequest::new("anything");
        let result = dispatcher.invoke(WorkerId::GeminiFlash, &task, None).await;
        assert!(matches!(result, Err(EngineError::Backend(_))));
        assert_eq!(cloud.call_count(), 1);
        assert_eq!(registry.failure_count(WorkerId::GeminiFlash), 1);
    }
}
