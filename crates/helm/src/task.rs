//! Task request and worker-reply types shared across the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::worker::WorkerId;

/// An incoming task. Immutable; one per caller invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// The prompt text to route and execute.
    pub prompt: String,
    /// Optional file the task concerns, used for extension hints.
    pub file_path: Option<PathBuf>,
    /// Optional size of that file in bytes.
    pub file_size: Option<u64>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            file_path: None,
            file_size: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Lower-cased extension of the file hint, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .and_then(|p| p.extension())
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Rough token estimate (~4 characters per token).
    pub fn estimated_tokens(&self) -> usize {
        self.prompt.len() / 4
    }
}

/// A structured function call extracted from a worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// A tool made available to a worker invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Successful result of one worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerReply {
    /// The worker that actually answered (may differ from the one asked for
    /// when a fallback was applied).
    pub worker: WorkerId,
    /// Response text.
    pub text: String,
    /// Wall time of the invocation.
    pub latency_ms: u64,
    /// Structured calls, when the backend supports them.
    pub function_calls: Vec<FunctionCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lowercased() {
        let task = TaskRequest::new("fix it").with_file("src/Main.TS");
        assert_eq!(task.extension().as_deref(), Some("ts"));

        let task = TaskRequest::new("no file");
        assert_eq!(task.extension(), None);
    }

    #[test]
    fn test_token_estimate() {
        let task = TaskRequest::new("a".repeat(400));
        assert_eq!(task.estimated_tokens(), 100);
    }
}
