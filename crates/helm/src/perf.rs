//! Rolling performance history for worker invocations.
//!
//! An append-only JSON array on disk, capped at a rolling window. Loading is
//! lenient: a missing or corrupt file is treated as empty history, never an
//! error — history is an optimization signal, not a source of truth.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::TaskCategory;
use crate::worker::WorkerId;

/// One recorded worker invocation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub worker: WorkerId,
    pub task_category: Option<TaskCategory>,
    pub extension: Option<String>,
    pub latency_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceRecord {
    pub fn new(worker: WorkerId, latency_ms: u64, success: bool) -> Self {
        Self {
            worker,
            task_category: None,
            extension: None,
            latency_ms,
            success,
            timestamp: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: Option<TaskCategory>) -> Self {
        self.task_category = category;
        self
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }
}

/// File-backed rolling performance log.
#[derive(Debug, Clone)]
pub struct PerformanceLog {
    path: PathBuf,
    cap: usize,
}

impl PerformanceLog {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full history; empty on a missing or unreadable file.
    pub fn load(&self) -> Vec<PerformanceRecord> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Append a record, trimming the history to the rolling cap.
    ///
    /// Persistence failures are logged and swallowed: a broken history file
    /// must never fail the invocation it was recording.
    pub fn append(&self, record: PerformanceRecord) {
        let mut history = self.load();
        history.push(record);
        if history.len() > self.cap {
            let excess = history.len() - self.cap;
            history.drain(..excess);
        }
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %e, "failed to create performance log directory");
                return;
            }
        }
        match serde_json::to_string_pretty(&history) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::error!(error = %e, path = %self.path.display(), "failed to write performance history");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize performance history"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = PerformanceLog::new(dir.path().join("perf.json"), 10);
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        std::fs::write(&path, "not json at all").unwrap();
        let log = PerformanceLog::new(path, 10);
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_append_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = PerformanceLog::new(dir.path().join("perf.json"), 10);
        log.append(
            PerformanceRecord::new(WorkerId::GeminiFlash, 120, true)
                .with_category(Some(TaskCategory::Syntax))
                .with_extension(Some("ts".to_string())),
        );
        let history = log.load();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].worker, WorkerId::GeminiFlash);
        assert_eq!(history[0].task_category, Some(TaskCategory::Syntax));
        assert_eq!(history[0].extension.as_deref(), Some("ts"));
        assert!(history[0].success);
    }

    #[test]
    fn test_rolling_cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let log = PerformanceLog::new(dir.path().join("perf.json"), 3);
        for latency in [1, 2, 3, 4, 5] {
            log.append(PerformanceRecord::new(WorkerId::QwenCoder7b, latency, true));
        }
        let history = log.load();
        assert_eq!(history.len(), 3);
        let latencies: Vec<u64> = history.iter().map(|r| r.latency_ms).collect();
        assert_eq!(latencies, vec![3, 4, 5]);
    }
}
