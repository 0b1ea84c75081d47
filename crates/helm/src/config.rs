//! Engine configuration.
//!
//! All tunable constants live here with their defaults; nothing in the
//! routing, sandbox, or adversarial layers hardcodes a threshold. Loadable
//! from a TOML file, every field optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for the routing-and-execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the project the engine operates on.
    pub project_root: PathBuf,
    /// Directory for engine state (snapshots, performance history).
    pub state_dir: PathBuf,
    /// Consecutive failures before a worker's circuit opens.
    pub circuit_failure_threshold: u32,
    /// Seconds after the last failure before Open → HalfOpen.
    pub circuit_cooldown_secs: u64,
    /// Maximum wall time for a sandboxed command.
    pub sandbox_timeout_secs: u64,
    /// Copy-snapshots older than this are pruned.
    pub snapshot_max_age_secs: u64,
    /// Paths captured by a copy-snapshot, relative to `project_root`.
    pub tracked_paths: Vec<String>,
    /// Minimum free disk (GiB) required to run a local worker.
    pub storage_threshold_gb: f64,
    /// Estimated-token ceiling for local workers (~4 chars per token).
    pub local_context_tokens: usize,
    /// Critique score required to accept a generated candidate.
    pub critique_threshold: u8,
    /// Maximum generate → validate → critique cycles.
    pub max_adversarial_iterations: u32,
    /// Rolling cap on persisted performance records.
    pub perf_history_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            state_dir: PathBuf::from(".helm"),
            circuit_failure_threshold: 3,
            circuit_cooldown_secs: 60,
            sandbox_timeout_secs: 60,
            snapshot_max_age_secs: 24 * 60 * 60,
            tracked_paths: vec![
                "src".to_string(),
                "Cargo.toml".to_string(),
                "Cargo.lock".to_string(),
            ],
            storage_threshold_gb: 5.0,
            local_context_tokens: 32_000,
            critique_threshold: 90,
            max_adversarial_iterations: 3,
            perf_history_cap: 1000,
        }
    }
}

impl EngineConfig {
    /// Config rooted at a specific project directory, state kept inside it.
    pub fn for_project(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            state_dir: root.join(".helm"),
            project_root: root,
            ..Default::default()
        }
    }

    /// Load from a TOML file. Missing fields take their defaults.
    pub fn from_toml_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Snapshot directory under the state dir.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }

    /// Performance-history file under the state dir.
    pub fn perf_history_path(&self) -> PathBuf {
        self.state_dir.join("worker-performance.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_spec_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.circuit_failure_threshold, 3);
        assert_eq!(config.circuit_cooldown_secs, 60);
        assert_eq!(config.sandbox_timeout_secs, 60);
        assert_eq!(config.critique_threshold, 90);
        assert_eq!(config.max_adversarial_iterations, 3);
        assert_eq!(config.perf_history_cap, 1000);
    }

    #[test]
    fn test_for_project_roots_state_dir() {
        let config = EngineConfig::for_project("/tmp/proj");
        assert_eq!(config.project_root, PathBuf::from("/tmp/proj"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/proj/.helm"));
        assert_eq!(
            config.snapshots_dir(),
            PathBuf::from("/tmp/proj/.helm/snapshots")
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig =
            toml::from_str("critique_threshold = 80\nmax_adversarial_iterations = 5\n").unwrap();
        assert_eq!(config.critique_threshold, 80);
        assert_eq!(config.max_adversarial_iterations, 5);
        // Untouched fields keep their defaults
        assert_eq!(config.circuit_failure_threshold, 3);
        assert_eq!(config.sandbox_timeout_secs, 60);
    }
}
