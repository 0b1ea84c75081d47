//! Error taxonomy for the routing-and-execution engine.
//!
//! Recoverable situations (resource preconditions, open circuits with a
//! resolvable fallback, validation rejections) are handled internally by the
//! dispatcher, router, and adversarial loop — they never appear here. What
//! does appear is what a caller can actually act on, tagged with the layer
//! that produced it.

use thiserror::Error;

use crate::worker::WorkerId;

/// Top-level error surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No healthy worker remained after circuit-breaker substitution.
    #[error("no healthy worker available: {0}")]
    WorkerUnavailable(String),

    /// The chosen worker's circuit is open and no fallback resolved.
    #[error("circuit open for worker '{worker}' with no resolvable fallback")]
    CircuitOpen { worker: WorkerId },

    /// Worker invocation failed even after the cloud fallback retry.
    #[error("worker invocation failed: {0}")]
    Backend(#[from] BackendError),

    /// The adversarial loop consumed its iteration budget without producing
    /// an accepted candidate.
    #[error("adversarial budget exhausted after {0} iterations")]
    AdversarialExhausted(u32),

    /// Sandbox infrastructure failure (snapshot, spawn, or rollback).
    #[error("sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    /// Anything else that doesn't fit the above categories.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Which layer produced this error, for user-visible reporting.
    pub fn layer(&self) -> &'static str {
        match self {
            Self::WorkerUnavailable(_) | Self::CircuitOpen { .. } => "routing",
            Self::Backend(_) => "dispatch",
            Self::AdversarialExhausted(_) => "adversarial",
            Self::Sandbox(_) => "sandbox",
            Self::Internal(_) => "engine",
        }
    }

    /// Whether the working tree may be left in an inconsistent state.
    ///
    /// Only a failed rollback qualifies; every other error leaves files as
    /// they were before the operation.
    pub fn leaves_unresolved_state(&self) -> bool {
        matches!(self, Self::Sandbox(SandboxError::RollbackFailed { .. }))
    }
}

/// Error from a single worker-backend invocation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The worker subprocess could not be spawned.
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker subprocess exited nonzero.
    #[error("worker process exited with code {code}: {stderr}")]
    Process { code: i32, stderr: String },

    /// The invocation exceeded its deadline.
    #[error("worker call timed out after {0}s")]
    Timeout(u64),

    /// HTTP transport failure for a remote worker.
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote worker answered with something we could not interpret.
    #[error("malformed worker response: {0}")]
    Protocol(String),
}

/// Error from the transactional sandbox.
///
/// A command's own nonzero exit is *not* an error — it is rolled back and
/// returned as data. These variants cover infrastructure failures only.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Could not capture a snapshot before execution.
    #[error("failed to create snapshot: {0}")]
    SnapshotFailed(String),

    /// Could not spawn the command shell.
    #[error("failed to spawn command: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The snapshot to roll back to no longer exists.
    #[error("snapshot '{0}' not found")]
    SnapshotMissing(String),

    /// Rollback itself failed — the working tree is in an unresolved state.
    #[error("rollback of snapshot '{snapshot}' failed: {reason}; working tree may be inconsistent")]
    RollbackFailed { snapshot: String, reason: String },
}
