//! Transactional sandbox: snapshot → execute → rollback.
//!
//! Every command runs under an automatic restore guarantee. A snapshot is
//! captured first — `git stash` when the project is a repository, a copy of
//! the tracked root paths otherwise. On nonzero exit the snapshot is applied
//! back before the call returns, and the command's failure is returned as
//! *data*, not as an error: a sandbox-caught command failure is not a system
//! fault. Only infrastructure problems (snapshot creation, process spawn,
//! rollback itself) are errors.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::EngineConfig;
use crate::error::SandboxError;

/// How a snapshot was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMethod {
    /// `git stash` entry named with the snapshot id.
    GitStash,
    /// Copies of the tracked paths under the snapshots directory.
    DirCopy,
}

/// A restorable capture of the working tree, taken before a command runs.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Time-based identifier, e.g. `snap_1717000000000`.
    pub id: String,
    pub method: SnapshotMethod,
    /// Paths captured (relative to the project root), for the copy method.
    pub paths: Vec<String>,
}

/// Outcome of a sandboxed command. Present even when the command failed —
/// `rolled_back` tells whether the tree was restored.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; −1 when the command was killed by the timeout.
    pub exit_code: i32,
    pub rolled_back: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

static COMMAND_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:bash|sh|shell|powershell|ps1|batch|cmd)?\n(.*?)```")
        .expect("command block pattern should compile")
});

/// The sandbox. Cheap to construct; all state lives on disk.
pub struct Sandbox {
    project_root: PathBuf,
    snapshots_dir: PathBuf,
    tracked_paths: Vec<String>,
    timeout: Duration,
    max_snapshot_age: Duration,
}

impl Sandbox {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            project_root: config.project_root.clone(),
            snapshots_dir: config.snapshots_dir(),
            tracked_paths: config.tracked_paths.clone(),
            timeout: Duration::from_secs(config.sandbox_timeout_secs),
            max_snapshot_age: Duration::from_secs(config.snapshot_max_age_secs),
        }
    }

    /// Run a shell command under the snapshot/rollback guarantee.
    pub async fn execute(&self, command: &str) -> Result<CommandOutcome, SandboxError> {
        tracing::info!(command, "executing command in sandbox");
        let snapshot = self.create_snapshot(&format!("before: {command}")).await?;

        let run = self.run_command(command).await;
        match run {
            Ok(outcome) if outcome.exit_code == 0 => {
                // Success: the snapshot is left unapplied and expires later.
                Ok(outcome)
            }
            Ok(mut outcome) => {
                tracing::warn!(
                    command,
                    exit_code = outcome.exit_code,
                    "command failed, rolling back"
                );
                self.rollback(&snapshot).await?;
                outcome.rolled_back = true;
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    /// Capture a snapshot of the working tree.
    ///
    /// Prefers a git stash when the project is a repository; falls back to
    /// copying the tracked paths when it is not, or when the stash fails.
    pub async fn create_snapshot(&self, reason: &str) -> Result<Snapshot, SandboxError> {
        let id = format!("snap_{}", chrono::Utc::now().timestamp_millis());

        if self.project_root.join(".git").exists() {
            let stash = self
                .run_git(&format!(
                    "git add -A && git stash push -m \"{id}: {reason}\""
                ))
                .await;
            match stash {
                Ok(true) => {
                    tracing::debug!(snapshot = %id, method = "git", "snapshot created");
                    return Ok(Snapshot {
                        id,
                        method: SnapshotMethod::GitStash,
                        paths: Vec::new(),
                    });
                }
                Ok(false) | Err(_) => {
                    tracing::warn!(snapshot = %id, "git stash failed, falling back to file copy");
                }
            }
        }

        let dest = self.snapshots_dir.join(&id);
        let project_root = self.project_root.clone();
        let tracked = self.tracked_paths.clone();
        let copied = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<String>> {
            std::fs::create_dir_all(&dest)?;
            let mut captured = Vec::new();
            for item in &tracked {
                let src = project_root.join(item);
                if src.exists() {
                    copy_recursive(&src, &dest.join(item))?;
                    captured.push(item.clone());
                }
            }
            Ok(captured)
        })
        .await
        .map_err(|e| SandboxError::SnapshotFailed(format!("snapshot task panicked: {e}")))?
        .map_err(|e| SandboxError::SnapshotFailed(e.to_string()))?;

        tracing::debug!(snapshot = %id, method = "copy", paths = copied.len(), "snapshot created");
        Ok(Snapshot {
            id,
            method: SnapshotMethod::DirCopy,
            paths: copied,
        })
    }

    /// Restore the working tree from a snapshot.
    pub async fn rollback(&self, snapshot: &Snapshot) -> Result<(), SandboxError> {
        tracing::info!(snapshot = %snapshot.id, "rolling back working tree");
        match snapshot.method {
            SnapshotMethod::GitStash => self.rollback_stash(snapshot).await,
            SnapshotMethod::DirCopy => self.rollback_copy(snapshot).await,
        }
    }

    async fn rollback_stash(&self, snapshot: &Snapshot) -> Result<(), SandboxError> {
        let list = self.run_git_capture("git stash list").await.map_err(|e| {
            SandboxError::RollbackFailed {
                snapshot: snapshot.id.clone(),
                reason: format!("could not list stashes: {e}"),
            }
        })?;

        let index = list
            .lines()
            .position(|line| line.contains(&snapshot.id))
            .ok_or_else(|| SandboxError::SnapshotMissing(snapshot.id.clone()))?;

        let popped = self
            .run_git(&format!(
                "git reset --hard HEAD && git stash pop stash@{{{index}}}"
            ))
            .await
            .map_err(|e| SandboxError::RollbackFailed {
                snapshot: snapshot.id.clone(),
                reason: e.to_string(),
            })?;
        if !popped {
            return Err(SandboxError::RollbackFailed {
                snapshot: snapshot.id.clone(),
                reason: "git stash pop exited nonzero".to_string(),
            });
        }
        Ok(())
    }

    async fn rollback_copy(&self, snapshot: &Snapshot) -> Result<(), SandboxError> {
        let source = self.snapshots_dir.join(&snapshot.id);
        if !source.exists() {
            return Err(SandboxError::SnapshotMissing(snapshot.id.clone()));
        }

        let project_root = self.project_root.clone();
        let paths = snapshot.paths.clone();
        let id = snapshot.id.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            for item in &paths {
                let captured = source.join(item);
                let live = project_root.join(item);
                if captured.exists() {
                    if live.exists() {
                        if live.is_dir() {
                            std::fs::remove_dir_all(&live)?;
                        } else {
                            std::fs::remove_file(&live)?;
                        }
                    }
                    copy_recursive(&captured, &live)?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| SandboxError::RollbackFailed {
            snapshot: id.clone(),
            reason: format!("rollback task panicked: {e}"),
        })?
        .map_err(|e| SandboxError::RollbackFailed {
            snapshot: id,
            reason: e.to_string(),
        })
    }

    /// Delete copy-snapshots older than the configured max age.
    pub fn prune_expired(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.snapshots_dir) else {
            return 0;
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let max_age_ms = self.max_snapshot_age.as_millis() as i64;
        let mut pruned = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stamp) = name.strip_prefix("snap_").and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            if now_ms - stamp > max_age_ms && std::fs::remove_dir_all(entry.path()).is_ok() {
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::debug!(pruned, "expired snapshots removed");
        }
        pruned
    }

    /// Extract concrete shell commands from free-form model output.
    ///
    /// Scans fenced command blocks and returns the non-comment, non-empty
    /// lines in order.
    pub fn extract_commands(text: &str) -> Vec<String> {
        let mut commands = Vec::new();
        for captures in COMMAND_BLOCK.captures_iter(text) {
            let Some(block) = captures.get(1) else {
                continue;
            };
            for line in block.as_str().lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                    continue;
                }
                commands.push(line.to_string());
            }
        }
        commands
    }

    /// Run the command under the configured timeout, in its own process
    /// group so a timeout kills the whole tree.
    async fn run_command(&self, command: &str) -> Result<CommandOutcome, SandboxError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&self.project_root)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(CommandOutcome {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                rolled_back: false,
            }),
            Ok(Err(e)) => Err(SandboxError::SpawnFailed(e)),
            Err(_) => Ok(CommandOutcome {
                stdout: String::new(),
                stderr: format!("command timed out after {}s", self.timeout.as_secs()),
                exit_code: -1,
                rolled_back: false,
            }),
        }
    }

    /// Run a git compound command; Ok(true) when it exited zero.
    async fn run_git(&self, command: &str) -> std::io::Result<bool> {
        let output = tokio::process::Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.project_root)
            .output()
            .await?;
        Ok(output.status.success())
    }

    async fn run_git_capture(&self, command: &str) -> std::io::Result<String> {
        let output = tokio::process::Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.project_root)
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn copy_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
    }
    Ok(())
}
