//! Worker identity, capability catalog, and per-call health snapshots.
//!
//! The catalog is static configuration: each worker's capability tags,
//! priority, fallback, and token limits are fixed at construction. Health
//! (availability + circuit level) is recomputed on every routing call and
//! never stored on the descriptor itself.

use serde::{Deserialize, Serialize};

use crate::ternary::Ternary;

/// Where a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Subprocess on this machine.
    Local,
    /// Remote HTTP API.
    Cloud,
}

/// Identifier for a callable model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerId {
    /// Fast, cheap cloud model — the default for routine work.
    GeminiFlash,
    /// Top-tier cloud model with a very large context window.
    GeminiPro,
    /// Cloud model tuned for deep multi-step reasoning.
    GeminiThinking,
    /// Small local coder, offline quick fixes.
    QwenCoder7b,
    /// Mid-size local generalist.
    YiCoder9b,
    /// Large local coder for heavier generation.
    QwenCoder14b,
    /// Local reviewer for diagnostics and error tracking.
    DiagnosticCritic,
}

impl WorkerId {
    /// The model name as passed to the backend (subprocess arg or API field).
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::GeminiFlash => "gemini-2.0-flash",
            Self::GeminiPro => "gemini-1.5-pro",
            Self::GeminiThinking => "gemini-2.0-flash-thinking",
            Self::QwenCoder7b => "qwen2.5-coder:7b-instruct-q4_K_M",
            Self::YiCoder9b => "yi-coder:9b-chat-q5_K_M",
            Self::QwenCoder14b => "qwen2.5-coder:14b-instruct-q5_K_M",
            Self::DiagnosticCritic => "qwen2.5-coder:14b-instruct-q5_K_M",
        }
    }

    /// All workers, in no particular priority order.
    pub fn all() -> &'static [WorkerId] {
        &[
            Self::GeminiFlash,
            Self::GeminiPro,
            Self::GeminiThinking,
            Self::QwenCoder7b,
            Self::YiCoder9b,
            Self::QwenCoder14b,
            Self::DiagnosticCritic,
        ]
    }

    /// Whether this is a budget-tier worker that would be a regretful pick
    /// for a genuinely complex task.
    pub fn is_budget_tier(&self) -> bool {
        matches!(self, Self::QwenCoder7b)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeminiFlash => write!(f, "gemini-flash"),
            Self::GeminiPro => write!(f, "gemini-pro"),
            Self::GeminiThinking => write!(f, "gemini-thinking"),
            Self::QwenCoder7b => write!(f, "qwen-coder-7b"),
            Self::YiCoder9b => write!(f, "yi-coder-9b"),
            Self::QwenCoder14b => write!(f, "qwen-coder-14b"),
            Self::DiagnosticCritic => write!(f, "diagnostic-critic"),
        }
    }
}

/// Static description of a worker: capabilities, priority, fallback, limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    pub kind: WorkerKind,
    /// Ordered capability tags, most specific first.
    pub capabilities: Vec<String>,
    /// 0–100; higher wins ties during substitution.
    pub priority: u8,
    /// Worker to substitute when this one's circuit is open.
    pub fallback: Option<WorkerId>,
    /// Maximum tokens the worker may emit.
    pub max_tokens: u32,
    /// Context window in tokens.
    pub context_window: u32,
}

impl WorkerDescriptor {
    /// Built-in descriptor for each known worker.
    pub fn for_worker(id: WorkerId) -> Self {
        let caps = |tags: &[&str]| tags.iter().map(|t| t.to_string()).collect();
        match id {
            WorkerId::GeminiFlash => Self {
                id,
                kind: WorkerKind::Cloud,
                capabilities: caps(&["syntax", "refactor", "generate", "test", "docs"]),
                priority: 90,
                fallback: Some(WorkerId::QwenCoder7b),
                max_tokens: 8_192,
                context_window: 32_768,
            },
            WorkerId::GeminiPro => Self {
                id,
                kind: WorkerKind::Cloud,
                capabilities: caps(&["architecture", "planning", "complex-prompts", "code"]),
                priority: 97,
                fallback: Some(WorkerId::GeminiFlash),
                max_tokens: 8_192,
                context_window: 1_000_000,
            },
            WorkerId::GeminiThinking => Self {
                id,
                kind: WorkerKind::Cloud,
                capabilities: caps(&[
                    "architecture",
                    "extreme-reasoning",
                    "planning",
                    "orchestration",
                ]),
                priority: 95,
                fallback: Some(WorkerId::GeminiPro),
                max_tokens: 8_192,
                context_window: 32_768,
            },
            WorkerId::QwenCoder7b => Self {
                id,
                kind: WorkerKind::Local,
                capabilities: caps(&["code", "syntax", "quick-fix", "offline"]),
                priority: 75,
                fallback: Some(WorkerId::GeminiFlash),
                max_tokens: 4_096,
                context_window: 4_096,
            },
            WorkerId::YiCoder9b => Self {
                id,
                kind: WorkerKind::Local,
                capabilities: caps(&["code", "web-dev", "refactor", "chat"]),
                priority: 70,
                fallback: Some(WorkerId::GeminiFlash),
                max_tokens: 8_192,
                context_window: 8_192,
            },
            WorkerId::QwenCoder14b => Self {
                id,
                kind: WorkerKind::Local,
                capabilities: caps(&["code", "architecture", "complex-reasoning", "orchestration"]),
                priority: 60,
                fallback: Some(WorkerId::GeminiThinking),
                max_tokens: 8_192,
                context_window: 16_384,
            },
            WorkerId::DiagnosticCritic => Self {
                id,
                kind: WorkerKind::Local,
                capabilities: caps(&["diagnostic", "error-tracking", "path-correction"]),
                priority: 100,
                fallback: Some(WorkerId::GeminiFlash),
                max_tokens: 4_096,
                context_window: 16_384,
            },
        }
    }
}

/// The full static catalog of workers.
#[derive(Debug, Clone)]
pub struct WorkerCatalog {
    entries: Vec<WorkerDescriptor>,
}

impl WorkerCatalog {
    /// Catalog pre-populated with every known worker.
    pub fn builtin() -> Self {
        Self {
            entries: WorkerId::all()
                .iter()
                .map(|&id| WorkerDescriptor::for_worker(id))
                .collect(),
        }
    }

    /// Catalog from explicit descriptors (for tests or custom deployments).
    pub fn from_descriptors(entries: Vec<WorkerDescriptor>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerDescriptor> {
        self.entries.iter()
    }

    /// The cloud worker with the largest context window, for overflow
    /// fallbacks.
    pub fn largest_context_cloud(&self) -> Option<&WorkerDescriptor> {
        self.entries
            .iter()
            .filter(|d| d.kind == WorkerKind::Cloud)
            .max_by_key(|d| d.context_window)
    }

    /// First cloud worker reachable from `id` via the fallback chain, else
    /// the highest-priority cloud worker in the catalog.
    pub fn cloud_fallback_for(&self, id: WorkerId) -> Option<WorkerId> {
        let mut cursor = self.get(id)?.fallback;
        let mut hops = 0;
        while let Some(next) = cursor {
            let desc = self.get(next)?;
            if desc.kind == WorkerKind::Cloud {
                return Some(next);
            }
            cursor = desc.fallback;
            hops += 1;
            if hops > self.entries.len() {
                break; // fallback cycle
            }
        }
        self.entries
            .iter()
            .filter(|d| d.kind == WorkerKind::Cloud)
            .max_by_key(|d| d.priority)
            .map(|d| d.id)
    }
}

/// Per-routing-call health snapshot for one worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerHealth {
    /// Whether the backend is reachable at all (binary present, key set).
    pub available: bool,
    /// Circuit level: −1 open, 0 degraded/half-open, 1 closed.
    pub circuit_level: Ternary,
}

/// Probe for raw worker availability, independent of circuit state.
///
/// Real deployments wire a probe that checks `ollama list` output or API-key
/// presence; the engine itself never shells out during routing.
pub trait AvailabilityProbe: Send + Sync {
    fn is_available(&self, descriptor: &WorkerDescriptor) -> bool;
}

/// Probe that reports every worker as present.
pub struct AlwaysAvailable;

impl AvailabilityProbe for AlwaysAvailable {
    fn is_available(&self, _descriptor: &WorkerDescriptor) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_all_workers() {
        let catalog = WorkerCatalog::builtin();
        for &id in WorkerId::all() {
            assert!(catalog.get(id).is_some(), "missing descriptor for {id}");
        }
    }

    #[test]
    fn test_fallbacks_resolve() {
        let catalog = WorkerCatalog::builtin();
        for desc in catalog.iter() {
            if let Some(fb) = desc.fallback {
                assert!(catalog.get(fb).is_some());
                assert_ne!(fb, desc.id);
            }
        }
    }

    #[test]
    fn test_largest_context_cloud_is_pro() {
        let catalog = WorkerCatalog::builtin();
        assert_eq!(
            catalog.largest_context_cloud().map(|d| d.id),
            Some(WorkerId::GeminiPro)
        );
    }

    #[test]
    fn test_cloud_fallback_walks_chain() {
        let catalog = WorkerCatalog::builtin();
        // qwen-14b falls back to gemini-thinking, which is already cloud.
        assert_eq!(
            catalog.cloud_fallback_for(WorkerId::QwenCoder14b),
            Some(WorkerId::GeminiThinking)
        );
        // qwen-7b falls straight to gemini-flash.
        assert_eq!(
            catalog.cloud_fallback_for(WorkerId::QwenCoder7b),
            Some(WorkerId::GeminiFlash)
        );
    }

    #[test]
    fn test_budget_tier() {
        assert!(WorkerId::QwenCoder7b.is_budget_tier());
        assert!(!WorkerId::GeminiPro.is_budget_tier());
    }
}
