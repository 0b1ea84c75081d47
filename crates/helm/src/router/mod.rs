//! Routing engine: an ordered strategy chain over a ternary decision tree.
//!
//! Strategies are evaluated in fixed order and the first conclusive decision
//! wins:
//!
//! ```text
//! Strategy        | Handles
//! ----------------|-----------------------------------------------
//! Override        | short diagnostic prompts, high-certainty intents
//! ComplexityTree  | everything with a meaningful complexity signal
//! Fallback        | sentinel — never decides, caller uses default
//! ```
//!
//! After a decision the circuit breaker gets the last word: an open,
//! still-cooling worker is substituted by its configured fallback or the
//! first available healthy worker.

pub mod tree;

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::breaker::{CircuitRegistry, CircuitState};
use crate::classifier::{Classify, RegexClassifier, TaskCategory, TaskProfile};
use crate::error::EngineError;
use crate::task::TaskRequest;
use crate::ternary::Ternary;
use crate::worker::{
    AlwaysAvailable, AvailabilityProbe, WorkerCatalog, WorkerDescriptor, WorkerHealth, WorkerId,
};

pub use tree::{Condition, TreeNode, TreeOutcome};

/// Everything a strategy may look at when deciding.
#[derive(Debug, Clone)]
pub struct RouteContext {
    /// The raw prompt text.
    pub prompt: String,
    /// Classifier output for the prompt.
    pub profile: TaskProfile,
    /// Per-worker descriptor + health snapshot, recomputed for this call.
    pub grid: Vec<(WorkerDescriptor, WorkerHealth)>,
    /// Aggregate circuit health bias across the fleet.
    pub health_bias: Ternary,
}

impl RouteContext {
    fn is_available(&self, worker: WorkerId) -> bool {
        self.grid
            .iter()
            .any(|(d, h)| d.id == worker && h.available)
    }
}

/// A routing decision with its explainability data.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub worker: WorkerId,
    /// Ternary value taken at each branch of the decision path.
    pub path: Vec<Ternary>,
    /// Human-readable reason trail.
    pub reasons: Vec<String>,
    /// Confidence in the pick, 0–1.
    pub confidence: f64,
    /// Likelihood a better worker was skipped, 0–1.
    pub regret: f64,
}

/// One link of the strategy chain.
pub trait RoutingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// `None` means "no opinion" — the chain moves on.
    fn decide(&self, ctx: &RouteContext) -> Option<RoutingDecision>;
}

static SHORT_DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(health|status|audit)\b").expect("diagnostic pattern should compile")
});

/// Strategy 1: direct mapping for high-certainty intents.
pub struct OverrideStrategy;

impl RoutingStrategy for OverrideStrategy {
    fn name(&self) -> &'static str {
        "override"
    }

    fn decide(&self, ctx: &RouteContext) -> Option<RoutingDecision> {
        // Short diagnostic prompts go straight to the cheapest worker.
        if ctx.profile.word_count < 15 && SHORT_DIAGNOSTIC.is_match(&ctx.prompt) {
            return Some(RoutingDecision {
                worker: WorkerId::GeminiFlash,
                path: vec![Ternary::Minus],
                reasons: vec!["override: short diagnostic task".to_string()],
                confidence: 1.0,
                regret: 0.01,
            });
        }

        // Strongly diagnostic prompts get the dedicated critic.
        if ctx.profile.weight(TaskCategory::Diagnostic) > 0.7 {
            return Some(RoutingDecision {
                worker: WorkerId::DiagnosticCritic,
                path: vec![Ternary::Plus],
                reasons: vec!["override: high diagnostic probability".to_string()],
                confidence: 0.9,
                regret: 0.05,
            });
        }

        None
    }
}

/// Strategy 2: the ternary complexity tree.
pub struct ComplexityTreeStrategy {
    tree: TreeNode,
}

impl ComplexityTreeStrategy {
    pub fn new(tree: TreeNode) -> Self {
        Self { tree }
    }

    pub fn canonical() -> Self {
        Self::new(TreeNode::canonical())
    }
}

impl RoutingStrategy for ComplexityTreeStrategy {
    fn name(&self) -> &'static str {
        "complexity_tree"
    }

    fn decide(&self, ctx: &RouteContext) -> Option<RoutingDecision> {
        let outcome = self.tree.evaluate(ctx);
        let center_hops = outcome.path.iter().filter(|t| t.is_center()).count();
        let confidence = 1.0 - 0.2 * center_hops as f64;
        let regret = if ctx.profile.complexity == Ternary::Plus
            && outcome.worker.is_budget_tier()
        {
            0.8
        } else {
            0.1
        };
        let reasons = if outcome.reasons.is_empty() {
            vec![format!("defaulted to leaf: {}", outcome.worker)]
        } else {
            outcome.reasons
        };
        Some(RoutingDecision {
            worker: outcome.worker,
            path: outcome.path,
            reasons,
            confidence,
            regret,
        })
    }
}

/// Strategy 3: terminal sentinel. Never decides; its presence marks the end
/// of the chain so the engine falls back to the default worker.
pub struct FallbackStrategy;

impl RoutingStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn decide(&self, _ctx: &RouteContext) -> Option<RoutingDecision> {
        None
    }
}

/// The routing engine: classifier + health grid + strategy chain + breaker
/// substitution.
pub struct RoutingEngine {
    catalog: WorkerCatalog,
    registry: Arc<CircuitRegistry>,
    classifier: Box<dyn Classify>,
    probe: Box<dyn AvailabilityProbe>,
    strategies: Vec<Box<dyn RoutingStrategy>>,
    default_worker: WorkerId,
}

impl RoutingEngine {
    /// Engine with the canonical strategy chain and regex classifier.
    pub fn new(catalog: WorkerCatalog, registry: Arc<CircuitRegistry>) -> Self {
        Self {
            catalog,
            registry,
            classifier: Box::new(RegexClassifier::new()),
            probe: Box::new(AlwaysAvailable),
            strategies: vec![
                Box::new(OverrideStrategy),
                Box::new(ComplexityTreeStrategy::canonical()),
                Box::new(FallbackStrategy),
            ],
            default_worker: WorkerId::GeminiFlash,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classify>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn AvailabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_default_worker(mut self, worker: WorkerId) -> Self {
        self.default_worker = worker;
        self
    }

    /// Pick a worker for `task`.
    ///
    /// Fails only when no worker is usable at all: either nothing is
    /// available on the grid, or the chosen circuit is open with no
    /// resolvable substitute.
    pub fn route(&self, task: &TaskRequest) -> Result<RoutingDecision, EngineError> {
        let profile = self.classifier.analyze(&task.prompt);

        let grid: Vec<(WorkerDescriptor, WorkerHealth)> = self
            .catalog
            .iter()
            .map(|d| {
                let health = WorkerHealth {
                    available: self.probe.is_available(d),
                    circuit_level: self.registry.circuit_level(d.id),
                };
                (d.clone(), health)
            })
            .collect();

        if !grid.iter().any(|(_, h)| h.available) {
            return Err(EngineError::WorkerUnavailable(
                "no functional workers found; check local backends and API keys".to_string(),
            ));
        }

        let worker_ids: Vec<WorkerId> = grid.iter().map(|(d, _)| d.id).collect();
        let ctx = RouteContext {
            prompt: task.prompt.clone(),
            profile,
            health_bias: self.registry.health_bias(&worker_ids),
            grid,
        };

        let mut decision = self
            .strategies
            .iter()
            .find_map(|s| {
                let d = s.decide(&ctx)?;
                tracing::debug!(strategy = s.name(), worker = %d.worker, "strategy decided");
                Some(d)
            })
            .unwrap_or_else(|| RoutingDecision {
                worker: self.default_worker,
                path: Vec::new(),
                reasons: vec!["no strategy decided; using default worker".to_string()],
                confidence: 0.5,
                regret: 0.1,
            });

        let substituted = self.apply_circuit_breaker(decision.worker, &ctx)?;
        if substituted != decision.worker {
            decision.reasons.push(format!(
                "circuit open for {}; substituted {}",
                decision.worker, substituted
            ));
            decision.worker = substituted;
        }

        tracing::info!(
            worker = %decision.worker,
            confidence = decision.confidence,
            regret = decision.regret,
            reason = %decision.reasons.join(" -> "),
            "routing decision"
        );
        Ok(decision)
    }

    /// Binary collapse: an open, still-cooling circuit forces a substitute.
    fn apply_circuit_breaker(
        &self,
        worker: WorkerId,
        ctx: &RouteContext,
    ) -> Result<WorkerId, EngineError> {
        // Querying the state here is what lazily promotes Open → HalfOpen
        // once the cooldown has elapsed; a half-open worker is allowed one
        // trial call, so only a hard Open triggers substitution.
        if self.registry.state(worker) != CircuitState::Open {
            return Ok(worker);
        }

        let configured = self
            .catalog
            .get(worker)
            .and_then(|d| d.fallback)
            .filter(|&fb| {
                ctx.is_available(fb) && self.registry.state(fb) != CircuitState::Open
            });
        if let Some(fb) = configured {
            return Ok(fb);
        }

        ctx.grid
            .iter()
            .filter(|(d, h)| {
                d.id != worker && h.available && self.registry.state(d.id) != CircuitState::Open
            })
            .max_by_key(|(d, _)| d.priority)
            .map(|(d, _)| d.id)
            .ok_or(EngineError::CircuitOpen { worker })
    }
}
