//! Ternary decision tree for complexity-based routing.
//!
//! The tree is plain data: branch nodes carry a *named* condition from a
//! closed enum, leaves name a worker. A pure recursive evaluator walks it,
//! collecting the path taken and a human-readable reason trail, so the tree
//! can be tested without any routing glue around it.

use crate::classifier::TaskCategory;
use crate::ternary::Ternary;
use crate::worker::WorkerId;

use super::RouteContext;

/// Branch condition, evaluated over the routing context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    /// The classifier's ternary complexity signal.
    Complexity,
    /// −1 when the syntax-category weight exceeds the threshold, else 0.
    SyntaxWeightAbove(f64),
    /// Aggregate circuit health bias across the worker grid.
    AggregateCircuitHealth,
    /// +1 when architecture or generate weight exceeds the threshold, else 0.
    ArchitectureOrGenerateAbove(f64),
}

impl Condition {
    pub fn eval(&self, ctx: &RouteContext) -> Ternary {
        match self {
            Self::Complexity => ctx.profile.complexity,
            Self::SyntaxWeightAbove(threshold) => {
                if ctx.profile.weight(TaskCategory::Syntax) > *threshold {
                    Ternary::Minus
                } else {
                    Ternary::Zero
                }
            }
            Self::AggregateCircuitHealth => ctx.health_bias,
            Self::ArchitectureOrGenerateAbove(threshold) => {
                let arch = ctx.profile.weight(TaskCategory::Architecture);
                let generate = ctx.profile.weight(TaskCategory::Generate);
                if arch > *threshold || generate > *threshold {
                    Ternary::Plus
                } else {
                    Ternary::Zero
                }
            }
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Complexity => "assess initial complexity state",
            Self::SyntaxWeightAbove(_) => "optimize for syntax probability",
            Self::AggregateCircuitHealth => "balance performance vs circuit health",
            Self::ArchitectureOrGenerateAbove(_) => "architecture and direct implementation",
        }
    }
}

/// A node in the ternary routing tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Branch {
        condition: Condition,
        left: Box<TreeNode>,
        center: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        worker: WorkerId,
    },
}

/// Result of evaluating the tree for one context.
#[derive(Debug, Clone)]
pub struct TreeOutcome {
    pub worker: WorkerId,
    /// Branch value taken at each level, root first.
    pub path: Vec<Ternary>,
    /// One reason line per branch traversed.
    pub reasons: Vec<String>,
}

impl TreeNode {
    pub fn leaf(worker: WorkerId) -> Self {
        Self::Leaf { worker }
    }

    pub fn branch(condition: Condition, left: TreeNode, center: TreeNode, right: TreeNode) -> Self {
        Self::Branch {
            condition,
            left: Box::new(left),
            center: Box::new(center),
            right: Box::new(right),
        }
    }

    /// The canonical routing tree.
    ///
    /// Root splits on complexity; the low branch optimizes for syntax fixes,
    /// the center branch hedges on fleet health, the high branch separates
    /// architecture-grade work from general generation.
    pub fn canonical() -> Self {
        use WorkerId::*;
        Self::branch(
            Condition::Complexity,
            Self::branch(
                Condition::SyntaxWeightAbove(0.6),
                Self::leaf(GeminiFlash),
                Self::leaf(QwenCoder7b),
                Self::leaf(GeminiFlash),
            ),
            Self::branch(
                Condition::AggregateCircuitHealth,
                Self::leaf(YiCoder9b),
                Self::leaf(GeminiFlash),
                Self::leaf(GeminiFlash),
            ),
            Self::branch(
                Condition::ArchitectureOrGenerateAbove(0.4),
                Self::leaf(QwenCoder14b),
                Self::leaf(GeminiThinking),
                Self::leaf(GeminiPro),
            ),
        )
    }

    /// Pure recursive evaluation: walk branches until a leaf names a worker.
    pub fn evaluate(&self, ctx: &RouteContext) -> TreeOutcome {
        let mut path = Vec::new();
        let mut reasons = Vec::new();
        let mut node = self;
        loop {
            match node {
                Self::Leaf { worker } => {
                    return TreeOutcome {
                        worker: *worker,
                        path,
                        reasons,
                    };
                }
                Self::Branch {
                    condition,
                    left,
                    center,
                    right,
                } => {
                    let value = condition.eval(ctx);
                    reasons.push(format!("{} [{}]", condition.describe(), value));
                    path.push(value);
                    node = match value {
                        Ternary::Minus => left,
                        Ternary::Zero => center,
                        Ternary::Plus => right,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classify, RegexClassifier};
    use crate::worker::{AlwaysAvailable, AvailabilityProbe, WorkerCatalog, WorkerHealth};

    fn ctx_for(prompt: &str, health_bias: Ternary) -> RouteContext {
        let catalog = WorkerCatalog::builtin();
        let probe = AlwaysAvailable;
        let grid = catalog
            .iter()
            .map(|d| {
                (
                    d.clone(),
                    WorkerHealth {
                        available: probe.is_available(d),
                        circuit_level: Ternary::Plus,
                    },
                )
            })
            .collect();
        RouteContext {
            prompt: prompt.to_string(),
            profile: RegexClassifier::new().analyze(prompt),
            grid,
            health_bias,
        }
    }

    #[test]
    fn test_low_complexity_syntax_goes_left_to_flash() {
        let ctx = ctx_for("fix syntax error in hello.ts", Ternary::Plus);
        let outcome = TreeNode::canonical().evaluate(&ctx);
        assert_eq!(outcome.worker, WorkerId::GeminiFlash);
        assert_eq!(outcome.path, vec![Ternary::Minus, Ternary::Minus]);
    }

    #[test]
    fn test_low_complexity_without_syntax_picks_small_local() {
        let ctx = ctx_for("hello there", Ternary::Plus);
        let outcome = TreeNode::canonical().evaluate(&ctx);
        assert_eq!(outcome.worker, WorkerId::QwenCoder7b);
        assert_eq!(outcome.path, vec![Ternary::Minus, Ternary::Zero]);
    }

    #[test]
    fn test_high_complexity_architecture_goes_top_tier() {
        let prompt = format!(
            "design a microservices architecture with a clean pattern {}",
            "word ".repeat(60)
        );
        let ctx = ctx_for(&prompt, Ternary::Plus);
        let outcome = TreeNode::canonical().evaluate(&ctx);
        assert_eq!(outcome.worker, WorkerId::GeminiPro);
        assert_eq!(outcome.path, vec![Ternary::Plus, Ternary::Plus]);
        assert_eq!(outcome.reasons.len(), 2);
    }

    #[test]
    fn test_neutral_complexity_degraded_fleet_picks_mid_local() {
        let ctx = ctx_for("sketch the system briefly", Ternary::Minus);
        let outcome = TreeNode::canonical().evaluate(&ctx);
        assert_eq!(outcome.worker, WorkerId::YiCoder9b);
        assert_eq!(outcome.path, vec![Ternary::Zero, Ternary::Minus]);
    }

    #[test]
    fn test_reason_trail_names_each_branch() {
        let ctx = ctx_for("fix syntax error in hello.ts", Ternary::Plus);
        let outcome = TreeNode::canonical().evaluate(&ctx);
        assert!(outcome.reasons[0].contains("complexity"));
        assert!(outcome.reasons[1].contains("syntax"));
    }
}
