//! Execution plans: a goal decomposed into strictly-ordered steps.
//!
//! Steps run sequentially — step N+1 never starts before step N completes —
//! so file-context deltas stay causally consistent. There is no resumption:
//! a retry restarts the whole step, never a partial one.

use serde::{Deserialize, Serialize};

use crate::classifier::TaskCategory;
use crate::dispatch::ExecutionDispatcher;
use crate::error::EngineError;
use crate::sandbox::{CommandOutcome, Sandbox};
use crate::task::TaskRequest;
use crate::worker::WorkerId;

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    /// Gather information; no side effects expected.
    Research,
    /// Produce changes; generated commands run through the sandbox.
    Modify,
    /// Check the result of earlier steps.
    Verify,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Modify => write!(f, "modify"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub description: String,
    pub action: StepAction,
}

/// A high-level task decomposed into ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Single-step plan: go straight to implementation.
    pub fn direct(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: vec![PlanStep {
                id: 1,
                description: "Direct implementation".to_string(),
                action: StepAction::Modify,
            }],
        }
    }
}

/// Result of one executed step.
#[derive(Debug)]
pub struct StepOutcome {
    pub step_id: u32,
    pub action: StepAction,
    /// The worker's response text for this step.
    pub response: String,
    /// Sandboxed command outcomes, for Modify steps.
    pub commands: Vec<CommandOutcome>,
}

/// Runs a plan's steps strictly in order through the dispatcher and sandbox.
pub struct PlanRunner<'a> {
    dispatcher: &'a ExecutionDispatcher,
    sandbox: &'a Sandbox,
}

impl<'a> PlanRunner<'a> {
    pub fn new(dispatcher: &'a ExecutionDispatcher, sandbox: &'a Sandbox) -> Self {
        Self {
            dispatcher,
            sandbox,
        }
    }

    /// Execute every step in order on `worker`.
    ///
    /// Modify-step responses are scanned for fenced command blocks; each
    /// extracted command runs in the sandbox, sequentially. A command's own
    /// failure is recorded in the outcome, not raised — only dispatcher and
    /// sandbox-infrastructure errors abort the plan.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        worker: WorkerId,
    ) -> Result<Vec<StepOutcome>, EngineError> {
        let mut outcomes = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            tracing::info!(step = step.id, action = %step.action, "executing plan step");
            let prompt = format!(
                "GOAL: {}\n\nSTEP {} ({}): {}",
                plan.goal, step.id, step.action, step.description
            );
            let category = match step.action {
                StepAction::Research => TaskCategory::Docs,
                StepAction::Modify => TaskCategory::Generate,
                StepAction::Verify => TaskCategory::Test,
            };
            let reply = self
                .dispatcher
                .invoke(worker, &TaskRequest::new(prompt), Some(category))
                .await?;

            let mut commands = Vec::new();
            if step.action == StepAction::Modify {
                for command in Sandbox::extract_commands(&reply.text) {
                    let outcome = self.sandbox.execute(&command).await?;
                    if !outcome.success() {
                        tracing::warn!(
                            step = step.id,
                            command,
                            exit_code = outcome.exit_code,
                            "step command failed and was rolled back"
                        );
                    }
                    commands.push(outcome);
                }
            }

            outcomes.push(StepOutcome {
                step_id: step.id,
                action: step.action,
                response: reply.text,
                commands,
            });
        }
        Ok(outcomes)
    }
}
