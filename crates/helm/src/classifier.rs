//! Task classification: category weights and the ternary complexity signal.
//!
//! Pure functions of the prompt text — no side effects, no I/O. The regex
//! implementation sits behind the [`Classify`] trait so the scoring can be
//! swapped or property-tested independently of the routing strategy chain.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ternary::Ternary;

/// Fixed task categories a prompt is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Architecture,
    Syntax,
    Refactor,
    Debug,
    Generate,
    Test,
    Docs,
    Orchestration,
    Diagnostic,
}

impl TaskCategory {
    pub fn all() -> &'static [TaskCategory] {
        &[
            Self::Architecture,
            Self::Syntax,
            Self::Refactor,
            Self::Debug,
            Self::Generate,
            Self::Test,
            Self::Docs,
            Self::Orchestration,
            Self::Diagnostic,
        ]
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Architecture => "architecture",
            Self::Syntax => "syntax",
            Self::Refactor => "refactor",
            Self::Debug => "debug",
            Self::Generate => "generate",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Orchestration => "orchestration",
            Self::Diagnostic => "diagnostic",
        };
        write!(f, "{name}")
    }
}

/// Result of classifying one prompt.
#[derive(Debug, Clone)]
pub struct TaskProfile {
    /// Per-category weight in [0, 1]; absent categories weigh 0.
    pub weights: HashMap<TaskCategory, f64>,
    /// Ternary complexity signal.
    pub complexity: Ternary,
    /// Word count of the (unwrapped) user intent.
    pub word_count: usize,
}

impl TaskProfile {
    pub fn weight(&self, category: TaskCategory) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.0)
    }

    /// The highest-weighted category, if any matched at all.
    pub fn dominant_category(&self) -> Option<TaskCategory> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(c, _)| *c)
    }
}

/// Classifier seam: prompt in, profile out.
pub trait Classify: Send + Sync {
    fn analyze(&self, prompt: &str) -> TaskProfile;
}

static CATEGORY_PATTERNS: LazyLock<Vec<(TaskCategory, Regex)>> = LazyLock::new(|| {
    let build = |pattern: &str| {
        Regex::new(&format!("(?i){pattern}")).expect("category pattern should compile")
    };
    vec![
        (
            TaskCategory::Orchestration,
            build(r"\b(wrangler|gcloud|gemini|github|api|deploy|cloud|cli)\b"),
        ),
        (
            TaskCategory::Architecture,
            build(r"\b(design|architect|system|microservice|pattern)\b"),
        ),
        (TaskCategory::Syntax, build(r"\b(fix|syntax|error|lint)\b")),
        (
            TaskCategory::Refactor,
            build(r"\b(refactor|optimize|clean)\b"),
        ),
        (TaskCategory::Debug, build(r"\b(debug|bug|crash|stack)\b")),
        (
            TaskCategory::Generate,
            build(r"\b(create|generate|build)\s+(app|project|website)\b"),
        ),
        (
            TaskCategory::Test,
            build(r"\b(test|spec|assert|verify)\b"),
        ),
        (
            TaskCategory::Docs,
            build(r"\b(document|comment|explain)\b"),
        ),
        (
            TaskCategory::Diagnostic,
            build(r"\b(diagnostic|critic|error-track|path-correction|analyze-error|health|status)\b"),
        ),
    ]
});

/// Tokens that mean the prompt already *is* code.
static CODE_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(function|class|const|let|var|if|return|while|for|switch)\b")
        .expect("code syntax pattern should compile")
});

/// System-prompt wrapper around the actual user intent.
static INTENT_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)### CURRENT USER INTENT\n(.*?)\n\n### EXECUTION DIRECTIVE")
        .expect("intent wrapper pattern should compile")
});

/// Regex-based classifier; the default implementation of [`Classify`].
#[derive(Debug, Default)]
pub struct RegexClassifier;

impl RegexClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Weight per category: 0 on no match, else `min(1.0, matches*2/10 + 0.5)`
    /// — a single match already yields 0.5, saturating at 1.0.
    fn category_weights(prompt: &str) -> HashMap<TaskCategory, f64> {
        let mut weights = HashMap::new();
        for (category, pattern) in CATEGORY_PATTERNS.iter() {
            let matches = pattern.find_iter(prompt).count();
            let weight = if matches == 0 {
                0.0
            } else {
                (matches as f64 * 2.0 / 10.0 + 0.5).min(1.0)
            };
            weights.insert(*category, weight);
        }
        weights
    }

    /// Ternary complexity: prompts that already contain code syntax are
    /// forced to −1; otherwise an additive score over length and the
    /// heavyweight categories decides.
    fn assess_complexity(
        intent: &str,
        word_count: usize,
        weights: &HashMap<TaskCategory, f64>,
    ) -> Ternary {
        if CODE_SYNTAX.is_match(intent) {
            return Ternary::Minus;
        }

        let weight = |c: TaskCategory| weights.get(&c).copied().unwrap_or(0.0);
        let mut score = 0u32;
        if word_count > 60 {
            score += 1;
        }
        if weight(TaskCategory::Architecture) > 0.5 {
            score += 2;
        }
        if weight(TaskCategory::Orchestration) > 0.5 {
            score += 2;
        }
        if weight(TaskCategory::Generate) > 0.5 {
            score += 2;
        }

        if score >= 3 {
            Ternary::Plus
        } else if score >= 1 {
            Ternary::Zero
        } else {
            Ternary::Minus
        }
    }

    /// Strip the system-prompt wrapper, if present, down to the user intent.
    fn unwrap_intent(prompt: &str) -> &str {
        INTENT_WRAPPER
            .captures(prompt)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(prompt)
    }
}

impl Classify for RegexClassifier {
    fn analyze(&self, prompt: &str) -> TaskProfile {
        let intent = Self::unwrap_intent(prompt).to_lowercase();
        let word_count = intent.split_whitespace().count();
        let weights = Self::category_weights(prompt);
        let complexity = Self::assess_complexity(&intent, word_count, &weights);
        TaskProfile {
            weights,
            complexity,
            word_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(prompt: &str) -> TaskProfile {
        RegexClassifier::new().analyze(prompt)
    }

    #[test]
    fn test_single_match_weighs_at_least_half() {
        let profile = analyze("fix the thing");
        assert!((profile.weight(TaskCategory::Syntax) - 0.7).abs() < 1e-9);
        assert_eq!(profile.weight(TaskCategory::Architecture), 0.0);
    }

    #[test]
    fn test_weight_saturates_at_one() {
        let profile = analyze("fix fix fix fix fix fix syntax error lint");
        assert_eq!(profile.weight(TaskCategory::Syntax), 1.0);
    }

    #[test]
    fn test_code_syntax_forces_minus_regardless_of_length() {
        let filler = "architecture design pattern system microservice ".repeat(20);
        let prompt = format!("{filler} function handle() return");
        let profile = analyze(&prompt);
        assert_eq!(profile.complexity, Ternary::Minus);
    }

    #[test]
    fn test_code_syntax_tokens_each_force_minus() {
        for token in ["function", "const", "if", "return", "class"] {
            let profile = analyze(&format!("please look at this {token} thing"));
            assert_eq!(profile.complexity, Ternary::Minus, "token {token}");
        }
    }

    #[test]
    fn test_architecture_prompt_scores_high() {
        // >60 words (+1) and architecture weight over 0.5 (+2) → score 3 → Plus.
        let prompt = format!(
            "design a microservices architecture with a clean pattern {}",
            "word ".repeat(60)
        );
        let profile = analyze(&prompt);
        assert_eq!(profile.complexity, Ternary::Plus);
    }

    #[test]
    fn test_plain_short_prompt_is_minus() {
        let profile = analyze("hello there");
        assert_eq!(profile.complexity, Ternary::Minus);
    }

    #[test]
    fn test_single_signal_is_zero() {
        // One architecture keyword, nothing else: score 2 → Zero.
        let profile = analyze("sketch the system briefly");
        assert_eq!(profile.complexity, Ternary::Zero);
    }

    #[test]
    fn test_wrapper_is_stripped_before_assessment() {
        let prompt = "### CURRENT USER INTENT\nhello there\n\n### EXECUTION DIRECTIVE\nconst x = 1; function f() {}";
        let profile = analyze(prompt);
        // Code tokens live only in the directive section; the intent is plain.
        assert_eq!(profile.complexity, Ternary::Minus); // short, zero score
        assert_eq!(profile.word_count, 2);
    }

    #[test]
    fn test_dominant_category() {
        let profile = analyze("refactor and clean and optimize the parser");
        assert_eq!(profile.dominant_category(), Some(TaskCategory::Refactor));
    }
}
