//! Content validation: an ordered pipeline of pattern-based validators.
//!
//! The pipeline is fail-fast — the first validator to reject wins and its
//! verdict is what the adversarial loop embeds in the rejection prompt.
//! Validators are pure pattern checks; anything needing a model belongs in
//! the critique pass, not here.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Why a validator rejected the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Name of the validator that rejected.
    pub validator: String,
    pub reason: String,
    /// The offending text, when a concrete pattern matched.
    pub pattern: Option<String>,
    pub suggestion: Option<String>,
}

/// Extra context handed to validators.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// File the content is destined for, when known.
    pub file_name: Option<String>,
}

/// A single content validator.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, output: &str, ctx: &ValidationContext) -> Result<(), ValidationFailure>;
}

/// Ordered validator pipeline; returns the first failure or success.
#[derive(Default)]
pub struct ValidationPipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the builtin validators: placeholder detection first,
    /// then layer-import rules.
    pub fn builtin(manifest: LayerManifest) -> Self {
        Self::new()
            .with(Box::new(PlaceholderValidator::new()))
            .with(Box::new(LayerImportValidator::new(manifest)))
    }

    pub fn with(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Run validators in order, short-circuiting on the first failure.
    pub fn validate(
        &self,
        output: &str,
        ctx: &ValidationContext,
    ) -> Result<(), ValidationFailure> {
        for validator in &self.validators {
            if let Err(failure) = validator.validate(output, ctx) {
                tracing::warn!(
                    validator = failure.validator,
                    reason = %failure.reason,
                    "content rejected"
                );
                return Err(failure);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

struct ForbiddenPattern {
    pattern: Regex,
    reason: &'static str,
    suggestion: &'static str,
}

static FORBIDDEN_PATTERNS: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    let build = |pattern: &str| Regex::new(pattern).expect("forbidden pattern should compile");
    vec![
        ForbiddenPattern {
            pattern: build(r"(?i)(?://|#|/\*).*(?:TODO|FIXME|HACK|XXX)"),
            reason: "contains placeholder comments (TODO/FIXME)",
            suggestion: "implement the logic fully or drop the marker",
        },
        ForbiddenPattern {
            pattern: build(r#"(?i)(?:unimplemented!|todo!)\s*\("#),
            reason: "contains an unimplemented/todo macro stub",
            suggestion: "replace the stub with a real implementation",
        },
        ForbiddenPattern {
            pattern: build(r#"(?i)throw\s+new\s+Error\(['"](?:not implemented|TODO)"#),
            reason: "detected a 'not implemented' error placeholder",
            suggestion: "implement the logic instead of throwing a placeholder",
        },
        ForbiddenPattern {
            pattern: build(r"(?i)mock(?:Data|User|Service|Response|Api)"),
            reason: "detected variables named 'mock*'",
            suggestion: "use real data structures and service instances",
        },
        ForbiddenPattern {
            pattern: build(r"(?i)//\s*etc\b"),
            reason: "detected an 'etc' comment indicating incomplete logic",
            suggestion: "complete the full list or logic sequence",
        },
        ForbiddenPattern {
            pattern: build(r"function\s+\w+\s*\([^)]*\)\s*\{\s*\}"),
            reason: "empty function body detected",
            suggestion: "every function needs a real implementation",
        },
    ]
});

/// Rejects unfinished-implementation markers: TODO comments, stub macros,
/// placeholder throws, mock names, empty bodies.
#[derive(Default)]
pub struct PlaceholderValidator;

impl PlaceholderValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Validator for PlaceholderValidator {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn validate(&self, output: &str, _ctx: &ValidationContext) -> Result<(), ValidationFailure> {
        for forbidden in FORBIDDEN_PATTERNS.iter() {
            if let Some(found) = forbidden.pattern.find(output) {
                return Err(ValidationFailure {
                    validator: self.name().to_string(),
                    reason: forbidden.reason.to_string(),
                    pattern: Some(found.as_str().to_string()),
                    suggestion: Some(forbidden.suggestion.to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Declared layer dependency rules: which layers each layer may import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerManifest {
    /// layer name → layers it is allowed to depend on.
    pub rules: HashMap<String, Vec<String>>,
}

impl LayerManifest {
    pub fn new(rules: HashMap<String, Vec<String>>) -> Self {
        Self { rules }
    }

    fn allows(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        self.rules
            .get(from)
            .map(|allowed| allowed.iter().any(|l| l == to))
            .unwrap_or(true) // layers without rules are unconstrained
    }
}

static IMPORT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+.*?from\s+['"]([^'"]+)['"]"#).expect("import pattern should compile")
});

static USE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"use\s+crate::(\w+)").expect("use pattern should compile")
});

static FILE_LAYER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"src/([^/]+)/").expect("file layer pattern should compile"));

/// Rejects imports that cross layers the manifest forbids.
pub struct LayerImportValidator {
    manifest: LayerManifest,
}

impl LayerImportValidator {
    pub fn new(manifest: LayerManifest) -> Self {
        Self { manifest }
    }

    fn current_layer(ctx: &ValidationContext) -> Option<String> {
        let file = ctx.file_name.as_deref()?;
        FILE_LAYER
            .captures(file)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
    }

    fn imported_layers(&self, output: &str) -> Vec<String> {
        let mut layers = Vec::new();
        for captures in IMPORT_PATH.captures_iter(output) {
            let path = &captures[1];
            for layer in self.manifest.rules.keys() {
                if path.contains(&format!("/{layer}/")) || path.contains(&format!("../{layer}/")) {
                    layers.push(layer.clone());
                }
            }
        }
        for captures in USE_PATH.captures_iter(output) {
            layers.push(captures[1].to_lowercase());
        }
        layers
    }
}

impl Validator for LayerImportValidator {
    fn name(&self) -> &'static str {
        "layer_import"
    }

    fn validate(&self, output: &str, ctx: &ValidationContext) -> Result<(), ValidationFailure> {
        let Some(current) = Self::current_layer(ctx) else {
            return Ok(()); // no file hint, nothing to enforce
        };
        for imported in self.imported_layers(output) {
            if self.manifest.rules.contains_key(&imported)
                && !self.manifest.allows(&current, &imported)
            {
                return Err(ValidationFailure {
                    validator: self.name().to_string(),
                    reason: format!(
                        "architectural violation: layer '{current}' may not depend on '{imported}'"
                    ),
                    pattern: Some(imported),
                    suggestion: Some(
                        "check the layer manifest for allowed dependencies".to_string(),
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> LayerManifest {
        let mut rules = HashMap::new();
        rules.insert("core".to_string(), vec![]);
        rules.insert("limbs".to_string(), vec!["core".to_string()]);
        LayerManifest::new(rules)
    }

    #[test]
    fn test_placeholder_rejects_todo_comment() {
        let validator = PlaceholderValidator::new();
        let result = validator.validate("fn x() {} // TODO: finish", &ValidationContext::default());
        let failure = result.unwrap_err();
        assert_eq!(failure.validator, "placeholder");
        assert!(failure.reason.contains("placeholder comments"));
        assert!(failure.pattern.is_some());
    }

    #[test]
    fn test_placeholder_rejects_stub_macro() {
        let validator = PlaceholderValidator::new();
        let result = validator.validate(
            "pub fn run() { unimplemented!(\"later\") }",
            &ValidationContext::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_placeholder_accepts_complete_code() {
        let validator = PlaceholderValidator::new();
        let code = "pub fn add(a: u32, b: u32) -> u32 { a + b }";
        assert!(validator
            .validate(code, &ValidationContext::default())
            .is_ok());
    }

    #[test]
    fn test_layer_import_rejects_forbidden_dependency() {
        let validator = LayerImportValidator::new(manifest());
        let ctx = ValidationContext {
            file_name: Some("src/core/router.ts".to_string()),
        };
        let output = "import { Limb } from '../limbs/media.js';";
        let failure = validator.validate(output, &ctx).unwrap_err();
        assert!(failure.reason.contains("'core' may not depend on 'limbs'"));
    }

    #[test]
    fn test_layer_import_allows_declared_dependency() {
        let validator = LayerImportValidator::new(manifest());
        let ctx = ValidationContext {
            file_name: Some("src/limbs/media.ts".to_string()),
        };
        let output = "import { Result } from '../core/models.js';";
        assert!(validator.validate(output, &ctx).is_ok());
    }

    #[test]
    fn test_layer_import_ignores_content_without_file_hint() {
        let validator = LayerImportValidator::new(manifest());
        let output = "import { Limb } from '../limbs/media.js';";
        assert!(validator
            .validate(output, &ValidationContext::default())
            .is_ok());
    }

    #[test]
    fn test_pipeline_short_circuits_on_first_failure() {
        // Content that trips both validators must report only the first.
        let pipeline = ValidationPipeline::builtin(manifest());
        let ctx = ValidationContext {
            file_name: Some("src/core/router.ts".to_string()),
        };
        let output = "// TODO: wire this up\nimport { Limb } from '../limbs/media.js';";
        let failure = pipeline.validate(output, &ctx).unwrap_err();
        assert_eq!(failure.validator, "placeholder");
        assert!(failure.reason.contains("placeholder comments"));
    }

    #[test]
    fn test_pipeline_passes_clean_content() {
        let pipeline = ValidationPipeline::builtin(manifest());
        let output = "export function add(a: number, b: number) { return a + b; }";
        assert!(pipeline.validate(output, &ValidationContext::default()).is_ok());
    }
}
