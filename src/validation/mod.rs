//! Chain validation: arithmetic re-evaluation, external fact checks,
//! cross-source consistency and reasoning-chain strength.

mod checks;
mod expr;

pub use checks::*;
pub use expr::{evaluate, ExprError};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::RequestConfig;
use crate::error::AppError;
use crate::reasoning::ReasoningResult;
use crate::retry::{retry_with_backoff, RetryError};

/// Absolute tolerance for arithmetic comparison.
const MATH_TOLERANCE: f64 = 1e-9;
/// Added to cross-source consistency before capping at 1.0.
const CROSS_SOURCE_BOOST: f64 = 0.3;
/// Every chain step must exceed this to be consistent.
const STEP_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Mean chain confidence must exceed this to be valid.
const CHAIN_VALIDITY_THRESHOLD: f64 = 0.75;

/// Which check produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// Arithmetic re-evaluation.
    Mathematical,
    /// External fact-check service.
    ExternalFact,
    /// Consistency across sources.
    CrossSource,
    /// Strength of a reasoning chain.
    ReasoningChain,
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Which check ran.
    #[serde(rename = "validation_type")]
    pub kind: ValidationKind,
    /// Inputs checked and derived values.
    pub inputs: serde_json::Value,
    /// Whether the check passed.
    pub is_valid: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Chain-level consistency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_consistent: Option<bool>,
    /// Failure description when the check could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn new(kind: ValidationKind, inputs: serde_json::Value, is_valid: bool, confidence: f64) -> Self {
        Self {
            kind,
            inputs,
            is_valid,
            confidence: confidence.clamp(0.0, 1.0),
            is_consistent: None,
            error: None,
        }
    }

    fn failed(kind: ValidationKind, inputs: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(kind, inputs, false, 0.0)
        }
    }
}

/// One link of a reasoning chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReasoningStep {
    /// A reasoning result.
    Reasoning(ReasoningResult),
    /// A validation result.
    Validation(ValidationResult),
}

impl ReasoningStep {
    /// Confidence of the step.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Reasoning(r) => r.confidence,
            Self::Validation(v) => v.confidence,
        }
    }
}

impl From<ReasoningResult> for ReasoningStep {
    fn from(result: ReasoningResult) -> Self {
        Self::Reasoning(result)
    }
}

impl From<ValidationResult> for ReasoningStep {
    fn from(result: ValidationResult) -> Self {
        Self::Validation(result)
    }
}

/// Checker table covering every [`FactCategory`].
#[derive(Clone)]
pub struct FactCheckers {
    /// Sanctions-list membership.
    pub sanctions: Arc<dyn FactChecker>,
    /// Regulatory filings.
    pub regulatory_filing: Arc<dyn FactChecker>,
    /// Everything else.
    pub generic: Arc<dyn FactChecker>,
}

impl FactCheckers {
    /// Default checkers with the given sanctions list.
    pub fn with_sanctions_list(entries: &[String]) -> Self {
        Self {
            sanctions: Arc::new(SanctionsListCheck::new(entries)),
            regulatory_filing: Arc::new(RegulatoryFilingCheck),
            generic: Arc::new(GenericCheck),
        }
    }

    /// Checker responsible for a category.
    pub fn for_category(&self, category: FactCategory) -> &dyn FactChecker {
        match category {
            FactCategory::Sanctions => self.sanctions.as_ref(),
            FactCategory::RegulatoryFiling => self.regulatory_filing.as_ref(),
            FactCategory::Generic => self.generic.as_ref(),
        }
    }
}

impl Default for FactCheckers {
    fn default() -> Self {
        Self::with_sanctions_list(&[])
    }
}

/// Runs validations and records each outcome in a per-instance history.
pub struct ChainValidator {
    checkers: FactCheckers,
    request_config: RequestConfig,
    history: Mutex<Vec<ValidationResult>>,
}

impl ChainValidator {
    /// Create a validator.
    pub fn new(checkers: FactCheckers, request_config: RequestConfig) -> Self {
        Self {
            checkers,
            request_config,
            history: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, result: ValidationResult) -> ValidationResult {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result.clone());
        result
    }

    /// Snapshot of every validation run so far.
    pub fn validation_history(&self) -> Vec<ValidationResult> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-evaluate `expression` and compare it with `expected`.
    ///
    /// Evaluation failures produce an invalid result carrying the error text.
    pub fn validate_mathematical(&self, expression: &str, expected: f64) -> ValidationResult {
        let result = match evaluate(expression) {
            Ok(actual) => {
                let is_valid = (actual - expected).abs() <= MATH_TOLERANCE;
                ValidationResult::new(
                    ValidationKind::Mathematical,
                    json!({
                        "expression": expression,
                        "expected_result": expected,
                        "actual_result": actual,
                    }),
                    is_valid,
                    if is_valid { 1.0 } else { 0.0 },
                )
            }
            Err(e) => {
                debug!(expression = %expression, error = %e, "Expression evaluation failed");
                ValidationResult::failed(
                    ValidationKind::Mathematical,
                    json!({
                        "expression": expression,
                        "expected_result": expected,
                    }),
                    format!("Computation error: {}", e),
                )
            }
        };
        self.record(result)
    }

    /// Dispatch a fact to the checker for its category.
    ///
    /// Each attempt is bounded by the request timeout; once retries are
    /// exhausted the result is invalid with zero confidence.
    pub async fn validate_external_fact(
        &self,
        fact: &str,
        category: FactCategory,
    ) -> ValidationResult {
        let checker = self.checkers.for_category(category);
        let inputs = json!({ "fact": fact, "category": category });

        let outcome = retry_with_backoff(
            &self.request_config,
            "fact check",
            move || checker.check(fact),
            |_| false,
        )
        .await;

        let (last_error, retries) = match outcome {
            Ok(verdict) => {
                debug!(
                    category = %category,
                    is_valid = verdict.is_valid,
                    confidence = verdict.confidence,
                    "Fact checked"
                );
                return self.record(ValidationResult::new(
                    ValidationKind::ExternalFact,
                    inputs,
                    verdict.is_valid,
                    verdict.confidence,
                ));
            }
            Err(RetryError::Permanent(e)) => (e.to_string(), 0),
            Err(RetryError::Exhausted {
                last_error,
                retries,
            }) => (last_error, retries),
        };

        let error = AppError::Validation {
            field: "fact".to_string(),
            reason: format!(
                "{} check failed after {} retries: {}",
                category, retries, last_error
            ),
        };
        warn!(category = %category, error = %error, "Fact check exhausted retries");
        self.record(ValidationResult::failed(
            ValidationKind::ExternalFact,
            inputs,
            error.to_string(),
        ))
    }

    /// Consistency of claimed facts across sources: `|unique| / |total|`.
    pub fn cross_validate(&self, facts: &[String], sources: &[String]) -> ValidationResult {
        let unique: HashSet<&str> = facts.iter().map(String::as_str).collect();
        let consistency = if facts.is_empty() {
            0.0
        } else {
            unique.len() as f64 / facts.len() as f64
        };
        // An empty fact set carries no evidence either way.
        let confidence = if facts.is_empty() {
            0.0
        } else {
            (consistency + CROSS_SOURCE_BOOST).min(1.0)
        };

        self.record(ValidationResult::new(
            ValidationKind::CrossSource,
            json!({
                "facts": facts,
                "sources": sources,
                "consistency_score": consistency,
            }),
            consistency > 0.5,
            confidence,
        ))
    }

    /// Strength of an ordered chain of reasoning and validation results.
    pub fn validate_reasoning_chain(&self, steps: &[ReasoningStep]) -> ValidationResult {
        let confidences: Vec<f64> = steps.iter().map(ReasoningStep::confidence).collect();
        let average = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        let is_consistent = !confidences.is_empty()
            && confidences.iter().all(|&c| c > STEP_CONFIDENCE_THRESHOLD);
        let is_valid = is_consistent && average > CHAIN_VALIDITY_THRESHOLD;

        info!(
            steps = steps.len(),
            average_confidence = average,
            is_consistent,
            is_valid,
            "Reasoning chain validated"
        );

        let mut result = ValidationResult::new(
            ValidationKind::ReasoningChain,
            json!({
                "step_confidences": confidences,
                "average_confidence": average,
            }),
            is_valid,
            if is_consistent { average } else { 0.0 },
        );
        result.is_consistent = Some(is_consistent);
        self.record(result)
    }
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new(FactCheckers::default(), RequestConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn step(confidence: f64) -> ReasoningStep {
        ReasoningResult::fallback("x", confidence).into()
    }

    fn fast_config(max_retries: u32) -> RequestConfig {
        RequestConfig {
            timeout_ms: 50,
            max_retries,
            retry_delay_ms: 1,
        }
    }

    #[test]
    fn test_mathematical_match() {
        let validator = ChainValidator::default();
        let result = validator.validate_mathematical("(2 + 3) * 4", 20.0);
        assert!(result.is_valid);
        assert_eq!(result.confidence, 1.0);

        let result = validator.validate_mathematical("0.1 + 0.2", 0.3);
        assert!(result.is_valid);
    }

    #[test]
    fn test_mathematical_mismatch() {
        let validator = ChainValidator::default();
        let result = validator.validate_mathematical("2 + 2", 5.0);
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_mathematical_malformed_expression() {
        let validator = ChainValidator::default();
        let result = validator.validate_mathematical("1 / 0", 0.0);
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.unwrap().starts_with("Computation error"));
    }

    #[test]
    fn test_mathematical_deep_nesting_is_rejected() {
        let validator = ChainValidator::default();
        let expression = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let result = validator.validate_mathematical(&expression, 1.0);

        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        let error = result.error.unwrap();
        assert!(error.starts_with("Computation error"));
        assert!(error.contains("nested deeper"));
    }

    #[test]
    fn test_cross_validation() {
        let validator = ChainValidator::default();
        let facts: Vec<String> = ["a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        let result = validator.cross_validate(&facts, &["wiki".to_string()]);
        assert!(result.is_valid);
        assert!((result.confidence - 1.0).abs() < 1e-12);

        let facts: Vec<String> = ["a", "a", "a", "a"].iter().map(|s| s.to_string()).collect();
        let result = validator.cross_validate(&facts, &[]);
        assert!(!result.is_valid);
        assert!((result.confidence - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_cross_validation_empty() {
        let validator = ChainValidator::default();
        let result = validator.cross_validate(&[], &[]);
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_empty_chain() {
        let validator = ChainValidator::default();
        let result = validator.validate_reasoning_chain(&[]);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_valid);
        assert_eq!(result.is_consistent, Some(false));
    }

    #[test]
    fn test_strong_chain() {
        let validator = ChainValidator::default();
        let result = validator.validate_reasoning_chain(&[step(0.9), step(0.95)]);
        assert_eq!(result.is_consistent, Some(true));
        assert!(result.is_valid);
        assert!((result.confidence - 0.925).abs() < 1e-12);
    }

    #[test]
    fn test_weak_step_zeroes_chain() {
        let validator = ChainValidator::default();
        for chain in [
            vec![step(0.7)],
            vec![step(0.95), step(0.5)],
            vec![step(0.2), step(0.6), step(0.7)],
        ] {
            let result = validator.validate_reasoning_chain(&chain);
            assert_eq!(result.confidence, 0.0);
            assert!(!result.is_valid);
        }

        let result = validator.validate_reasoning_chain(&[step(0.1), step(0.3)]);
        assert_eq!(result.is_consistent, Some(false));
    }

    #[test]
    fn test_consistent_but_not_valid() {
        let validator = ChainValidator::default();
        let result = validator.validate_reasoning_chain(&[step(0.72), step(0.74)]);
        assert_eq!(result.is_consistent, Some(true));
        assert!(!result.is_valid);
        assert!((result.confidence - 0.73).abs() < 1e-12);
    }

    #[test]
    fn test_history_records_every_validation() {
        let validator = ChainValidator::default();
        validator.validate_mathematical("1 + 1", 2.0);
        validator.cross_validate(&["a".to_string()], &[]);
        validator.validate_reasoning_chain(&[]);

        let kinds: Vec<_> = validator.validation_history().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationKind::Mathematical,
                ValidationKind::CrossSource,
                ValidationKind::ReasoningChain
            ]
        );
    }

    #[tokio::test]
    async fn test_external_fact_dispatches_by_category() {
        let validator = ChainValidator::new(
            FactCheckers::with_sanctions_list(&["Acme Shipping".to_string()]),
            fast_config(0),
        );

        let result = validator
            .validate_external_fact("Funds sent to Acme Shipping", FactCategory::Sanctions)
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.95);

        let result = validator
            .validate_external_fact("Annual report filed", FactCategory::RegulatoryFiling)
            .await;
        assert!(result.is_valid);
        assert_eq!(result.confidence, 0.9);

        let result = validator
            .validate_external_fact("Water is wet", FactCategory::Generic)
            .await;
        assert_eq!(result.confidence, 0.8);
    }

    struct FlakyCheck {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl FactChecker for FlakyCheck {
        async fn check(&self, _fact: &str) -> AppResult<FactVerdict> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::pipeline("service unavailable"));
            }
            Ok(FactVerdict {
                is_valid: true,
                confidence: 0.85,
            })
        }
    }

    struct HangingCheck;

    #[async_trait]
    impl FactChecker for HangingCheck {
        async fn check(&self, _fact: &str) -> AppResult<FactVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(FactVerdict {
                is_valid: true,
                confidence: 1.0,
            })
        }
    }

    #[tokio::test]
    async fn test_external_fact_retries_then_succeeds() {
        let checkers = FactCheckers {
            generic: Arc::new(FlakyCheck {
                failures_left: AtomicU32::new(2),
            }),
            ..FactCheckers::default()
        };
        let validator = ChainValidator::new(checkers, fast_config(2));

        let result = validator
            .validate_external_fact("anything", FactCategory::Generic)
            .await;
        assert!(result.is_valid);
        assert_eq!(result.confidence, 0.85);
    }

    #[tokio::test]
    async fn test_external_fact_exhausted_retries() {
        let checkers = FactCheckers {
            regulatory_filing: Arc::new(HangingCheck),
            ..FactCheckers::default()
        };
        let validator = ChainValidator::new(checkers, fast_config(1));

        let result = validator
            .validate_external_fact("10-K", FactCategory::RegulatoryFiling)
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.unwrap().contains("timed out"));
    }
}
