//! Deterministic keyword-overlap backend.
//!
//! The offline "mock" backend: no model, no network. A criterion passes when
//! enough of its terms appear in the artifact's observed text or DOM.

use async_trait::async_trait;

use qa_automator_core::error::BackendError;
use qa_automator_core::model::{AcceptanceCriterion, CriterionResult, Status, TestArtifact};
use qa_automator_core::traits::AnalysisBackend;

pub const DEFAULT_PASS_THRESHOLD: f64 = 0.6;

/// Terms shorter than this are ignored ("a", "is", "to", ...).
const MIN_TERM_LEN: usize = 3;

const PASS_RECOMMENDATION: &str =
    "Keep existing assertions; add semantic snapshot checks for this flow.";
const FAIL_RECOMMENDATION: &str = "Update test case with outcome-oriented checks, and include missing user-visible behavior from acceptance criterion.";

/// Scores criteria by keyword overlap against the artifact text.
#[derive(Debug, Clone)]
pub struct KeywordBackend {
    pass_threshold: f64,
}

impl Default for KeywordBackend {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl KeywordBackend {
    /// Create a backend with a custom pass threshold in `[0, 1]`.
    pub fn new(pass_threshold: f64) -> Result<Self, BackendError> {
        if !(0.0..=1.0).contains(&pass_threshold) {
            return Err(BackendError::InvalidThreshold(pass_threshold));
        }
        Ok(Self { pass_threshold })
    }

    /// Judge a criterion synchronously.
    pub fn judge(&self, criterion: &AcceptanceCriterion, artifact: &TestArtifact) -> CriterionResult {
        let overlap = overlap(&criterion.statement, artifact);
        let score = overlap.unwrap_or(0.0);
        // A statement with no terms never passes, whatever the threshold.
        let passed = overlap.is_some_and(|s| s >= self.pass_threshold);

        CriterionResult {
            criterion: criterion.clone(),
            status: Status::from_passed(passed),
            confidence: (score * 1000.0).round() / 1000.0,
            reasoning: format!(
                "Matched {:.1}% of criterion terms against observed output using deterministic keyword scoring.",
                score * 100.0
            ),
            recommended_test_update: if passed {
                PASS_RECOMMENDATION.to_string()
            } else {
                FAIL_RECOMMENDATION.to_string()
            },
        }
    }
}

/// Lower-cased alphanumeric terms of `statement` long enough to count.
pub fn terms(statement: &str) -> Vec<String> {
    statement
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= MIN_TERM_LEN)
        .map(str::to_string)
        .collect()
}

/// Fraction of `statement`'s terms found in the artifact, in `[0, 1]`.
///
/// Returns 0 when the statement has no qualifying terms.
pub fn score(statement: &str, artifact: &TestArtifact) -> f64 {
    overlap(statement, artifact).unwrap_or(0.0)
}

fn overlap(statement: &str, artifact: &TestArtifact) -> Option<f64> {
    let terms = terms(statement);
    if terms.is_empty() {
        return None;
    }

    let haystack = format!("{} {}", artifact.observed_text, artifact.dom_snapshot).to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    Some(hits as f64 / terms.len() as f64)
}

#[async_trait]
impl AnalysisBackend for KeywordBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn evaluate(
        &self,
        criterion: &AcceptanceCriterion,
        artifact: &TestArtifact,
    ) -> anyhow::Result<CriterionResult> {
        Ok(self.judge(criterion, artifact))
    }
}
