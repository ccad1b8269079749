//! Analyzer: drives one backend across a criteria set.
//!
//! Criteria are evaluated sequentially in input order. The first backend
//! error aborts the run; there is no partial report and no retry.

use std::time::Instant;

use anyhow::Result;

use crate::model::{AcceptanceCriterion, TestArtifact};
use crate::report::QaReport;
use crate::traits::AnalysisBackend;

/// Header line placed above the appended recommendation block.
pub const UPDATE_HEADER: &str = "# Auto-updated checks from multimodal QA analysis";

/// Runs a backend over every criterion of a run.
pub struct QaAnalyzer {
    backend: Box<dyn AnalysisBackend>,
}

impl QaAnalyzer {
    pub fn new(backend: Box<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Evaluate every criterion against `artifact`, preserving input order.
    pub async fn analyze(
        &self,
        criteria: &[AcceptanceCriterion],
        artifact: &TestArtifact,
    ) -> Result<QaReport> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(criteria.len());

        for criterion in criteria {
            tracing::debug!(
                backend = self.backend.name(),
                criterion = %criterion.id,
                "evaluating criterion"
            );
            let result = self.backend.evaluate(criterion, artifact).await?;
            tracing::debug!(
                criterion = %criterion.id,
                status = %result.status,
                confidence = result.confidence,
                "criterion evaluated"
            );
            results.push(result);
        }

        let report = QaReport::new(results);
        tracing::info!(
            backend = self.backend.name(),
            artifact = %artifact.title,
            passed = report.passed(),
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(report)
    }
}

/// Append a recommendation block for `report` to a test-case document.
///
/// The baseline is trimmed at the end, followed by a blank line, the
/// [`UPDATE_HEADER`], and one `- [STATUS] id: recommendation` line per
/// result. The output always ends with exactly one newline.
pub fn update_test_cases(report: &QaReport, test_case_text: &str) -> String {
    let mut additions = Vec::with_capacity(report.results.len() + 1);
    additions.push(format!("\n{UPDATE_HEADER}"));
    for result in &report.results {
        additions.push(format!(
            "- [{}] {}: {}",
            result.status.to_string().to_uppercase(),
            result.criterion.id,
            single_line(&result.recommended_test_update),
        ));
    }
    format!("{}\n{}\n", test_case_text.trim_end(), additions.join("\n"))
}

/// Collapse whitespace runs (including newlines) to single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
