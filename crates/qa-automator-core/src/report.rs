//! QA report type with JSON serialization.

use anyhow::{Context, Result};
use serde::ser::{Serialize, Serializer};

use crate::model::{CriterionResult, Status};

/// The ordered per-criterion judgments for one run.
///
/// Serializes as `{"results": [...]}` with one flat record per result.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QaReport {
    pub results: Vec<CriterionResult>,
}

/// Flat wire form of a [`CriterionResult`].
#[derive(serde::Serialize)]
struct ResultRecord<'a> {
    criterion_id: &'a str,
    statement: &'a str,
    status: Status,
    confidence: f64,
    reasoning: &'a str,
    recommended_test_update: &'a str,
}

impl Serialize for CriterionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultRecord {
            criterion_id: &self.criterion.id,
            statement: &self.criterion.statement,
            status: self.status,
            confidence: self.confidence,
            reasoning: &self.reasoning,
            recommended_test_update: &self.recommended_test_update,
        }
        .serialize(serializer)
    }
}

impl QaReport {
    pub fn new(results: Vec<CriterionResult>) -> Self {
        Self { results }
    }

    /// Number of criteria that passed.
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_pass()).count()
    }

    /// Number of criteria that failed.
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// Render as 2-space indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}
