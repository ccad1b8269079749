//! The scoring backend trait.
//!
//! Implemented by the keyword and Ollama backends in
//! `qa-automator-backends`. Adding a backend means implementing this trait;
//! the analyzer never inspects which backend it holds.

use async_trait::async_trait;

use crate::model::{AcceptanceCriterion, CriterionResult, TestArtifact};

/// A strategy that judges one criterion against one artifact.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short backend name (e.g. "mock", "ollama").
    fn name(&self) -> &str;

    /// Judge `criterion` against `artifact`.
    ///
    /// Errors abort the whole run; recoverable problems such as malformed
    /// model output should be folded into a failing result instead.
    async fn evaluate(
        &self,
        criterion: &AcceptanceCriterion,
        artifact: &TestArtifact,
    ) -> anyhow::Result<CriterionResult>;
}
