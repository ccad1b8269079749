//! JSON input loaders.
//!
//! Loads the criteria set and the test artifact for a run.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AcceptanceCriterion, TestArtifact};

/// Intermediate structure for the criteria file.
#[derive(Debug, Deserialize)]
struct CriteriaFile {
    criteria: Vec<AcceptanceCriterion>,
}

/// Load criteria from a `{ "criteria": [ {id, statement}, ... ] }` file.
pub fn load_criteria(path: &Path) -> Result<Vec<AcceptanceCriterion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read criteria file: {}", path.display()))?;
    parse_criteria(&content)
        .with_context(|| format!("failed to parse criteria file: {}", path.display()))
}

/// Parse criteria from a JSON string.
pub fn parse_criteria(content: &str) -> Result<Vec<AcceptanceCriterion>> {
    let file: CriteriaFile = serde_json::from_str(content)?;

    let mut seen = HashSet::new();
    for criterion in &file.criteria {
        if !seen.insert(criterion.id.as_str()) {
            anyhow::bail!("duplicate criterion id: {}", criterion.id);
        }
    }

    tracing::debug!(count = file.criteria.len(), "loaded criteria");
    Ok(file.criteria)
}

/// Load a test artifact descriptor.
pub fn load_artifact(path: &Path) -> Result<TestArtifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read artifact file: {}", path.display()))?;
    let artifact: TestArtifact = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse artifact file: {}", path.display()))?;
    Ok(artifact)
}
