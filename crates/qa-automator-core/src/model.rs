//! Core data model types for qa-automator.
//!
//! Criteria and artifacts are loaded once at the start of a run and never
//! mutated afterwards; results are produced one per criterion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One requirement taken from a user story or acceptance document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    /// Identifier, unique within a run (e.g. "AC-1").
    pub id: String,
    /// Natural-language statement of the expected behavior.
    pub statement: String,
}

impl AcceptanceCriterion {
    pub fn new(id: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
        }
    }
}

/// Evidence captured from a UI or API test run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestArtifact {
    /// Human-readable name of the run.
    pub title: String,
    /// Text observed on screen or in the response.
    pub observed_text: String,
    /// Serialized DOM captured at the end of the run.
    #[serde(default)]
    pub dom_snapshot: String,
    /// Optional screenshot file.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub screenshot_path: Option<PathBuf>,
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PathBuf::from))
}

/// Verdict for a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Status::Pass
        } else {
            Status::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Status::Pass
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "pass"),
            Status::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" => Ok(Status::Pass),
            "fail" => Ok(Status::Fail),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// A backend's judgment of one criterion against one artifact.
#[derive(Debug, Clone)]
pub struct CriterionResult {
    /// The criterion that was judged.
    pub criterion: AcceptanceCriterion,
    pub status: Status,
    /// Confidence in the verdict, in `[0, 1]`.
    pub confidence: f64,
    /// Why the backend reached this verdict.
    pub reasoning: String,
    /// Suggested change to the test case for this criterion.
    pub recommended_test_update: String,
}
