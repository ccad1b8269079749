//! Backend configuration and factory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qa_automator_core::traits::AnalysisBackend;

use crate::keyword::{KeywordBackend, DEFAULT_PASS_THRESHOLD};
use crate::ollama::{OllamaBackend, PromptLimits};

/// Which scoring strategy to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic keyword overlap, fully offline.
    #[default]
    Mock,
    /// A local model served by Ollama.
    Ollama,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mock => write!(f, "mock"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" | "keyword" => Ok(BackendKind::Mock),
            "ollama" => Ok(BackendKind::Ollama),
            other => Err(format!("unknown backend: {other} (expected mock or ollama)")),
        }
    }
}

/// Settings for the keyword backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockSettings {
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
        }
    }
}

fn default_pass_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD
}

/// Settings for the Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Max DOM snapshot characters sent in the prompt.
    #[serde(default = "default_dom_snapshot_limit")]
    pub dom_snapshot_limit: usize,
    /// Max base64 screenshot characters sent in the prompt.
    #[serde(default = "default_image_prefix_limit")]
    pub image_prefix_limit: usize,
}

impl OllamaSettings {
    pub fn prompt_limits(&self) -> PromptLimits {
        PromptLimits {
            dom_snapshot_chars: self.dom_snapshot_limit,
            image_prefix_chars: self.image_prefix_limit,
        }
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            timeout_secs: default_timeout_secs(),
            dom_snapshot_limit: default_dom_snapshot_limit(),
            image_prefix_limit: default_image_prefix_limit(),
        }
    }
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_dom_snapshot_limit() -> usize {
    PromptLimits::default().dom_snapshot_chars
}
fn default_image_prefix_limit() -> usize {
    PromptLimits::default().image_prefix_chars
}

/// Top-level qa-automator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaAutomatorConfig {
    /// Backend used when `--backend` is not given.
    #[serde(default)]
    pub default_backend: BackendKind,
    #[serde(default)]
    pub mock: MockSettings,
    #[serde(default)]
    pub ollama: OllamaSettings,
}

impl QaAutomatorConfig {
    /// Reject settings the selected backend could not run with.
    ///
    /// Ollama settings are only checked when Ollama is the default backend.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.mock.pass_threshold),
            "mock.pass_threshold must be between 0.0 and 1.0, got {}",
            self.mock.pass_threshold
        );
        if self.default_backend == BackendKind::Ollama {
            anyhow::ensure!(
                self.ollama.timeout_secs >= 1,
                "ollama.timeout_secs must be at least 1"
            );
            anyhow::ensure!(!self.ollama.host.is_empty(), "ollama.host must not be empty");
            anyhow::ensure!(
                !self.ollama.model.is_empty(),
                "ollama.model must not be empty"
            );
        }
        Ok(())
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Apply `QA_AUTOMATOR_OLLAMA_*` overrides using `lookup` to read variables.
fn apply_env_overrides(config: &mut QaAutomatorConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("QA_AUTOMATOR_OLLAMA_HOST") {
        config.ollama.host = host;
    }
    if let Some(model) = lookup("QA_AUTOMATOR_OLLAMA_MODEL") {
        config.ollama.model = model;
    }
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order when `path` is `None`:
/// 1. `qa-automator.toml` in the current directory
/// 2. `~/.config/qa-automator/config.toml`
///
/// Environment variable overrides: `QA_AUTOMATOR_OLLAMA_HOST`, `QA_AUTOMATOR_OLLAMA_MODEL`.
pub fn load_config_from(path: Option<&Path>) -> Result<QaAutomatorConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("qa-automator.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QaAutomatorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QaAutomatorConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config.ollama.host = resolve_env_vars(&config.ollama.host);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("qa-automator"))
}

/// Create a backend instance from its configuration.
pub fn create_backend(
    kind: BackendKind,
    config: &QaAutomatorConfig,
) -> Result<Box<dyn AnalysisBackend>> {
    match kind {
        BackendKind::Mock => Ok(Box::new(KeywordBackend::new(config.mock.pass_threshold)?)),
        BackendKind::Ollama => Ok(Box::new(OllamaBackend::new(&config.ollama)?)),
    }
}
