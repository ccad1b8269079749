//! qa-automator-backends: scoring backend implementations.
//!
//! Implements the `AnalysisBackend` trait with a deterministic keyword scorer
//! and an Ollama-hosted model, plus the configuration that selects between
//! them.

pub mod config;
pub mod keyword;
pub mod ollama;

pub use config::{create_backend, load_config_from, BackendKind, QaAutomatorConfig};
pub use keyword::KeywordBackend;
pub use ollama::OllamaBackend;
