//! qa-automator-core: data model, backend trait, and analyzer.
//!
//! This crate defines the records every run is built from, the
//! `AnalysisBackend` trait that scoring strategies implement, and the
//! analyzer that drives a backend across a criteria set.

pub mod analyzer;
pub mod error;
pub mod loader;
pub mod model;
pub mod report;
pub mod traits;
