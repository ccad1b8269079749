//! The analysis run: load inputs, score every criterion, report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use qa_automator_backends::config::load_config_from;
use qa_automator_backends::{create_backend, BackendKind, QaAutomatorConfig};
use qa_automator_core::analyzer::{update_test_cases, QaAnalyzer};
use qa_automator_core::loader::{load_artifact, load_criteria};
use qa_automator_core::report::QaReport;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// JSON file with criteria
    #[arg(long)]
    pub criteria: PathBuf,

    /// JSON file with test run artifact
    #[arg(long)]
    pub artifact: PathBuf,

    /// Scoring backend: mock or ollama [default: mock]
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Ollama model name
    #[arg(long)]
    pub model: Option<String>,

    /// Ollama host URL
    #[arg(long)]
    pub host: Option<String>,

    /// Existing test-case markdown/txt to update
    #[arg(long)]
    pub test_case: Option<PathBuf>,

    /// Output path for updated test case
    #[arg(long, default_value = "updated_test_case.md")]
    pub updated_test_case_out: PathBuf,

    /// Keyword backend pass threshold (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Ollama request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl AnalyzeArgs {
    /// Fold command-line overrides into the loaded config.
    fn apply_to(&self, config: &mut QaAutomatorConfig) {
        if let Some(model) = &self.model {
            config.ollama.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.ollama.host = host.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.ollama.timeout_secs = timeout;
        }
        if let Some(threshold) = self.threshold {
            config.mock.pass_threshold = threshold;
        }
        if let Some(backend) = self.backend {
            config.default_backend = backend;
        }
    }
}

pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    let criteria = load_criteria(&args.criteria)?;
    let artifact = load_artifact(&args.artifact)?;

    let backend = create_backend(config.default_backend, &config)?;
    let analyzer = QaAnalyzer::new(backend);
    tracing::info!(
        backend = analyzer.backend_name(),
        criteria = criteria.len(),
        artifact = %artifact.title,
        "starting analysis"
    );

    let report = analyzer.analyze(&criteria, &artifact).await?;
    println!("{}", report.to_json_pretty()?);
    print_summary(&report);

    if let Some(test_case) = &args.test_case {
        let baseline = std::fs::read_to_string(test_case)
            .with_context(|| format!("failed to read test case: {}", test_case.display()))?;
        let updated = update_test_cases(&report, &baseline);

        let out = &args.updated_test_case_out;
        std::fs::write(out, updated)
            .with_context(|| format!("failed to write updated test case: {}", out.display()))?;
        println!("\nUpdated test-case written to: {}", out.display());
    }

    Ok(())
}

fn print_summary(report: &QaReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Criterion", "Status", "Confidence"]);

    for result in &report.results {
        table.add_row(vec![
            Cell::new(&result.criterion.id),
            Cell::new(result.status.to_string().to_uppercase()),
            Cell::new(format!("{:.3}", result.confidence)),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "{} passed, {} failed ({} criteria)",
        report.passed(),
        report.failed(),
        report.results.len()
    );
}
