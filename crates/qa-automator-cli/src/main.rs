//! qa-automator CLI: judge a test artifact against acceptance criteria.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "qa-automator",
    version,
    about = "Automate QA analysis with multimodal reasoning and test updates"
)]
struct Cli {
    #[command(flatten)]
    analyze: commands::analyze::AnalyzeArgs,
}

#[tokio::main]
async fn main() {
    // RUST_LOG, when set, replaces the default filter entirely.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qa_automator=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    // Usage errors exit 1 like every other failure; help and version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    if let Err(e) = commands::analyze::execute(cli.analyze).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
