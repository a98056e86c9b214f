//! Report agent CLI.
//!
//! Usage: `report-agent <topic> [--structure <file>] [--config <file>] [--json]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use report_agent::llm::OpenRouterClient;
use report_agent::search::TavilyClient;
use report_agent::{Config, ReportOrchestrator};

const DEFAULT_STRUCTURE: &str = "This report type focuses on comparative analysis.

The report structure should include:
1. Introduction (no research needed)
   - Brief overview of the topic area
   - Context for the comparison

2. Main Body Sections:
   - One dedicated section for EACH offering being compared in the user-provided list
   - Each section should examine:
     - Core Features (bulleted list)
     - Architecture & Implementation (2-3 sentences)
     - One example use case (2-3 sentences)

3. No Main Body Sections other than the ones dedicated to each offering in the user-provided list

4. Conclusion with Comparison Table (no research needed)
   - Structured comparison table that:
     * Compares all offerings from the user-provided list across key dimensions
     * Highlights relative strengths and weaknesses
   - Final recommendations";

/// Generate a research report on a topic
#[derive(Parser)]
#[command(name = "report-agent")]
#[command(version)]
struct Args {
    /// Topic of the report
    topic: String,

    /// Report structure template file
    #[arg(short, long)]
    structure: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON instead of markdown
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let structure = match &args.structure {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read structure file {}", path.display()))?,
        None => DEFAULT_STRUCTURE.to_string(),
    };

    let llm = Arc::new(OpenRouterClient::new(config.openrouter_api_key.clone()));
    let search = Arc::new(TavilyClient::new(config.tavily_api_key.clone()));
    let orchestrator = ReportOrchestrator::from_config(&config, llm, search);

    let report = orchestrator
        .run(&args.topic, structure)
        .await
        .context("Report generation failed")?;

    tracing::info!(
        "Report {} finished with {} sections",
        report.id,
        report.sections.len()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.text);
    }
    Ok(())
}
