//! Paper Analyst - Entry Point
//!
//! Modes:
//! - Default: analyze an extracted-text paper, save and print the result
//! - --load / -l: print a previously saved analysis

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use paper_analyst::{AnalysisPipeline, ClaudeClient, Config, Document, ResultStore};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let help_mode = args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h");
    let load_title = args
        .iter()
        .position(|a| a == "--load" || a == "-l")
        .map(|i| args.get(i + 1).cloned());

    if help_mode {
        print_usage();
        return Ok(());
    }

    // Logs go to stderr so stdout carries only the result JSON
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json_logs = std::env::var("PAPER_ANALYST_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let store = ResultStore::new(&config.results_dir);

    if let Some(title) = load_title {
        let title = title.context("--load needs a paper title")?;
        let result = store.load(&title).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let path = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .map(PathBuf::from)
        .context("no input file given (see --help)")?;

    info!("Paper Analyst v{}", env!("CARGO_PKG_VERSION"));

    let document = Document::from_text_file(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!(title = document.title(), pages = document.page_count(), "Document loaded");

    let client = ClaudeClient::from_config(&config)?;
    if !client.is_available() {
        anyhow::bail!("ANTHROPIC_API_KEY not set");
    }

    let pipeline = AnalysisPipeline::from_config(&config, Arc::new(client));
    let (result, saved) = pipeline
        .analyze_and_save(&document, &store)
        .await
        .with_context(|| format!("analysis of '{}' failed", document.title()))?;

    info!(path = %saved.display(), "Done");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn print_usage() {
    println!("Paper Analyst v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: paper-analyst [OPTIONS] <FILE>");
    println!();
    println!("  <FILE> is extracted paper text, pages separated by form feeds");
    println!();
    println!("Options:");
    println!("  --load, -l <TITLE>  Print a saved analysis");
    println!("  --help, -h          Show this help");
    println!();
    println!("Environment variables:");
    println!("  ANTHROPIC_API_KEY               Claude API key");
    println!("  PAPER_ANALYST_MODEL             Model id (default: claude-sonnet-4-20250514)");
    println!("  PAPER_ANALYST_MAX_TOKENS        Max response tokens (default: 4096)");
    println!("  PAPER_ANALYST_REQUEST_TIMEOUT   Per-call timeout, seconds (default: 120)");
    println!("  PAPER_ANALYST_MAX_RETRIES       Attempts per call (default: 5)");
    println!("  PAPER_ANALYST_INITIAL_DELAY_MS  First backoff delay (default: 1000)");
    println!("  PAPER_ANALYST_MAX_DELAY_MS      Backoff cap (default: 60000)");
    println!("  PAPER_ANALYST_MAX_CONCURRENCY   Parallel section analyses (default: CPU count)");
    println!("  PAPER_ANALYST_RESULTS_DIR       Output directory (default: analysis_results)");
    println!("  PAPER_ANALYST_LOG_JSON          1 for JSON logs on stderr");
}
