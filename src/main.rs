//! setracker - serious side effects of drugs from ClinicalTrials.gov
//!
//! A CLI tool that aggregates serious adverse events across clinical
//! trials into one probability per side effect, and records every new
//! side effect per drug in a local SQLite store without duplicates.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid input, study feed failure, store failure, or agent failure

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod source;
mod store;
mod tracker;

use anyhow::{Context, Result};
use cli::{Action, Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use source::{ClinicalTrialsClient, SourceConfig};
use std::path::Path;
use std::time::Duration;
use store::SqliteStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracker::SideEffectTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first: it can turn on verbose logging
    let (mut config, config_note) = load_config(&args)?;
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose))?;

    info!("setracker v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_note {
        ConfigNote::Loaded(source) => info!("Loaded config from {}", source),
        ConfigNote::Defaults => debug!("No config file found, using defaults"),
        ConfigNote::Unreadable(e) => warn!("Failed to load config: {:#}", e),
    }

    if let Err(e) = run(args, config).await {
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .setracker.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the database path, threshold, and model.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the requested action.
async fn run(args: Args, config: Config) -> Result<()> {
    config.validate()?;

    let action = args
        .action()
        .context("No action requested")?;

    let store = SqliteStore::open(Path::new(&config.general.database))
        .with_context(|| format!("Failed to open store at {}", config.general.database))?;
    let client = ClinicalTrialsClient::new(SourceConfig::from(&config.source))
        .context("Failed to create study feed client")?;
    let mut tracker = SideEffectTracker::new(client, store, config.source.threshold);

    let rendered = match action {
        Action::Search { drug, dry_run } => {
            let spinner = spinner(&args, format!("Searching ClinicalTrials.gov for {}...", drug));
            let result = if dry_run {
                tracker.preview(&drug).await
            } else {
                tracker.search(&drug).await
            };
            spinner.finish_and_clear();
            let outcome = result?;

            status(
                &args,
                &format!(
                    "📊 {}: {} side effects above {:.2}%, {} new{}",
                    outcome.drug,
                    outcome.total_side_effects,
                    config.source.threshold * 100.0,
                    outcome.new_side_effects,
                    if dry_run { " (dry run)" } else { "" }
                ),
            );

            match args.format {
                OutputFormat::Json => report::generate_json(&outcome)?,
                OutputFormat::Markdown => report::generate_search_markdown(&outcome),
            }
        }
        Action::ListDrugs => {
            let drugs = tracker.list_drugs()?;
            match args.format {
                OutputFormat::Json => report::generate_json(&drugs)?,
                OutputFormat::Markdown => report::generate_drugs_markdown(&drugs),
            }
        }
        Action::ListEffects { drug } => {
            let Some(reports) = tracker.list_side_effects(&drug)? else {
                anyhow::bail!("Drug '{}' not found. Search it first with --drug.", drug.trim());
            };
            match args.format {
                OutputFormat::Json => report::generate_json(&reports)?,
                OutputFormat::Markdown => report::generate_reports_markdown(drug.trim(), &reports),
            }
        }
        Action::Query { text } => {
            status(
                &args,
                &format!(
                    "🤖 Asking {} at {}",
                    config.model.name, config.model.ollama_url
                ),
            );

            let executor = agent::ToolExecutor::new(tracker);
            let mut assistant =
                agent::SideEffectAgent::new(agent::AgentConfig::from(&config.model), executor)?;

            let spinner = spinner(&args, "Waiting for the assistant...".to_string());
            let result = assistant.run(&text).await;
            spinner.finish_and_clear();
            let outcome = result?;

            match args.format {
                OutputFormat::Json => report::generate_json(&outcome)?,
                OutputFormat::Markdown => report::generate_agent_markdown(&outcome),
            }
        }
    };

    emit(&rendered, config.general.output.as_deref())
}

/// Write rendered output to a file, or stdout.
fn emit(rendered: &str, output: Option<&str>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write output to {}", path))?;
            println!("✅ Saved to: {}", path);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Print a progress line to stderr unless --quiet. Stdout carries only the
/// rendered output.
fn status(args: &Args, message: &str) {
    if !args.quiet {
        eprintln!("{}", message);
    }
}

/// Spinner on stderr while waiting on a remote service. Hidden with --quiet.
fn spinner(args: &Args, message: String) -> ProgressBar {
    if args.quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        Ok(style) => pb.set_style(style),
        Err(e) => debug!("Falling back to default spinner style: {}", e),
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Where the configuration came from, logged once logging is up.
enum ConfigNote {
    Loaded(String),
    Defaults,
    Unreadable(anyhow::Error),
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` that cannot be read is an error. A broken default
/// file falls back to defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigNote)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigNote::Loaded(config_path.display().to_string())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigNote::Loaded(CONFIG_FILE.to_string()))),
        Ok(None) => Ok((Config::default(), ConfigNote::Defaults)),
        Err(e) => Ok((Config::default(), ConfigNote::Unreadable(e))),
    }
}
