//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// setracker - serious side effects of drugs from ClinicalTrials.gov
///
/// Aggregates serious adverse events reported by clinical trials into one
/// probability per side effect, and keeps a local store of every effect
/// seen per drug. Re-running a search only records effects that are new.
///
/// Examples:
///   setracker --drug aspirin
///   setracker --drug aspirin --dry-run --format json
///   setracker --list-drugs
///   setracker --list-effects aspirin
///   setracker --query "What new side effects does metformin have?"
///   setracker --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Drug to search on ClinicalTrials.gov
    ///
    /// New side effects are recorded in the store unless --dry-run is set.
    #[arg(short, long, value_name = "NAME")]
    pub drug: Option<String>,

    /// Show what a search would record without writing to the store
    #[arg(long, requires = "drug")]
    pub dry_run: bool,

    /// List every drug in the store
    #[arg(long)]
    pub list_drugs: bool,

    /// List the stored side effects of a drug
    #[arg(long, value_name = "NAME")]
    pub list_effects: Option<String>,

    /// Ask the tool-calling assistant a question (requires Ollama)
    #[arg(long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Generate a default .setracker.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Minimum probability (exclusive) for a side effect to be reported
    #[arg(long, value_name = "P")]
    pub threshold: Option<f64>,

    /// Number of studies requested per search
    #[arg(long, value_name = "COUNT")]
    pub page_size: Option<usize>,

    /// Path of the SQLite report store
    #[arg(long, value_name = "FILE", env = "SETRACKER_DB")]
    pub database: Option<PathBuf>,

    /// ClinicalTrials.gov API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Study feed request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Ollama model used by --query
    #[arg(short, long, env = "SETRACKER_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .setracker.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for rendered results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// The single action requested on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Search { drug: String, dry_run: bool },
    ListDrugs,
    ListEffects { drug: String },
    Query { text: String },
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve the requested action. Call after [`Args::validate`].
    ///
    /// `--init-config` is not an action: it is handled before any config is
    /// loaded, so this returns `None` for it.
    pub fn action(&self) -> Option<Action> {
        if let Some(ref drug) = self.drug {
            return Some(Action::Search {
                drug: drug.clone(),
                dry_run: self.dry_run,
            });
        }
        if self.list_drugs {
            return Some(Action::ListDrugs);
        }
        if let Some(ref drug) = self.list_effects {
            return Some(Action::ListEffects { drug: drug.clone() });
        }
        self.query.clone().map(|text| Action::Query { text })
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        let actions = [
            self.init_config,
            self.drug.is_some(),
            self.list_drugs,
            self.list_effects.is_some(),
            self.query.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if actions == 0 {
            return Err(
                "Nothing to do: use --drug, --list-drugs, --list-effects, --query or --init-config"
                    .to_string(),
            );
        }
        if actions > 1 {
            return Err("Only one of --drug, --list-drugs, --list-effects, --query or --init-config may be used".to_string());
        }

        // Blank names are also rejected by the tracker; fail early with a clearer message
        for name in [&self.drug, &self.list_effects].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err("Drug name must not be blank".to_string());
            }
        }

        if let Some(ref text) = self.query {
            if text.trim().is_empty() {
                return Err("Query must not be blank".to_string());
            }
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..1.0).contains(&threshold) {
                return Err("Threshold must be in [0.0, 1.0)".to_string());
            }
        }

        if self.page_size == Some(0) {
            return Err("Page size must be at least 1".to_string());
        }

        for url in [&self.api_url, &self.ollama_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_default` is the config file's `general.verbose`. `--quiet`
    /// wins over it.
    pub fn log_level(&self, verbose_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
