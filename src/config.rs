//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.setracker.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".setracker.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Study feed settings.
    #[serde(default)]
    pub source: SourceSettings,

    /// Agent model settings.
    #[serde(default)]
    pub model: ModelConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the SQLite report store.
    #[serde(default = "default_database")]
    pub database: String,

    /// Write rendered output here instead of stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            output: None,
            verbose: false,
        }
    }
}

fn default_database() -> String {
    "side_effects.db".to_string()
}

/// ClinicalTrials.gov query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Base URL of the v2 API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Studies requested per query.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Sort order passed to the API.
    #[serde(default = "default_sort")]
    pub sort: String,

    /// Effects at or below this probability are dropped.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            page_size: default_page_size(),
            sort: default_sort(),
            threshold: default_threshold(),
            timeout_seconds: default_source_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://clinicaltrials.gov/api/v2".to_string()
}

fn default_page_size() -> usize {
    25
}

fn default_sort() -> String {
    "ResultsFirstPostDate".to_string()
}

fn default_threshold() -> f64 {
    crate::analysis::DEFAULT_THRESHOLD
}

fn default_source_timeout() -> u64 {
    30
}

/// LLM model settings for agent mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama model name. Must support tool calling.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Upper bound on model round trips per query.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Tool results kept in the conversation window.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            max_iterations: default_max_iterations(),
            max_context_messages: default_max_context_messages(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> u64 {
    300
}

fn default_max_iterations() -> usize {
    25
}

fn default_max_context_messages() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref database) = args.database {
            self.general.database = database.display().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref api_url) = args.api_url {
            self.source.api_url = api_url.clone();
        }
        if let Some(page_size) = args.page_size {
            self.source.page_size = page_size;
        }
        if let Some(threshold) = args.threshold {
            self.source.threshold = threshold;
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref ollama_url) = args.ollama_url {
            self.model.ollama_url = ollama_url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
    }

    /// Check values a config file could have set out of range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.source.threshold) {
            anyhow::bail!(
                "threshold must be in [0, 1), got {}",
                self.source.threshold
            );
        }
        if self.source.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.model.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
