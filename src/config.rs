//! Engine configuration, loaded from TOML. Every field has a default, so an
//! empty document is a valid configuration.
use crate::spreadsheet::Criteria;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ingest: IngestConfig,
    pub selector: SelectorConfig,
    pub synthesis: SynthesisConfig,
    pub execution: ExecutionConfig,
    pub summary: SummaryConfig,
    pub model: ModelConfig,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(input)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        Config::from_toml_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Database file; `None` keeps the data in memory.
    pub database: Option<PathBuf>,
    /// Cell text that reads as null, compared after trimming
    pub nulls: Vec<String>,
    /// Sheet name glob patterns; empty reads every sheet
    pub sheets: Vec<String>,
    /// Maximum data rows per sheet
    pub rows_limit: Option<usize>,
    pub skip_empty_rows: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: None,
            nulls: vec![String::new()],
            sheets: Vec::new(),
            rows_limit: None,
            skip_empty_rows: true,
        }
    }
}

impl IngestConfig {
    pub fn criteria(&self) -> Result<Criteria, glob::PatternError> {
        Criteria::new(&self.sheets, &self.nulls, self.rows_limit, self.skip_empty_rows)
    }
}

// ---------------------------------------------------------------------------
// Question answering
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    /// Maximum number of tables offered to the model
    pub top_k: usize,
    /// Maximum number of columns across the selected tables
    pub column_budget: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            column_budget: 64,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisConfig {
    pub max_attempts: usize,
    pub generation_timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generation_timeout_ms: 60_000,
        }
    }
}

impl SynthesisConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Results with more rows than this are rejected
    pub row_cap: usize,
    pub timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            row_cap: 10_000,
            timeout_ms: 30_000,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryConfig {
    /// Result rows shown to the model
    pub sample_rows: usize,
    pub generation_timeout_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            sample_rows: 20,
            generation_timeout_ms: 60_000,
        }
    }
}

impl SummaryConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Model endpoint
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// OpenAI-compatible API root, without `/chat/completions`
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_owned(),
            model: "llama3-8b-8192".to_owned(),
            temperature: 0.0,
            max_tokens: 512,
            request_timeout_ms: 60_000,
        }
    }
}
