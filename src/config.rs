//src/config.rs

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// What to do when a single external lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any failed lookup aborts the whole run; no artifacts are written.
    #[default]
    Abort,
    /// The affected species is kept with an unknown value and the run goes on.
    Isolate,
}

/// Settings for the NCBI Entrez reference-count client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntrezConfig {
    pub base_url: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub tool: String,
    pub timeout_secs: u64,
    /// Minimum spacing between two requests
    pub request_interval_ms: u64,
}

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            email: None,
            api_key: None,
            tool: "blastcblast-rs".to_string(),
            timeout_secs: 30,
            // 3 requests/s without an API key
            request_interval_ms: 340,
        }
    }
}

/// Run-wide settings. Loaded from TOML, then overridden from the command line.
///
/// ```toml
/// outgroup = "deinococcus_radiodurans"
/// reference_db = "assembly"
/// failure_policy = "isolate"
///
/// [entrez]
/// email = "me@example.org"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Outgroup species; underscores stand for spaces.
    pub outgroup: Option<String>,
    /// Drop records repeating an earlier record's first field before counting.
    pub dedup_first_field: bool,
    pub failure_policy: FailurePolicy,
    /// Reference collection queried for per-species counts.
    pub reference_db: String,
    /// Field delimiter; guessed from the input extension when unset.
    pub delimiter: Option<char>,
    /// Where artifacts go; next to the input when unset.
    pub output_dir: Option<PathBuf>,
    pub entrez: EntrezConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outgroup: None,
            dedup_first_field: false,
            failure_policy: FailurePolicy::Abort,
            reference_db: "assembly".to_string(),
            delimiter: None,
            output_dir: None,
            entrez: EntrezConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Outgroup in label form ("deinococcus_radiodurans" -> "deinococcus radiodurans").
    pub fn outgroup_label(&self) -> Option<String> {
        self.outgroup
            .as_deref()
            .map(|og| og.replace('_', " ").trim().to_string())
            .filter(|og| !og.is_empty())
    }

    /// The delimiter as a single byte, rejecting multi-byte characters.
    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        match self.delimiter {
            None => Ok(None),
            Some(c) if c.is_ascii() => Ok(Some(c as u8)),
            Some(c) => Err(PipelineError::Config(format!(
                "delimiter must be a single ASCII character, got '{c}'"
            ))),
        }
    }
}
