//src/error.rs

use thiserror::Error;

/// Everything that can abort a run.
///
/// Gaps that only shrink the output (a species with no taxid, a leaf with no
/// reverse-resolved name, an all-noise input) are not errors; they are
/// reported through `PipelineResults` and the log instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Empty input, or a recognized format missing its required header column
    #[error("format detection failed: {0}")]
    FormatDetection(String),

    /// An external lookup (reference counts, taxonomy) failed
    #[error("{service} lookup failed for '{term}': {message}")]
    ExternalService {
        service: &'static str,
        term: String,
        message: String,
    },

    /// None of the species resolved to a taxonomy identifier
    #[error("no species could be resolved to a taxonomy identifier")]
    EmptyTopology,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
