//src/normalize.rs

use crate::error::{PipelineError, Result};
use crate::types::Record;

/// First field of a BLAST "Descriptions" hit-table export.
pub const HIT_TABLE_SIGNATURE: &str = "Description";
/// First field of a cluster-composition export.
pub const CLUSTER_SIGNATURE: &str = "Cluster";

pub const SCIENTIFIC_NAME_COLUMN: &str = "Scientific Name";
pub const REPRESENTATIVE_COLUMN: &str = "Representative sequence";

/// What a missing value normalizes to.
pub const MISSING_LABEL: &str = "nan";

const MISSING_MARKERS: [&str; 6] = ["", "nan", "NaN", "NA", "N/A", "null"];

/// The closed set of supported input layouts, decided once from the first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Per-hit description table; the name comes from the "Scientific Name" column.
    HitTable { name_column: usize },
    /// Cluster table; the name is the `[...]` token of the "Representative sequence" column.
    ClusterTable { representative_column: usize },
    /// Anything else (cblaster-style): the first field is the name.
    FirstField,
}

impl InputFormat {
    /// Classify the input by the first field of its first record.
    pub fn detect(first: Option<&Record>) -> Result<Self> {
        let first = first.ok_or_else(|| PipelineError::FormatDetection("input is empty".into()))?;
        let signature = first
            .first()
            .ok_or_else(|| PipelineError::FormatDetection("first row has no fields".into()))?;

        match signature.trim() {
            HIT_TABLE_SIGNATURE => Ok(InputFormat::HitTable {
                name_column: column_index(first, SCIENTIFIC_NAME_COLUMN)?,
            }),
            CLUSTER_SIGNATURE => Ok(InputFormat::ClusterTable {
                representative_column: column_index(first, REPRESENTATIVE_COLUMN)?,
            }),
            _ => Ok(InputFormat::FirstField),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            InputFormat::HitTable { .. } => "NCBI BLAST hit table",
            InputFormat::ClusterTable { .. } => "cluster composition table",
            InputFormat::FirstField => "cblaster-style table",
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, InputFormat::ClusterTable { .. })
    }

    /// Raw name text for one record. `None` means the record has to be skipped.
    fn extract<'a>(&self, record: &'a Record) -> Option<&'a str> {
        match *self {
            // short rows read as missing values
            InputFormat::HitTable { name_column } => {
                Some(record.get(name_column).map(String::as_str).unwrap_or(""))
            }
            InputFormat::ClusterTable { representative_column } => record
                .get(representative_column)
                .map(|field| bracketed(field).unwrap_or("")),
            InputFormat::FirstField => Some(record.first().map(String::as_str).unwrap_or("")),
        }
    }
}

fn column_index(header: &Record, column: &str) -> Result<usize> {
    header
        .iter()
        .position(|f| f.trim() == column)
        .ok_or_else(|| PipelineError::FormatDetection(format!("header row has no '{column}' column")))
}

/// The text between the first `[` and the next `]`.
pub fn bracketed(field: &str) -> Option<&str> {
    let open = field.find('[')?;
    let rest = &field[open + 1..];
    let close = rest.find(']')?;
    Some(&rest[..close])
}

/// Collapse a name to genus + species: the first two whitespace tokens.
/// Missing values become "nan".
pub fn binomial(raw: &str) -> String {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        return MISSING_LABEL.to_string();
    }
    trimmed.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

/// Labels produced for a batch, plus how many records had to be dropped.
#[derive(Debug, Default)]
pub struct NormalizedLabels {
    pub labels: Vec<String>,
    pub skipped_records: usize,
}

/// One binomial label per record, in input order. Header rows are not
/// removed here; their labels are header leftovers the aggregator drops.
pub fn normalize_records(records: &[Record], format: InputFormat) -> NormalizedLabels {
    let mut out = NormalizedLabels {
        labels: Vec::with_capacity(records.len()),
        skipped_records: 0,
    };

    for (idx, record) in records.iter().enumerate() {
        match format.extract(record) {
            Some(raw) => out.labels.push(binomial(raw)),
            None => {
                log::debug!("Record {} has no name field for {}, skipping", idx + 1, format.describe());
                out.skipped_records += 1;
            }
        }
    }
    out
}
