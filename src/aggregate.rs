//src/aggregate.rs

use ahash::AHashMap;

use crate::normalize::{InputFormat, MISSING_LABEL, REPRESENTATIVE_COLUMN, SCIENTIFIC_NAME_COLUMN};
use crate::types::SpeciesCount;

/// Column names that show up as data when a header row is counted.
pub const HEADER_LEFTOVERS: [&str; 2] = [SCIENTIFIC_NAME_COLUMN, REPRESENTATIVE_COLUMN];

/// Marker of a species-level indeterminate identification ("Bacillus sp.").
pub const INDETERMINATE_MARKER: &str = "sp.";

/// Placeholder taxon word common in cluster tables ("Firmicutes bacterium").
pub const PLACEHOLDER_TAXON: &str = "bacterium";

pub fn is_header_leftover(label: &str) -> bool {
    HEADER_LEFTOVERS.contains(&label)
}

pub fn is_indeterminate(label: &str) -> bool {
    label.contains(INDETERMINATE_MARKER)
}

/// Whether a label carries no usable species information for this format.
pub fn is_noise(label: &str, format: InputFormat) -> bool {
    is_header_leftover(label)
        || is_indeterminate(label)
        || label == MISSING_LABEL
        || (format.is_cluster() && label.split_whitespace().any(|tok| tok == PLACEHOLDER_TAXON))
}

/// Count labels and drop noise. Sorted by descending count, then label.
pub fn count_species(labels: &[String], format: InputFormat) -> Vec<SpeciesCount> {
    let mut counts: AHashMap<&str, u64> = AHashMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }

    let mut species: Vec<SpeciesCount> = counts
        .into_iter()
        .filter(|(label, _)| !is_noise(label, format))
        .map(|(label, n)| SpeciesCount {
            species: label.to_string(),
            observed_count: n,
        })
        .collect();

    species.sort_by(|a, b| {
        b.observed_count
            .cmp(&a.observed_count)
            .then_with(|| a.species.cmp(&b.species))
    });

    log::debug!("{} distinct species after noise filtering", species.len());
    species
}
