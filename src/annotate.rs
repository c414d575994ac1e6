//src/annotate.rs

use std::collections::BTreeMap;

use crate::aggregate::{is_header_leftover, is_indeterminate};
use crate::types::EnrichedSpecies;

/// Species label -> ratio_percent, for the leaves the renderer decorates.
pub type AnnotationMap = BTreeMap<String, f64>;

/// Project the enriched table onto the labels worth drawing: no "sp." labels,
/// no header leftovers, no non-finite ratios.
pub fn build_annotation_map(enriched: &[EnrichedSpecies]) -> AnnotationMap {
    enriched
        .iter()
        .filter(|e| !is_indeterminate(&e.species))
        .filter(|e| !is_header_leftover(&e.species))
        .filter(|e| e.ratio_percent.is_finite())
        .map(|e| (e.species.clone(), e.ratio_percent))
        .collect()
}
