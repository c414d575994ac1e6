//src/types.rs

/// One raw input row, as the fields came out of the delimited file.
pub type Record = Vec<String>;

/// Taxonomic identifier (NCBI taxid).
pub type TaxId = u32;

/// One distinct species label that survived noise filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesCount {
    pub species: String,
    pub observed_count: u64,
}

/// A `SpeciesCount` with its reference-collection count and ratio.
#[derive(Debug, Clone)]
pub struct EnrichedSpecies {
    pub species: String,
    pub observed_count: u64,
    /// `None` only when the lookup failed under the isolate policy.
    pub reference_count: Option<u64>,
    /// observed / reference * 100, non-finite when reference is 0 or unknown
    pub ratio_percent: f64,
}
