//src/enrich.rs

use std::io::BufRead;
use std::path::Path;

use ahash::AHashMap;

use crate::config::FailurePolicy;
use crate::error::{PipelineError, Result};
use crate::input::open_maybe_gz;
use crate::types::{EnrichedSpecies, SpeciesCount};

/// "How many entries of the reference collection match this term?"
pub trait ReferenceCounter {
    fn count_references(&self, term: &str) -> Result<u64>;
}

/// observed / reference * 100. Infinite for a zero reference, NaN when unknown.
pub fn ratio_percent(observed: u64, reference: Option<u64>) -> f64 {
    match reference {
        Some(reference) => observed as f64 / reference as f64 * 100.0,
        None => f64::NAN,
    }
}

/// Attach a reference count and ratio to every species, one lookup each, in order.
///
/// Under `FailurePolicy::Abort` the first failed lookup is returned as the
/// error. Under `FailurePolicy::Isolate` the species stays in the table with
/// an unknown count.
pub fn enrich_species(
    counts: Vec<SpeciesCount>,
    counter: &dyn ReferenceCounter,
    collection: &str,
    policy: FailurePolicy,
) -> Result<Vec<EnrichedSpecies>> {
    let mut enriched = Vec::with_capacity(counts.len());

    for SpeciesCount { species, observed_count } in counts {
        let reference_count = match counter.count_references(&species) {
            Ok(n) => {
                log::info!("Number of {species} occurrences in NCBI {collection} database: {n}");
                Some(n)
            }
            Err(e) if policy == FailurePolicy::Isolate => {
                log::warn!("Reference count unknown for {species}: {e}");
                None
            }
            Err(e) => return Err(e),
        };

        enriched.push(EnrichedSpecies {
            ratio_percent: ratio_percent(observed_count, reference_count),
            species,
            observed_count,
            reference_count,
        });
    }

    Ok(enriched)
}

/// Reference counts read from a `<term>\t<count>` file. Terms not listed count 0.
#[derive(Debug, Default)]
pub struct TableCounter {
    counts: AHashMap<String, u64>,
}

impl TableCounter {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            counts: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = open_maybe_gz(path.as_ref())?;
        let mut counts = AHashMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((term, count)) = line.rsplit_once('\t') else {
                log::warn!("Skipping counts line {} without a tab", line_num + 1);
                continue;
            };
            let count: u64 = count.trim().parse().map_err(|_| {
                PipelineError::Config(format!(
                    "{}:{}: '{}' is not a count",
                    path.as_ref().display(),
                    line_num + 1,
                    count.trim()
                ))
            })?;
            counts.insert(term.trim().to_string(), count);
        }

        Ok(Self { counts })
    }
}

impl ReferenceCounter for TableCounter {
    fn count_references(&self, term: &str) -> Result<u64> {
        Ok(self.counts.get(term).copied().unwrap_or(0))
    }
}
