// src/lib.rs
pub mod aggregate;
pub mod annotate;
pub mod config;
pub mod enrich;
pub mod entrez;
pub mod error;
pub mod input;
pub mod normalize;
pub mod render;
pub mod report;
pub mod taxdb;
pub mod tree;
pub mod types;

use std::path::Path;

use crate::aggregate::count_species;
use crate::annotate::{build_annotation_map, AnnotationMap};
use crate::config::PipelineConfig;
use crate::enrich::{enrich_species, ReferenceCounter};
use crate::error::Result;
use crate::input::{dedup_by_first_field, read_records};
use crate::normalize::{normalize_records, InputFormat};
use crate::render::Renderer;
use crate::report::{table_csv, write_atomically, OutputPaths};
use crate::tree::{build_species_tree, TaxTree, Taxonomy};
use crate::types::{EnrichedSpecies, Record};

/// Everything one run produced. Text artifacts are generated on demand.
#[derive(Debug)]
pub struct PipelineResults {
    pub format: InputFormat,
    /// One row per surviving species, including zero/unknown references
    pub enriched: Vec<EnrichedSpecies>,
    pub annotations: AnnotationMap,
    /// Leaves carry scientific names (or "Unknown")
    pub tree: TaxTree,
    /// Labels (and outgroup) that resolved to no taxid
    pub unresolved_species: Vec<String>,
    /// Records dropped by the normalizer for lacking the name field
    pub skipped_records: usize,
    pub collection: String,
}

impl PipelineResults {
    /// The abundance table as CSV bytes
    pub fn get_table_csv(&self) -> Result<Vec<u8>> {
        table_csv(&self.enriched, &self.collection)
    }

    /// The tree in Newick format, newline-terminated
    pub fn get_newick(&self) -> String {
        let mut text = self.tree.to_newick();
        text.push('\n');
        text
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Nothing survived noise filtering; no artifacts are produced.
    Empty { format: InputFormat },
    Completed(PipelineResults),
}

/// Runs the pipeline over already-read records:
///   1) detect format, optionally dedup, normalize
///   2) count and filter noise
///   3) enrich with reference counts
///   4) build the taxonomy tree (outgroup included)
///   5) build the annotation map
pub fn run_pipeline(
    records: Vec<Record>,
    config: &PipelineConfig,
    counter: &dyn ReferenceCounter,
    taxonomy: &dyn Taxonomy,
) -> Result<PipelineOutcome> {
    // 1. Normalize
    let format = InputFormat::detect(records.first())?;
    log::info!("Input looks like a {}", format.describe());

    let records = if config.dedup_first_field {
        let before = records.len();
        let kept = dedup_by_first_field(records);
        log::info!("Dedup by first field kept {} of {} records", kept.len(), before);
        kept
    } else {
        records
    };
    let normalized = normalize_records(&records, format);

    // 2. Aggregate
    let counts = count_species(&normalized.labels, format);
    if counts.is_empty() {
        log::warn!("No species left after noise filtering");
        return Ok(PipelineOutcome::Empty { format });
    }

    // 3. Enrich
    let enriched = enrich_species(counts, counter, &config.reference_db, config.failure_policy)?;

    // 4. Tree
    let outgroup = config.outgroup_label();
    let species_tree = build_species_tree(
        enriched.iter().map(|e| e.species.as_str()),
        outgroup.as_deref(),
        taxonomy,
        config.failure_policy,
    )?;

    // 5. Annotate
    let annotations = build_annotation_map(&enriched);

    Ok(PipelineOutcome::Completed(PipelineResults {
        format,
        enriched,
        annotations,
        tree: species_tree.tree,
        unresolved_species: species_tree.unresolved,
        skipped_records: normalized.skipped_records,
        collection: config.reference_db.clone(),
    }))
}

/// Reads `input`, runs the pipeline, renders, and writes all artifacts at once.
/// Returns `None` when nothing survived filtering (and nothing was written).
pub fn process_file(
    input: &Path,
    config: &PipelineConfig,
    counter: &dyn ReferenceCounter,
    taxonomy: &dyn Taxonomy,
    renderer: &dyn Renderer,
) -> Result<Option<(PipelineResults, OutputPaths)>> {
    let records = read_records(input, config.delimiter_byte()?)?;

    let results = match run_pipeline(records, config, counter, taxonomy)? {
        PipelineOutcome::Empty { .. } => return Ok(None),
        PipelineOutcome::Completed(results) => results,
    };

    // Produce every artifact in memory before touching the filesystem
    let table = results.get_table_csv()?;
    let newick = results.get_newick();
    let rendering = renderer.render(&results.tree, &results.annotations)?;

    let paths = OutputPaths::for_input(input, config.output_dir.as_deref(), renderer.extension());
    write_atomically(&[
        (paths.table.as_path(), table.as_slice()),
        (paths.newick.as_path(), newick.as_bytes()),
        (paths.rendering.as_path(), rendering.as_slice()),
    ])?;

    Ok(Some((results, paths)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::enrich::TableCounter;
    use crate::error::PipelineError;
    use crate::render::SvgRenderer;
    use crate::taxdb::{parse_taxdb, TaxonomyDb};
    use crate::tree::tests::FakeTaxonomy;
    use std::fs;

    fn rec(fields: &[&str]) -> Record {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn blast_records() -> Vec<Record> {
        vec![
            rec(&["Description", "x", "x", "Scientific Name", "x"]),
            rec(&["hit 1", "x", "x", "Homo sapiens GRCh38", "x"]),
            rec(&["hit 2", "x", "x", "Homo sapiens CHM13", "x"]),
            rec(&["hit 3", "x", "x", "Mus musculus GRCm39", "x"]),
        ]
    }

    fn services() -> (TableCounter, FakeTaxonomy) {
        (
            TableCounter::from_pairs([("Homo sapiens", 100), ("Mus musculus", 50)]),
            FakeTaxonomy::new(&[
                ("Homo sapiens", 9606),
                ("Mus musculus", 10090),
                ("Deinococcus radiodurans", 1299),
            ]),
        )
    }

    fn completed(outcome: PipelineOutcome) -> PipelineResults {
        match outcome {
            PipelineOutcome::Completed(results) => results,
            PipelineOutcome::Empty { .. } => panic!("expected a completed run"),
        }
    }

    #[test]
    fn test_blast_scenario() {
        let (counter, taxonomy) = services();
        let results = completed(
            run_pipeline(blast_records(), &PipelineConfig::default(), &counter, &taxonomy).unwrap(),
        );

        assert_eq!(results.format, InputFormat::HitTable { name_column: 3 });
        let rows: Vec<(&str, u64, Option<u64>, f64)> = results
            .enriched
            .iter()
            .map(|e| (e.species.as_str(), e.observed_count, e.reference_count, e.ratio_percent))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("Homo sapiens", 2, Some(100), 2.0),
                ("Mus musculus", 1, Some(50), 2.0),
            ]
        );
        assert_eq!(results.annotations.get("Homo sapiens"), Some(&2.0));
        assert_eq!(results.annotations.get("Mus musculus"), Some(&2.0));
        assert_eq!(results.tree.leaf_names(), vec!["Homo sapiens", "Mus musculus"]);
    }

    #[test]
    fn test_nan_species_never_reaches_table() {
        let mut records = blast_records();
        records.push(rec(&["hit 4", "x", "x", "NaN", "x"]));
        let (counter, taxonomy) = services();
        let results = completed(
            run_pipeline(records, &PipelineConfig::default(), &counter, &taxonomy).unwrap(),
        );
        assert!(results.enriched.iter().all(|e| e.species != "nan"));
        let table = String::from_utf8(results.get_table_csv().unwrap()).unwrap();
        assert!(!table.contains("nan,"));
    }

    #[test]
    fn test_outgroup_is_a_leaf() {
        let (counter, taxonomy) = services();
        let config = PipelineConfig {
            outgroup: Some("Deinococcus_radiodurans".to_string()),
            ..PipelineConfig::default()
        };
        let results = completed(run_pipeline(blast_records(), &config, &counter, &taxonomy).unwrap());
        assert!(results.tree.leaf_names().contains(&"Deinococcus radiodurans"));
        // the outgroup is on the tree but not in the table
        assert_eq!(results.enriched.len(), 2);
    }

    #[test]
    fn test_zero_reference_kept_in_table_not_annotated() {
        let counter = TableCounter::from_pairs([("Homo sapiens", 100)]);
        let (_, taxonomy) = services();
        let results = completed(
            run_pipeline(blast_records(), &PipelineConfig::default(), &counter, &taxonomy).unwrap(),
        );
        assert_eq!(results.enriched.len(), 2);
        assert!(results.enriched[1].ratio_percent.is_infinite());
        assert!(!results.annotations.contains_key("Mus musculus"));
        for (species, ratio) in &results.annotations {
            assert!(ratio.is_finite());
            assert!(results.enriched.iter().any(|e| &e.species == species));
        }
    }

    #[test]
    fn test_all_noise_is_empty_outcome() {
        let records = vec![rec(&["Streptomyces sp. X1"]), rec(&["NaN"])];
        let (counter, taxonomy) = services();
        let outcome = run_pipeline(records, &PipelineConfig::default(), &counter, &taxonomy).unwrap();
        assert!(matches!(outcome, PipelineOutcome::Empty { format: InputFormat::FirstField }));
    }

    #[test]
    fn test_empty_input_is_format_error() {
        let (counter, taxonomy) = services();
        let err = run_pipeline(Vec::new(), &PipelineConfig::default(), &counter, &taxonomy).unwrap_err();
        assert!(matches!(err, PipelineError::FormatDetection(_)));
    }

    #[test]
    fn test_dedup_changes_observed_counts() {
        let records = vec![
            rec(&["Homo sapiens GRCh38", "hitA"]),
            rec(&["Homo sapiens GRCh38", "hitB"]),
            rec(&["Homo sapiens CHM13", "hitC"]),
        ];
        let (counter, taxonomy) = services();

        let plain = completed(
            run_pipeline(records.clone(), &PipelineConfig::default(), &counter, &taxonomy).unwrap(),
        );
        assert_eq!(plain.enriched[0].observed_count, 3);

        let config = PipelineConfig {
            dedup_first_field: true,
            ..PipelineConfig::default()
        };
        let deduped = completed(run_pipeline(records, &config, &counter, &taxonomy).unwrap());
        assert_eq!(deduped.enriched[0].observed_count, 2);
    }

    struct DownCounter;

    impl ReferenceCounter for DownCounter {
        fn count_references(&self, term: &str) -> Result<u64> {
            Err(PipelineError::ExternalService {
                service: "test",
                term: term.to_string(),
                message: "down".to_string(),
            })
        }
    }

    #[test]
    fn test_service_failure_policies() {
        let (_, taxonomy) = services();
        let err = run_pipeline(blast_records(), &PipelineConfig::default(), &DownCounter, &taxonomy).unwrap_err();
        assert!(matches!(err, PipelineError::ExternalService { .. }));

        let config = PipelineConfig {
            failure_policy: FailurePolicy::Isolate,
            ..PipelineConfig::default()
        };
        let results = completed(run_pipeline(blast_records(), &config, &DownCounter, &taxonomy).unwrap());
        assert!(results.enriched.iter().all(|e| e.reference_count.is_none()));
        assert!(results.annotations.is_empty());
        assert_eq!(results.tree.leaves().len(), 2);
    }

    const TAXDB: &str = "1\t1\troot\tno rank\n\
40674\t1\tMammalia\tclass\n\
9606\t40674\tHomo sapiens\tspecies\n\
10090\t40674\tMus musculus\tspecies\n\
2\t1\tBacteria\tsuperkingdom\n\
1299\t2\tDeinococcus radiodurans\tspecies\n";

    #[test]
    fn test_lowercase_outgroup_resolves() {
        let (p, n) = parse_taxdb(TAXDB.as_bytes()).unwrap();
        let taxonomy = TaxonomyDb::new(p, n);
        let (counter, _) = services();
        let config = PipelineConfig {
            outgroup: Some("deinococcus_radiodurans".to_string()),
            ..PipelineConfig::default()
        };

        let results = completed(run_pipeline(blast_records(), &config, &counter, &taxonomy).unwrap());
        assert!(results.unresolved_species.is_empty());
        assert_eq!(
            results.tree.leaf_names(),
            vec!["Deinococcus radiodurans", "Homo sapiens", "Mus musculus"]
        );
    }

    #[test]
    fn test_process_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("y.csv");
        fs::write(
            &input,
            "Description,x,x,Scientific Name\nh1,x,x,Homo sapiens GRCh38\nh2,x,x,Homo sapiens CHM13\nh3,x,x,Mus musculus GRCm39\n",
        )
        .unwrap();

        let (p, n) = parse_taxdb(TAXDB.as_bytes()).unwrap();
        let taxonomy = TaxonomyDb::new(p, n);
        let (counter, _) = services();
        let renderer = SvgRenderer::default();
        let config = PipelineConfig::default();

        let (_, paths) = process_file(&input, &config, &counter, &taxonomy, &renderer)
            .unwrap()
            .expect("artifacts written");
        let table = fs::read(&paths.table).unwrap();
        let newick = fs::read_to_string(&paths.newick).unwrap();
        assert!(paths.rendering.exists());
        assert_eq!(newick, "('Homo sapiens','Mus musculus');\n");
        assert_eq!(
            String::from_utf8(table.clone()).unwrap(),
            "Species,count,assembly,%_in_assembly_db\nHomo sapiens,2,100,2.0\nMus musculus,1,50,2.0\n"
        );

        process_file(&input, &config, &counter, &taxonomy, &renderer).unwrap();
        assert_eq!(fs::read(&paths.table).unwrap(), table);
        assert_eq!(fs::read_to_string(&paths.newick).unwrap(), newick);
    }

    #[test]
    fn test_process_file_writes_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("z.csv");
        fs::write(&input, "Unknown thing one\nUnknown thing two\n").unwrap();

        let (p, n) = parse_taxdb(TAXDB.as_bytes()).unwrap();
        let taxonomy = TaxonomyDb::new(p, n);
        let counter = TableCounter::default();

        let err = process_file(&input, &PipelineConfig::default(), &counter, &taxonomy, &SvgRenderer::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTopology));
        // only the input is left
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
