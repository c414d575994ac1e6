use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use blastcblast_rs::config::{FailurePolicy, PipelineConfig};
use blastcblast_rs::enrich::{ReferenceCounter, TableCounter};
use blastcblast_rs::entrez::EntrezCounter;
use blastcblast_rs::error::{PipelineError, Result};
use blastcblast_rs::process_file;
use blastcblast_rs::render::SvgRenderer;
use blastcblast_rs::taxdb::TaxonomyDb;

/// Species abundance against a reference database, drawn on a taxonomy tree.
#[derive(Parser, Debug)]
#[command(version, about)]
#[command(group(ArgGroup::new("taxonomy").required(true).args(["taxdb", "ncbi_dump"])))]
struct Args {
    /// BLAST hit table, cluster table or cblaster export
    #[arg(short, long)]
    input: PathBuf,

    /// Outgroup species, underscores for spaces (e.g. deinococcus_radiodurans)
    #[arg(short = 'g', long = "outgroup", visible_short_alias = 'o')]
    outgroup: Option<String>,

    /// Keep only the first record for each distinct first field
    #[arg(long)]
    dedup: bool,

    /// TOML file with default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// taxDB file: taxid, parent, name, rank (tab separated)
    #[arg(long)]
    taxdb: Option<PathBuf>,

    /// Directory holding NCBI nodes.dmp and names.dmp
    #[arg(long)]
    ncbi_dump: Option<PathBuf>,

    /// Offline reference counts (term<TAB>count) instead of querying Entrez
    #[arg(long)]
    counts: Option<PathBuf>,

    /// Reference collection to count against
    #[arg(long)]
    reference_db: Option<String>,

    #[arg(long, env = "NCBI_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// What a failed lookup does to the run
    #[arg(long, value_enum)]
    failure_policy: Option<FailurePolicy>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Field delimiter (defaults to tab for .tsv, comma otherwise)
    #[arg(long)]
    delimiter: Option<char>,
}

impl Args {
    /// File settings (if any) overridden by whatever was given on the command line.
    fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };

        if self.outgroup.is_some() {
            config.outgroup = self.outgroup.clone();
        }
        config.dedup_first_field |= self.dedup;
        if let Some(db) = &self.reference_db {
            config.reference_db = db.clone();
        }
        if self.email.is_some() {
            config.entrez.email = self.email.clone();
        }
        if self.api_key.is_some() {
            config.entrez.api_key = self.api_key.clone();
            // 10 requests/s with a key
            config.entrez.request_interval_ms = config.entrez.request_interval_ms.min(110);
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if self.output_dir.is_some() {
            config.output_dir = self.output_dir.clone();
        }
        if self.delimiter.is_some() {
            config.delimiter = self.delimiter;
        }
        Ok(config)
    }
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

fn run(args: Args) -> Result<()> {
    let config = args.to_config()?;

    // 1. Taxonomy handle, loaded once for the whole run
    let sp = spinner("blue", "Loading taxonomy...");
    let taxonomy = match (&args.taxdb, &args.ncbi_dump) {
        (Some(path), _) => TaxonomyDb::from_taxdb(path)?,
        (None, Some(dir)) => TaxonomyDb::from_ncbi_dump(dir)?,
        (None, None) => {
            return Err(PipelineError::Config("one of --taxdb or --ncbi-dump is required".into()))
        }
    };
    sp.finish_with_message(format!("Loaded {} taxa.", taxonomy.len()));

    // 2. Reference counter
    let counter: Box<dyn ReferenceCounter> = match &args.counts {
        Some(path) => Box::new(TableCounter::from_tsv(path)?),
        None => Box::new(EntrezCounter::new(&config.entrez, &config.reference_db)?),
    };

    // 3. Pipeline + outputs
    let sp = spinner("green", "Counting species and building the tree...");
    let renderer = SvgRenderer::default();
    let outcome = process_file(&args.input, &config, counter.as_ref(), &taxonomy, &renderer);
    sp.finish_and_clear();

    match outcome? {
        Some((results, paths)) => {
            if !results.unresolved_species.is_empty() {
                log::warn!(
                    "{} species not on the tree: {}",
                    results.unresolved_species.len(),
                    results.unresolved_species.join(", ")
                );
            }
            println!("Done for the database file: {}", paths.table.display());
            println!("Tree written to {}", paths.newick.display());
            println!("Tree with pie charts rendered to {}", paths.rendering.display());
        }
        None => println!("No species left after filtering; nothing written."),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("An error occurred: {e}");
            ExitCode::FAILURE
        }
    }
}
