//src/report.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::types::EnrichedSpecies;

/// Where the three artifacts of a run go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub table: PathBuf,
    pub newick: PathBuf,
    pub rendering: PathBuf,
}

impl OutputPaths {
    /// `database_percentage_<stem>.csv`, `<stem>_tree.nwk`,
    /// `<stem>_tree_with_pies.<ext>`, next to the input unless `out_dir` is set.
    pub fn for_input(input: &Path, out_dir: Option<&Path>, render_ext: &str) -> Self {
        let stem = input_stem(input);
        let dir = out_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        Self {
            table: dir.join(format!("database_percentage_{stem}.csv")),
            newick: dir.join(format!("{stem}_tree.nwk")),
            rendering: dir.join(format!("{stem}_tree_with_pies.{render_ext}")),
        }
    }
}

/// File name without its extension; `hits.csv.gz` gives `hits`.
pub fn input_stem(input: &Path) -> String {
    let mut path = input.to_path_buf();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        path.set_extension("");
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// The enriched table as CSV: `Species,count,<collection>,%_in_<collection>_db`.
pub fn table_csv(enriched: &[EnrichedSpecies], collection: &str) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Species".to_string(),
        "count".to_string(),
        collection.to_string(),
        format!("%_in_{collection}_db"),
    ])?;

    for row in enriched {
        writer.write_record([
            row.species.clone(),
            row.observed_count.to_string(),
            row.reference_count.map(|n| n.to_string()).unwrap_or_default(),
            // shortest text that reads back to the same f64 (`2.0`, `inf`, `NaN`)
            format!("{:?}", row.ratio_percent),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

/// Write every artifact or none of them.
///
/// Each file is first written to a `.part` sibling; only when all of them are
/// on disk are they renamed into place. On failure every staged or already
/// renamed file is removed.
pub fn write_atomically(artifacts: &[(&Path, &[u8])]) -> Result<()> {
    let staged: Vec<(PathBuf, &Path)> = artifacts
        .iter()
        .map(|(path, _)| (part_path(path), *path))
        .collect();

    for ((part, _), (_, bytes)) in staged.iter().zip(artifacts) {
        if let Err(e) = fs::write(part, bytes) {
            cleanup(staged.iter().map(|(p, _)| p.as_path()));
            return Err(e.into());
        }
    }

    for (i, (part, target)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(part, target) {
            cleanup(staged[..i].iter().map(|(_, t)| *t));
            cleanup(staged[i..].iter().map(|(p, _)| p.as_path()));
            return Err(e.into());
        }
    }
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

fn cleanup<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
