//src/input.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashSet;
use flate2::read::MultiGzDecoder;

use crate::error::Result;
use crate::types::Record;

/// Open a file for buffered reading, transparently decompressing `.gz`.
pub fn open_maybe_gz<P: AsRef<Path>>(path: P) -> std::io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    if is_gz(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Tab for `.tsv`/`.tab` (also when gzipped), comma otherwise.
pub fn guess_delimiter(path: &Path) -> u8 {
    let inner = if is_gz(path) {
        path.file_stem().map(Path::new).unwrap_or(path)
    } else {
        path
    };
    match inner.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Read every row of a header-less delimited file.
///
/// Rows may have any number of fields. Rows the CSV reader rejects (e.g. not
/// valid UTF-8) are skipped with a warning rather than failing the batch.
pub fn read_records<P: AsRef<Path>>(path: P, delimiter: Option<u8>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let delimiter = delimiter.unwrap_or_else(|| guess_delimiter(path));
    let reader = open_maybe_gz(path)?;
    read_records_from(reader, delimiter)
}

pub fn read_records_from<R: std::io::Read>(reader: R, delimiter: u8) -> Result<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line_num, result) in csv_reader.records().enumerate() {
        match result {
            Ok(row) => records.push(row.iter().map(str::to_string).collect()),
            Err(e) => log::warn!("Skipping malformed row {}: {}", line_num + 1, e),
        }
    }
    Ok(records)
}

/// Keep only the first record for each distinct raw first field.
pub fn dedup_by_first_field(records: Vec<Record>) -> Vec<Record> {
    let mut seen: AHashSet<String> = AHashSet::new();
    records
        .into_iter()
        .filter(|rec| {
            let key = rec.first().cloned().unwrap_or_default();
            seen.insert(key)
        })
        .collect()
}
