//! CSV metadata reader.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{IngestError, IngestResult};

use super::headers::{clean_cell, rename_header};
use super::{RawRow, RawTable};

/// Read a CSV metadata file.
///
/// Rules:
///
/// - The file must have a header row.
/// - Header names go through `renames`; cells are trimmed and unquoted.
/// - Short rows are padded with blanks; fully blank rows are skipped.
pub fn read_csv_from_path(
    path: impl AsRef<Path>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let mut rdr = builder().from_path(path)?;
    read_csv_from_reader(&mut rdr, renames)
}

/// Read CSV metadata already held in memory (e.g. fetched from object storage).
pub fn read_csv_from_bytes(bytes: &[u8], renames: &BTreeMap<String, String>) -> IngestResult<RawTable> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut rdr = builder().from_reader(bytes);
    read_csv_from_reader(&mut rdr, renames)
}

fn builder() -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.has_headers(true).flexible(true);
    b
}

/// Read CSV metadata from an existing CSV reader.
pub fn read_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| rename_header(renames, h))
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(IngestError::SchemaMismatch {
            message: "csv has no header row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (idx0, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cells = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.clone(), clean_cell(record.get(idx).unwrap_or(""))))
            .collect();
        rows.push(RawRow::new(idx0, cells));
    }

    Ok(RawTable { headers, rows })
}
