//! Unified table reading.
//!
//! - If no [`TableFormat`] is given, it is inferred from the location's extension.
//! - Header names are canonicalized with the supplied rename table.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{IngestError, IngestResult};

use super::{csv, RawTable};

/// Supported metadata table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values.
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl TableFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn infer(location: &str) -> IngestResult<Self> {
        let ext = Path::new(location)
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IngestError::SchemaMismatch {
                message: format!("cannot infer format: '{location}' has no extension"),
            })?;
        Self::from_extension(ext).ok_or_else(|| IngestError::SchemaMismatch {
            message: format!("cannot infer format from extension '{ext}' for '{location}'"),
        })
    }
}

/// Read a metadata table from bytes fetched from `location`.
pub fn read_table(
    location: &str,
    bytes: &[u8],
    format: Option<TableFormat>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let format = match format {
        Some(f) => f,
        None => TableFormat::infer(location)?,
    };
    match format {
        TableFormat::Csv => csv::read_csv_from_bytes(bytes, renames),
        TableFormat::Excel => read_excel_dispatch(bytes, renames),
    }
}

/// Read a metadata table from a local path.
pub fn read_table_from_path(
    path: impl AsRef<Path>,
    format: Option<TableFormat>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    read_table(&path.to_string_lossy(), &bytes, format, renames)
}

fn read_excel_dispatch(bytes: &[u8], renames: &BTreeMap<String, String>) -> IngestResult<RawTable> {
    // Avoid unused warnings when the feature is off.
    let _ = (bytes, renames);

    #[cfg(feature = "excel")]
    {
        super::excel::read_excel_from_bytes(bytes, None, renames)
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(IngestError::SchemaMismatch {
            message: "excel metadata not enabled (enable cargo feature 'excel')".to_string(),
        })
    }
}
