//! Raw metadata table readers.
//!
//! Most callers should use [`read_table`] (from [`unified`]), which picks a reader by file
//! extension and yields a [`RawTable`]: canonical header names plus one [`RawRow`] of
//! cleaned string cells per data row. No typing happens here; that is the normalizer's job.
//!
//! Format-specific functions are also available under [`csv`] and (with the `excel`
//! feature) `excel`.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod headers;
pub mod unified;

pub use unified::{read_table, read_table_from_path, TableFormat};

/// One data row: `(canonical header, cleaned cell)` pairs in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 0-based index among data rows.
    pub ordinal: usize,
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(ordinal: usize, cells: Vec<(String, String)>) -> Self {
        Self { ordinal, cells }
    }

    /// Cell under `header`, if the column exists.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Row number as a spreadsheet user sees it (the header is row 1).
    pub fn user_row(&self) -> usize {
        self.ordinal + 2
    }
}

/// A whole metadata table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }
}
