#![cfg(feature = "excel")]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate};

use crate::error::{IngestError, IngestResult};

use super::headers::{clean_cell, rename_header};
use super::{RawRow, RawTable};

/// Read a metadata sheet from a workbook (`.xlsx`, `.xls`, `.ods`, etc.).
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Converts every cell to cleaned text; dates and numbers use calamine's display form
pub fn read_excel_from_path(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let mut workbook = open_workbook_auto(path)?;
    let range = select_sheet(&mut workbook, sheet_name)?;
    read_sheet_range(&range, renames)
}

/// Read a metadata sheet from workbook bytes.
pub fn read_excel_from_bytes(
    bytes: &[u8],
    sheet_name: Option<&str>,
    renames: &BTreeMap<String, String>,
) -> IngestResult<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = select_sheet(&mut workbook, sheet_name)?;
    read_sheet_range(&range, renames)
}

fn select_sheet<RS>(workbook: &mut Sheets<RS>, sheet_name: Option<&str>) -> IngestResult<Range<Data>>
where
    RS: std::io::Read + std::io::Seek,
{
    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?,
    };
    Ok(workbook.worksheet_range(&sheet)?)
}

/// Excel serial day number to an ISO date (serial 1 is 1900-01-01, with the 1900 leap bug).
fn serial_to_date(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(Duration::try_days(serial.trunc() as i64)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn read_sheet_range(range: &Range<Data>, renames: &BTreeMap<String, String>) -> IngestResult<RawTable> {
    let header_row_idx = range
        .rows()
        .position(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .ok_or_else(|| IngestError::SchemaMismatch {
            message: "sheet has no non-empty rows (no header row found)".to_string(),
        })?;

    let headers: Vec<String> = range
        .rows()
        .nth(header_row_idx)
        .map(|row| {
            row.iter()
                .map(|c| rename_header(renames, &cell_to_string(c)))
                .collect()
        })
        .unwrap_or_default();

    let mut rows = Vec::new();
    for (idx0, row) in range.rows().enumerate().skip(header_row_idx + 1) {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let cells = headers
            .iter()
            .enumerate()
            .map(|(col, h)| {
                let cell = row.get(col).unwrap_or(&Data::Empty);
                (h.clone(), clean_cell(&cell_to_string(cell)))
            })
            .collect();
        rows.push(RawRow::new(idx0 - header_row_idx - 1, cells));
    }

    Ok(RawTable { headers, rows })
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => serial_to_date(dt.as_f64()).unwrap_or_else(|| dt.to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}
