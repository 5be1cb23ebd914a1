//! Per-batch result log.
//!
//! One CSV row per processed metadata row (`row_in_metadata, identifier, succeeded, message`)
//! plus a plain-text summary, both written next to each other in object storage under
//! `<category>/<collection>/metadata_import_results/`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::IngestResult;
use crate::types::IngestResultEntry;

use super::metrics::IngestMetricsSnapshot;
use super::FileKind;

/// Everything known about one processed batch file.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub location: String,
    pub kind: FileKind,
    pub entries: Vec<IngestResultEntry>,
    /// The batch policy stopped processing before the last row.
    pub aborted: bool,
    /// Object location of the results CSV, once written.
    pub results_location: Option<String>,
    pub metrics: IngestMetricsSnapshot,
    /// Reports of item files ingested through an index file.
    pub children: Vec<IngestReport>,
}

impl IngestReport {
    pub fn succeeded_rows(&self) -> usize {
        self.entries.iter().filter(|e| e.succeeded).count()
    }

    pub fn failed_rows(&self) -> usize {
        self.entries.len() - self.succeeded_rows()
    }

    pub fn is_clean(&self) -> bool {
        !self.aborted
            && self.failed_rows() == 0
            && self.children.iter().all(IngestReport::is_clean)
    }
}

/// `<category>/<collection>/metadata_import_results/<collection>_ingest_results_<YYYYmmddHHMMSS>.csv`
pub fn results_location(category: &str, collection_identifier: &str, at: DateTime<Utc>) -> String {
    format!(
        "{category}/{collection_identifier}/metadata_import_results/{collection_identifier}_ingest_results_{}.csv",
        at.format("%Y%m%d%H%M%S")
    )
}

/// `base` if no key in `taken` uses it, otherwise `base` with the first free `_<n>` suffix.
pub fn unique_results_location(base: &str, taken: &[String]) -> String {
    let stem = base.strip_suffix(".csv").unwrap_or(base);
    let in_use = |candidate: &str| {
        taken
            .iter()
            .any(|k| k == candidate || *k == summary_location(candidate))
    };
    if !in_use(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{stem}_{n}.csv"))
        .find(|candidate| !in_use(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Location of the text summary written beside a results CSV.
pub fn summary_location(results_location: &str) -> String {
    match results_location.strip_suffix(".csv") {
        Some(stem) => format!("{stem}.txt"),
        None => format!("{results_location}.txt"),
    }
}

pub fn render_results_csv(entries: &[IngestResultEntry]) -> IngestResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in entries {
        writer.serialize(entry)?;
    }
    if entries.is_empty() {
        writer.write_record(["row_in_metadata", "identifier", "succeeded", "message"])?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

pub fn render_summary(report: &IngestReport, dry_run: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Ingest results for {}", report.location);
    let _ = writeln!(out, "File kind: {}", report.kind);
    if dry_run {
        let _ = writeln!(out, "Dry run: no records were written");
    }
    let _ = writeln!(
        out,
        "Rows: {} processed, {} succeeded, {} failed",
        report.entries.len(),
        report.succeeded_rows(),
        report.failed_rows()
    );
    if report.aborted {
        let _ = writeln!(out, "Batch aborted after the first failed row");
    }
    let _ = writeln!(out, "Metrics: {}", report.metrics);
    for entry in report.entries.iter().filter(|e| !e.succeeded) {
        let _ = writeln!(out, "  {}", entry.message);
    }
    out
}
