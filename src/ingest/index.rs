//! Batch index files: each row names an item metadata file and the collection path it belongs under.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::BatchPolicy;
use crate::error::{HierarchyError, IngestError, IngestResult};
use crate::hierarchy::split_path;
use crate::tabular::{read_table, RawTable};
use crate::types::IngestResultEntry;

use super::{BatchContext, CollectionOwner, FileKind, IngestOrchestrator, IngestReport};

pub const FILE_COLUMN: &str = "file";
pub const PATH_COLUMN: &str = "path";

#[derive(Debug, Error)]
enum IndexRowError {
    #[error("index row has no file")]
    MissingFile,

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    File(#[from] IngestError),
}

/// Header of `table` equal to `name` ignoring case.
fn column<'a>(table: &'a RawTable, name: &str) -> IngestResult<&'a str> {
    table
        .headers
        .iter()
        .find(|h| h.trim().eq_ignore_ascii_case(name))
        .map(String::as_str)
        .ok_or_else(|| IngestError::SchemaMismatch {
            message: format!("index file is missing the '{name}' column"),
        })
}

impl IngestOrchestrator {
    pub(super) fn run_index(&self, location: &str, table: &RawTable) -> IngestResult<IngestReport> {
        let file_col = column(table, FILE_COLUMN)?;
        let path_col = column(table, PATH_COLUMN)?;
        let ctx = BatchContext {
            location: location.to_string(),
            kind: Some(FileKind::Index),
        };
        info!(%location, entries = table.row_count(), "ingesting index");

        let mut entries = Vec::with_capacity(table.row_count());
        let mut children = Vec::new();
        let mut aborted = false;
        for (pos, row) in table.rows.iter().enumerate() {
            let file = row.get(file_col).unwrap_or_default().trim();
            let path = row.get(path_col).unwrap_or_default();
            let n = row.user_row();

            let entry = match self.run_index_row(file, path) {
                Ok((owner, child)) => {
                    let entry = IngestResultEntry {
                        row: n,
                        identifier: owner.identifier,
                        succeeded: child.is_clean(),
                        message: format!(
                            "Row {n}: {file} ingested, {} of {} rows succeeded{}.",
                            child.succeeded_rows(),
                            child.entries.len(),
                            if child.aborted { ", batch aborted" } else { "" }
                        ),
                    };
                    children.push(child);
                    entry
                }
                Err(e) => {
                    warn!(%location, row = n, %file, error = %e, "index row failed");
                    IngestResultEntry {
                        row: n,
                        identifier: path.trim().to_string(),
                        succeeded: false,
                        message: format!("Error Row {n}: {file}: {e}."),
                    }
                }
            };
            let failed = !entry.succeeded;
            if let Some(obs) = self.options.observer.as_ref() {
                obs.on_row(&ctx, &entry);
            }
            entries.push(entry);

            if failed && self.config.batch_policy == BatchPolicy::AbortOnFirstError {
                if pos + 1 < table.row_count() {
                    warn!(%location, "aborting index after failed entry");
                    aborted = true;
                }
                break;
            }
        }

        let log_identifier = self.batch_identifier(location);
        self.finish_batch(ctx, FileKind::Index, entries, aborted, children, &log_identifier)
    }

    /// Resolve the entry's collection path, then ingest its file under the leaf collection.
    fn run_index_row(&self, file: &str, path: &str) -> Result<(CollectionOwner, IngestReport), IndexRowError> {
        if file.is_empty() {
            return Err(IndexRowError::MissingFile);
        }
        let resolution = self.hierarchy.resolve(&split_path(path))?;
        for _ in &resolution.created {
            self.metrics.on_created();
        }
        if resolution.map_rebuilt {
            self.metrics.on_map_rebuilt();
        }
        let owner = CollectionOwner::from(&resolution);

        let bytes = self.objects.get(file).map_err(IngestError::from)?;
        let table = read_table(file, &bytes, None, &self.config.fields.header_renames)?;
        let report = self.run_batch(file, FileKind::Item, &table, Some(&owner))?;
        Ok((owner, report))
    }
}
