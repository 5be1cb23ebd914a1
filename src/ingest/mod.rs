//! Batch ingestion of metadata files.
//!
//! A batch file is dispatched by its name:
//!
//! - `*_collection_metadata.{csv,xlsx}`: one collection per row
//! - `*_archive_metadata.*` / `*_item_metadata.*`: one item per row
//! - `*_index.csv`: `file`/`path` pairs; each path is resolved (creating missing
//!   collections) and the referenced item file is ingested under the leaf
//!
//! Rows are processed one at a time, in file order, since later rows may depend on
//! collections created by earlier ones. Each row produces one [`IngestResultEntry`];
//! row failures never escape as errors. What happens after a failed row is decided by
//! [`BatchPolicy`]. Every batch ends with a results CSV and a text summary in object
//! storage.
//!
//! If an [`IngestObserver`] is configured it sees every row, every finished batch, and
//! every whole-batch failure; `on_alert` fires for failures whose severity is at or
//! above [`IngestOptions::alert_at_or_above`].

mod index;
mod metrics;
mod observer;
mod results;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::assets::{resolver_for, AssetContext, AssetResolver, ManifestFetcher};
use crate::collection_map::CollectionMapBuilder;
use crate::config::{BatchPolicy, Config};
use crate::error::{IngestError, IngestResult, RowError};
use crate::hierarchy::{HierarchyResolver, Resolution};
use crate::minting::{MintingService, ShortIdMinter};
use crate::normalize::{collection_thumbnail, RowNormalizer};
use crate::objects::ObjectStore;
use crate::registry::{IdentityRegistry, WriteOutcome};
use crate::store::KeyValueStore;
use crate::tabular::{read_table, RawRow, RawTable};
use crate::types::{fields, list_field, text_field, CollectionRecord, Document, IngestResultEntry, RecordType, Value};

pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
pub use observer::{
    severity_for_error, BatchContext, CompositeObserver, FileObserver, IngestObserver, IngestSeverity,
    TracingObserver,
};
pub use results::{
    render_results_csv, render_summary, results_location, summary_location, unique_results_location, IngestReport,
};

/// File name suffixes (before the extension) and the batch kind they select.
const KIND_SUFFIXES: [(&str, FileKind); 4] = [
    ("_collection_metadata", FileKind::Collection),
    ("_archive_metadata", FileKind::Item),
    ("_item_metadata", FileKind::Item),
    ("_index", FileKind::Index),
];

/// What a batch file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Collection,
    Item,
    Index,
}

impl FileKind {
    /// Detect the kind from the file name suffix (case-insensitive).
    pub fn detect(location: &str) -> IngestResult<Self> {
        let stem = file_stem(location).to_ascii_lowercase();
        KIND_SUFFIXES
            .iter()
            .find(|(suffix, _)| stem.ends_with(suffix))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| IngestError::UnsupportedFile(location.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Collection => "collection",
            FileKind::Item => "item",
            FileKind::Index => "index",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn file_stem(location: &str) -> &str {
    Path::new(location)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(location)
}

/// The collection an item row is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOwner {
    pub id: String,
    pub identifier: String,
    /// Root-first ids, inclusive of the collection.
    pub ancestor_path: Vec<String>,
}

impl From<&CollectionRecord> for CollectionOwner {
    fn from(record: &CollectionRecord) -> Self {
        let ancestor_path = if record.ancestor_path.is_empty() {
            vec![record.id.clone()]
        } else {
            record.ancestor_path.clone()
        };
        Self {
            id: record.id.clone(),
            identifier: record.identifier.clone(),
            ancestor_path,
        }
    }
}

impl From<&Resolution> for CollectionOwner {
    fn from(resolution: &Resolution) -> Self {
        Self {
            id: resolution.leaf_id.clone(),
            identifier: resolution.leaf_identifier.clone(),
            ancestor_path: resolution.ancestor_path.clone(),
        }
    }
}

/// Options controlling observation of ingest runs.
#[derive(Clone)]
pub struct IngestOptions {
    pub observer: Option<Arc<dyn IngestObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestSeverity,
}

impl fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: IngestSeverity::Critical,
        }
    }
}

/// A successfully handled row.
struct RowDone {
    identifier: String,
    outcome: WriteOutcome,
    notes: Vec<String>,
}

/// Drives batch files through normalization, identity resolution, and persistence.
pub struct IngestOrchestrator {
    config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
    objects: Arc<dyn ObjectStore>,
    minter: Arc<ShortIdMinter>,
    registry: Arc<IdentityRegistry>,
    maps: Arc<CollectionMapBuilder>,
    hierarchy: HierarchyResolver,
    normalizer: RowNormalizer,
    assets: Arc<dyn AssetResolver>,
    options: IngestOptions,
    metrics: IngestMetrics,
}

impl IngestOrchestrator {
    /// Wire every component from one configuration and its collaborators.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn KeyValueStore>,
        objects: Arc<dyn ObjectStore>,
        minting: Arc<dyn MintingService>,
        fetcher: Arc<dyn ManifestFetcher>,
    ) -> Self {
        let minter = Arc::new(ShortIdMinter::new(
            Arc::clone(&config),
            Arc::clone(&store),
            minting,
        ));
        let registry = Arc::new(IdentityRegistry::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&minter),
        ));
        let maps = Arc::new(CollectionMapBuilder::new(Arc::clone(&config), Arc::clone(&store)));
        let hierarchy = HierarchyResolver::new(Arc::clone(&config), Arc::clone(&registry), Arc::clone(&maps));
        let assets = resolver_for(Arc::clone(&config), fetcher, Arc::clone(&objects));
        Self {
            normalizer: RowNormalizer::new(Arc::clone(&config)),
            config,
            store,
            objects,
            minter,
            registry,
            maps,
            hierarchy,
            assets,
            options: IngestOptions::default(),
            metrics: IngestMetrics::new(),
        }
    }

    /// Replace the media-type strategy chosen from configuration.
    pub fn with_asset_resolver(mut self, assets: Arc<dyn AssetResolver>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn minter(&self) -> &ShortIdMinter {
        &self.minter
    }

    pub fn maps(&self) -> &CollectionMapBuilder {
        &self.maps
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    /// Counters of the current (or last) run.
    pub fn metrics(&self) -> IngestMetricsSnapshot {
        self.metrics
            .observe_minting(self.minter.registered_count(), self.minter.released_count());
        self.metrics.snapshot()
    }

    /// Startup connectivity check; the only store failure that is fatal to a run.
    pub fn preflight(&self) -> IngestResult<()> {
        self.store.ping()?;
        debug!("record store reachable");
        Ok(())
    }

    /// Fetch, parse, and ingest one batch file from object storage.
    pub fn ingest_file(&self, location: &str) -> IngestResult<IngestReport> {
        self.observed(location, FileKind::detect(location).ok(), || {
            let kind = FileKind::detect(location)?;
            let bytes = self.objects.get(location)?;
            let table = read_table(location, &bytes, None, &self.config.fields.header_renames)?;
            self.run_table(location, kind, &table)
        })
    }

    /// Ingest a table that has already been read.
    pub fn ingest_table(&self, location: &str, kind: FileKind, table: &RawTable) -> IngestResult<IngestReport> {
        self.observed(location, Some(kind), || self.run_table(location, kind, table))
    }

    fn observed<F>(&self, location: &str, kind: Option<FileKind>, run: F) -> IngestResult<IngestReport>
    where
        F: FnOnce() -> IngestResult<IngestReport>,
    {
        self.metrics
            .begin_run(self.minter.registered_count(), self.minter.released_count());
        let result = self.preflight().and_then(|()| run());
        self.metrics.end_run();

        if let Err(e) = &result {
            warn!(%location, error = %e, "batch failed");
            if let Some(obs) = self.options.observer.as_ref() {
                let ctx = BatchContext {
                    location: location.to_string(),
                    kind,
                };
                let sev = severity_for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= self.options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
        result
    }

    fn run_table(&self, location: &str, kind: FileKind, table: &RawTable) -> IngestResult<IngestReport> {
        match kind {
            FileKind::Index => self.run_index(location, table),
            FileKind::Collection | FileKind::Item => self.run_batch(location, kind, table, None),
        }
    }

    /// Process every row of a collection or item table.
    fn run_batch(
        &self,
        location: &str,
        kind: FileKind,
        table: &RawTable,
        owner: Option<&CollectionOwner>,
    ) -> IngestResult<IngestReport> {
        let record_type = match kind {
            FileKind::Collection => RecordType::Collection,
            FileKind::Item | FileKind::Index => RecordType::Item,
        };
        let ctx = BatchContext {
            location: location.to_string(),
            kind: Some(kind),
        };
        info!(%location, %kind, rows = table.row_count(), "ingesting batch");

        let mut entries = Vec::with_capacity(table.row_count());
        let mut aborted = false;
        for (pos, row) in table.rows.iter().enumerate() {
            self.metrics.on_row();
            let (entry, failed) = match self.process_row(row, record_type, owner) {
                Ok(done) => {
                    self.count_outcome(&done.outcome);
                    (self.success_entry(row, done), false)
                }
                Err(e) => {
                    self.metrics.on_failed();
                    warn!(%location, row = row.user_row(), error = %e, "row failed");
                    (failure_entry(row, &e), true)
                }
            };
            if let Some(obs) = self.options.observer.as_ref() {
                obs.on_row(&ctx, &entry);
            }
            entries.push(entry);

            if failed && self.config.batch_policy == BatchPolicy::AbortOnFirstError {
                let remaining = table.row_count() - pos - 1;
                if remaining > 0 {
                    warn!(%location, remaining, "aborting batch after failed row");
                    aborted = true;
                }
                break;
            }
        }

        let log_identifier = match owner {
            Some(owner) => owner.identifier.clone(),
            None => self.batch_identifier(location),
        };
        self.finish_batch(ctx, kind, entries, aborted, Vec::new(), &log_identifier)
    }

    /// Write the result log and notify the observer.
    fn finish_batch(
        &self,
        ctx: BatchContext,
        kind: FileKind,
        entries: Vec<IngestResultEntry>,
        aborted: bool,
        children: Vec<IngestReport>,
        log_identifier: &str,
    ) -> IngestResult<IngestReport> {
        let mut report = IngestReport {
            location: ctx.location.clone(),
            kind,
            entries,
            aborted,
            results_location: None,
            metrics: self.metrics(),
            children,
        };

        let base = results_location(&self.config.collection_category, log_identifier, Utc::now());
        // Several logs for one collection can land in the same second (index batches).
        let taken = self.objects.list(base.strip_suffix(".csv").unwrap_or(&base))?;
        let csv_location = unique_results_location(&base, &taken);
        self.objects
            .put(&csv_location, &render_results_csv(&report.entries)?)?;
        self.objects.put(
            &summary_location(&csv_location),
            render_summary(&report, self.config.dry_run).as_bytes(),
        )?;
        info!(
            location = %report.location,
            results = %csv_location,
            succeeded = report.succeeded_rows(),
            failed = report.failed_rows(),
            "wrote ingest results"
        );
        report.results_location = Some(csv_location);

        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_batch_finished(&ctx, &report.metrics);
        }
        Ok(report)
    }

    /// Collection identifier a batch's result log is filed under.
    fn batch_identifier(&self, location: &str) -> String {
        if let Some(identifier) = &self.config.collection_identifier {
            return identifier.clone();
        }
        let stem = file_stem(location);
        let lower = stem.to_ascii_lowercase();
        KIND_SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map_or(stem, |(suffix, _)| &stem[..stem.len() - suffix.len()])
            .to_string()
    }

    fn process_row(
        &self,
        row: &RawRow,
        record_type: RecordType,
        owner: Option<&CollectionOwner>,
    ) -> Result<RowDone, RowError> {
        let doc = self
            .normalizer
            .normalize(row, record_type, &*self.registry)?;
        match record_type {
            RecordType::Collection => self.write_collection(doc),
            RecordType::Item => self.write_item(doc, owner),
        }
    }

    fn write_collection(&self, mut doc: Document) -> Result<RowDone, RowError> {
        let identifier = text_field(&doc, fields::IDENTIFIER)
            .unwrap_or_default()
            .to_string();
        if text_field(&doc, fields::THUMBNAIL_PATH).is_none() {
            doc.insert(
                fields::THUMBNAIL_PATH.into(),
                Value::Text(collection_thumbnail(&self.config, &identifier)),
            );
        }
        let parent_root = list_field(&doc, fields::ANCESTOR_PATH).into_iter().next();

        let outcome = self
            .registry
            .create_or_update(RecordType::Collection, doc, self.config.update_metadata)?;

        let mut notes = Vec::new();
        let created = matches!(outcome, WriteOutcome::Created(_));
        let moved = [fields::ANCESTOR_PATH, fields::TITLE, fields::PARENT_COLLECTION]
            .iter()
            .any(|key| outcome.changed(key));
        // A collection created in a dry run was never stored, so there is no tree to walk.
        if moved || (created && !self.config.dry_run) {
            let root = match parent_root {
                Some(root) => root,
                None => self
                    .registry
                    .find_by_id(RecordType::Collection, outcome.id())?
                    .as_ref()
                    .and_then(CollectionRecord::from_document)
                    .map_or_else(|| outcome.id().to_string(), |c| c.root_id().to_string()),
            };
            if self.rebuild_map(&root) {
                notes.push("collection map rebuilt".to_string());
            }
        }

        Ok(RowDone {
            identifier,
            outcome,
            notes,
        })
    }

    fn write_item(&self, mut doc: Document, owner: Option<&CollectionOwner>) -> Result<RowDone, RowError> {
        let mut identifier = text_field(&doc, fields::IDENTIFIER)
            .unwrap_or_default()
            .to_string();
        let owner = match owner {
            Some(owner) => owner.clone(),
            None => self
                .resolve_owner(&doc)?
                .ok_or_else(|| RowError::CollectionNotFound(identifier.clone()))?,
        };

        if self.config.prefix_item_identifiers && !identifier.contains(&owner.identifier) {
            identifier = format!("{}_{}", owner.identifier, identifier);
            doc.insert(fields::IDENTIFIER.into(), Value::text(&identifier));
        }
        doc.insert(fields::COLLECTION.into(), Value::text(&owner.id));
        doc.insert(
            fields::PARENT_COLLECTION.into(),
            Value::List(vec![owner.id.clone()]),
        );
        doc.insert(
            fields::ANCESTOR_PATH.into(),
            Value::List(owner.ancestor_path.clone()),
        );

        let notes = self.attach_assets(&mut doc, &owner, &identifier)?;
        let outcome = self
            .registry
            .create_or_update(RecordType::Item, doc, self.config.update_metadata)?;
        Ok(RowDone {
            identifier,
            outcome,
            notes,
        })
    }

    /// Owning collection of an item row: explicit `collection`, then `parent_collection`,
    /// then the immediate parent in `ancestor_path`, then the configured default collection.
    fn resolve_owner(&self, doc: &Document) -> Result<Option<CollectionOwner>, RowError> {
        let inherited = list_field(doc, fields::ANCESTOR_PATH).pop();
        let candidates = [
            doc.get(fields::COLLECTION).and_then(Value::first).map(str::to_string),
            doc.get(fields::PARENT_COLLECTION)
                .and_then(Value::first)
                .map(str::to_string),
            inherited,
            self.config.collection_identifier.clone(),
        ];
        for reference in candidates.into_iter().flatten() {
            if let Some(record) = self.registry.find_collection(&reference)? {
                debug!(%reference, collection = %record.id, "resolved owning collection");
                return Ok(Some(CollectionOwner::from(&record)));
            }
        }
        Ok(None)
    }

    /// Fill in manifest and thumbnail locations through the media-type strategy.
    fn attach_assets(
        &self,
        doc: &mut Document,
        owner: &CollectionOwner,
        identifier: &str,
    ) -> Result<Vec<String>, RowError> {
        if text_field(doc, fields::MANIFEST_URL).is_some() && text_field(doc, fields::THUMBNAIL_PATH).is_some() {
            return Ok(Vec::new());
        }
        let ctx = AssetContext {
            category: &self.config.collection_category,
            collection_identifier: &owner.identifier,
            item_identifier: identifier,
        };
        match self.assets.resolve(&ctx) {
            Ok(set) => {
                for (key, value) in [
                    (fields::MANIFEST_URL, set.manifest_url),
                    (fields::THUMBNAIL_PATH, set.thumbnail_path),
                ] {
                    if let Some(value) = value {
                        if text_field(doc, key).is_none() {
                            doc.insert(key.into(), Value::Text(value));
                        }
                    }
                }
                doc.extend(set.extra);
                Ok(Vec::new())
            }
            Err(source) if self.assets.thumbnail_required() => Err(RowError::ManifestNotFound {
                identifier: identifier.to_string(),
                source,
            }),
            Err(e) => {
                warn!(%identifier, error = %e, "assets not resolved");
                Ok(vec![format!("assets not resolved: {e}")])
            }
        }
    }

    fn rebuild_map(&self, root: &str) -> bool {
        match self.maps.rebuild(root) {
            Ok(_) => {
                self.metrics.on_map_rebuilt();
                true
            }
            Err(e) => {
                warn!(%root, error = %e, "collection map not rebuilt");
                false
            }
        }
    }

    fn count_outcome(&self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Created(_) => self.metrics.on_created(),
            WriteOutcome::Updated { .. } => self.metrics.on_updated(),
            WriteOutcome::Unchanged(_) => self.metrics.on_unchanged(),
            WriteOutcome::DuplicateSkipped(_) => self.metrics.on_duplicate_skipped(),
        }
    }

    fn success_entry(&self, row: &RawRow, done: RowDone) -> IngestResultEntry {
        let n = row.user_row();
        let id = &done.identifier;
        let mut message = match &done.outcome {
            WriteOutcome::Created(_) => format!("Row {n}: {id} has been successfully imported."),
            WriteOutcome::Updated { changed, .. } if changed.is_empty() => {
                format!("Row {n}: {id} has been updated (no field changes).")
            }
            WriteOutcome::Updated { changed, .. } => {
                format!("Row {n}: {id} has been updated ({}).", changed.join(", "))
            }
            WriteOutcome::Unchanged(_) => format!("Row {n}: {id} is already up to date."),
            WriteOutcome::DuplicateSkipped(_) => {
                format!("Row {n}: Identifier ({id}) already exists, skipped.")
            }
        };
        for note in &done.notes {
            message.push(' ');
            message.push_str(note);
            message.push('.');
        }
        if self.config.dry_run {
            message.push_str(" [dry run]");
        }
        IngestResultEntry {
            row: n,
            identifier: done.identifier,
            succeeded: true,
            message,
        }
    }
}

fn failure_entry(row: &RawRow, error: &RowError) -> IngestResultEntry {
    IngestResultEntry {
        row: row.user_row(),
        identifier: row_identifier(row),
        succeeded: false,
        message: format!("Error Row {}: {error}.", row.user_row()),
    }
}

/// The raw identifier cell, or `N/A`.
fn row_identifier(row: &RawRow) -> String {
    row.get(fields::IDENTIFIER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A")
        .to_string()
}
