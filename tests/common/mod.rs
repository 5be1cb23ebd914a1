#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::json;

use archive_ingest::assets::ManifestFetcher;
use archive_ingest::config::Config;
use archive_ingest::error::{AssetError, MintingError};
use archive_ingest::ingest::{
    BatchContext, IngestMetricsSnapshot, IngestObserver, IngestOptions, IngestOrchestrator, IngestSeverity,
};
use archive_ingest::minting::{LocalNoidService, MintUpdate, MintingService, ShortIdMinter};
use archive_ingest::objects::{MemoryObjectStore, ObjectStore};
use archive_ingest::registry::IdentityRegistry;
use archive_ingest::store::{KeyValueStore, MemoryStore};
use archive_ingest::tabular::{RawRow, RawTable};
use archive_ingest::types::{fields, text_field, Document, IngestResultEntry, Value};
use archive_ingest::IngestError;

pub const IMG_ROOT: &str = "https://img.example.org";

pub fn test_config() -> Config {
    Config {
        collection_category: "IAWA".to_string(),
        app_img_root_path: IMG_ROOT.to_string(),
        ..Config::default()
    }
}

/// Hands out a fixed sequence of short ids, then reports itself unavailable.
#[derive(Default)]
pub struct SequenceMinting {
    ids: Mutex<VecDeque<String>>,
    pub updates: Mutex<Vec<String>>,
}

impl SequenceMinting {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl MintingService for SequenceMinting {
    fn mint(&self) -> Result<String, MintingError> {
        self.ids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MintingError::Unavailable("sequence exhausted".to_string()))
    }

    fn update(&self, update: &MintUpdate<'_>) -> Result<(), MintingError> {
        self.updates.lock().unwrap().push(update.short_id.to_string());
        Ok(())
    }
}

/// Serves a manifest with a thumbnail for every URL except the ones marked missing.
#[derive(Default)]
pub struct FakeManifests {
    missing: Vec<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeManifests {
    pub fn missing(urls: &[&str]) -> Self {
        Self {
            missing: urls.iter().map(|s| s.to_string()).collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }
}

impl ManifestFetcher for FakeManifests {
    fn fetch(&self, url: &str) -> Result<serde_json::Value, AssetError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.missing.iter().any(|m| m == url) {
            return Err(AssetError::ManifestNotFound {
                url: url.to_string(),
                reason: "http status 404 Not Found".to_string(),
            });
        }
        Ok(json!({
            "@id": url,
            "thumbnail": {"@id": thumbnail_for(url)}
        }))
    }
}

pub fn thumbnail_for(manifest_url: &str) -> String {
    format!("{}/full/200,/0/default.jpg", manifest_url.trim_end_matches("/manifest.json"))
}

/// Store, object store, and an orchestrator wired over them.
pub struct Harness {
    pub config: Arc<Config>,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub orchestrator: IngestOrchestrator,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_services(config, Arc::new(LocalNoidService), Arc::new(FakeManifests::default()))
    }

    pub fn with_services(
        config: Config,
        minting: Arc<dyn MintingService>,
        fetcher: Arc<dyn ManifestFetcher>,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let orchestrator = IngestOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            minting,
            fetcher,
        );
        Self {
            config,
            store,
            objects,
            orchestrator,
        }
    }

    pub fn observed_by(mut self, observer: Arc<dyn IngestObserver>, alert_at_or_above: IngestSeverity) -> Self {
        self.orchestrator = self.orchestrator.with_options(IngestOptions {
            observer: Some(observer),
            alert_at_or_above,
        });
        self
    }

    pub fn put_file(&self, location: &str, contents: &str) {
        self.put_file_bytes(location, contents.as_bytes());
    }

    pub fn put_file_bytes(&self, location: &str, bytes: &[u8]) {
        self.objects.put(location, bytes).unwrap();
    }

    pub fn collections(&self) -> Vec<Document> {
        self.store.documents(&self.config.tables.collection)
    }

    pub fn items(&self) -> Vec<Document> {
        self.store.documents(&self.config.tables.item)
    }

    pub fn collection(&self, identifier: &str) -> Document {
        find_by_identifier(&self.collections(), identifier)
    }

    pub fn item(&self, identifier: &str) -> Document {
        find_by_identifier(&self.items(), identifier)
    }
}

pub fn find_by_identifier(docs: &[Document], identifier: &str) -> Document {
    docs.iter()
        .find(|d| text_field(d, fields::IDENTIFIER) == Some(identifier))
        .cloned()
        .unwrap_or_else(|| panic!("no record with identifier {identifier}"))
}

pub fn id_of(doc: &Document) -> String {
    text_field(doc, fields::ID).unwrap().to_string()
}

pub fn list(doc: &Document, key: &str) -> Vec<String> {
    doc.get(key)
        .and_then(Value::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

/// Registry and minter over a fresh store, without an orchestrator.
pub fn registry_parts(
    config: Config,
    minting: Arc<dyn MintingService>,
) -> (Arc<Config>, Arc<MemoryStore>, Arc<ShortIdMinter>, IdentityRegistry) {
    let config = Arc::new(config);
    let store = Arc::new(MemoryStore::new());
    let minter = Arc::new(ShortIdMinter::new(
        Arc::clone(&config),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        minting,
    ));
    let registry = IdentityRegistry::new(
        Arc::clone(&config),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::clone(&minter),
    );
    (config, store, minter, registry)
}

pub fn text_doc(pairs: &[(&str, &str)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::text(*v)))
        .collect()
}

/// Stored collection fixture with explicit id, parent, and ancestor path.
pub fn collection_fixture(id: &str, identifier: &str, title: &str, parents: &[&str], path: &[&str]) -> Document {
    let mut doc = text_doc(&[("id", id), ("identifier", identifier), ("title", title), ("collection_category", "IAWA")]);
    if !parents.is_empty() {
        doc.insert(
            fields::PARENT_COLLECTION.into(),
            Value::List(parents.iter().map(|s| s.to_string()).collect()),
        );
    }
    doc.insert(
        fields::ANCESTOR_PATH.into(),
        Value::List(path.iter().map(|s| s.to_string()).collect()),
    );
    doc
}

pub fn raw_row(ordinal: usize, cells: &[(&str, &str)]) -> RawRow {
    RawRow::new(
        ordinal,
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

pub fn raw_table(rows: &[&[(&str, &str)]]) -> RawTable {
    RawTable {
        headers: rows
            .first()
            .map(|r| r.iter().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default(),
        rows: rows.iter().enumerate().map(|(i, r)| raw_row(i, r)).collect(),
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub rows: Mutex<Vec<IngestResultEntry>>,
    pub batches: Mutex<Vec<(String, IngestMetricsSnapshot)>>,
    pub failures: Mutex<Vec<IngestSeverity>>,
    pub alerts: Mutex<Vec<IngestSeverity>>,
}

impl IngestObserver for RecordingObserver {
    fn on_row(&self, _ctx: &BatchContext, entry: &IngestResultEntry) {
        self.rows.lock().unwrap().push(entry.clone());
    }

    fn on_batch_finished(&self, ctx: &BatchContext, metrics: &IngestMetricsSnapshot) {
        self.batches
            .lock()
            .unwrap()
            .push((ctx.location.clone(), metrics.clone()));
    }

    fn on_failure(&self, _ctx: &BatchContext, severity: IngestSeverity, _error: &IngestError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &BatchContext, severity: IngestSeverity, _error: &IngestError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

/// Object keys under `prefix`, mapped to their text contents.
pub fn files_under(objects: &MemoryObjectStore, prefix: &str) -> BTreeMap<String, String> {
    objects
        .list(prefix)
        .unwrap()
        .into_iter()
        .filter_map(|k| objects.get_string(&k).map(|v| (k, v)))
        .collect()
}
