use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{document_id, KeyValueStore, PutOutcome, UpdateExpression};
use crate::error::StoreError;
use crate::types::Document;

type Tables = BTreeMap<String, BTreeMap<String, Document>>;

/// In-process [`KeyValueStore`].
///
/// Reads are immediately consistent. Tests can flip the store unavailable,
/// reject writes to chosen tables, and seed documents that bypass uniqueness
/// checks (e.g. duplicated identifiers).
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    failing_tables: Mutex<BTreeSet<String>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reject writes (put, update, delete) to `table` with [`StoreError::WriteRejected`].
    pub fn fail_writes_to(&self, table: &str) {
        self.failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string());
    }

    pub fn clear_write_failures(&self) {
        self.failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Insert a fixture document without any uniqueness check.
    pub fn insert_raw(&self, table: &str, doc: Document) -> Result<(), StoreError> {
        let id = document_id(table, &doc)?;
        self.tables()
            .entry(table.to_string())
            .or_default()
            .insert(id, doc);
        Ok(())
    }

    /// All documents of a table, ordered by id.
    pub fn documents(&self, table: &str) -> Vec<Document> {
        self.tables()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables().get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Number of successful mutating calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Serialize every table as pretty JSON.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.tables())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a store previously written by [`Self::save_snapshot`].
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)?;
        let tables: Tables = serde_json::from_str(&raw)?;
        Ok(Self {
            tables: Mutex::new(tables),
            ..Self::default()
        })
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, table: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let failing = self
            .failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failing.contains(table) {
            return Err(StoreError::WriteRejected {
                table: table.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }

    fn record_write(&self) {
        let _ = self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        Ok(self.tables().get(table).and_then(|t| t.get(id)).cloned())
    }

    fn query(
        &self,
        table: &str,
        field: &str,
        value: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        let tables = self.tables();
        let Some(docs) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let matches = docs
            .values()
            .filter(|doc| doc.get(field).is_some_and(|v| v.contains(value)));
        Ok(match limit {
            Some(n) => matches.take(n).cloned().collect(),
            None => matches.cloned().collect(),
        })
    }

    fn put(&self, table: &str, doc: Document) -> Result<(), StoreError> {
        self.check_writable(table)?;
        let id = document_id(table, &doc)?;
        self.tables()
            .entry(table.to_string())
            .or_default()
            .insert(id, doc);
        self.record_write();
        Ok(())
    }

    fn put_if_absent(
        &self,
        table: &str,
        doc: Document,
        unique_field: &str,
    ) -> Result<PutOutcome, StoreError> {
        self.check_writable(table)?;
        let id = document_id(table, &doc)?;
        let unique = doc.get(unique_field).cloned();

        let mut tables = self.tables();
        let docs = tables.entry(table.to_string()).or_default();
        if docs.contains_key(&id) {
            debug!(table, id = %id, "conditional put lost on primary key");
            return Ok(PutOutcome::AlreadyExists(id));
        }
        if let Some(unique) = unique {
            let clash = docs
                .iter()
                .find(|(_, existing)| existing.get(unique_field) == Some(&unique));
            if let Some((existing_id, _)) = clash {
                debug!(table, field = unique_field, "conditional put lost on unique field");
                return Ok(PutOutcome::AlreadyExists(existing_id.clone()));
            }
        }
        docs.insert(id, doc);
        drop(tables);
        self.record_write();
        Ok(PutOutcome::Written)
    }

    fn update(
        &self,
        table: &str,
        id: &str,
        expr: &UpdateExpression,
    ) -> Result<(), StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables();
        let doc = tables
            .get_mut(table)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| StoreError::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        expr.apply_to(doc);
        drop(tables);
        self.record_write();
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        self.check_writable(table)?;
        if let Some(t) = self.tables().get_mut(table) {
            t.remove(id);
        }
        self.record_write();
        Ok(())
    }
}
