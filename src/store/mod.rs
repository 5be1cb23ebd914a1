//! Key-value store collaborator.
//!
//! The engine only needs a handful of primitives from its record store: point
//! lookups, equality queries on a named field, unconditional and conditional
//! puts, and partial updates carrying SET and REMOVE clauses. [`KeyValueStore`]
//! captures exactly that; [`MemoryStore`] implements it for tests and local runs.

mod memory;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::StoreError;
use crate::types::{Document, Value};

pub use memory::MemoryStore;

/// Result of a conditional put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The document was written.
    Written,
    /// Another document already holds the unique value; holds its id.
    AlreadyExists(String),
}

/// Partial update: fields to set and fields to drop, applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    pub set: BTreeMap<String, Value>,
    pub remove: BTreeSet<String>,
}

impl UpdateExpression {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Apply this expression to an in-memory document.
    pub fn apply_to(&self, doc: &mut Document) {
        for key in &self.remove {
            doc.remove(key);
        }
        for (key, value) in &self.set {
            doc.insert(key.clone(), value.clone());
        }
    }
}

/// Record store used by the registry, the minting client, and the map builder.
///
/// Every document carries a text `id` field that acts as its primary key.
pub trait KeyValueStore: Send + Sync {
    /// Connectivity check run once before a batch starts.
    fn ping(&self) -> Result<(), StoreError>;

    /// Point lookup by primary key.
    fn get(&self, table: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Documents whose `field` equals `value` (text) or contains it (list).
    ///
    /// At most `limit` documents are returned when a limit is given.
    fn query(
        &self,
        table: &str,
        field: &str,
        value: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Unconditional write, replacing any document with the same id.
    fn put(&self, table: &str, doc: Document) -> Result<(), StoreError>;

    /// Write only if no document in `table` has the same `unique_field` value (and id).
    fn put_if_absent(
        &self,
        table: &str,
        doc: Document,
        unique_field: &str,
    ) -> Result<PutOutcome, StoreError>;

    /// Apply a partial update to an existing document.
    fn update(
        &self,
        table: &str,
        id: &str,
        expr: &UpdateExpression,
    ) -> Result<(), StoreError>;

    fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

/// Pull the primary key out of a document.
pub(crate) fn document_id(table: &str, doc: &Document) -> Result<String, StoreError> {
    crate::types::text_field(doc, crate::types::fields::ID)
        .map(str::to_string)
        .ok_or_else(|| StoreError::MissingId {
            table: table.to_string(),
        })
}
