//! Identity registry: identifier lookup and create-or-update over the record store.
//!
//! Creation is a conditional put keyed on `identifier`, so two writers racing
//! on the same identifier produce one record and one
//! [`WriteOutcome::DuplicateSkipped`]. Updates are computed as a field-level
//! diff and sent as a single SET/REMOVE [`UpdateExpression`].

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{MintingError, RegistryError};
use crate::minting::ShortIdMinter;
use crate::normalize::ParentLookup;
use crate::store::{KeyValueStore, PutOutcome, UpdateExpression};
use crate::types::{fields, list_field, text_field, CollectionRecord, Document, RecordType, Value};

/// Field names accepted in SET/REMOVE clauses.
const FIELD_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static FIELD_NAME: OnceLock<Option<Regex>> = OnceLock::new();

/// Fields never written by the SET clause of an update.
const IMMUTABLE_ON_UPDATE: &[&str] = &[fields::ID, fields::IDENTIFIER, fields::CREATED_AT];

/// What [`IdentityRegistry::create_or_update`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(String),
    /// Merge-updated and `updatedAt` refreshed; `changed` lists the keys whose
    /// stored value differs afterwards (set first, then removed).
    Updated { id: String, changed: Vec<String> },
    /// Update mode was on but the row had nothing to set or remove.
    Unchanged(String),
    /// The identifier exists and updates are disabled (or a concurrent create won).
    DuplicateSkipped(String),
}

impl WriteOutcome {
    pub fn id(&self) -> &str {
        match self {
            WriteOutcome::Created(id)
            | WriteOutcome::Updated { id, .. }
            | WriteOutcome::Unchanged(id)
            | WriteOutcome::DuplicateSkipped(id) => id,
        }
    }

    /// Whether an update touched `key`.
    pub fn changed(&self, key: &str) -> bool {
        matches!(self, WriteOutcome::Updated { changed, .. } if changed.iter().any(|c| c == key))
    }
}

pub struct IdentityRegistry {
    config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
    minter: Arc<ShortIdMinter>,
}

impl IdentityRegistry {
    pub fn new(config: Arc<Config>, store: Arc<dyn KeyValueStore>, minter: Arc<ShortIdMinter>) -> Self {
        Self {
            config,
            store,
            minter,
        }
    }

    pub fn table_for(&self, record_type: RecordType) -> &str {
        match record_type {
            RecordType::Collection => &self.config.tables.collection,
            RecordType::Item => &self.config.tables.item,
        }
    }

    /// Every record of `record_type` with this identifier.
    pub fn lookup(&self, record_type: RecordType, identifier: &str) -> Result<Vec<Document>, RegistryError> {
        Ok(self
            .store
            .query(self.table_for(record_type), fields::IDENTIFIER, identifier, None)?)
    }

    /// The unique record with this identifier, if any.
    pub fn find_by_identifier(
        &self,
        record_type: RecordType,
        identifier: &str,
    ) -> Result<Option<Document>, RegistryError> {
        let mut matches = self.lookup(record_type, identifier)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(RegistryError::AmbiguousIdentifier {
                table: self.table_for(record_type).to_string(),
                identifier: identifier.to_string(),
                matches: n,
            }),
        }
    }

    pub fn find_by_id(&self, record_type: RecordType, id: &str) -> Result<Option<Document>, RegistryError> {
        Ok(self.store.get(self.table_for(record_type), id)?)
    }

    /// A collection referenced either by id or by identifier.
    pub fn find_collection(&self, reference: &str) -> Result<Option<CollectionRecord>, RegistryError> {
        let doc = match self.find_by_id(RecordType::Collection, reference)? {
            Some(doc) => Some(doc),
            None => self.find_by_identifier(RecordType::Collection, reference)?,
        };
        Ok(doc.as_ref().and_then(CollectionRecord::from_document))
    }

    /// Create the record if its identifier is new, otherwise skip or merge-update it.
    pub fn create_or_update(
        &self,
        record_type: RecordType,
        doc: Document,
        update_enabled: bool,
    ) -> Result<WriteOutcome, RegistryError> {
        let identifier = text_field(&doc, fields::IDENTIFIER)
            .ok_or(RegistryError::MissingIdentifier)?
            .to_string();

        match self.find_by_identifier(record_type, &identifier)? {
            None => self.create(record_type, doc, &identifier),
            Some(existing) => {
                let id = text_field(&existing, fields::ID).unwrap_or_default().to_string();
                if update_enabled {
                    let mut doc = doc;
                    // Incoming collection paths stop at the parent; stored ones include the record.
                    if record_type == RecordType::Collection {
                        if let Some(Value::List(path)) = doc.get_mut(fields::ANCESTOR_PATH) {
                            if path.last() != Some(&id) {
                                path.push(id.clone());
                            }
                        }
                    }
                    self.update(record_type, &id, &existing, &doc)
                } else {
                    info!(%identifier, table = self.table_for(record_type), "identifier exists, skipping");
                    Ok(WriteOutcome::DuplicateSkipped(id))
                }
            }
        }
    }

    fn create(
        &self,
        record_type: RecordType,
        mut doc: Document,
        identifier: &str,
    ) -> Result<WriteOutcome, RegistryError> {
        let id = Uuid::new_v4().to_string();
        doc.insert(fields::ID.into(), Value::text(&id));
        if record_type == RecordType::Collection {
            let mut path = list_field(&doc, fields::ANCESTOR_PATH);
            path.push(id.clone());
            doc.insert(fields::ANCESTOR_PATH.into(), Value::List(path));
        }

        let minted = self.reserve_short_id(record_type, identifier);
        if let Some(record) = &minted {
            doc.insert(
                fields::SHORT_KEY.into(),
                Value::text(self.minter.short_key(&record.short_id)),
            );
        }

        let now = Value::Timestamp(Utc::now());
        doc.insert(fields::CREATED_AT.into(), now.clone());
        doc.insert(fields::UPDATED_AT.into(), now);

        let table = self.table_for(record_type);
        if self.config.dry_run {
            info!(%identifier, table, "dry run: record would be created");
            return Ok(WriteOutcome::Created(id));
        }

        match self.store.put_if_absent(table, doc, fields::IDENTIFIER) {
            Ok(PutOutcome::Written) => {
                info!(%identifier, %id, table, "created record");
                if let Some(record) = &minted {
                    if let Err(e) = self.minter.notify(record) {
                        warn!(short_id = %record.short_id, error = %e, "failed to report short id urls");
                    }
                }
                Ok(WriteOutcome::Created(id))
            }
            Ok(PutOutcome::AlreadyExists(existing)) => {
                warn!(%identifier, table, "identifier created concurrently, skipping");
                self.release_quietly(minted.as_ref().map(|r| r.short_id.as_str()));
                Ok(WriteOutcome::DuplicateSkipped(existing))
            }
            Err(source) => {
                self.release_quietly(minted.as_ref().map(|r| r.short_id.as_str()));
                Err(RegistryError::StoreWrite {
                    identifier: identifier.to_string(),
                    source,
                })
            }
        }
    }

    /// Mint and register a short id; minting trouble means "no short id", never a failed row.
    fn reserve_short_id(
        &self,
        record_type: RecordType,
        identifier: &str,
    ) -> Option<crate::types::ShortIdentifierRecord> {
        let result = self
            .minter
            .mint()
            .and_then(|short_id| self.minter.register_minted(&short_id, record_type, identifier));
        match result {
            Ok(record) => Some(record),
            Err(MintingError::Unavailable(reason)) => {
                warn!(%identifier, %reason, "minting unavailable, creating record without short id");
                None
            }
            Err(e) => {
                warn!(%identifier, error = %e, "short id not minted");
                None
            }
        }
    }

    fn release_quietly(&self, short_id: Option<&str>) {
        if let Some(short_id) = short_id {
            if let Err(e) = self.minter.release(short_id) {
                warn!(short_id, error = %e, "failed to release short id");
            }
        }
    }

    fn update(
        &self,
        record_type: RecordType,
        id: &str,
        existing: &Document,
        incoming: &Document,
    ) -> Result<WriteOutcome, RegistryError> {
        let mut expr = diff_for_update(existing, incoming);
        if expr.is_empty() {
            debug!(%id, "no changes to apply");
            return Ok(WriteOutcome::Unchanged(id.to_string()));
        }
        let changed: Vec<String> = expr
            .set
            .iter()
            .filter(|(key, value)| existing.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key)
            .chain(expr.remove.iter())
            .cloned()
            .collect();
        expr.set
            .insert(fields::UPDATED_AT.into(), Value::Timestamp(Utc::now()));

        let table = self.table_for(record_type);
        if self.config.dry_run {
            info!(%id, table, ?changed, "dry run: record would be updated");
        } else {
            self.store.update(table, id, &expr)?;
            info!(%id, table, ?changed, "updated record");
        }
        Ok(WriteOutcome::Updated {
            id: id.to_string(),
            changed,
        })
    }
}

impl ParentLookup for IdentityRegistry {
    fn parent_collection(&self, reference: &str) -> Option<CollectionRecord> {
        match self.find_collection(reference) {
            Ok(found) => found,
            Err(e) => {
                warn!(%reference, error = %e, "parent collection lookup failed");
                None
            }
        }
    }
}

/// Whether REMOVE must leave `key` alone.
pub fn is_protected_from_remove(key: &str) -> bool {
    key == fields::IDENTIFIER
        || key == fields::CREATED_AT
        || key == fields::UPDATED_AT
        || key.contains("collection")
}

pub fn is_valid_field_name(key: &str) -> bool {
    FIELD_NAME
        .get_or_init(|| Regex::new(FIELD_NAME_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(key))
}

/// Field-level diff between a stored record and an incoming one.
///
/// Every non-empty incoming value is SET, whether or not it matches the stored
/// one. Empty incoming values whose key is stored and not protected are
/// REMOVEd. Invalid field names are skipped. `updatedAt` is not included.
pub fn diff_for_update(existing: &Document, incoming: &Document) -> UpdateExpression {
    let mut expr = UpdateExpression::default();
    for (key, value) in incoming {
        if !is_valid_field_name(key) {
            debug!(field = %key, "skipping invalid field name");
            continue;
        }
        if key == fields::UPDATED_AT {
            continue;
        }
        if value.is_empty() {
            if existing.contains_key(key) && !is_protected_from_remove(key) {
                expr.remove.insert(key.clone());
            }
        } else if !IMMUTABLE_ON_UPDATE.contains(&key.as_str()) {
            expr.set.insert(key.clone(), value.clone());
        }
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, &str)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::text(*v)))
            .collect()
    }

    #[test]
    fn diff_sets_changed_and_removes_blank() {
        let existing = doc(&[("identifier", "x"), ("a", "1"), ("b", "2")]);
        let incoming = doc(&[("identifier", "x"), ("a", ""), ("b", "3"), ("c", "4")]);
        let expr = diff_for_update(&existing, &incoming);

        assert_eq!(expr.set.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(expr.remove.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn diff_protects_collection_keys_from_remove_only() {
        let existing = doc(&[("parent_collection", "p"), ("collection_note", "n")]);
        let incoming = doc(&[("parent_collection", ""), ("collection_note", "changed")]);
        let expr = diff_for_update(&existing, &incoming);

        assert!(expr.remove.is_empty());
        assert_eq!(expr.set.get("collection_note"), Some(&Value::text("changed")));
    }

    #[test]
    fn diff_skips_invalid_names_and_missing_keys() {
        let existing = doc(&[("a", "1")]);
        let incoming = doc(&[("bad name!", "v"), ("gone", "")]);
        assert!(diff_for_update(&existing, &incoming).is_empty());
    }

    #[test]
    fn diff_sets_unchanged_values_too() {
        let d = doc(&[("identifier", "x"), ("title", "T")]);
        let expr = diff_for_update(&d, &d);
        assert_eq!(expr.set.keys().collect::<Vec<_>>(), vec!["title"]);
        assert!(expr.remove.is_empty());
    }

    #[test]
    fn dotted_and_dashed_names_are_not_field_names() {
        assert!(is_valid_field_name("asset_x3d_config"));
        assert!(is_valid_field_name("_private"));
        assert!(!is_valid_field_name("dcterms.foo"));
        assert!(!is_valid_field_name("rights-holder"));
        assert!(!is_valid_field_name("3d"));

        let existing = doc(&[("dcterms.foo", "old")]);
        let incoming = doc(&[("dcterms.foo", ""), ("dcterms.bar", "new")]);
        assert!(diff_for_update(&existing, &incoming).is_empty());
    }

    #[test]
    fn diff_of_identifier_only_row_is_empty() {
        let existing = doc(&[("identifier", "x"), ("title", "T")]);
        assert!(diff_for_update(&existing, &doc(&[("identifier", "x")])).is_empty());
    }
}
