//! Row normalization: one raw metadata row in, one canonical attribute record out.
//!
//! Per field, in order of precedence:
//!
//! - boolean fields (`visibility`, `explicit_content`, `explicit`): `"true"` in any case is true,
//!   a blank cell takes the field's configured default, anything else is false
//! - date fields: parsed permissively and stored as `YYYY/mm/dd`; bare years are kept verbatim;
//!   unparseable values are dropped with a warning
//! - `parent_collection_identifier` / `parent_collection`: looked up through [`ParentLookup`];
//!   the parent's id, identifier, and ancestor path are copied onto the record. An unresolved
//!   `parent_collection` reference on an item is kept as-is for owner resolution to retry
//! - `thumbnail_path` / `filename`: expanded into derived asset locations
//! - multi-valued fields: split on the configured delimiter and trimmed
//! - everything else: copied verbatim, blanks included (blank means "remove on update")
//!
//! Afterwards `identifier` and `title` must be present, the category is stamped, and
//! `visibility` is recomputed from the embargo window.

pub mod dates;
mod derived;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RowError;
use crate::tabular::RawRow;
use crate::types::{fields, text_field, CollectionRecord, Document, RecordType, Value};

pub use dates::{parse_date, parse_date_cell, DateCell};
pub use derived::{collection_thumbnail, embargo_window, within_embargo, EmbargoWindow};

/// Resolves a parent collection referenced in a metadata row, by id or by identifier.
pub trait ParentLookup {
    fn parent_collection(&self, reference: &str) -> Option<CollectionRecord>;
}

/// A lookup that never finds anything; for rows with no parent references.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParents;

impl ParentLookup for NoParents {
    fn parent_collection(&self, _reference: &str) -> Option<CollectionRecord> {
        None
    }
}

/// Lower-case a header and replace spaces with underscores; `note` becomes `embargo_note`.
pub fn normalize_key(raw: &str) -> String {
    let key = raw.trim().to_lowercase().replace(' ', "_");
    if key == "note" {
        "embargo_note".to_string()
    } else {
        key
    }
}

pub struct RowNormalizer {
    config: Arc<Config>,
}

impl RowNormalizer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Normalize `row` using today's date for the embargo check.
    pub fn normalize(
        &self,
        row: &RawRow,
        record_type: RecordType,
        parents: &dyn ParentLookup,
    ) -> Result<Document, RowError> {
        self.normalize_at(row, record_type, parents, Utc::now().date_naive())
    }

    pub fn normalize_at(
        &self,
        row: &RawRow,
        record_type: RecordType,
        parents: &dyn ParentLookup,
        today: NaiveDate,
    ) -> Result<Document, RowError> {
        let mut doc = Document::new();
        for (raw_key, raw_value) in &row.cells {
            let key = normalize_key(raw_key);
            if key.is_empty() {
                continue;
            }
            self.apply_field(&mut doc, &key, raw_value.trim(), record_type, parents, row.user_row());
        }

        for required in [fields::IDENTIFIER, fields::TITLE] {
            if text_field(&doc, required).is_none() {
                return Err(RowError::MissingRequiredField(required.to_string()));
            }
        }

        doc.insert(
            record_type.category_field().to_string(),
            Value::text(&self.config.collection_category),
        );

        let requested = doc
            .get(fields::VISIBILITY)
            .and_then(Value::as_bool)
            .or_else(|| self.config.fields.boolean_default(fields::VISIBILITY))
            .unwrap_or(true);
        let window = embargo_window(&doc);
        if window.is_inverted() {
            warn!(
                identifier = text_field(&doc, fields::IDENTIFIER).unwrap_or_default(),
                "embargo start date is after its end date"
            );
        }
        let embargoed = within_embargo(&window, today);
        doc.insert(fields::VISIBILITY.into(), Value::Bool(requested && !embargoed));
        Ok(doc)
    }

    fn apply_field(
        &self,
        doc: &mut Document,
        key: &str,
        value: &str,
        record_type: RecordType,
        parents: &dyn ParentLookup,
        row: usize,
    ) {
        let rules = &self.config.fields;
        if let Some(blank_default) = rules.boolean_default(key) {
            let flag = if value.is_empty() {
                blank_default
            } else {
                value.eq_ignore_ascii_case("true")
            };
            doc.insert(key.to_string(), Value::Bool(flag));
            return;
        }

        if rules.is_date(key) {
            match parse_date_cell(value).stored() {
                Some(stored) => {
                    doc.insert(key.to_string(), Value::Text(stored));
                }
                None => warn!(row, field = key, value, "unknown date format, dropping field"),
            }
            return;
        }

        match key {
            fields::PARENT_COLLECTION_IDENTIFIER | fields::PARENT_COLLECTION => {
                if value.is_empty() {
                    return;
                }
                match parents.parent_collection(value) {
                    Some(parent) => {
                        doc.insert(
                            fields::PARENT_COLLECTION.into(),
                            Value::List(vec![parent.id.clone()]),
                        );
                        doc.insert(
                            fields::PARENT_COLLECTION_IDENTIFIER.into(),
                            Value::List(vec![parent.identifier.clone()]),
                        );
                        doc.insert(
                            fields::ANCESTOR_PATH.into(),
                            Value::List(parent.ancestor_path.clone()),
                        );
                    }
                    None if key == fields::PARENT_COLLECTION && record_type == RecordType::Item => {
                        warn!(row, parent = value, "parent collection not found, keeping reference");
                        doc.entry(fields::PARENT_COLLECTION.into())
                            .or_insert_with(|| Value::List(vec![value.to_string()]));
                    }
                    None => warn!(row, parent = value, "parent collection not found"),
                }
            }
            fields::THUMBNAIL_PATH => {
                if !value.is_empty() {
                    doc.insert(
                        fields::THUMBNAIL_PATH.into(),
                        Value::Text(derived::representative_thumbnail(&self.config, value)),
                    );
                }
            }
            "filename" => {
                if let Some(assets) = derived::assets_from_filename(&self.config, value) {
                    doc.insert(fields::THUMBNAIL_PATH.into(), Value::Text(assets.thumbnail_path));
                    doc.insert(fields::MANIFEST_URL.into(), Value::Text(assets.manifest_url));
                } else {
                    debug!(row, filename = value, "filename matches no asset convention");
                }
            }
            _ if rules.is_multi_valued(key) => {
                let v = if value.is_empty() {
                    Value::text("")
                } else {
                    Value::List(
                        value
                            .split(rules.multi_value_delimiter.as_str())
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect(),
                    )
                };
                doc.insert(key.to_string(), v);
            }
            _ => {
                doc.insert(key.to_string(), Value::text(value));
            }
        }
    }
}
