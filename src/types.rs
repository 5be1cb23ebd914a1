//! Core data model for ingestion.
//!
//! Records are stored as [`Document`]s: string-keyed bags of tagged [`Value`]s. The typed views
//! ([`CollectionRecord`], [`ItemRecord`], [`ShortIdentifierRecord`]) pull the well-known fields
//! out of a document and keep everything else in an open attribute bag.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Well-known field names shared by every table.
pub mod fields {
    pub const ID: &str = "id";
    pub const IDENTIFIER: &str = "identifier";
    pub const TITLE: &str = "title";
    pub const PARENT_COLLECTION: &str = "parent_collection";
    pub const PARENT_COLLECTION_IDENTIFIER: &str = "parent_collection_identifier";
    pub const COLLECTION: &str = "collection";
    pub const ANCESTOR_PATH: &str = "ancestor_path";
    pub const SHORT_KEY: &str = "short_key";
    pub const COLLECTION_MAP_ID: &str = "collectionmap_id";
    pub const COLLECTION_CATEGORY: &str = "collection_category";
    pub const ITEM_CATEGORY: &str = "item_category";
    pub const VISIBILITY: &str = "visibility";
    pub const MANIFEST_URL: &str = "manifest_url";
    pub const THUMBNAIL_PATH: &str = "thumbnail_path";
    pub const EMBARGO_START: &str = "embargo_start_date";
    pub const EMBARGO_END: &str = "embargo_end_date";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    // Short identifier (mint) table.
    pub const SHORT_ID: &str = "short_id";
    pub const TYPE: &str = "type";
    pub const CATEGORY: &str = "category";
    pub const LONG_URL: &str = "long_url";
    pub const SHORT_URL: &str = "short_url";
    pub const MINTED_AT: &str = "created_at";
    pub const HITS: &str = "hits";

    // Collection map table.
    pub const MAP_OBJECT: &str = "map_object";
    pub const COLLECTION_ID: &str = "collection_id";
    pub const COLLECTION_MAP_CATEGORY: &str = "collectionmap_category";
}

/// A single tagged attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Scalar text. An empty string means "remove on update".
    Text(String),
    /// Ordered list of scalars (multi-valued fields, id paths).
    List(Vec<String>),
    /// Boolean flag.
    Bool(bool),
    /// Integer counter.
    Number(i64),
    /// UTC instant.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Convenience constructor for [`Value::Text`].
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Returns `true` for blank text and for lists with no non-blank element.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::List(items) => items.iter().all(|s| s.trim().is_empty()),
            Value::Bool(_) | Value::Number(_) | Value::Timestamp(_) => false,
        }
    }

    /// Text content, if this is a [`Value::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// List content, if this is a [`Value::List`].
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// First scalar reference: the text itself, or the first list element.
    pub fn first(&self) -> Option<&str> {
        match self {
            Value::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
            Value::List(items) => items.iter().map(String::as_str).find(|s| !s.trim().is_empty()),
            _ => None,
        }
    }

    /// Whether `needle` equals the text or is an element of the list.
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Value::Text(s) => s == needle,
            Value::List(items) => items.iter().any(|s| s == needle),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::List(items) => f.write_str(&items.join("||")),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Timestamp(ts) => f.write_str(&utc_format(ts)),
        }
    }
}

/// String-keyed attribute bag. Ordered so serialized records are stable.
pub type Document = BTreeMap<String, Value>;

/// Read a non-blank text field from a document.
pub fn text_field<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_text).filter(|s| !s.trim().is_empty())
}

/// Read a list field, accepting a single text value as a one-element list.
pub fn list_field(doc: &Document, key: &str) -> Vec<String> {
    match doc.get(key) {
        Some(Value::List(items)) => items.clone(),
        Some(Value::Text(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Format an instant the way records store it: `YYYY-mm-ddTHH:MM:SS.mmmZ`.
pub fn utc_format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Which kind of record a row or table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A hierarchical grouping node.
    Collection,
    /// A leaf archive item owned by one collection.
    Item,
}

impl RecordType {
    /// Field that receives the configured category.
    pub fn category_field(self) -> &'static str {
        match self {
            RecordType::Collection => fields::COLLECTION_CATEGORY,
            RecordType::Item => fields::ITEM_CATEGORY,
        }
    }

    /// Path segment used in long URLs.
    pub fn url_segment(self) -> &'static str {
        match self {
            RecordType::Collection => "collection",
            RecordType::Item => "archive",
        }
    }

    /// Type label stored in short identifier records.
    pub fn label(self) -> &'static str {
        match self {
            RecordType::Collection => "Collection",
            RecordType::Item => "Item",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn timestamp_field(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(key) {
        Some(Value::Timestamp(ts)) => Some(*ts),
        Some(Value::Text(s)) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

/// Keys pulled out of the attribute bag by the typed views.
const COLLECTION_KEYS: &[&str] = &[
    fields::ID,
    fields::IDENTIFIER,
    fields::TITLE,
    fields::PARENT_COLLECTION,
    fields::ANCESTOR_PATH,
    fields::SHORT_KEY,
    fields::COLLECTION_MAP_ID,
    fields::COLLECTION_CATEGORY,
    fields::VISIBILITY,
    fields::CREATED_AT,
    fields::UPDATED_AT,
];

const ITEM_KEYS: &[&str] = &[
    fields::ID,
    fields::IDENTIFIER,
    fields::TITLE,
    fields::COLLECTION,
    fields::ANCESTOR_PATH,
    fields::SHORT_KEY,
    fields::MANIFEST_URL,
    fields::THUMBNAIL_PATH,
    fields::ITEM_CATEGORY,
    fields::VISIBILITY,
    fields::EMBARGO_START,
    fields::EMBARGO_END,
    fields::CREATED_AT,
    fields::UPDATED_AT,
];

fn remaining_attributes(doc: &Document, known: &[&str]) -> Document {
    doc.iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Typed view of a stored collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub id: String,
    pub identifier: String,
    pub title: String,
    /// Immediate parent collection id; `None` for roots.
    pub parent: Option<String>,
    /// Root-first ids, inclusive of this record.
    pub ancestor_path: Vec<String>,
    pub short_key: Option<String>,
    pub collection_map_id: Option<String>,
    pub category: String,
    pub visible: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Everything else.
    pub attributes: Document,
}

impl CollectionRecord {
    /// Build the typed view; `None` when `id` or `identifier` is missing.
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: text_field(doc, fields::ID)?.to_string(),
            identifier: text_field(doc, fields::IDENTIFIER)?.to_string(),
            title: text_field(doc, fields::TITLE).unwrap_or_default().to_string(),
            parent: doc
                .get(fields::PARENT_COLLECTION)
                .and_then(Value::first)
                .map(str::to_string),
            ancestor_path: list_field(doc, fields::ANCESTOR_PATH),
            short_key: text_field(doc, fields::SHORT_KEY).map(str::to_string),
            collection_map_id: text_field(doc, fields::COLLECTION_MAP_ID).map(str::to_string),
            category: text_field(doc, fields::COLLECTION_CATEGORY).unwrap_or_default().to_string(),
            visible: doc.get(fields::VISIBILITY).and_then(Value::as_bool).unwrap_or(false),
            created_at: timestamp_field(doc, fields::CREATED_AT),
            updated_at: timestamp_field(doc, fields::UPDATED_AT),
            attributes: remaining_attributes(doc, COLLECTION_KEYS),
        })
    }

    /// Whether this collection has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Root of this collection's hierarchy.
    pub fn root_id(&self) -> &str {
        self.ancestor_path.first().map(String::as_str).unwrap_or(&self.id)
    }
}

/// Typed view of a stored archive item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: String,
    pub identifier: String,
    pub title: String,
    /// Immediate owning collection id.
    pub collection: Option<String>,
    pub ancestor_path: Vec<String>,
    pub short_key: Option<String>,
    pub manifest_url: Option<String>,
    pub thumbnail_path: Option<String>,
    pub category: String,
    pub visible: bool,
    pub embargo_start: Option<String>,
    pub embargo_end: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub attributes: Document,
}

impl ItemRecord {
    pub fn from_document(doc: &Document) -> Option<Self> {
        let owned = |key: &str| text_field(doc, key).map(str::to_string);
        Some(Self {
            id: owned(fields::ID)?,
            identifier: owned(fields::IDENTIFIER)?,
            title: owned(fields::TITLE).unwrap_or_default(),
            collection: owned(fields::COLLECTION),
            ancestor_path: list_field(doc, fields::ANCESTOR_PATH),
            short_key: owned(fields::SHORT_KEY),
            manifest_url: owned(fields::MANIFEST_URL),
            thumbnail_path: owned(fields::THUMBNAIL_PATH),
            category: owned(fields::ITEM_CATEGORY).unwrap_or_default(),
            visible: doc.get(fields::VISIBILITY).and_then(Value::as_bool).unwrap_or(false),
            embargo_start: owned(fields::EMBARGO_START),
            embargo_end: owned(fields::EMBARGO_END),
            created_at: timestamp_field(doc, fields::CREATED_AT),
            updated_at: timestamp_field(doc, fields::UPDATED_AT),
            attributes: remaining_attributes(doc, ITEM_KEYS),
        })
    }
}

/// Mapping from a minted short identifier to its owning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortIdentifierRecord {
    pub short_id: String,
    pub record_type: RecordType,
    pub category: String,
    pub identifier: String,
    pub long_url: String,
    pub short_url: String,
    pub created_at: String,
}

impl ShortIdentifierRecord {
    /// Stored form; the short id doubles as the primary key.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::ID.into(), Value::text(&self.short_id));
        doc.insert(fields::SHORT_ID.into(), Value::text(&self.short_id));
        doc.insert(fields::TYPE.into(), Value::text(self.record_type.label()));
        doc.insert(fields::CATEGORY.into(), Value::text(&self.category));
        doc.insert(fields::IDENTIFIER.into(), Value::text(&self.identifier));
        doc.insert(fields::LONG_URL.into(), Value::text(&self.long_url));
        doc.insert(fields::SHORT_URL.into(), Value::text(&self.short_url));
        doc.insert(fields::MINTED_AT.into(), Value::text(&self.created_at));
        doc.insert(fields::HITS.into(), Value::Number(0));
        doc
    }
}

/// One node of a materialized collection tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMapNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "custom_key")]
    pub short_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CollectionMapNode>,
}

impl CollectionMapNode {
    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CollectionMapNode::node_count).sum::<usize>()
    }

    /// Depth-first list of `(node id, parent id)` pairs.
    pub fn edges(&self) -> Vec<(String, Option<String>)> {
        let mut out = vec![(self.id.clone(), None)];
        let mut stack: Vec<&CollectionMapNode> = vec![self];
        while let Some(node) = stack.pop() {
            for child in &node.children {
                out.push((child.id.clone(), Some(node.id.clone())));
                stack.push(child);
            }
        }
        out
    }
}

/// One line of the per-batch result log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResultEntry {
    /// 1-based row in the source file (the header is row 1).
    #[serde(rename = "row_in_metadata")]
    pub row: usize,
    /// Record identifier, or `N/A` when the row never produced one.
    pub identifier: String,
    pub succeeded: bool,
    pub message: String,
}
