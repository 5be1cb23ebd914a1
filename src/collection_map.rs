//! Collection map materialization.
//!
//! A root collection's whole descendant tree is rebuilt from the store and written as
//! one document in the map table, referenced from the root by `collectionmap_id`. The walk
//! keeps a visited set and a depth bound, so a bad parent link fails loudly instead of
//! recursing forever.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::MapError;
use crate::store::{KeyValueStore, UpdateExpression};
use crate::types::{fields, CollectionMapNode, CollectionRecord, Document, Value};

/// Outcome of [`CollectionMapBuilder::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRebuild {
    pub root_id: String,
    /// Stored map document id; `None` in dry-run mode.
    pub map_id: Option<String>,
    pub map: CollectionMapNode,
}

pub struct CollectionMapBuilder {
    config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
}

impl CollectionMapBuilder {
    pub fn new(config: Arc<Config>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { config, store }
    }

    fn collection_table(&self) -> &str {
        &self.config.tables.collection
    }

    fn load(&self, id: &str) -> Result<CollectionRecord, MapError> {
        self.store
            .get(self.collection_table(), id)?
            .as_ref()
            .and_then(CollectionRecord::from_document)
            .ok_or_else(|| MapError::CollectionNotFound(id.to_string()))
    }

    /// Materialize the tree under `root_id`, which must be a top level collection.
    pub fn build(&self, root_id: &str) -> Result<CollectionMapNode, MapError> {
        let root = self.load(root_id)?;
        if !root.is_root() {
            return Err(MapError::NotRoot(root.identifier));
        }
        let mut visited = HashSet::new();
        self.walk(&root, &root.id, 0, &mut visited)
    }

    fn walk(
        &self,
        record: &CollectionRecord,
        root_id: &str,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Result<CollectionMapNode, MapError> {
        if depth > self.config.max_map_depth {
            return Err(MapError::DepthExceeded {
                root: root_id.to_string(),
                max: self.config.max_map_depth,
            });
        }
        if !visited.insert(record.id.clone()) {
            return Err(MapError::CycleDetected(record.id.clone()));
        }

        let mut children: Vec<CollectionRecord> = self
            .store
            .query(self.collection_table(), fields::PARENT_COLLECTION, &record.id, None)?
            .iter()
            .filter_map(CollectionRecord::from_document)
            .collect();
        children.sort_by(|a, b| (&a.title, &a.identifier, &a.id).cmp(&(&b.title, &b.identifier, &b.id)));

        let children = children
            .iter()
            .map(|child| self.walk(child, root_id, depth + 1, visited))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CollectionMapNode {
            id: record.id.clone(),
            name: record.title.clone(),
            short_key: bare_short_id(record.short_key.as_deref()),
            children,
        })
    }

    /// Store `map` for `root`: overwrite its existing map document or create one and back-link it.
    pub fn persist(&self, root: &CollectionRecord, map: &CollectionMapNode) -> Result<String, MapError> {
        let map_table = &self.config.tables.collection_map;
        let map_object = Value::Text(serde_json::to_string(map)?);
        let category = Value::text(&root.category);
        let now = Value::Timestamp(Utc::now());

        if let Some(map_id) = &root.collection_map_id {
            if self.store.get(map_table, map_id)?.is_some() {
                let mut expr = UpdateExpression::default();
                expr.set.insert(fields::MAP_OBJECT.into(), map_object);
                expr.set.insert(fields::COLLECTION_MAP_CATEGORY.into(), category);
                expr.set.insert(fields::UPDATED_AT.into(), now);
                self.store.update(map_table, map_id, &expr)?;
                debug!(%map_id, root = %root.id, "overwrote collection map");
                return Ok(map_id.clone());
            }
        }

        let map_id = Uuid::new_v4().to_string();
        let mut doc = Document::new();
        doc.insert(fields::ID.into(), Value::text(&map_id));
        doc.insert(fields::MAP_OBJECT.into(), map_object);
        doc.insert(fields::COLLECTION_ID.into(), Value::text(&root.id));
        doc.insert(fields::COLLECTION_MAP_CATEGORY.into(), category);
        doc.insert(fields::CREATED_AT.into(), now.clone());
        doc.insert(fields::UPDATED_AT.into(), now);
        self.store.put(map_table, doc)?;

        let mut link = UpdateExpression::default();
        link.set
            .insert(fields::COLLECTION_MAP_ID.into(), Value::text(&map_id));
        self.store.update(self.collection_table(), &root.id, &link)?;
        debug!(%map_id, root = %root.id, "created collection map");
        Ok(map_id)
    }

    /// Build and persist the map for `root_id`. Dry runs build but do not write.
    pub fn rebuild(&self, root_id: &str) -> Result<MapRebuild, MapError> {
        let map = self.build(root_id)?;
        let map_id = if self.config.dry_run {
            None
        } else {
            let root = self.load(root_id)?;
            Some(self.persist(&root, &map)?)
        };
        info!(root = %root_id, nodes = map.node_count(), "rebuilt collection map");
        Ok(MapRebuild {
            root_id: root_id.to_string(),
            map_id,
            map,
        })
    }

    /// Stored map for a root, parsed back into nodes.
    pub fn load_map(&self, root_id: &str) -> Result<Option<CollectionMapNode>, MapError> {
        let root = self.load(root_id)?;
        let Some(map_id) = root.collection_map_id else {
            return Ok(None);
        };
        let Some(doc) = self.store.get(&self.config.tables.collection_map, &map_id)? else {
            return Ok(None);
        };
        match doc.get(fields::MAP_OBJECT).and_then(Value::as_text) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

/// `ark:/53696/abc123` -> `abc123`
fn bare_short_id(short_key: Option<&str>) -> String {
    short_key
        .and_then(|k| k.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}
