//! Hierarchy resolution: turn a list of ancestor names into collection ids,
//! creating whatever levels do not exist yet.
//!
//! Level `n` is identified by the first `n` segment names joined with `_`
//! (`["Top", "Mid"]` resolves `Top`, then `Top_Mid`). Levels are never revisited.

use std::sync::Arc;

use tracing::{error, info};

use crate::collection_map::CollectionMapBuilder;
use crate::config::Config;
use crate::error::HierarchyError;
use crate::registry::{IdentityRegistry, WriteOutcome};
use crate::types::{fields, CollectionRecord, Document, RecordType, Value};

/// Resolved leaf of an ancestor path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Id of the collection named by the last segment.
    pub leaf_id: String,
    pub leaf_identifier: String,
    /// Root-first ids, inclusive of the leaf.
    pub ancestor_path: Vec<String>,
    /// Ids of collections created during this resolution.
    pub created: Vec<String>,
    pub map_rebuilt: bool,
}

/// Split an index path (`Top/Mid/Leaf`) into segment names.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub struct HierarchyResolver {
    config: Arc<Config>,
    registry: Arc<IdentityRegistry>,
    maps: Arc<CollectionMapBuilder>,
}

impl HierarchyResolver {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<IdentityRegistry>,
        maps: Arc<CollectionMapBuilder>,
    ) -> Self {
        Self {
            config,
            registry,
            maps,
        }
    }

    pub fn resolve(&self, segments: &[String]) -> Result<Resolution, HierarchyError> {
        let segments: Vec<&str> = segments
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(HierarchyError::EmptyPath);
        }

        let mut compound = String::new();
        let mut parent: Option<String> = None;
        let mut path: Vec<String> = Vec::new();
        let mut created = Vec::new();

        for segment in segments {
            if !compound.is_empty() {
                compound.push('_');
            }
            compound.push_str(segment);

            let matches = self.registry.lookup(RecordType::Collection, &compound)?;
            let (id, level_path) = match matches.len() {
                0 => {
                    let id = self.create_level(segment, &compound, parent.as_deref(), &path)?;
                    created.push(id.clone());
                    let mut level_path = path.clone();
                    level_path.push(id.clone());
                    (id, level_path)
                }
                1 => {
                    let record = CollectionRecord::from_document(&matches[0])
                        .ok_or_else(|| HierarchyError::Unresolved(compound.clone()))?;
                    (record.id, record.ancestor_path)
                }
                n => {
                    return Err(HierarchyError::AmbiguousHierarchy {
                        identifier: compound,
                        matches: n,
                    });
                }
            };
            parent = Some(id);
            path = level_path;
        }

        let leaf_id = parent.ok_or(HierarchyError::EmptyPath)?;
        // Levels created in a dry run were never stored, so there is no tree to walk.
        let map_rebuilt = !created.is_empty() && !self.config.dry_run && self.rebuild_map(&path);
        Ok(Resolution {
            leaf_id,
            leaf_identifier: compound,
            ancestor_path: path,
            created,
            map_rebuilt,
        })
    }

    fn create_level(
        &self,
        title: &str,
        identifier: &str,
        parent: Option<&str>,
        parent_path: &[String],
    ) -> Result<String, HierarchyError> {
        let mut doc = Document::new();
        doc.insert(fields::TITLE.into(), Value::text(title));
        doc.insert(fields::IDENTIFIER.into(), Value::text(identifier));
        doc.insert(
            fields::COLLECTION_CATEGORY.into(),
            Value::text(&self.config.collection_category),
        );
        doc.insert(fields::VISIBILITY.into(), Value::Bool(true));
        if let Some(parent) = parent {
            doc.insert(
                fields::PARENT_COLLECTION.into(),
                Value::List(vec![parent.to_string()]),
            );
            doc.insert(
                fields::ANCESTOR_PATH.into(),
                Value::List(parent_path.to_vec()),
            );
        }

        match self
            .registry
            .create_or_update(RecordType::Collection, doc, false)?
        {
            WriteOutcome::Created(id) => {
                info!(%identifier, %id, "created intermediate collection");
                Ok(id)
            }
            // Lost a race with a concurrent create: adopt the winner.
            other => Ok(other.id().to_string()),
        }
    }

    fn rebuild_map(&self, path: &[String]) -> bool {
        let Some(root) = path.first() else {
            return false;
        };
        match self.maps.rebuild(root) {
            Ok(_) => true,
            Err(e) => {
                error!(root = %root, error = %e, "collection map rebuild failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_drops_blank_segments() {
        assert_eq!(split_path("Top/ Mid //Leaf/"), vec!["Top", "Mid", "Leaf"]);
        assert!(split_path(" / ").is_empty());
    }
}
