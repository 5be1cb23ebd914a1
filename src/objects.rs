//! Object storage collaborator.
//!
//! Locations are `/`-separated keys (`<category>/<collection>/<item>/manifest.json`).
//! [`LocalObjectStore`] maps them under a root directory; [`MemoryObjectStore`]
//! keeps them in a map for tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ObjectStoreError;

pub trait ObjectStore: Send + Sync {
    fn get(&self, location: &str) -> Result<Vec<u8>, ObjectStoreError>;

    fn put(&self, location: &str, bytes: &[u8]) -> Result<(), ObjectStoreError>;

    /// Every key starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
}

/// Filesystem-backed object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, location: &str) -> PathBuf {
        location
            .split('/')
            .filter(|s| !s.is_empty() && *s != "..")
            .fold(self.root.clone(), |p, seg| p.join(seg))
    }

    /// Metadata files under the root whose file name matches a glob pattern.
    ///
    /// Returned as object locations, e.g. `discover("*_collection_metadata.csv")`.
    pub fn discover(&self, pattern: &str) -> Result<Vec<String>, ObjectStoreError> {
        let full = self.root.join("**").join(pattern);
        let full = full.to_string_lossy().into_owned();
        let paths = glob::glob(&full).map_err(|e| ObjectStoreError::Io {
            location: pattern.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;
        let mut out: Vec<String> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter_map(|p| self.location_for(&p))
            .collect();
        out.sort();
        Ok(out)
    }

    fn location_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

impl ObjectStore for LocalObjectStore {
    fn get(&self, location: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(location);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ObjectStoreError::NotFound(location.to_string()),
            _ => ObjectStoreError::Io {
                location: location.to_string(),
                source: e,
            },
        })
    }

    fn put(&self, location: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let path = self.path_for(location);
        let io_err = |source| ObjectStoreError::Io {
            location: location.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, bytes).map_err(io_err)?;
        debug!(location, bytes = bytes.len(), "wrote object");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(location) = self.location_for(entry.path()) {
                if location.starts_with(prefix) {
                    out.push(location);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for test fixtures.
    pub fn with_object(self, location: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.to_string(), bytes.into());
        self
    }

    pub fn get_string(&self, location: &str) -> Option<String> {
        self.get(location)
            .ok()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, location: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(location.to_string()))
    }

    fn put(&self, location: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
