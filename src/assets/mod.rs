//! Media asset resolution for item records.
//!
//! Each media type knows where its manifest, thumbnail, and companion files live.
//! The orchestrator only sees the [`AssetResolver`] strategy chosen from
//! [`Config::media_type`](crate::config::Config::media_type).

mod iiif;
mod manifest;
mod pdf;
mod three_d;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AssetError, ConfigError};
use crate::objects::ObjectStore;
use crate::types::Document;

pub use iiif::IiifResolver;
pub use manifest::{extract_thumbnail, HttpManifestFetcher, ManifestFetcher};
pub use pdf::PdfResolver;
pub use three_d::{ThreeDResolver, THREE_D_TEMPLATES};

/// Kind of digital object an item file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    #[default]
    Iiif,
    Pdf,
    ThreeD,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Iiif => "iiif",
            MediaType::Pdf => "pdf",
            MediaType::ThreeD => "3d",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iiif" => Ok(Self::Iiif),
            "pdf" => Ok(Self::Pdf),
            "3d" | "3d_2diiif" | "three_d" => Ok(Self::ThreeD),
            _ => Err(ConfigError::Invalid {
                var: "MEDIA_TYPE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Which item the assets belong to.
#[derive(Debug, Clone, Copy)]
pub struct AssetContext<'a> {
    pub category: &'a str,
    pub collection_identifier: &'a str,
    pub item_identifier: &'a str,
}

impl AssetContext<'_> {
    /// `<category>/<collection>/<item>`
    pub fn item_prefix(&self) -> String {
        format!(
            "{}/{}/{}",
            self.category, self.collection_identifier, self.item_identifier
        )
    }
}

/// Locations resolved for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSet {
    pub manifest_url: Option<String>,
    pub thumbnail_path: Option<String>,
    /// Media-specific fields merged into the item record.
    pub extra: Document,
}

pub trait AssetResolver: Send + Sync {
    fn resolve(&self, ctx: &AssetContext<'_>) -> Result<AssetSet, AssetError>;

    /// When true, a failed resolution fails the row instead of just being noted.
    fn thumbnail_required(&self) -> bool;
}

/// Build the resolver for the configured media type.
pub fn resolver_for(
    config: Arc<Config>,
    fetcher: Arc<dyn ManifestFetcher>,
    objects: Arc<dyn ObjectStore>,
) -> Arc<dyn AssetResolver> {
    match config.media_type {
        MediaType::Iiif => Arc::new(IiifResolver::new(config, fetcher)),
        MediaType::Pdf => Arc::new(PdfResolver::new(config, objects)),
        MediaType::ThreeD => Arc::new(ThreeDResolver::new(config, fetcher, objects)),
    }
}

/// Join URL or key parts with single slashes.
pub(crate) fn join_location(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Find `key` in object storage, falling back to a case-insensitive match in its directory.
pub(crate) fn find_key(objects: &dyn ObjectStore, key: &str) -> Result<Option<String>, AssetError> {
    let candidates = objects.list(key)?;
    if let Some(exact) = candidates.iter().find(|k| k.as_str() == key) {
        return Ok(Some(exact.clone()));
    }
    let dir = key.rsplit_once('/').map_or("", |(dir, _)| dir);
    let wanted = key.to_lowercase();
    Ok(objects
        .list(dir)?
        .into_iter()
        .find(|k| k.to_lowercase() == wanted))
}
