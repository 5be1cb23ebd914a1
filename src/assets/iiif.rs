use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::AssetError;

use super::manifest::{extract_thumbnail, ManifestFetcher};
use super::{join_location, AssetContext, AssetResolver, AssetSet};

/// IIIF items: `<img root>/<category>/<collection>/<item>/manifest.json`, thumbnail from the manifest.
pub struct IiifResolver {
    config: Arc<Config>,
    fetcher: Arc<dyn ManifestFetcher>,
}

impl IiifResolver {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn ManifestFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn manifest_url(&self, ctx: &AssetContext<'_>) -> String {
        join_location(&[
            &self.config.app_img_root_path,
            ctx.category,
            ctx.collection_identifier,
            ctx.item_identifier,
            "manifest.json",
        ])
    }

    /// Manifest location and thumbnail, shared with the 3D resolver.
    pub(crate) fn manifest_assets(&self, ctx: &AssetContext<'_>) -> Result<AssetSet, AssetError> {
        let url = self.manifest_url(ctx);
        let manifest = self.fetcher.fetch(&url)?;
        let thumbnail = extract_thumbnail(&manifest).ok_or_else(|| AssetError::MissingThumbnail(url.clone()))?;
        debug!(%url, %thumbnail, "resolved iiif manifest");
        Ok(AssetSet {
            manifest_url: Some(url),
            thumbnail_path: Some(thumbnail),
            ..AssetSet::default()
        })
    }
}

impl AssetResolver for IiifResolver {
    fn resolve(&self, ctx: &AssetContext<'_>) -> Result<AssetSet, AssetError> {
        self.manifest_assets(ctx)
    }

    fn thumbnail_required(&self) -> bool {
        true
    }
}
