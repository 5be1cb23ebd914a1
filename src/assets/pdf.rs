use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AssetError;
use crate::objects::ObjectStore;
use crate::types::Value;

use super::{join_location, AssetContext, AssetResolver, AssetSet, MediaType};

const THUMBNAIL_NAME: &str = "thumbnail.jpg";

/// PDF items: the first `.pdf` object under the item prefix, plus an optional `thumbnail.jpg`.
pub struct PdfResolver {
    config: Arc<Config>,
    objects: Arc<dyn ObjectStore>,
}

impl PdfResolver {
    pub fn new(config: Arc<Config>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { config, objects }
    }
}

impl AssetResolver for PdfResolver {
    fn resolve(&self, ctx: &AssetContext<'_>) -> Result<AssetSet, AssetError> {
        let prefix = format!("{}/", ctx.item_prefix());
        let keys = self.objects.list(&prefix)?;

        let pdf = keys.iter().find(|k| k.to_ascii_lowercase().ends_with(".pdf"));
        let thumbnail = keys.iter().find(|k| k.ends_with(THUMBNAIL_NAME));
        if pdf.is_none() {
            warn!(item = ctx.item_identifier, %prefix, "no pdf object found");
        }

        let url = |k: &String| join_location(&[&self.config.app_img_root_path, k]);
        let mut set = AssetSet {
            manifest_url: pdf.map(url),
            thumbnail_path: thumbnail.map(url),
            ..AssetSet::default()
        };
        set.extra
            .insert("media_type".into(), Value::text(MediaType::Pdf.as_str()));
        debug!(item = ctx.item_identifier, pdf = ?set.manifest_url, "resolved pdf assets");
        Ok(set)
    }

    fn thumbnail_required(&self) -> bool {
        false
    }
}
