use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::AssetError;
use crate::objects::ObjectStore;
use crate::types::Value;

use super::iiif::IiifResolver;
use super::manifest::ManifestFetcher;
use super::{find_key, join_location, AssetContext, AssetResolver, AssetSet, MediaType};

/// Companion files of a 3D item: record field and file name template (`{}` is the item identifier).
pub const THREE_D_TEMPLATES: [(&str, &str); 3] = [
    ("asset_x3d_config", "LowRes_{}_X3D.x3d"),
    ("asset_x3d_src_img", "LowRes_{}_X3D.png"),
    ("asset_morpho_thumb", "HighRes_{}_thumbnail.png"),
];

/// 3D items carry a IIIF manifest plus model files under `<item>/3d/`.
pub struct ThreeDResolver {
    config: Arc<Config>,
    iiif: IiifResolver,
    objects: Arc<dyn ObjectStore>,
}

impl ThreeDResolver {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn ManifestFetcher>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            iiif: IiifResolver::new(Arc::clone(&config), fetcher),
            config,
            objects,
        }
    }
}

impl AssetResolver for ThreeDResolver {
    fn resolve(&self, ctx: &AssetContext<'_>) -> Result<AssetSet, AssetError> {
        let mut set = self.iiif.manifest_assets(ctx)?;
        let dir = format!("{}/3d", ctx.item_prefix());
        for (field, template) in THREE_D_TEMPLATES {
            let wanted = format!("{dir}/{}", template.replace("{}", ctx.item_identifier));
            match find_key(self.objects.as_ref(), &wanted)? {
                Some(key) => {
                    let url = join_location(&[&self.config.app_img_root_path, &key]);
                    set.extra.insert(field.into(), Value::Text(url));
                }
                None => warn!(item = ctx.item_identifier, %wanted, "3d asset not found"),
            }
        }
        set.extra
            .insert("media_type".into(), Value::text(MediaType::ThreeD.as_str()));
        Ok(set)
    }

    fn thumbnail_required(&self) -> bool {
        true
    }
}
