use std::time::Duration;

use serde_json::Value as Json;

use crate::error::AssetError;

/// Fetches a IIIF manifest document.
pub trait ManifestFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Json, AssetError>;
}

/// Blocking HTTP GET of a manifest URL.
#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    client: reqwest::blocking::Client,
}

impl HttpManifestFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl ManifestFetcher for HttpManifestFetcher {
    fn fetch(&self, url: &str) -> Result<Json, AssetError> {
        let not_found = |reason: String| AssetError::ManifestNotFound {
            url: url.to_string(),
            reason,
        };
        let response = self.client.get(url).send().map_err(|e| not_found(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(not_found(format!("http status {status}")));
        }
        response.json().map_err(|e| not_found(e.to_string()))
    }
}

/// Thumbnail URL of a manifest: `thumbnail.@id` (v2) or `thumbnail[0].id` (v3).
pub fn extract_thumbnail(manifest: &Json) -> Option<String> {
    let thumbnail = manifest.get("thumbnail")?;
    let node = match thumbnail {
        Json::Array(items) => items.first()?,
        other => other,
    };
    match node {
        Json::String(s) => Some(s.clone()),
        Json::Object(_) => node
            .get("@id")
            .or_else(|| node.get("id"))
            .and_then(Json::as_str)
            .map(str::to_string),
        _ => None,
    }
    .filter(|s| !s.trim().is_empty())
}
