use chrono::NaiveDate;

use super::dates::stored_to_date;
use crate::config::Config;
use crate::types::{fields, text_field, Document};

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `<img_root>/<category>/<value>/representative.jpg`
pub(crate) fn representative_thumbnail(config: &Config, value: &str) -> String {
    join(&[
        &config.app_img_root_path,
        &config.collection_category,
        value,
        "representative.jpg",
    ])
}

/// Default thumbnail for a collection without one.
pub fn collection_thumbnail(config: &Config, identifier: &str) -> String {
    representative_thumbnail(config, identifier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilenameAssets {
    pub thumbnail_path: String,
    pub manifest_url: String,
}

/// Asset locations implied by a `filename` cell, if it follows a known convention.
pub(crate) fn assets_from_filename(config: &Config, value: &str) -> Option<FilenameAssets> {
    let root = config.app_img_root_path.as_str();
    let category = config.collection_category.as_str();
    if value.ends_with(".pdf") || value.ends_with(".jpg") {
        return Some(FilenameAssets {
            thumbnail_path: join(&[root, category, "thumbnail", &value.replace(".pdf", ".jpg")]),
            manifest_url: join(&[root, category, "pdf", value]),
        });
    }
    if !config.video_url_marker.is_empty() && value.contains(&config.video_url_marker) {
        let stem = value.split('_').nth(1)?;
        return Some(FilenameAssets {
            thumbnail_path: join(&[root, category, "thumbnail", &format!("{stem}.png")]),
            manifest_url: value.to_string(),
        });
    }
    None
}

/// Parsed embargo dates of a normalized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbargoWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl EmbargoWindow {
    /// Both dates set and the start falls after the end.
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }
}

pub fn embargo_window(doc: &Document) -> EmbargoWindow {
    let read = |key| text_field(doc, key).and_then(stored_to_date);
    EmbargoWindow {
        start: read(fields::EMBARGO_START),
        end: read(fields::EMBARGO_END),
    }
}

/// Embargoed iff a start date is set and there is no end date or `today` is before it.
pub fn within_embargo(window: &EmbargoWindow, today: NaiveDate) -> bool {
    match (window.start, window.end) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(_), Some(end)) => today < end,
    }
}
