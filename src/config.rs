//! Immutable run configuration.
//!
//! A [`Config`] is built once at process start ([`Config::from_env`], or
//! [`Config::from_lookup`] in tests) and handed to every component behind an
//! `Arc`. Nothing reads the process environment after construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::assets::MediaType;
use crate::error::ConfigError;
use crate::tabular::headers::default_header_renames;

/// What the orchestrator does after a row fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Stop processing the file at the first failed row.
    #[default]
    AbortOnFirstError,
    /// Log the failure and carry on with the next row.
    ContinueAndAccumulateErrors,
}

impl FromStr for BatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" | "abort_on_first_error" | "fail_fast" => Ok(Self::AbortOnFirstError),
            "continue" | "continue_and_accumulate_errors" => Ok(Self::ContinueAndAccumulateErrors),
            _ => Err(ConfigError::Invalid {
                var: "BATCH_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Store table names, derived from a deployment suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub collection: String,
    pub item: String,
    pub collection_map: String,
    pub short_id: String,
}

impl TableNames {
    pub fn with_suffix(suffix: &str, short_id_table: impl Into<String>) -> Self {
        Self {
            collection: format!("Collection-{suffix}"),
            item: format!("Archive-{suffix}"),
            collection_map: format!("Collectionmap-{suffix}"),
            short_id: short_id_table.into(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::with_suffix("local", "mint-local")
    }
}

/// Settings for the short identifier namespace and its HTTP minting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoidConfig {
    pub scheme: String,
    pub naa: String,
    pub long_url_path: String,
    pub short_url_path: String,
    /// Base URL of the minting service; `None` selects local minting.
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl NoidConfig {
    /// `<scheme>/<naa>/<short_id>`
    pub fn short_key(&self, short_id: &str) -> String {
        format!("{}/{}/{}", self.scheme, self.naa, short_id)
    }
}

impl Default for NoidConfig {
    fn default() -> Self {
        Self {
            scheme: "ark:".to_string(),
            naa: "53696".to_string(),
            long_url_path: "https://example.org".to_string(),
            short_url_path: "https://n2t.example.org".to_string(),
            api_endpoint: None,
            api_key: None,
        }
    }
}

/// Field classification used by the row normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRules {
    pub single_valued: BTreeSet<String>,
    pub multi_valued: BTreeSet<String>,
    pub multi_value_delimiter: String,
    /// Boolean fields, mapped to the value a blank cell takes.
    pub boolean_blank_defaults: BTreeMap<String, bool>,
    pub date_fields: BTreeSet<String>,
    /// Long-form column names to canonical names.
    pub header_renames: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct HeadersFile {
    #[serde(default)]
    single_value_headers: Vec<String>,
    #[serde(default)]
    multi_value_headers: Vec<String>,
}

impl FieldRules {
    /// Replace the single/multi classification with the lists from a headers JSON document.
    pub fn with_headers_json(mut self, json: &str) -> Result<Self, serde_json::Error> {
        let parsed: HeadersFile = serde_json::from_str(json)?;
        self.single_valued = parsed.single_value_headers.into_iter().collect();
        self.multi_valued = parsed.multi_value_headers.into_iter().collect();
        Ok(self)
    }

    pub fn is_multi_valued(&self, key: &str) -> bool {
        self.multi_valued.contains(key)
    }

    pub fn is_date(&self, key: &str) -> bool {
        self.date_fields.contains(key)
    }

    pub fn boolean_default(&self, key: &str) -> Option<bool> {
        self.boolean_blank_defaults.get(key).copied()
    }
}

const DEFAULT_MULTI_VALUED: &[&str] = &[
    "alternative",
    "belongs_to",
    "contributor",
    "coverage",
    "creator",
    "format",
    "has_format",
    "has_part",
    "has_version",
    "is_format_of",
    "is_version_of",
    "language",
    "location",
    "medium",
    "provenance",
    "publisher",
    "reference",
    "related_url",
    "resource_type",
    "rights_holder",
    "source",
    "subject",
    "tags",
    "temporal",
];

const DEFAULT_SINGLE_VALUED: &[&str] = &[
    "identifier",
    "title",
    "description",
    "bibliographic_citation",
    "conforms_to",
    "created",
    "date",
    "extent",
    "license",
    "rights_statement",
    "custom_key",
    "display_date",
    "size",
    "embargo_note",
];

impl Default for FieldRules {
    fn default() -> Self {
        let boolean_blank_defaults = ["visibility", "explicit_content", "explicit"]
            .into_iter()
            .map(|k| (k.to_string(), true))
            .collect();
        Self {
            single_valued: DEFAULT_SINGLE_VALUED.iter().map(|s| s.to_string()).collect(),
            multi_valued: DEFAULT_MULTI_VALUED.iter().map(|s| s.to_string()).collect(),
            multi_value_delimiter: "||".to_string(),
            boolean_blank_defaults,
            date_fields: ["start_date", "end_date", "embargo_start_date", "embargo_end_date"]
                .into_iter()
                .map(String::from)
                .collect(),
            header_renames: default_header_renames(),
        }
    }
}

/// Run configuration shared by every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Category stamped onto every record (`collection_category` / `item_category`).
    pub collection_category: String,
    /// Default owning collection for items that name none.
    pub collection_identifier: Option<String>,
    /// Root of derived asset URLs.
    pub app_img_root_path: String,
    pub tables: TableNames,
    pub noid: NoidConfig,
    /// Merge-update existing records instead of skipping them.
    pub update_metadata: bool,
    /// Simulate every store write.
    pub dry_run: bool,
    pub batch_policy: BatchPolicy,
    pub media_type: MediaType,
    /// Prefix item identifiers with their collection identifier.
    pub prefix_item_identifiers: bool,
    pub fields: FieldRules,
    /// Substring marking a streaming-video `filename` value.
    pub video_url_marker: String,
    pub max_map_depth: usize,
    pub max_mint_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_category: "IAWA".to_string(),
            collection_identifier: None,
            app_img_root_path: "https://img.example.org".to_string(),
            tables: TableNames::default(),
            noid: NoidConfig::default(),
            update_metadata: false,
            dry_run: false,
            batch_policy: BatchPolicy::default(),
            media_type: MediaType::default(),
            prefix_item_identifiers: false,
            fields: FieldRules::default(),
            video_url_marker: "video.vt.edu/media".to_string(),
            max_map_depth: 64,
            max_mint_attempts: 32,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `COLLECTION_CATEGORY` (required)
    /// - `COLLECTION_IDENTIFIER`, `APP_IMG_ROOT_PATH`
    /// - `DYNAMODB_TABLE_SUFFIX`, `DYNAMODB_NOID_TABLE`
    /// - `NOID_SCHEME`, `NOID_NAA`, `LONG_URL_PATH`, `SHORT_URL_PATH`, `API_ENDPOINT`, `API_KEY`
    /// - `UPDATE_METADATA`, `DRY_RUN`, `PREFIX_ITEM_IDENTIFIERS` (true/false/1/0/yes/no)
    /// - `MEDIA_TYPE` (iiif, pdf, 3d), `BATCH_POLICY` (abort, continue)
    /// - `HEADERS_FILE`: JSON file with `single_value_headers` / `multi_value_headers`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let collection_category =
            get("COLLECTION_CATEGORY").ok_or_else(|| ConfigError::Missing("COLLECTION_CATEGORY".to_string()))?;

        let suffix = get("DYNAMODB_TABLE_SUFFIX").unwrap_or_else(|| "local".to_string());
        let noid_table = get("DYNAMODB_NOID_TABLE").unwrap_or_else(|| format!("mint-{suffix}"));

        let noid = NoidConfig {
            scheme: get("NOID_SCHEME").unwrap_or(defaults.noid.scheme),
            naa: get("NOID_NAA").unwrap_or(defaults.noid.naa),
            long_url_path: get("LONG_URL_PATH").unwrap_or(defaults.noid.long_url_path),
            short_url_path: get("SHORT_URL_PATH").unwrap_or(defaults.noid.short_url_path),
            api_endpoint: get("API_ENDPOINT"),
            api_key: get("API_KEY"),
        };

        let mut fields = FieldRules::default();
        if let Some(path) = get("HEADERS_FILE") {
            fields = load_headers_file(fields, Path::new(&path))?;
        }

        Ok(Self {
            collection_category,
            collection_identifier: get("COLLECTION_IDENTIFIER"),
            app_img_root_path: get("APP_IMG_ROOT_PATH").unwrap_or(defaults.app_img_root_path),
            tables: TableNames::with_suffix(&suffix, noid_table),
            noid,
            update_metadata: parse_flag("UPDATE_METADATA", get("UPDATE_METADATA"), false)?,
            dry_run: parse_flag("DRY_RUN", get("DRY_RUN"), false)?,
            batch_policy: get("BATCH_POLICY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            media_type: get("MEDIA_TYPE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            prefix_item_identifiers: parse_flag(
                "PREFIX_ITEM_IDENTIFIERS",
                get("PREFIX_ITEM_IDENTIFIERS"),
                false,
            )?,
            fields,
            ..defaults
        })
    }
}

fn load_headers_file(fields: FieldRules, path: &Path) -> Result<FieldRules, ConfigError> {
    let headers_err = |message: String| ConfigError::HeadersFile {
        path: path.display().to_string(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|e| headers_err(e.to_string()))?;
    fields.with_headers_json(&raw).map_err(|e| headers_err(e.to_string()))
}

/// Parse a boolean setting; accepts true/false/1/0/yes/no in any case.
pub(crate) fn parse_flag(var: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var: var.to_string(),
            value,
        }),
    }
}
