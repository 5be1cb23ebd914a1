use thiserror::Error;

/// Convenience result type for whole-run ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by the key-value store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (or has been marked unavailable).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected by the store.
    #[error("write to table '{table}' rejected: {message}")]
    WriteRejected { table: String, message: String },

    /// A document without a usable `id` was handed to the store.
    #[error("document for table '{table}' has no id")]
    MissingId { table: String },

    /// A point update or delete referenced a record that does not exist.
    #[error("record '{id}' not found in table '{table}'")]
    RecordNotFound { table: String, id: String },

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type returned by the object storage collaborator.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object io error at '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type returned by the short identifier minting client.
#[derive(Debug, Error)]
pub enum MintingError {
    /// The minting service cannot hand out identifiers right now.
    #[error("minting service unavailable: {0}")]
    Unavailable(String),

    #[error("minting http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected minting response: {0}")]
    InvalidResponse(String),

    /// Every candidate collided with an existing identifier.
    #[error("no free short identifier after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// Registration lost a race against another writer.
    #[error("short identifier '{0}' is already registered")]
    Collision(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error type returned by the identity registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// More than one record shares an identifier that must be unique.
    #[error("identifier '{identifier}' matches {matches} records in table '{table}'")]
    AmbiguousIdentifier {
        table: String,
        identifier: String,
        matches: usize,
    },

    /// The record write failed after identifier minting; the minted id was released.
    #[error("failed to persist '{identifier}': {source}")]
    StoreWrite {
        identifier: String,
        #[source]
        source: StoreError,
    },

    #[error("record has no identifier")]
    MissingIdentifier,
}

/// Error type returned by the collection map builder.
#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Maps are only materialized for root collections.
    #[error("collection '{0}' is not a top level collection")]
    NotRoot(String),

    /// A parent link leads back to a collection already on the walk.
    #[error("collection hierarchy cycle detected at '{0}'")]
    CycleDetected(String),

    #[error("collection hierarchy deeper than {max} levels below '{root}'")]
    DepthExceeded { root: String, max: usize },

    #[error("map serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type returned by the hierarchy resolver.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("ancestor path is empty")]
    EmptyPath,

    /// The path is ill-defined: a level matches more than one collection.
    #[error("ambiguous hierarchy: '{identifier}' matches {matches} collections")]
    AmbiguousHierarchy { identifier: String, matches: usize },

    /// A level could neither be found nor created.
    #[error("could not resolve collection '{0}'")]
    Unresolved(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Error type returned by media asset resolution.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("manifest not found at '{url}': {reason}")]
    ManifestNotFound { url: String, reason: String },

    #[error("manifest at '{0}' has no thumbnail")]
    MissingThumbnail(String),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),
}

/// Error type returned while building a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },

    #[error("failed to read headers file '{path}': {message}")]
    HeadersFile { path: String, message: String },
}

/// Why a single row failed. Captured into the result log, never returned to callers.
#[derive(Debug, Error)]
pub enum RowError {
    /// The row lacks `identifier` or `title` after normalization.
    #[error("missing required attribute '{0}'")]
    MissingRequiredField(String),

    /// An item could not be attached to any collection.
    #[error("collection record not found for archive {0}")]
    CollectionNotFound(String),

    #[error("manifest not found for archive {identifier}: {source}")]
    ManifestNotFound {
        identifier: String,
        #[source]
        source: AssetError,
    },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Error type returned by whole-run ingest operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel reading error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV reading or writing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The input does not have the expected shape (no header row, missing index columns, ...).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// The file name does not identify a collection, item, or index metadata file.
    #[error("unsupported metadata file '{0}': names must end with _collection_metadata, _archive_metadata, _item_metadata, or _index")]
    UnsupportedFile(String),
}
