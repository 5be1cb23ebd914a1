//! `archive-ingest` ingests tabular metadata describing archival collections and their items,
//! and keeps a record store in sync with it.
//!
//! The primary entrypoint is [`ingest::IngestOrchestrator::ingest_file`], which picks what to do
//! from the file name:
//!
//! - **Collection metadata** (`*_collection_metadata.csv|xlsx`): one collection per row
//! - **Item metadata** (`*_archive_metadata.*`, `*_item_metadata.*`): one item per row, each
//!   attached to an owning collection
//! - **Index files** (`*_index.csv`): `file` / `path` columns; each path of collection names is
//!   resolved (missing levels are created) and the referenced item file is ingested under it
//!
//! Excel workbooks require the Cargo feature `excel`.
//!
//! ## What happens to a row
//!
//! 1. [`normalize::RowNormalizer`] turns the raw cells into a [`types::Document`]: header
//!    renaming, booleans, multi-valued fields split on `||`, permissive date parsing, and
//!    visibility derived from the embargo window.
//! 2. [`registry::IdentityRegistry`] creates the record (with a minted short identifier from
//!    [`minting::ShortIdMinter`]) or, when updates are enabled, merge-updates the stored one.
//!    Creation is a conditional put keyed on `identifier`, so duplicates are skipped instead of
//!    written twice.
//! 3. Collections whose position in the hierarchy changed get their root's
//!    [`collection_map::CollectionMapBuilder`] map rebuilt.
//! 4. The outcome is appended to the batch's result log.
//!
//! Row failures are captured in the result log; only startup connectivity, unreadable input,
//! and result-log persistence fail a whole batch.
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use archive_ingest::assets::HttpManifestFetcher;
//! use archive_ingest::config::Config;
//! use archive_ingest::ingest::IngestOrchestrator;
//! use archive_ingest::minting::service_from_config;
//! use archive_ingest::objects::LocalObjectStore;
//! use archive_ingest::store::MemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! archive_ingest::logging::init_logging(&archive_ingest::logging::LogConfig::from_env()?)?;
//!
//! let config = Arc::new(Config::from_env()?);
//! let orchestrator = IngestOrchestrator::new(
//!     Arc::clone(&config),
//!     Arc::new(MemoryStore::load_snapshot("store.json")?),
//!     Arc::new(LocalObjectStore::new("data")),
//!     service_from_config(&config)?,
//!     Arc::new(HttpManifestFetcher::new()?),
//! );
//!
//! let report = orchestrator.ingest_file("IAWA/Ms1990_025_collection_metadata.csv")?;
//! tracing::info!(
//!     succeeded = report.succeeded_rows(),
//!     failed = report.failed_rows(),
//!     results = ?report.results_location,
//!     "done"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Everything logs through `tracing`; [`logging::init_logging`] installs a subscriber.
//! [`ingest::IngestObserver`] implementations receive row results, batch completions, and
//! batch failures, and [`ingest::IngestMetricsSnapshot`] summarizes a run.

pub mod assets;
pub mod collection_map;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod ingest;
pub mod logging;
pub mod minting;
pub mod normalize;
pub mod objects;
pub mod registry;
pub mod store;
pub mod tabular;
pub mod types;

pub use config::Config;
pub use error::{IngestError, IngestResult, RowError};
pub use ingest::{IngestOrchestrator, IngestReport};
