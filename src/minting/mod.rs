//! Short identifier minting with collision checks and compensation.
//!
//! A short id is minted and reserved in the mint table *before* the owning
//! record is written. If that write fails the registry calls
//! [`ShortIdMinter::release`] so no mapping is left pointing at nothing.

mod service;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::MintingError;
use crate::store::{KeyValueStore, PutOutcome};
use crate::types::{fields, utc_format, RecordType, ShortIdentifierRecord};

pub use service::{parse_mint_message, HttpNoidService, LocalNoidService, MintUpdate, MintingService};

/// Placeholder returned by every mint in dry-run mode.
pub const DRY_RUN_SHORT_ID: &str = "12345678";

/// Build the minting service selected by configuration: HTTP when an endpoint is set, local otherwise.
pub fn service_from_config(config: &Config) -> Result<Arc<dyn MintingService>, MintingError> {
    match &config.noid.api_endpoint {
        Some(endpoint) => {
            let key = config.noid.api_key.clone().unwrap_or_default();
            Ok(Arc::new(HttpNoidService::new(endpoint.clone(), key)?))
        }
        None => Ok(Arc::new(LocalNoidService)),
    }
}

pub struct ShortIdMinter {
    config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
    service: Arc<dyn MintingService>,
    registered: AtomicU64,
    released: AtomicU64,
}

impl ShortIdMinter {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn KeyValueStore>,
        service: Arc<dyn MintingService>,
    ) -> Self {
        Self {
            config,
            store,
            service,
            registered: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Short ids registered by this minter (dry-run placeholders included).
    pub fn registered_count(&self) -> u64 {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    fn table(&self) -> &str {
        &self.config.tables.short_id
    }

    /// Draw candidates until one is not present in the mint table.
    pub fn mint(&self) -> Result<String, MintingError> {
        if self.config.dry_run {
            return Ok(DRY_RUN_SHORT_ID.to_string());
        }
        let attempts = self.config.max_mint_attempts.max(1);
        for attempt in 1..=attempts {
            let candidate = self.service.mint()?;
            if self.store.get(self.table(), &candidate)?.is_none() {
                debug!(short_id = %candidate, attempt, "minted short id");
                return Ok(candidate);
            }
            warn!(short_id = %candidate, attempt, "short id collision, retrying");
        }
        Err(MintingError::Exhausted { attempts })
    }

    /// Persist the mapping from `short_id` to its owning record.
    ///
    /// Fails with [`MintingError::Collision`] if another writer registered the id first.
    pub fn register_minted(
        &self,
        short_id: &str,
        record_type: RecordType,
        identifier: &str,
    ) -> Result<ShortIdentifierRecord, MintingError> {
        let record = ShortIdentifierRecord {
            short_id: short_id.to_string(),
            record_type,
            category: self.config.collection_category.clone(),
            identifier: identifier.to_string(),
            long_url: self.long_url(record_type, short_id),
            short_url: self.short_url(short_id),
            created_at: utc_format(&Utc::now()),
        };
        if self.config.dry_run {
            debug!(short_id, "dry run: skipping mint registration");
            self.registered.fetch_add(1, Ordering::SeqCst);
            return Ok(record);
        }
        match self
            .store
            .put_if_absent(self.table(), record.to_document(), fields::SHORT_ID)?
        {
            PutOutcome::Written => {
                self.registered.fetch_add(1, Ordering::SeqCst);
                Ok(record)
            }
            PutOutcome::AlreadyExists(_) => Err(MintingError::Collision(short_id.to_string())),
        }
    }

    /// Delete a registered short id whose owning write failed.
    pub fn release(&self, short_id: &str) -> Result<(), MintingError> {
        if self.config.dry_run {
            return Ok(());
        }
        self.store.delete(self.table(), short_id)?;
        self.released.fetch_add(1, Ordering::SeqCst);
        debug!(short_id, "released short id");
        Ok(())
    }

    /// Report the resolvable URLs of a registered id to the minting service.
    pub fn notify(&self, record: &ShortIdentifierRecord) -> Result<(), MintingError> {
        if self.config.dry_run {
            return Ok(());
        }
        self.service.update(&MintUpdate {
            long_url: &record.long_url,
            short_url: &record.short_url,
            short_id: &record.short_id,
            created_at: &record.created_at,
        })
    }

    /// `<scheme>/<naa>/<short_id>`, stored on records as `short_key`.
    pub fn short_key(&self, short_id: &str) -> String {
        self.config.noid.short_key(short_id)
    }

    pub fn long_url(&self, record_type: RecordType, short_id: &str) -> String {
        join_url(&[
            &self.config.noid.long_url_path,
            record_type.url_segment(),
            short_id,
        ])
    }

    pub fn short_url(&self, short_id: &str) -> String {
        join_url(&[
            &self.config.noid.short_url_path,
            &self.config.noid.scheme,
            &self.config.noid.naa,
            short_id,
        ])
    }
}

fn join_url(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
