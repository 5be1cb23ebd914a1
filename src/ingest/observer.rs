use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::error::{IngestError, ObjectStoreError, StoreError};
use crate::types::IngestResultEntry;

use super::metrics::IngestMetricsSnapshot;
use super::FileKind;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestSeverity {
    Info,
    /// Non-fatal event.
    Warning,
    /// The batch could not be processed.
    Error,
    /// Infrastructure failure: I/O, unreachable store, missing input object.
    Critical,
}

/// Which batch an event belongs to.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub location: String,
    /// `None` when the file kind could not be detected.
    pub kind: Option<FileKind>,
}

/// Observer interface for ingest outcomes.
pub trait IngestObserver: Send + Sync {
    /// Called once per processed row, after its result has been logged.
    fn on_row(&self, _ctx: &BatchContext, _entry: &IngestResultEntry) {}

    fn on_batch_finished(&self, _ctx: &BatchContext, _metrics: &IngestMetricsSnapshot) {}

    /// Called when a batch fails as a whole.
    fn on_failure(&self, _ctx: &BatchContext, _severity: IngestSeverity, _error: &IngestError) {}

    /// Called when a batch failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        self.on_failure(ctx, severity, error)
    }
}

pub fn severity_for_error(e: &IngestError) -> IngestSeverity {
    match e {
        IngestError::Io(_) => IngestSeverity::Critical,
        IngestError::Store(StoreError::Unavailable(_) | StoreError::Io(_)) => IngestSeverity::Critical,
        IngestError::Store(_) => IngestSeverity::Error,
        IngestError::Objects(ObjectStoreError::NotFound(_) | ObjectStoreError::Io { .. }) => {
            IngestSeverity::Critical
        }
        IngestError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => IngestSeverity::Critical,
            _ => IngestSeverity::Error,
        },
        #[cfg(feature = "excel")]
        IngestError::Excel(_) => IngestSeverity::Error,
        IngestError::UnsupportedFile(_) => IngestSeverity::Warning,
        IngestError::Json(_) | IngestError::Config(_) | IngestError::SchemaMismatch { .. } => {
            IngestSeverity::Error
        }
    }
}

/// Fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn IngestObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestObserver for CompositeObserver {
    fn on_row(&self, ctx: &BatchContext, entry: &IngestResultEntry) {
        for o in &self.observers {
            o.on_row(ctx, entry);
        }
    }

    fn on_batch_finished(&self, ctx: &BatchContext, metrics: &IngestMetricsSnapshot) {
        for o in &self.observers {
            o.on_batch_finished(ctx, metrics);
        }
    }

    fn on_failure(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits ingest events as `tracing` events under the `archive_ingest::events` target.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn on_row(&self, ctx: &BatchContext, entry: &IngestResultEntry) {
        if entry.succeeded {
            info!(target: "archive_ingest::events", location = %ctx.location, row = entry.row, identifier = %entry.identifier, "{}", entry.message);
        } else {
            warn!(target: "archive_ingest::events", location = %ctx.location, row = entry.row, identifier = %entry.identifier, "{}", entry.message);
        }
    }

    fn on_batch_finished(&self, ctx: &BatchContext, metrics: &IngestMetricsSnapshot) {
        info!(target: "archive_ingest::events", location = %ctx.location, kind = ?ctx.kind, %metrics, "batch finished");
    }

    fn on_failure(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        error!(target: "archive_ingest::events", location = %ctx.location, ?severity, %error, "batch failed");
    }

    fn on_alert(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        error!(target: "archive_ingest::events", location = %ctx.location, ?severity, %error, "ALERT");
    }
}

/// Appends ingest events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestObserver for FileObserver {
    fn on_row(&self, ctx: &BatchContext, entry: &IngestResultEntry) {
        let status = if entry.succeeded { "ok" } else { "fail" };
        self.append_line(&format!(
            "{} row {status} location={} row={} identifier={} message={}",
            unix_ts(),
            ctx.location,
            entry.row,
            entry.identifier,
            entry.message
        ));
    }

    fn on_batch_finished(&self, ctx: &BatchContext, metrics: &IngestMetricsSnapshot) {
        self.append_line(&format!(
            "{} batch location={} kind={:?} {metrics}",
            unix_ts(),
            ctx.location,
            ctx.kind
        ));
    }

    fn on_failure(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} location={} err={error}",
            unix_ts(),
            ctx.location
        ));
    }

    fn on_alert(&self, ctx: &BatchContext, severity: IngestSeverity, error: &IngestError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} location={} err={error}",
            unix_ts(),
            ctx.location
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_store_is_critical() {
        let e = IngestError::Store(StoreError::Unavailable("down".into()));
        assert_eq!(severity_for_error(&e), IngestSeverity::Critical);
        let e = IngestError::SchemaMismatch {
            message: "no header".into(),
        };
        assert_eq!(severity_for_error(&e), IngestSeverity::Error);
        assert!(IngestSeverity::Warning < IngestSeverity::Critical);
    }
}
