use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Real-time counters for an ingest run.
///
/// The orchestrator updates these while rows are processed; callers can snapshot them at any time.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    rows_processed: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
    duplicates_skipped: AtomicU64,
    failed: AtomicU64,
    maps_rebuilt: AtomicU64,

    mint_baseline: AtomicU64,
    release_baseline: AtomicU64,
    ids_minted: AtomicU64,
    ids_released: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters. The minting totals seen so far become the baseline for this run.
    pub fn begin_run(&self, minted_so_far: u64, released_so_far: u64) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        for counter in [
            &self.elapsed_ns,
            &self.rows_processed,
            &self.created,
            &self.updated,
            &self.unchanged,
            &self.duplicates_skipped,
            &self.failed,
            &self.maps_rebuilt,
            &self.ids_minted,
            &self.ids_released,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.mint_baseline.store(minted_so_far, Ordering::SeqCst);
        self.release_baseline.store(released_so_far, Ordering::SeqCst);
    }

    pub fn end_run(&self) {
        let started = *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(started) = started {
            let elapsed = started.elapsed().as_nanos().min(u64::MAX as u128) as u64;
            self.elapsed_ns.store(elapsed, Ordering::SeqCst);
        }
    }

    /// Record the minter's lifetime totals; the run's share is the difference from the baseline.
    pub fn observe_minting(&self, minted_total: u64, released_total: u64) {
        let minted = minted_total.saturating_sub(self.mint_baseline.load(Ordering::SeqCst));
        let released = released_total.saturating_sub(self.release_baseline.load(Ordering::SeqCst));
        self.ids_minted.store(minted, Ordering::SeqCst);
        self.ids_released.store(released, Ordering::SeqCst);
    }

    pub fn on_row(&self) {
        self.rows_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_created(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_updated(&self) {
        self.updated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_map_rebuilt(&self) {
        self.maps_rebuilt.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        IngestMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_processed: self.rows_processed.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            unchanged: self.unchanged.load(Ordering::SeqCst),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            maps_rebuilt: self.maps_rebuilt.load(Ordering::SeqCst),
            ids_minted: self.ids_minted.load(Ordering::SeqCst),
            ids_released: self.ids_released.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of [`IngestMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_processed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub duplicates_skipped: u64,
    pub failed: u64,
    pub maps_rebuilt: u64,
    pub ids_minted: u64,
    pub ids_released: u64,
}

impl fmt::Display for IngestMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows={}, created={}, updated={}, unchanged={}, skipped={}, failed={}, maps_rebuilt={}, minted={}, released={}, elapsed={:?}",
            self.run_id,
            self.rows_processed,
            self.created,
            self.updated,
            self.unchanged,
            self.duplicates_skipped,
            self.failed,
            self.maps_rebuilt,
            self.ids_minted,
            self.ids_released,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_run_resets_counters_and_sets_minting_baseline() {
        let m = IngestMetrics::new();
        m.begin_run(0, 0);
        m.on_row();
        m.on_created();
        m.observe_minting(3, 1);
        assert_eq!(m.snapshot().ids_minted, 3);

        m.begin_run(3, 1);
        m.observe_minting(5, 1);
        let s = m.snapshot();
        assert_eq!(s.run_id, 2);
        assert_eq!(s.rows_processed, 0);
        assert_eq!(s.ids_minted, 2);
        assert_eq!(s.ids_released, 0);
    }
}
