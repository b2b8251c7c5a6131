use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the front door, accumulator and sink writer
#[derive(Debug, Default)]
pub struct PipelineStats {
    reports_accepted: AtomicU64,
    reports_dropped: AtomicU64,
    records_encoded: AtomicU64,
    encode_errors: AtomicU64,
    active_records: AtomicU64,
    batches_rotated: AtomicU64,
    dispatch_waits: AtomicU64,
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    rows_loaded: AtomicU64,
    bytes_shipped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`], served by `/api/v1/status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub reports_accepted: u64,
    pub reports_dropped: u64,
    pub records_encoded: u64,
    pub encode_errors: u64,
    pub active_records: u64,
    pub batches_rotated: u64,
    pub dispatch_waits: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub rows_loaded: u64,
    pub bytes_shipped: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_accepted(&self) {
        self.reports_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_encoded(&self, n: u64) {
        self.records_encoded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn encode_errors(&self, n: u64) {
        self.encode_errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_active_records(&self, n: u64) {
        self.active_records.store(n, Ordering::Relaxed);
    }

    pub fn batch_rotated(&self) {
        self.batches_rotated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_waited(&self) {
        self.dispatch_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_written(&self, rows: u64, bytes: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.rows_loaded.fetch_add(rows, Ordering::Relaxed);
        self.bytes_shipped.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reports_accepted: self.reports_accepted.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            records_encoded: self.records_encoded.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            active_records: self.active_records.load(Ordering::Relaxed),
            batches_rotated: self.batches_rotated.load(Ordering::Relaxed),
            dispatch_waits: self.dispatch_waits.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
            bytes_shipped: self.bytes_shipped.load(Ordering::Relaxed),
        }
    }
}
