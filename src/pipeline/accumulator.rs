use super::dispatch::{DispatchClosed, DispatchSender};
use super::stats::PipelineStats;
use super::Receiver;
use crate::avro::{Codec, ContainerWriter, Encode, EncodeError};
use crate::config::types::PipelineConfig;
use crate::report::{event_schema, Report};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    pub size_threshold_bytes: usize,
    pub age_threshold: Duration,
    pub records_per_block: usize,
    pub codec: Codec,
}

impl From<&PipelineConfig> for AccumulatorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            size_threshold_bytes: config.size_threshold_bytes,
            age_threshold: config.age_threshold,
            records_per_block: config.records_per_block,
            codec: Codec::from(config.codec),
        }
    }
}

/// A finished batch container on its way to the sink
#[derive(Debug)]
pub struct Batch {
    pub bytes: Bytes,
    pub records: u64,
    pub reports: u64,
    pub started_at: Instant,
    /// Position in creation order, starting at 0
    pub sequence: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Owns the active batch and decides when to retire it.
///
/// Retirement swaps the finished buffer out for a fresh one; the buffer is
/// moved, never shared, so nothing written after the swap can reach the
/// retired batch.
pub struct Accumulator {
    config: AccumulatorConfig,
    schema: serde_json::Value,
    writer: ContainerWriter<Vec<u8>>,
    started_at: Instant,
    reports: u64,
    next_sequence: u64,
    stats: Arc<PipelineStats>,
}

impl Accumulator {
    pub fn new(
        config: AccumulatorConfig,
        now: Instant,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, EncodeError> {
        let schema = event_schema();
        let writer = Self::fresh_writer(&config, &schema)?;
        Ok(Self {
            config,
            schema,
            writer,
            started_at: now,
            reports: 0,
            next_sequence: 0,
            stats,
        })
    }

    fn fresh_writer(
        config: &AccumulatorConfig,
        schema: &serde_json::Value,
    ) -> Result<ContainerWriter<Vec<u8>>, EncodeError> {
        // Room for a full batch plus one report, so the buffer rarely regrows
        let capacity = config.size_threshold_bytes.min(16 * 1024 * 1024) + 64 * 1024;
        ContainerWriter::new(
            Vec::with_capacity(capacity),
            schema,
            config.codec,
            config.records_per_block,
        )
    }

    /// Records in the active batch
    pub fn record_count(&self) -> u64 {
        self.writer.record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Conservative size of the active batch, see [`ContainerWriter::len`]
    pub fn len(&self) -> usize {
        self.writer.len()
    }

    /// Writes every event of `report` into the active batch, then retires the
    /// batch if it is over the size threshold or older than the age threshold.
    pub fn ingest(&mut self, report: &Report, now: Instant) -> Option<Batch> {
        self.encode_records(report.records());
        self.reports += 1;

        if self.over_size() || self.over_age(now) {
            self.rotate(now)
        } else {
            None
        }
    }

    fn encode_records<R: Encode>(&mut self, records: impl IntoIterator<Item = R>) {
        let mut encoded = 0u64;
        let mut failed = 0u64;

        for record in records {
            match self.writer.write_record(&record) {
                Ok(()) => encoded += 1,
                Err(e @ (EncodeError::Compression { .. } | EncodeError::Io(_))) => {
                    // The record is held in the open block until a close succeeds
                    encoded += 1;
                    warn!(error = %e, "Failed to close block, keeping it open");
                }
                Err(e) => {
                    failed += 1;
                    warn!(error = %e, "Skipping record that failed to encode");
                }
            }
        }

        self.stats.records_encoded(encoded);
        if failed > 0 {
            self.stats.encode_errors(failed);
        }
        self.stats.set_active_records(self.writer.record_count());
    }

    /// Timer tick: retires a non-empty batch that has outlived the age threshold
    pub fn poll_age(&mut self, now: Instant) -> Option<Batch> {
        if self.over_age(now) {
            self.rotate(now)
        } else {
            None
        }
    }

    /// Retires whatever is pending, for shutdown
    pub fn finish(&mut self, now: Instant) -> Option<Batch> {
        if self.is_empty() {
            return None;
        }
        self.rotate(now)
    }

    /// The open block is counted uncompressed, so once that estimate passes
    /// the threshold the block is closed and the framed size decides.
    fn over_size(&mut self) -> bool {
        let threshold = self.config.size_threshold_bytes;
        if self.is_empty() || self.writer.len() <= threshold {
            return false;
        }
        if self.writer.flushed_len() <= threshold {
            if let Err(e) = self.writer.flush() {
                warn!(error = %e, "Failed to close block for size check");
                return false;
            }
        }
        self.writer.flushed_len() > threshold
    }

    fn over_age(&self, now: Instant) -> bool {
        !self.is_empty()
            && now.saturating_duration_since(self.started_at) > self.config.age_threshold
    }

    fn rotate(&mut self, now: Instant) -> Option<Batch> {
        // Build the replacement first; on failure the active batch stays
        // active and the next check tries again.
        let fresh = match Self::fresh_writer(&self.config, &self.schema) {
            Ok(writer) => writer,
            Err(e) => {
                error!(error = %e, "Failed to start a new batch, keeping the active one");
                return None;
            }
        };

        if let Err(e) = self.writer.flush() {
            error!(error = %e, "Failed to finalize batch, keeping it active");
            return None;
        }

        let retired = std::mem::replace(&mut self.writer, fresh);
        let records = retired.record_count();
        let reports = std::mem::take(&mut self.reports);
        let started_at = std::mem::replace(&mut self.started_at, now);
        self.stats.set_active_records(0);

        let batch = Batch {
            bytes: Bytes::from(retired.into_inner()),
            records,
            reports,
            started_at,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.stats.batch_rotated();

        debug!(
            sequence = batch.sequence,
            bytes = batch.len(),
            records = batch.records,
            reports = batch.reports,
            age_ms = now.saturating_duration_since(started_at).as_millis() as u64,
            "Batch rotated"
        );

        Some(batch)
    }
}

/// Drives an [`Accumulator`]: ingests reports from the intake queue, checks
/// the age threshold every `tick`, and hands retired batches to the
/// dispatch queue.
///
/// Returns once the intake queue is closed and drained, or when `shutdown`
/// fires, after retiring the final partial batch.
pub async fn run_accumulator(
    mut intake: Receiver<Report>,
    mut accumulator: Accumulator,
    dispatch: DispatchSender,
    tick: Duration,
    mut shutdown: oneshot::Receiver<()>,
    stats: Arc<PipelineStats>,
) -> Result<(), DispatchClosed> {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Accumulator started");

    loop {
        tokio::select! {
            report = intake.recv() => {
                match report {
                    Some(report) => {
                        if let Some(batch) = accumulator.ingest(&report, Instant::now()) {
                            hand_off(&dispatch, batch, &stats).await?;
                        }
                    }
                    None => {
                        info!("Intake closed, flushing active batch");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if let Some(batch) = accumulator.poll_age(Instant::now()) {
                    hand_off(&dispatch, batch, &stats).await?;
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown requested, draining intake");
                intake.close();
                while let Some(report) = intake.recv().await {
                    if let Some(batch) = accumulator.ingest(&report, Instant::now()) {
                        hand_off(&dispatch, batch, &stats).await?;
                    }
                }
                break;
            }
        }
    }

    if let Some(batch) = accumulator.finish(Instant::now()) {
        info!(records = batch.records, "Dispatching final batch");
        hand_off(&dispatch, batch, &stats).await?;
    }

    info!("Accumulator shutdown complete");
    Ok(())
}

async fn hand_off(
    dispatch: &DispatchSender,
    batch: Batch,
    stats: &PipelineStats,
) -> Result<(), DispatchClosed> {
    if dispatch.is_busy() {
        stats.dispatch_waited();
        debug!(
            sequence = batch.sequence,
            "Previous batch still being written, waiting for dispatch slot"
        );
    }
    dispatch.dispatch(batch).await
}
