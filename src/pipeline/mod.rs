//! Buffering and batch-flush pipeline.
//!
//! ```text
//! submit -> intake queue -> accumulator -> dispatch slot -> sink writer -> Sink
//! ```
//!
//! The intake queue is bounded and is the only backpressure producers see.
//! The dispatch slot holds at most one batch, so the accumulator waits there
//! (while producers keep filling the intake queue) when the sink is slow.

pub mod accumulator;
pub mod channel;
pub mod dispatch;
pub mod stats;
pub mod writer;

pub use accumulator::{run_accumulator, Accumulator, AccumulatorConfig, Batch};
pub use channel::{create_channel, Receiver, ReportSender, Sender};
pub use dispatch::{dispatch_queue, DispatchClosed, DispatchReceiver, DispatchSender, InFlight};
pub use stats::{PipelineStats, StatsSnapshot};
pub use writer::run_sink_writer;

use crate::avro::EncodeError;
use crate::config::types::{PipelineConfig, TableConfig};
use crate::sink::Sink;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start batch encoder: {0}")]
    Encoder(#[from] EncodeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchClosed),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Running accumulator and sink writer tasks
pub struct Pipeline {
    sender: ReportSender,
    stats: Arc<PipelineStats>,
    shutdown: oneshot::Sender<()>,
    accumulator: JoinHandle<Result<(), DispatchClosed>>,
    writer: JoinHandle<()>,
}

impl Pipeline {
    /// Spawns the accumulator and sink writer. Must be called inside a tokio
    /// runtime.
    pub fn start(
        config: &PipelineConfig,
        sink: Arc<dyn Sink>,
        table: TableConfig,
    ) -> Result<Self, PipelineError> {
        let stats = Arc::new(PipelineStats::new());
        let accumulator = Accumulator::new(
            AccumulatorConfig::from(config),
            Instant::now(),
            stats.clone(),
        )?;

        let (intake_tx, intake_rx) = create_channel(config.intake_capacity);
        let (dispatch_tx, dispatch_rx) = dispatch_queue();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let writer = tokio::spawn(run_sink_writer(dispatch_rx, sink, table, stats.clone()));
        let accumulator = tokio::spawn(run_accumulator(
            intake_rx,
            accumulator,
            dispatch_tx,
            config.tick_interval,
            shutdown_rx,
            stats.clone(),
        ));

        info!(
            intake_capacity = config.intake_capacity,
            size_threshold_bytes = config.size_threshold_bytes,
            age_threshold = ?config.age_threshold,
            records_per_block = config.records_per_block,
            codec = ?config.codec,
            "Pipeline started"
        );

        Ok(Self {
            sender: ReportSender::new(intake_tx, stats.clone()),
            stats,
            shutdown: shutdown_tx,
            accumulator,
            writer,
        })
    }

    pub fn sender(&self) -> ReportSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Stops intake, retires the active batch and waits for the sink writer
    /// to finish its last write.
    pub async fn shutdown(self) -> Result<StatsSnapshot, PipelineError> {
        let Pipeline {
            sender,
            stats,
            shutdown,
            accumulator,
            writer,
        } = self;

        drop(sender);
        // The accumulator may already have stopped on its own
        let _ = shutdown.send(());

        let result = accumulator.await?;
        writer.await?;

        if let Err(e) = &result {
            error!(error = %e, "Final batch was not dispatched");
        }
        result?;

        let snapshot = stats.snapshot();
        info!(
            reports = snapshot.reports_accepted,
            batches_written = snapshot.batches_written,
            batches_failed = snapshot.batches_failed,
            "Pipeline drained"
        );
        Ok(snapshot)
    }
}
