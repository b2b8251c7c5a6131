use super::stats::PipelineStats;
use crate::report::{EventKind, Report};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Create a bounded channel with the specified buffer size
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size)
}

/// Producer handle for the intake queue. Cheap to clone, one per request
/// handler.
#[derive(Clone)]
pub struct ReportSender {
    tx: Sender<Report>,
    stats: Arc<PipelineStats>,
}

impl ReportSender {
    pub(crate) fn new(tx: Sender<Report>, stats: Arc<PipelineStats>) -> Self {
        Self { tx, stats }
    }

    /// Queues a report for batching, waiting while the intake queue is full.
    ///
    /// Never fails from the caller's point of view: a report submitted after
    /// the pipeline stopped is logged and counted as dropped.
    pub async fn submit(&self, report: Report) {
        debug!(
            play = report.count(EventKind::Play),
            stalled = report.count(EventKind::Stalled),
            waiting = report.count(EventKind::Waiting),
            resource = report.count(EventKind::Resource),
            "Report accepted"
        );

        if self.tx.send(report).await.is_err() {
            warn!("Pipeline is shut down, report dropped");
            self.stats.report_dropped();
            return;
        }
        self.stats.report_accepted();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
