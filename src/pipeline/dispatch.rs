//! Single-slot handoff between the accumulator and the sink writer.
//!
//! The slot is a one-permit semaphore. The accumulator takes the permit
//! before sending a batch and the permit travels with the batch; it is
//! released only when the writer drops the [`InFlight`] after the write
//! attempt. A second batch therefore waits in the accumulator until the
//! first one's write has finished, so at most one batch is ever queued for
//! or inside the sink.

use super::accumulator::Batch;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
#[error("sink writer has stopped, batch {} not dispatched", .0.sequence)]
pub struct DispatchClosed(pub Batch);

/// A batch owned by the sink writer. Dropping it frees the dispatch slot.
#[derive(Debug)]
pub struct InFlight {
    pub batch: Batch,
    _slot: OwnedSemaphorePermit,
}

pub struct DispatchSender {
    tx: mpsc::Sender<InFlight>,
    slot: Arc<Semaphore>,
}

pub struct DispatchReceiver {
    rx: mpsc::Receiver<InFlight>,
}

pub fn dispatch_queue() -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let slot = Arc::new(Semaphore::new(1));
    (DispatchSender { tx, slot }, DispatchReceiver { rx })
}

impl DispatchSender {
    /// True while a batch is queued for or being written by the sink writer
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Hands `batch` to the sink writer, waiting for the slot to free up
    pub async fn dispatch(&self, batch: Batch) -> Result<(), DispatchClosed> {
        if self.tx.is_closed() {
            return Err(DispatchClosed(batch));
        }

        let permit = tokio::select! {
            permit = self.slot.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(DispatchClosed(batch)),
            },
            _ = self.tx.closed() => return Err(DispatchClosed(batch)),
        };

        self.tx
            .send(InFlight {
                batch,
                _slot: permit,
            })
            .await
            .map_err(|e| DispatchClosed(e.0.batch))
    }
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<InFlight> {
        self.rx.recv().await
    }
}
