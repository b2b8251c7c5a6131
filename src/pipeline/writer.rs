use super::dispatch::DispatchReceiver;
use super::stats::PipelineStats;
use crate::config::types::TableConfig;
use crate::sink::{resolve_table_id, Sink};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Run the sink writer task.
///
/// Writes each dispatched batch to `sink`, one at a time, and logs the
/// outcome. A failed write is logged and the batch dropped; the loop only
/// ends when the dispatch queue closes.
pub async fn run_sink_writer(
    mut input: DispatchReceiver,
    sink: Arc<dyn Sink>,
    table: TableConfig,
    stats: Arc<PipelineStats>,
) {
    info!(table_id = %table.table_id, "Sink writer started");

    while let Some(in_flight) = input.recv().await {
        let batch = &in_flight.batch;
        let table_id = resolve_table_id(&table, Utc::now());

        match sink.write(batch.bytes.clone(), &table_id).await {
            Ok(load) => {
                stats.batch_written(load.output_rows, batch.len() as u64);
                info!(
                    sequence = batch.sequence,
                    table_id = %table_id,
                    records = batch.records,
                    total_bytes_processed = load.total_bytes_processed,
                    input_bytes = load.input_bytes,
                    output_bytes = load.output_bytes,
                    output_rows = load.output_rows,
                    "Finished loading batch"
                );
            }
            Err(e) => {
                stats.batch_failed();
                error!(
                    sequence = batch.sequence,
                    table_id = %table_id,
                    records = batch.records,
                    bytes = batch.len(),
                    error = %e,
                    "Failed to load batch"
                );
            }
        }

        // Frees the dispatch slot
        drop(in_flight);
    }

    info!("Sink writer shutdown complete");
}
