use crate::config::parse::load_config;
use crate::sink::directory::{table_id_from_file_name, BATCH_EXTENSION};
use crate::sink::{build_replay_sink, Sink};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Re-ship spilled batch files through the configured sink
pub async fn replay(
    config_path: Option<PathBuf>,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;
    let config = load_config(&path)?;
    let sink = build_replay_sink(&config).await?;

    let summary = replay_dir(dir, sink.as_ref()).await?;
    println!(
        "Replayed {} batches ({} failed, {} skipped)",
        summary.delivered, summary.failed, summary.skipped
    );

    if summary.failed > 0 {
        return Err(format!("{} batches could not be delivered", summary.failed).into());
    }
    Ok(())
}

/// Writes each batch file in `dir` to `sink`, oldest name first.
///
/// Delivered files are removed. Failed files stay where they are so the
/// replay can be repeated.
pub async fn replay_dir(dir: &Path, sink: &dyn Sink) -> std::io::Result<ReplaySummary> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == BATCH_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();

    let mut summary = ReplaySummary::default();
    for path in files {
        let Some(table_id) = table_id_from_file_name(&path) else {
            warn!(path = %path.display(), "Skipping file without a table id in its name");
            summary.skipped += 1;
            continue;
        };

        let batch = Bytes::from(tokio::fs::read(&path).await?);
        match sink.write(batch, &table_id).await {
            Ok(stats) => {
                info!(
                    path = %path.display(),
                    table_id = %table_id,
                    output_rows = stats.output_rows,
                    "Replayed batch"
                );
                tokio::fs::remove_file(&path).await?;
                summary.delivered += 1;
            }
            Err(e) => {
                error!(path = %path.display(), table_id = %table_id, error = %e, "Replay failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
