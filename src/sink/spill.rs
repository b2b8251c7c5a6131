use super::directory::write_batch_file;
use super::{LoadStats, Sink, SinkError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

/// Keeps batches the inner sink rejected as files in a spill directory so
/// they can be re-shipped with `atmon replay`.
pub struct SpillingSink {
    inner: Arc<dyn Sink>,
    dir: PathBuf,
}

impl SpillingSink {
    pub fn new(inner: Arc<dyn Sink>, dir: PathBuf) -> Self {
        Self { inner, dir }
    }
}

#[async_trait]
impl Sink for SpillingSink {
    async fn write(&self, batch: Bytes, table_id: &str) -> Result<LoadStats, SinkError> {
        let err = match self.inner.write(batch.clone(), table_id).await {
            Ok(stats) => return Ok(stats),
            Err(e) => e,
        };

        match write_batch_file(&self.dir, table_id, &batch).await {
            Ok(path) => {
                warn!(
                    table_id,
                    path = %path.display(),
                    bytes = batch.len(),
                    error = %err,
                    "Batch write failed, spilled to disk"
                );
                Err(SinkError::Spilled {
                    path,
                    source: Box::new(err),
                })
            }
            Err(spill_err) => {
                error!(
                    table_id,
                    dir = %self.dir.display(),
                    error = %spill_err,
                    "Failed to spill batch, it will be lost"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::directory::table_id_from_file_name;
    use crate::sink::tests::FlakySink;

    #[tokio::test]
    async fn test_success_passes_through_without_spilling() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SpillingSink::new(Arc::new(FlakySink::default()), dir.path().to_path_buf());

        sink.write(Bytes::from_static(b"batch"), "events").await.unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_spilled_intact() {
        let dir = tempfile::tempdir().unwrap();
        let spill_dir = dir.path().join("spill");
        let sink = SpillingSink::new(Arc::new(FlakySink::failing(1)), spill_dir.clone());

        let result = sink.write(Bytes::from_static(b"batch"), "events_20190105").await;

        let path = match result {
            Err(SinkError::Spilled { path, source }) => {
                assert!(matches!(*source, SinkError::Status { status: 503, .. }));
                path
            }
            other => panic!("expected spill, got {:?}", other),
        };
        assert!(path.starts_with(&spill_dir));
        assert_eq!(std::fs::read(&path).unwrap(), b"batch");
        assert_eq!(
            table_id_from_file_name(&path).as_deref(),
            Some("events_20190105")
        );
    }

    #[tokio::test]
    async fn test_unwritable_spill_dir_returns_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let sink = SpillingSink::new(Arc::new(FlakySink::failing(1)), blocker.join("spill"));

        let result = sink.write(Bytes::from_static(b"batch"), "events").await;
        assert!(matches!(result, Err(SinkError::Status { status: 503, .. })));
    }
}
