use super::{LoadStats, Sink, SinkError};
use crate::avro::ContainerReader;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BATCH_EXTENSION: &str = "avro";

/// File name for a batch bound for `table_id`: `{table_id}.{utc stamp}.{uuid}.avro`
pub fn batch_file_name(table_id: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}.{}.{}.{}",
        table_id,
        now.format("%Y%m%dT%H%M%S"),
        uuid::Uuid::new_v4().simple(),
        BATCH_EXTENSION
    )
}

/// Recovers the table id from a name produced by [`batch_file_name`]
pub fn table_id_from_file_name(path: &Path) -> Option<String> {
    if path.extension()? != BATCH_EXTENSION {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    let (table_id, rest) = name.split_once('.')?;
    // stamp, uuid and extension must follow
    if table_id.is_empty() || rest.split('.').count() != 3 {
        return None;
    }
    Some(table_id.to_string())
}

/// Writes each batch to `dir` with an atomic rename
pub(crate) async fn write_batch_file(dir: &Path, table_id: &str, batch: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(batch_file_name(table_id, Utc::now()));
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, batch).await?;
    tokio::fs::rename(&tmp, &path).await?;

    Ok(path)
}

/// Sink that keeps batches as files, for local runs and air-gapped hosts
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for DirectorySink {
    async fn write(&self, batch: Bytes, table_id: &str) -> Result<LoadStats, SinkError> {
        let rows = ContainerReader::new(&batch)
            .and_then(|reader| reader.count_records())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let path = write_batch_file(&self.dir, table_id, &batch).await?;
        debug!(path = %path.display(), rows, "Wrote batch file");

        let len = batch.len() as u64;
        Ok(LoadStats {
            total_bytes_processed: len,
            input_bytes: len,
            output_bytes: len,
            output_rows: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avro::{Codec, ContainerWriter};
    use crate::report::{event_schema, EventRecord};

    fn empty_container() -> Bytes {
        let mut w = ContainerWriter::new(Vec::new(), &event_schema(), Codec::Null, 10).unwrap();
        w.flush().unwrap();
        Bytes::from(w.into_inner())
    }

    #[test]
    fn test_file_name_round_trips_table_id() {
        let name = batch_file_name("events_20190105", Utc::now());
        assert!(name.starts_with("events_20190105."));
        assert!(name.ends_with(".avro"));
        assert_eq!(
            table_id_from_file_name(Path::new(&name)).as_deref(),
            Some("events_20190105")
        );
    }

    #[test]
    fn test_foreign_files_ignored() {
        assert_eq!(table_id_from_file_name(Path::new("notes.txt")), None);
        assert_eq!(table_id_from_file_name(Path::new("events.avro")), None);
        assert_eq!(table_id_from_file_name(Path::new("a.b.tmp")), None);
    }

    #[tokio::test]
    async fn test_writes_batch_and_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(&dir.path().join("out")).unwrap();

        let stats = sink.write(empty_container(), "events").await.unwrap();
        assert_eq!(stats.output_rows, 0);

        let files: Vec<_> = std::fs::read_dir(sink.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);

        let bytes = std::fs::read(files[0].as_ref().unwrap().path()).unwrap();
        let records: Vec<EventRecord> = ContainerReader::new(&bytes).unwrap().records().unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_container() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap();

        let result = sink.write(Bytes::from_static(b"not avro"), "events").await;
        assert!(matches!(result, Err(SinkError::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
