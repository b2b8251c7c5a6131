use super::binary::{write_bytes, write_long, write_string};
use super::{Codec, Encode, EncodeError, CODEC_KEY, MAGIC, SCHEMA_KEY, SYNC_SIZE};
use std::io::Write;

/// Streams records into an Avro object container.
///
/// Records are buffered into an open block until `records_per_block` is
/// reached or [`flush`](Self::flush) is called; the block is then compressed
/// and framed as `count, byte length, data, sync marker`. Nothing is written
/// for a flush with no pending records.
pub struct ContainerWriter<W: Write> {
    inner: W,
    codec: Codec,
    sync_marker: [u8; SYNC_SIZE],
    records_per_block: usize,
    block: Vec<u8>,
    block_records: usize,
    bytes_written: usize,
    records_written: u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Writes the container header and returns a writer ready for records
    pub fn new(
        mut inner: W,
        schema: &serde_json::Value,
        codec: Codec,
        records_per_block: usize,
    ) -> Result<Self, EncodeError> {
        let sync_marker = *uuid::Uuid::new_v4().as_bytes();

        let mut header = Vec::with_capacity(256);
        header.extend_from_slice(&MAGIC);
        // File metadata is an Avro map<bytes> written as a single block
        write_long(&mut header, 2);
        write_string(&mut header, SCHEMA_KEY);
        write_bytes(&mut header, schema.to_string().as_bytes());
        write_string(&mut header, CODEC_KEY);
        write_bytes(&mut header, codec.name().as_bytes());
        write_long(&mut header, 0);
        header.extend_from_slice(&sync_marker);

        inner.write_all(&header)?;

        Ok(Self {
            inner,
            codec,
            sync_marker,
            records_per_block: records_per_block.max(1),
            block: Vec::new(),
            block_records: 0,
            bytes_written: header.len(),
            records_written: 0,
        })
    }

    /// Appends one record to the open block, closing the block when full.
    ///
    /// A record that fails to encode leaves the open block untouched. A
    /// [`EncodeError::Compression`] or [`EncodeError::Io`] error means the
    /// record was accepted but the full block could not be closed; it stays
    /// open and is closed by a later write or flush.
    pub fn write_record<R: Encode>(&mut self, record: &R) -> Result<(), EncodeError> {
        let mark = self.block.len();
        if let Err(e) = record.encode(&mut self.block) {
            self.block.truncate(mark);
            return Err(e);
        }
        self.block_records += 1;

        if self.block_records >= self.records_per_block {
            self.close_block()?;
        }
        Ok(())
    }

    /// Closes any open block so every written record is in the underlying sink
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.close_block()?;
        self.inner.flush()?;
        Ok(())
    }

    /// Framed bytes written so far plus the uncompressed size of the open
    /// block. Never less than what a flush would leave behind for the
    /// null codec.
    pub fn len(&self) -> usize {
        self.bytes_written + self.block.len()
    }

    /// Bytes of closed, framed blocks (and the header) in the sink
    pub fn flushed_len(&self) -> usize {
        self.bytes_written
    }

    /// Records in closed blocks plus records in the open block
    pub fn record_count(&self) -> u64 {
        self.records_written + self.block_records as u64
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn pending_records(&self) -> usize {
        self.block_records
    }

    pub fn sync_marker(&self) -> &[u8; SYNC_SIZE] {
        &self.sync_marker
    }

    /// Returns the underlying sink. Call [`flush`](Self::flush) first or the
    /// open block is discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn close_block(&mut self) -> Result<(), EncodeError> {
        if self.block_records == 0 {
            return Ok(());
        }

        // The open block is only cleared once its frame is in the sink, so a
        // failed close can be retried by the next write or flush.
        let records = self.block_records;
        let data = self
            .codec
            .compress(&self.block)
            .map_err(|source| EncodeError::Compression { records, source })?;

        let mut frame = Vec::with_capacity(data.len() + 2 * 10 + SYNC_SIZE);
        write_long(&mut frame, records as i64);
        write_long(&mut frame, data.len() as i64);
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&self.sync_marker);

        self.inner.write_all(&frame)?;
        self.bytes_written += frame.len();
        self.records_written += records as u64;
        self.block.clear();
        self.block_records = 0;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::avro::binary::{write_string as put_string, BinaryReader};
    use crate::avro::{ContainerReader, Decode, DecodeError};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Sample {
        pub id: i64,
        pub label: String,
    }

    impl Encode for Sample {
        fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
            if self.label.is_empty() {
                return Err(EncodeError::Schema("label cannot be empty".to_string()));
            }
            write_long(buf, self.id);
            put_string(buf, &self.label);
            Ok(())
        }
    }

    impl Decode for Sample {
        fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, DecodeError> {
            Ok(Sample {
                id: reader.read_long()?,
                label: reader.read_string()?,
            })
        }
    }

    pub(crate) fn sample_schema() -> serde_json::Value {
        json!({
            "type": "record",
            "name": "Sample",
            "fields": [
                {"name": "id", "type": "long"},
                {"name": "label", "type": "string"}
            ]
        })
    }

    fn sample(id: i64) -> Sample {
        Sample {
            id,
            label: format!("sample-{}", id),
        }
    }

    fn writer(codec: Codec, records_per_block: usize) -> ContainerWriter<Vec<u8>> {
        ContainerWriter::new(Vec::new(), &sample_schema(), codec, records_per_block).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let w = writer(Codec::Null, 10);
        let sync = *w.sync_marker();
        let bytes = w.into_inner();

        assert_eq!(&bytes[..4], b"Obj\x01");
        assert_eq!(&bytes[bytes.len() - SYNC_SIZE..], &sync);
    }

    #[test]
    fn test_blocks_close_at_configured_size() {
        let mut w = writer(Codec::Null, 3);
        for id in 0..7 {
            w.write_record(&sample(id)).unwrap();
        }
        assert_eq!(w.pending_records(), 1);
        w.flush().unwrap();

        let bytes = w.into_inner();
        let blocks = ContainerReader::new(&bytes).unwrap().blocks().unwrap();
        let counts: Vec<usize> = blocks.iter().map(|b| b.record_count()).collect();
        assert_eq!(counts, vec![3, 3, 1]);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut w = writer(Codec::from_name("zstandard").unwrap(), 100);
        w.flush().unwrap();
        let empty_len = w.len();
        w.flush().unwrap();
        assert_eq!(w.len(), empty_len);

        w.write_record(&sample(1)).unwrap();
        w.flush().unwrap();
        let one_block_len = w.len();
        w.flush().unwrap();
        w.flush().unwrap();
        assert_eq!(w.len(), one_block_len);

        let bytes = w.into_inner();
        let reader = ContainerReader::new(&bytes).unwrap();
        let blocks = reader.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].record_count(), 1);
    }

    #[test]
    fn test_empty_container_is_valid() {
        let mut w = writer(Codec::Null, 100);
        w.flush().unwrap();
        let bytes = w.into_inner();

        let records: Vec<Sample> = ContainerReader::new(&bytes).unwrap().records().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_rejected_record_leaves_block_intact() {
        let mut w = writer(Codec::Null, 100);
        w.write_record(&sample(1)).unwrap();
        let len_before = w.len();

        let bad = Sample {
            id: 2,
            label: String::new(),
        };
        assert!(matches!(w.write_record(&bad), Err(EncodeError::Schema(_))));
        assert_eq!(w.len(), len_before);
        assert_eq!(w.record_count(), 1);

        w.write_record(&sample(3)).unwrap();
        w.flush().unwrap();
        let records: Vec<Sample> = ContainerReader::new(&w.into_inner())
            .unwrap()
            .records()
            .unwrap();
        assert_eq!(records, vec![sample(1), sample(3)]);
    }

    /// Accepts the header, then fails writes while `fail` is set
    struct Switchable {
        buf: Vec<u8>,
        fail: bool,
    }

    impl Write for Switchable {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.buf.write(data)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_block_close_keeps_records() {
        let sink = Switchable {
            buf: Vec::new(),
            fail: false,
        };
        let mut w = ContainerWriter::new(sink, &sample_schema(), Codec::Deflate, 2).unwrap();
        w.write_record(&sample(1)).unwrap();

        w.inner.fail = true;
        assert!(matches!(w.write_record(&sample(2)), Err(EncodeError::Io(_))));
        assert_eq!(w.record_count(), 2);
        assert_eq!(w.pending_records(), 2);
        assert!(w.flush().is_err());

        w.inner.fail = false;
        w.write_record(&sample(3)).unwrap();
        w.flush().unwrap();
        assert_eq!(w.pending_records(), 0);

        let bytes = w.into_inner().buf;
        let records: Vec<Sample> = ContainerReader::new(&bytes).unwrap().records().unwrap();
        assert_eq!(records, vec![sample(1), sample(2), sample(3)]);
    }

    #[test]
    fn test_deflate_container_reads_back() {
        let mut w = writer(Codec::Deflate, 4);
        for id in 0..10 {
            w.write_record(&sample(id)).unwrap();
        }
        w.flush().unwrap();

        let bytes = w.into_inner();
        let reader = ContainerReader::new(&bytes).unwrap();
        assert_eq!(reader.codec(), Codec::Deflate);
        let records: Vec<Sample> = reader.records().unwrap();
        assert_eq!(records, (0..10).map(sample).collect::<Vec<_>>());
    }

    #[test]
    fn test_len_never_below_flushed_size_for_null_codec() {
        let mut w = writer(Codec::Null, 100);
        for id in 0..42 {
            w.write_record(&sample(id)).unwrap();
        }
        let estimate = w.len();
        w.flush().unwrap();
        assert!(w.len() >= estimate);

        // 452 bytes of records: one-byte count varint, two-byte size varint
        let framing = 1 + 2 + SYNC_SIZE;
        assert_eq!(w.into_inner().len(), estimate + framing);
    }
}
