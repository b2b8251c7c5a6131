use super::binary::BinaryReader;
use super::{Codec, Decode, DecodeError, CODEC_KEY, MAGIC, SCHEMA_KEY, SYNC_SIZE};

/// Reads an Avro object container produced by [`ContainerWriter`](super::ContainerWriter)
/// or any other writer using the `null`, `deflate` or `zstandard` codec.
pub struct ContainerReader<'a> {
    reader: BinaryReader<'a>,
    schema: serde_json::Value,
    codec: Codec,
    sync_marker: [u8; SYNC_SIZE],
}

/// One decompressed block of encoded records
#[derive(Debug)]
pub struct Block {
    record_count: usize,
    data: Vec<u8>,
}

impl Block {
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn decode<R: Decode>(&self) -> Result<Vec<R>, DecodeError> {
        let mut reader = BinaryReader::new(&self.data);
        let mut records = Vec::with_capacity(self.record_count);
        for _ in 0..self.record_count {
            records.push(R::decode(&mut reader)?);
        }
        if !reader.is_empty() {
            return Err(DecodeError::InvalidValue {
                offset: reader.position(),
                message: "trailing bytes after last record in block".to_string(),
            });
        }
        Ok(records)
    }
}

impl<'a> ContainerReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        let mut reader = BinaryReader::new(data);

        if reader.read_fixed(MAGIC.len()).map_err(|_| DecodeError::BadMagic)? != MAGIC {
            return Err(DecodeError::BadMagic);
        }

        let mut schema = None;
        let mut codec_name = None;

        loop {
            let mut count = reader.read_long()?;
            if count == 0 {
                break;
            }
            if count < 0 {
                // Negative counts are followed by the block's byte size
                count = -count;
                reader.read_long()?;
            }
            for _ in 0..count {
                let key = reader.read_string()?;
                let value = reader.read_bytes()?;
                match key.as_str() {
                    SCHEMA_KEY => schema = Some(serde_json::from_slice(value)?),
                    CODEC_KEY => codec_name = Some(String::from_utf8_lossy(value).into_owned()),
                    _ => {}
                }
            }
        }

        let schema = schema.ok_or(DecodeError::MissingMetadata(SCHEMA_KEY))?;
        // The Avro spec treats a missing codec as "null"
        let codec_name = codec_name.unwrap_or_else(|| "null".to_string());
        let codec =
            Codec::from_name(&codec_name).ok_or(DecodeError::UnsupportedCodec(codec_name))?;

        let mut sync_marker = [0u8; SYNC_SIZE];
        sync_marker.copy_from_slice(reader.read_fixed(SYNC_SIZE)?);

        Ok(Self {
            reader,
            schema,
            codec,
            sync_marker,
        })
    }

    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Reads every remaining block, verifying each sync marker
    pub fn blocks(mut self) -> Result<Vec<Block>, DecodeError> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_block()? {
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Decodes every record in the container, in write order
    pub fn records<R: Decode>(self) -> Result<Vec<R>, DecodeError> {
        let mut records = Vec::new();
        for block in self.blocks()? {
            records.extend(block.decode::<R>()?);
        }
        Ok(records)
    }

    /// Counts records from block headers without decompressing them
    pub fn count_records(mut self) -> Result<u64, DecodeError> {
        let mut total = 0u64;
        while let Some((count, _)) = self.next_frame()? {
            total += count as u64;
        }
        Ok(total)
    }

    fn next_block(&mut self) -> Result<Option<Block>, DecodeError> {
        match self.next_frame()? {
            Some((record_count, data)) => {
                let data = self.codec.decompress(data)?.into_owned();
                Ok(Some(Block { record_count, data }))
            }
            None => Ok(None),
        }
    }

    fn next_frame(&mut self) -> Result<Option<(usize, &'a [u8])>, DecodeError> {
        if self.reader.is_empty() {
            return Ok(None);
        }

        let offset = self.reader.position();
        let count = self.reader.read_long()?;
        let record_count = usize::try_from(count).map_err(|_| DecodeError::InvalidValue {
            offset,
            message: format!("negative block record count {}", count),
        })?;
        let data = self.reader.read_bytes()?;

        if self.reader.read_fixed(SYNC_SIZE)? != self.sync_marker {
            return Err(DecodeError::SyncMismatch { offset });
        }

        Ok(Some((record_count, data)))
    }
}
