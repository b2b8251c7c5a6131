//! Avro object container encoding.
//!
//! Batches shipped to the warehouse are Avro object container files: a
//! header carrying the writer schema and codec, then independently
//! compressed blocks of records, each followed by the file's 16-byte sync
//! marker.

pub mod binary;
pub mod codec;
pub mod container;
pub mod reader;

use thiserror::Error;

pub use binary::BinaryReader;
pub use codec::Codec;
pub use container::ContainerWriter;
pub use reader::{Block, ContainerReader};

/// Leading bytes of every object container file
pub const MAGIC: [u8; 4] = *b"Obj\x01";

pub const SYNC_SIZE: usize = 16;

pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";

/// A value that can be written as one Avro record
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError>;
}

/// A value that can be read back from one Avro record
pub trait Decode: Sized {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, DecodeError>;
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("record violates schema: {0}")]
    Schema(String),

    #[error("failed to compress block of {records} records: {source}")]
    Compression {
        records: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not an Avro object container (bad magic)")]
    BadMagic,

    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: usize },

    #[error("malformed varint at offset {offset}")]
    InvalidVarint { offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid value at offset {offset}: {message}")]
    InvalidValue { offset: usize, message: String },

    #[error("container header is missing '{0}'")]
    MissingMetadata(&'static str),

    #[error("unsupported codec '{0}'")]
    UnsupportedCodec(String),

    #[error("sync marker mismatch after block at offset {offset}")]
    SyncMismatch { offset: usize },

    #[error("invalid schema JSON: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("failed to decompress block: {0}")]
    Io(#[from] std::io::Error),
}
