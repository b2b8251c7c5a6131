use crate::config::types::CodecName;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::borrow::Cow;
use std::io::{self, Read, Write};

/// Block compression codec, named in the container's `avro.codec` metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Null,
    /// Raw RFC 1951 deflate, no zlib header
    Deflate,
    Zstandard { level: i32 },
}

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Null => "null",
            Codec::Deflate => "deflate",
            Codec::Zstandard { .. } => "zstandard",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Codec::Null),
            "deflate" => Some(Codec::Deflate),
            "zstandard" => Some(Codec::Zstandard {
                level: DEFAULT_ZSTD_LEVEL,
            }),
            _ => None,
        }
    }

    pub fn compress<'a>(&self, data: &'a [u8]) -> io::Result<Cow<'a, [u8]>> {
        match self {
            Codec::Null => Ok(Cow::Borrowed(data)),
            Codec::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish().map(Cow::Owned)
            }
            Codec::Zstandard { level } => zstd::encode_all(data, *level).map(Cow::Owned),
        }
    }

    pub fn decompress<'a>(&self, data: &'a [u8]) -> io::Result<Cow<'a, [u8]>> {
        match self {
            Codec::Null => Ok(Cow::Borrowed(data)),
            Codec::Deflate => {
                let mut out = Vec::with_capacity(data.len() * 4);
                DeflateDecoder::new(data).read_to_end(&mut out)?;
                Ok(Cow::Owned(out))
            }
            Codec::Zstandard { .. } => zstd::decode_all(data).map(Cow::Owned),
        }
    }
}

impl From<CodecName> for Codec {
    fn from(name: CodecName) -> Self {
        match name {
            CodecName::Null => Codec::Null,
            CodecName::Deflate => Codec::Deflate,
            CodecName::Zstandard => Codec::Zstandard {
                level: DEFAULT_ZSTD_LEVEL,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstandard_shrinks_repetitive_data() {
        let data = b"waiting waiting waiting waiting waiting waiting ".repeat(64);
        let codec = Codec::from(CodecName::Zstandard);

        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());

        let restored = codec.decompress(&compressed).unwrap();
        assert_eq!(restored.as_ref(), data.as_slice());
    }

    #[test]
    fn test_deflate_is_raw_stream() {
        let data = b"stalled stalled stalled stalled ".repeat(32);
        let codec = Codec::from(CodecName::Deflate);

        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        // A zlib wrapper would start with 0x78
        assert_ne!(compressed[0], 0x78);

        let restored = codec.decompress(&compressed).unwrap();
        assert_eq!(restored.as_ref(), data.as_slice());
    }

    #[test]
    fn test_corrupt_deflate_block_is_an_error() {
        assert!(Codec::Deflate.decompress(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_null_codec_borrows() {
        let data = [1u8, 2, 3];
        assert!(matches!(Codec::Null.compress(&data).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_names() {
        assert_eq!(Codec::from_name("null"), Some(Codec::Null));
        assert_eq!(Codec::from_name("zstandard").map(|c| c.name()), Some("zstandard"));
        assert_eq!(Codec::from_name("deflate"), Some(Codec::Deflate));
        assert_eq!(Codec::Deflate.name(), "deflate");
        assert_eq!(Codec::from_name("snappy"), None);
    }
}
