//! Avro binary encoding primitives.
//!
//! `int` and `long` are zig-zag encoded variable-length integers, `float` and
//! `double` are little-endian IEEE 754, and `bytes`/`string` are a `long`
//! length followed by the raw data.

use super::DecodeError;

pub fn write_long(buf: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n & !0x7f != 0 {
        buf.push((n & 0x7f) as u8 | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}

pub fn write_int(buf: &mut Vec<u8>, value: i32) {
    write_long(buf, i64::from(value));
}

pub fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(u8::from(value));
}

pub fn write_double(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn write_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    write_long(buf, value.len() as i64);
    buf.extend_from_slice(value);
}

pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_bytes(buf, value.as_bytes());
}

/// Cursor over an Avro-encoded byte slice
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_long(&mut self) -> Result<i64, DecodeError> {
        let mut n: u64 = 0;
        let mut shift = 0;
        loop {
            if shift >= 64 {
                return Err(DecodeError::InvalidVarint { offset: self.pos });
            }
            let byte = self.read_u8()?;
            n |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok((n >> 1) as i64 ^ -((n & 1) as i64))
    }

    pub fn read_int(&mut self) -> Result<i32, DecodeError> {
        let offset = self.pos;
        let value = self.read_long()?;
        i32::try_from(value).map_err(|_| DecodeError::InvalidValue {
            offset,
            message: format!("int out of range: {}", value),
        })
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidValue {
                offset,
                message: format!("invalid boolean byte {}", other),
            }),
        }
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        let raw = self.read_fixed(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(f64::from_le_bytes(bytes))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let offset = self.pos;
        let len = self.read_long()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidValue {
            offset,
            message: format!("negative length {}", len),
        })?;
        self.read_fixed(len)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let raw = self.read_bytes()?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    pub fn read_fixed(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a union branch index, rejecting anything past `branches`
    pub fn read_union_index(&mut self, branches: usize) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let index = self.read_long()?;
        usize::try_from(index)
            .ok()
            .filter(|i| *i < branches)
            .ok_or(DecodeError::InvalidValue {
                offset,
                message: format!("union index {} out of range", index),
            })
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }
}
