//! Canonical big-endian binary encoding shared by every wire structure.

use thiserror::Error;

/// Largest integer a 64-bit field may carry on the wire (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    #[error("read of {needed} bytes at offset {offset} exceeds buffer length {len}")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        len: usize,
    },
    #[error("invalid cursor position {position} for buffer of length {len}")]
    InvalidPosition { position: usize, len: usize },
    #[error("integer {0} exceeds the safe 64-bit range")]
    UnsafeInteger(u64),
    #[error("invalid string: {0}")]
    InvalidString(String),
    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: u64 },
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Growable byte buffer with independent read and write cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl SerialBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SerialBuffer {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Wraps existing bytes; both cursors start at zero.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        SerialBuffer {
            data: data.into(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn set_read_pos(&mut self, position: usize) -> Result<(), SerialError> {
        if position > self.data.len() {
            return Err(SerialError::InvalidPosition {
                position,
                len: self.data.len(),
            });
        }
        self.read_pos = position;
        Ok(())
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn set_write_pos(&mut self, position: usize) -> Result<(), SerialError> {
        if position > self.data.len() {
            return Err(SerialError::InvalidPosition {
                position,
                len: self.data.len(),
            });
        }
        self.write_pos = position;
        Ok(())
    }

    /// Bytes left between the read cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    fn take(&mut self, needed: usize) -> Result<&[u8], SerialError> {
        let end = self
            .read_pos
            .checked_add(needed)
            .filter(|end| *end <= self.data.len())
            .ok_or(SerialError::UnexpectedEnd {
                offset: self.read_pos,
                needed,
                len: self.data.len(),
            })?;
        let start = self.read_pos;
        self.read_pos = end;
        Ok(&self.data[start..end])
    }

    pub fn read(&mut self, length: usize) -> Result<Vec<u8>, SerialError> {
        Ok(self.take(length)?.to_vec())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SerialError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        let end = self.write_pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
    }

    pub fn read_u8(&mut self) -> Result<u8, SerialError> {
        Ok(self.take(1)?[0])
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    pub fn read_u16(&mut self) -> Result<u16, SerialError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write(&value.to_be_bytes());
    }

    pub fn read_u32(&mut self) -> Result<u32, SerialError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write(&value.to_be_bytes());
    }

    pub fn read_u64(&mut self) -> Result<u64, SerialError> {
        let value = u64::from_be_bytes(self.read_array()?);
        if value > MAX_SAFE_INTEGER {
            return Err(SerialError::UnsafeInteger(value));
        }
        Ok(value)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), SerialError> {
        if value > MAX_SAFE_INTEGER {
            return Err(SerialError::UnsafeInteger(value));
        }
        self.write(&value.to_be_bytes());
        Ok(())
    }

    /// Four big-endian 32-bit words, most significant first.
    pub fn read_u128(&mut self) -> Result<u128, SerialError> {
        let mut value = 0u128;
        for _ in 0..4 {
            value = (value << 32) | u128::from(self.read_u32()?);
        }
        Ok(value)
    }

    pub fn write_u128(&mut self, value: u128) {
        for shift in [96u32, 64, 32, 0] {
            self.write_u32((value >> shift) as u32);
        }
    }

    pub fn read_var_uint(&mut self) -> Result<u64, SerialError> {
        match self.read_u8()? {
            0xFD => Ok(u64::from(self.read_u16()?)),
            0xFE => Ok(u64::from(self.read_u32()?)),
            0xFF => self.read_u64(),
            small => Ok(u64::from(small)),
        }
    }

    pub fn write_var_uint(&mut self, value: u64) -> Result<(), SerialError> {
        if value < 0xFD {
            self.write_u8(value as u8);
        } else if value <= 0xFFFF {
            self.write_u8(0xFD);
            self.write_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE);
            self.write_u32(value as u32);
        } else {
            if value > MAX_SAFE_INTEGER {
                return Err(SerialError::UnsafeInteger(value));
            }
            self.write_u8(0xFF);
            self.write_u64(value)?;
        }
        Ok(())
    }

    pub fn var_uint_size(value: u64) -> usize {
        if value < 0xFD {
            1
        } else if value <= 0xFFFF {
            3
        } else if value <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }

    pub fn read_string(&mut self, length: usize) -> Result<String, SerialError> {
        let bytes = self.read(length)?;
        ascii_string(bytes)
    }

    pub fn write_string(&mut self, value: &str, length: usize) -> Result<(), SerialError> {
        check_ascii(value)?;
        if value.len() != length {
            return Err(SerialError::InvalidString(format!(
                "expected {} bytes, got {}",
                length,
                value.len()
            )));
        }
        self.write(value.as_bytes());
        Ok(())
    }

    /// Fixed-width field; the value ends at the first NUL byte.
    pub fn read_padded_string(&mut self, length: usize) -> Result<String, SerialError> {
        let mut bytes = self.read(length)?;
        if let Some(end) = bytes.iter().position(|b| *b == 0) {
            bytes.truncate(end);
        }
        ascii_string(bytes)
    }

    pub fn write_padded_string(&mut self, value: &str, length: usize) -> Result<(), SerialError> {
        check_ascii(value)?;
        if value.len() > length {
            return Err(SerialError::InvalidString(format!(
                "{} bytes do not fit a {} byte field",
                value.len(),
                length
            )));
        }
        self.write(value.as_bytes());
        self.write(&vec![0u8; length - value.len()]);
        Ok(())
    }

    /// Reads a u8 length prefix and that many ASCII bytes. On error the
    /// read position is left where it was.
    pub fn read_var_length_string(&mut self) -> Result<String, SerialError> {
        let start = self.read_pos;
        let result = self.read_prefixed_string();
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    fn read_prefixed_string(&mut self) -> Result<String, SerialError> {
        let length = self.read_u8()? as usize;
        if self.read_pos + length > self.data.len() {
            return Err(SerialError::Malformed(format!(
                "string length {} exceeds remaining {} bytes",
                length,
                self.remaining()
            )));
        }
        self.read_string(length)
    }

    pub fn write_var_length_string(&mut self, value: &str) -> Result<(), SerialError> {
        check_ascii(value)?;
        let length = u8::try_from(value.len()).map_err(|_| {
            SerialError::InvalidString(format!("{} bytes exceed a u8 prefix", value.len()))
        })?;
        self.write_u8(length);
        self.write(value.as_bytes());
        Ok(())
    }

    pub fn var_length_string_size(value: &str) -> usize {
        1 + value.len()
    }

    pub fn concat(buffers: &[&SerialBuffer]) -> SerialBuffer {
        let total = buffers.iter().map(|b| b.len()).sum();
        let mut out = SerialBuffer::with_capacity(total);
        for buffer in buffers {
            out.write(buffer.as_bytes());
        }
        out
    }
}

fn check_ascii(value: &str) -> Result<(), SerialError> {
    if !value.is_ascii() {
        return Err(SerialError::InvalidString(format!(
            "'{}' contains non-ASCII characters",
            value
        )));
    }
    Ok(())
}

fn ascii_string(bytes: Vec<u8>) -> Result<String, SerialError> {
    if !bytes.is_ascii() {
        return Err(SerialError::InvalidString(
            "decoded bytes are not ASCII".to_string(),
        ));
    }
    String::from_utf8(bytes).map_err(|e| SerialError::InvalidString(e.to_string()))
}

/// Structures with a canonical wire encoding.
pub trait SerialEncode {
    fn serialize_to(&self, buf: &mut SerialBuffer);
    fn serialized_size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = SerialBuffer::with_capacity(self.serialized_size());
        self.serialize_to(&mut buf);
        buf.into_bytes()
    }
}

pub trait SerialDecode: Sized {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError>;

    fn decode(bytes: &[u8]) -> Result<Self, SerialError> {
        let mut buf = SerialBuffer::from_bytes(bytes);
        Self::unserialize(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_integers_are_big_endian() {
        let mut buf = SerialBuffer::new();
        buf.write_u8(0xAB);
        buf.write_u16(0x0102);
        buf.write_u32(0x0304_0506);
        buf.write_u64(0x0708).unwrap();
        assert_eq!(
            buf.as_bytes(),
            &[0xAB, 1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0, 7, 8]
        );

        assert_eq!(buf.read_u8().unwrap(), 0xAB);
        assert_eq!(buf.read_u16().unwrap(), 0x0102);
        assert_eq!(buf.read_u32().unwrap(), 0x0304_0506);
        assert_eq!(buf.read_u64().unwrap(), 0x0708);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_u64_rejects_unsafe_integers() {
        let mut buf = SerialBuffer::new();
        assert!(buf.write_u64(MAX_SAFE_INTEGER).is_ok());
        assert_eq!(
            buf.write_u64(MAX_SAFE_INTEGER + 1),
            Err(SerialError::UnsafeInteger(MAX_SAFE_INTEGER + 1))
        );

        let mut raw = SerialBuffer::from_bytes(u64::MAX.to_be_bytes());
        assert!(matches!(
            raw.read_u64(),
            Err(SerialError::UnsafeInteger(_))
        ));
    }

    #[test]
    fn test_u128_words() {
        let mut buf = SerialBuffer::new();
        buf.write_u128(u128::MAX);
        buf.write_u128(1 << 96 | 5);
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf.as_bytes()[16..20], &[0, 0, 0, 1]);
        assert_eq!(&buf.as_bytes()[28..32], &[0, 0, 0, 5]);
        assert_eq!(buf.read_u128().unwrap(), u128::MAX);
        assert_eq!(buf.read_u128().unwrap(), 1 << 96 | 5);
    }

    #[test]
    fn test_var_uint_markers() {
        let cases: [(u64, &[u8]); 5] = [
            (0xFC, &[0xFC]),
            (0xFD, &[0xFD, 0x00, 0xFD]),
            (0xFFFF, &[0xFD, 0xFF, 0xFF]),
            (0x1_0000, &[0xFE, 0x00, 0x01, 0x00, 0x00]),
            (
                0x1_0000_0000,
                &[0xFF, 0, 0, 0, 1, 0, 0, 0, 0],
            ),
        ];
        for (value, encoded) in cases {
            let mut buf = SerialBuffer::new();
            buf.write_var_uint(value).unwrap();
            assert_eq!(buf.as_bytes(), encoded, "encoding of {value:#x}");
            assert_eq!(SerialBuffer::var_uint_size(value), encoded.len());
            assert_eq!(buf.read_var_uint().unwrap(), value);
        }
    }

    #[test]
    fn test_reading_past_end_fails() {
        let mut buf = SerialBuffer::from_bytes(vec![1, 2, 3]);
        assert!(buf.read_u16().is_ok());
        assert_eq!(
            buf.read_u16(),
            Err(SerialError::UnexpectedEnd {
                offset: 2,
                needed: 2,
                len: 3
            })
        );
        // A failed read does not move the cursor.
        assert_eq!(buf.read_pos(), 2);
        assert_eq!(buf.read(1).unwrap(), vec![3]);
    }

    #[test]
    fn test_cursor_bounds() {
        let mut buf = SerialBuffer::from_bytes(vec![0; 4]);
        assert!(buf.set_read_pos(4).is_ok());
        assert!(buf.set_read_pos(5).is_err());
        assert!(buf.set_write_pos(2).is_ok());
        buf.write_u16(0xFFFF);
        buf.write_u8(7);
        assert_eq!(buf.as_bytes(), &[0, 0, 0xFF, 0xFF, 7]);
    }

    #[test]
    fn test_strings() {
        let mut buf = SerialBuffer::new();
        buf.write_string("abc", 3).unwrap();
        buf.write_padded_string("hi", 5).unwrap();
        buf.write_var_length_string("krypton").unwrap();
        assert_eq!(buf.len(), 3 + 5 + 8);

        assert_eq!(buf.read_string(3).unwrap(), "abc");
        assert_eq!(buf.read_padded_string(5).unwrap(), "hi");
        assert_eq!(buf.read_var_length_string().unwrap(), "krypton");

        assert!(buf.write_string("abc", 4).is_err());
        assert!(buf.write_string("äb", 3).is_err());
        assert!(buf.write_padded_string("toolong", 3).is_err());
        assert!(buf.write_var_length_string(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_var_length_string_prefix_past_end() {
        let mut buf = SerialBuffer::from_bytes(vec![5, b'a', b'b']);
        assert!(matches!(
            buf.read_var_length_string(),
            Err(SerialError::Malformed(_))
        ));
    }

    #[test]
    fn test_var_length_string_error_keeps_position() {
        let mut buf = SerialBuffer::from_bytes(vec![3, b'a', 0xFF, b'c']);
        assert!(buf.read_var_length_string().is_err());
        assert_eq!(buf.read_pos(), 0);

        let mut buf = SerialBuffer::from_bytes(vec![1, b'x', 5, b'a']);
        assert_eq!(buf.read_var_length_string().unwrap(), "x");
        assert!(buf.read_var_length_string().is_err());
        assert_eq!(buf.read_pos(), 2);
    }

    #[test]
    fn test_concat() {
        let mut a = SerialBuffer::new();
        a.write(&[1, 2]);
        let mut b = SerialBuffer::new();
        b.write(&[3]);
        let joined = SerialBuffer::concat(&[&a, &b, &SerialBuffer::new()]);
        assert_eq!(joined.as_bytes(), &[1, 2, 3]);
    }
}
