//! Endian-aware primitive reads over a random-access byte stream.
//!
//! Both containers mix fixed-width integers with raw byte strings, and the
//! two formats disagree on byte order. [`BinaryReader`] reads either order
//! from the same stream and reports every failure as a [`ReadError`] instead
//! of clamping or silently returning zeroes.

use std::io::{self, Read, Seek, SeekFrom};

use bitstream_io::{BigEndian, ByteRead, ByteReader, LittleEndian, Primitive};

use crate::utils::errors::ReadError;

/// A seekable reader with a known length.
#[derive(Debug)]
pub struct BinaryReader<R: Read + Seek> {
    inner: R,
    len: u64,
}

pub type SliceReader<'a> = BinaryReader<io::Cursor<&'a [u8]>>;

impl<'a> SliceReader<'a> {
    /// Wraps an in-memory chunk body.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            inner: io::Cursor::new(data),
            len: data.len() as u64,
        }
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Wraps `inner`, measuring its length and rewinding it to the start.
    pub fn new(mut inner: R) -> Result<Self, ReadError> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> Result<u64, ReadError> {
        Ok(self.inner.stream_position()?)
    }

    /// Bytes left between the current position and the end of the stream.
    pub fn remaining(&mut self) -> Result<u64, ReadError> {
        Ok(self.len.saturating_sub(self.position()?))
    }

    /// Moves to an absolute offset. Offsets past the end are rejected.
    pub fn seek(&mut self, target: u64) -> Result<(), ReadError> {
        if target > self.len {
            return Err(ReadError::SeekOutOfRange {
                target,
                len: self.len,
            });
        }
        self.inner.seek(SeekFrom::Start(target))?;
        Ok(())
    }

    pub fn skip(&mut self, bytes: u64) -> Result<(), ReadError> {
        let pos = self.position()?;
        let target = pos.checked_add(bytes).ok_or(ReadError::SeekOutOfRange {
            target: u64::MAX,
            len: self.len,
        })?;
        self.seek(target)
    }

    #[inline]
    pub fn read_le<V: Primitive>(&mut self) -> Result<V, ReadError> {
        let offset = self.position()?;
        ByteReader::endian(&mut self.inner, LittleEndian)
            .read::<V>()
            .map_err(|e| short_read(e, offset, size_of::<V>()))
    }

    #[inline]
    pub fn read_be<V: Primitive>(&mut self) -> Result<V, ReadError> {
        let offset = self.position()?;
        ByteReader::endian(&mut self.inner, BigEndian)
            .read::<V>()
            .map_err(|e| short_read(e, offset, size_of::<V>()))
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.read_be::<u8>()
    }

    /// Reads a four character chunk identifier.
    pub fn read_id(&mut self) -> Result<[u8; 4], ReadError> {
        let mut id = [0u8; 4];
        self.read_exact(&mut id)?;
        Ok(id)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let offset = self.position()?;
        self.inner
            .read_exact(buf)
            .map_err(|e| short_read(e, offset, buf.len()))
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        let available = self.remaining()?;
        if len as u64 > available {
            return Err(ReadError::ShortRead {
                offset: self.position()?,
                wanted: len,
            });
        }
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed text field as lossy UTF-8.
    pub fn read_text(&mut self, len: usize) -> Result<String, ReadError> {
        let bytes = self.read_vec(len)?;
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Fills as much of `buf` as the stream allows and returns the byte count.
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

fn short_read(e: io::Error, offset: u64, wanted: usize) -> ReadError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ReadError::ShortRead { offset, wanted }
    } else {
        ReadError::Io(e)
    }
}

/// Formats a chunk identifier for diagnostics.
pub fn id_str(id: &[u8; 4]) -> String {
    id.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_both_byte_orders() -> Result<(), ReadError> {
        let data = [0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78];
        let mut reader = BinaryReader::new(Cursor::new(&data[..]))?;

        assert_eq!(reader.read_le::<u32>()?, 0x7856_3412);
        assert_eq!(reader.read_be::<u32>()?, 0x1234_5678);
        assert_eq!(reader.position()?, 8);
        Ok(())
    }

    #[test]
    fn reads_wide_and_signed_values() -> Result<(), ReadError> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        data.extend_from_slice(&(-2i32).to_be_bytes());
        data.extend_from_slice(&0xBEEFu16.to_le_bytes());
        let mut reader = SliceReader::from_slice(&data);

        assert_eq!(reader.read_be::<u64>()?, 0x0102_0304_0506_0708);
        assert_eq!(reader.read_be::<i32>()?, -2);
        assert_eq!(reader.read_le::<u16>()?, 0xBEEF);
        Ok(())
    }

    #[test]
    fn short_read_reports_offset() {
        let data = [0u8; 3];
        let mut reader = SliceReader::from_slice(&data);
        reader.read_u8().unwrap();

        match reader.read_be::<u32>() {
            Err(ReadError::ShortRead { offset, wanted }) => {
                assert_eq!(offset, 1);
                assert_eq!(wanted, 4);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let data = [0u8; 16];
        let mut reader = SliceReader::from_slice(&data);

        assert!(reader.seek(16).is_ok());
        assert!(matches!(
            reader.seek(17),
            Err(ReadError::SeekOutOfRange { target: 17, len: 16 })
        ));
        assert!(reader.skip(1).is_err());
    }

    #[test]
    fn read_up_to_stops_at_end() -> Result<(), ReadError> {
        let data = [1u8, 2, 3];
        let mut reader = SliceReader::from_slice(&data);
        let mut buf = [0u8; 8];

        assert_eq!(reader.read_up_to(&mut buf)?, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(reader.read_up_to(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn text_fields_drop_trailing_nul() -> Result<(), ReadError> {
        let data = b"Abc\0";
        let mut reader = SliceReader::from_slice(data);
        assert_eq!(reader.read_text(4)?, "Abc");
        Ok(())
    }

    #[test]
    fn identifiers_are_printable() {
        assert_eq!(id_str(b"DSD "), "DSD ");
        assert_eq!(id_str(&[0x46, 0x00, 0x4D, 0xFF]), "F?M?");
    }
}
