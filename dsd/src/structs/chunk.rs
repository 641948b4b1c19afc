//! Chunk headers for the DSF and DSDIFF containers.
//!
//! Both formats describe their contents as `id + size + payload` records.
//! DSDIFF sizes are big-endian, exclude the 12 byte header and are padded to
//! an even length. DSF sizes are little-endian and include the header.

use std::io::{Read, Seek};

use crate::utils::errors::ReadError;
use crate::utils::reader::{BinaryReader, id_str};

/// Length of a chunk header: four byte id plus eight byte size.
pub const HEADER_LEN: u64 = 12;

pub mod ids {
    pub const FRM8: &[u8; 4] = b"FRM8";
    pub const DSD: &[u8; 4] = b"DSD ";
    pub const DST: &[u8; 4] = b"DST ";
    pub const FVER: &[u8; 4] = b"FVER";
    pub const PROP: &[u8; 4] = b"PROP";
    pub const SND: &[u8; 4] = b"SND ";
    pub const FS: &[u8; 4] = b"FS  ";
    pub const CHNL: &[u8; 4] = b"CHNL";
    pub const CMPR: &[u8; 4] = b"CMPR";
    pub const ABSS: &[u8; 4] = b"ABSS";
    pub const LSCO: &[u8; 4] = b"LSCO";
    pub const COMT: &[u8; 4] = b"COMT";
    pub const ID3: &[u8; 4] = b"ID3 ";
    pub const DIIN: &[u8; 4] = b"DIIN";
    pub const EMID: &[u8; 4] = b"EMID";
    pub const MARK: &[u8; 4] = b"MARK";
    pub const DIAR: &[u8; 4] = b"DIAR";
    pub const DITI: &[u8; 4] = b"DITI";
    pub const DSTI: &[u8; 4] = b"DSTI";
    pub const FRTE: &[u8; 4] = b"FRTE";
    pub const DSTF: &[u8; 4] = b"DSTF";
    pub const DSTC: &[u8; 4] = b"DSTC";

    pub const FMT: &[u8; 4] = b"fmt ";
    pub const DATA: &[u8; 4] = b"data";
}

/// A DSDIFF chunk header located at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    pub start: u64,
    /// Payload size as declared, excluding header and pad byte.
    pub size: u64,
}

impl ChunkHeader {
    /// Reads the big-endian header at `start`.
    pub fn read<R: Read + Seek>(
        reader: &mut BinaryReader<R>,
        start: u64,
    ) -> Result<Self, ReadError> {
        reader.seek(start)?;
        let id = reader.read_id()?;
        let size = reader.read_be::<u64>()?;
        Ok(Self { id, start, size })
    }

    #[inline]
    pub fn is(&self, id: &[u8; 4]) -> bool {
        &self.id == id
    }

    #[inline]
    pub fn data_start(&self) -> u64 {
        self.start + HEADER_LEN
    }

    #[inline]
    pub fn data_end(&self) -> u64 {
        self.data_start().saturating_add(self.size)
    }

    /// Offset of the next sibling, skipping the pad byte of odd sized chunks.
    #[inline]
    pub fn next(&self) -> u64 {
        self.data_end().saturating_add(self.size & 1)
    }

    pub fn name(&self) -> String {
        id_str(&self.id)
    }

    /// Reads the whole payload into memory.
    pub fn read_body<R: Read + Seek>(
        &self,
        reader: &mut BinaryReader<R>,
    ) -> Result<Vec<u8>, ReadError> {
        reader.seek(self.data_start())?;
        let len = usize::try_from(self.size).map_err(|_| ReadError::ShortRead {
            offset: self.data_start(),
            wanted: usize::MAX,
        })?;
        reader.read_vec(len)
    }
}

/// Lists the child chunk headers found in `[start, end)`.
///
/// The walk stops early when a header would start past the stream end; a
/// truncated final chunk is still returned so the caller can decide.
pub fn read_children<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    start: u64,
    end: u64,
) -> Result<Vec<ChunkHeader>, ReadError> {
    let end = end.min(reader.len());
    let mut children = Vec::new();
    let mut pos = start;

    while pos + HEADER_LEN <= end {
        let header = ChunkHeader::read(reader, pos)?;
        let next = header.next();
        children.push(header);
        if next <= pos {
            break;
        }
        pos = next;
    }

    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u64).to_be_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn odd_sized_chunk_skips_pad_byte() -> Result<(), ReadError> {
        let mut data = chunk(b"AAAA", &[1, 2, 3]);
        data.extend(chunk(b"BBBB", &[4, 5]));
        let mut reader = BinaryReader::new(Cursor::new(data))?;

        let first = ChunkHeader::read(&mut reader, 0)?;
        assert_eq!(first.size, 3);
        assert_eq!(first.next(), 16);

        let second = ChunkHeader::read(&mut reader, first.next())?;
        assert!(second.is(b"BBBB"));
        assert_eq!(second.read_body(&mut reader)?, vec![4, 5]);
        Ok(())
    }

    #[test]
    fn children_are_listed_in_order() -> Result<(), ReadError> {
        let mut data = chunk(b"ONE ", &[0; 5]);
        data.extend(chunk(b"TWO ", &[0; 4]));
        data.extend(chunk(b"THRE", &[]));
        let len = data.len() as u64;
        let mut reader = BinaryReader::new(Cursor::new(data))?;

        let children = read_children(&mut reader, 0, len)?;
        let names: Vec<String> = children.iter().map(ChunkHeader::name).collect();
        assert_eq!(names, ["ONE ", "TWO ", "THRE"]);
        assert_eq!(children[1].start, 18);
        Ok(())
    }

    #[test]
    fn truncated_body_is_a_short_read() -> Result<(), ReadError> {
        let mut data = Vec::new();
        data.extend_from_slice(b"LONG");
        data.extend_from_slice(&100u64.to_be_bytes());
        data.extend_from_slice(&[0; 10]);
        let mut reader = BinaryReader::new(Cursor::new(data))?;

        let header = ChunkHeader::read(&mut reader, 0)?;
        assert!(matches!(
            header.read_body(&mut reader),
            Err(ReadError::ShortRead { .. })
        ));
        Ok(())
    }
}
