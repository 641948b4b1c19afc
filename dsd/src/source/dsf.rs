//! Reader for the flat DSF container.
//!
//! A DSF file is three little-endian chunks in fixed order, `DSD `, `fmt `
//! and `data`, optionally followed by an ID3v2 tag located through the
//! metadata pointer. Sample data is stored as blocks of `block_size` bytes
//! for each channel in turn, with the earliest sample in bit 0.

use std::io::{Read, Seek};

use anyhow::{Result, bail, ensure};
use log::Level;

use crate::log_or_err;
use crate::source::buffer::{BlockBuffer, BlockLayout, BlockStatus, Playhead};
use crate::source::{IDLE_BYTE, ReaderOptions, SampleSource, SlidingBuffer};
use crate::structs::chunk::ids;
use crate::structs::tags::{ID3_HEADER_LEN, TrackTags, id3v2_tag_len};
use crate::utils::errors::{ChunkWarning, ContainerError};
use crate::utils::reader::{BinaryReader, id_str};

const DSD_CHUNK_LEN: u64 = 28;
const FMT_CHUNK_LEN: u64 = 52;
const DATA_HEADER_LEN: u64 = 12;

/// Everything the `DSD ` and `fmt ` chunks declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsfHeader {
    pub file_size: u64,
    pub metadata_pointer: u64,
    pub format_version: u32,
    pub format_id: u32,
    pub channel_type: u32,
    pub channel_count: u32,
    pub sampling_frequency: u32,
    pub bits_per_sample: u32,
    pub sample_count: u64,
    pub block_size: u32,
    pub data_start: u64,
    pub data_size: u64,
}

impl DsfHeader {
    pub fn read<R: Read + Seek>(reader: &mut BinaryReader<R>) -> Result<Self> {
        let start = expect_chunk(reader, ids::DSD)?;
        let chunk_size = reader.read_le::<u64>()?;
        let file_size = reader.read_le()?;
        let metadata_pointer = reader.read_le()?;
        resync(reader, start, chunk_size, DSD_CHUNK_LEN)?;

        let start = expect_chunk(reader, ids::FMT)?;
        let chunk_size = reader.read_le::<u64>()?;
        let format_version = reader.read_le()?;
        let format_id = reader.read_le()?;
        let channel_type = reader.read_le()?;
        let channel_count = reader.read_le()?;
        let sampling_frequency = reader.read_le()?;
        let bits_per_sample = reader.read_le()?;
        let sample_count = reader.read_le()?;
        let block_size = reader.read_le()?;
        reader.skip(4)?;
        resync(reader, start, chunk_size, FMT_CHUNK_LEN)?;

        let start = expect_chunk(reader, ids::DATA)?;
        let chunk_size = reader.read_le::<u64>()?;

        Ok(Self {
            file_size,
            metadata_pointer,
            format_version,
            format_id,
            channel_type,
            channel_count,
            sampling_frequency,
            bits_per_sample,
            sample_count,
            block_size,
            data_start: start + DATA_HEADER_LEN,
            data_size: chunk_size.saturating_sub(DATA_HEADER_LEN),
        })
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.bits_per_sample == 1,
            ContainerError::UnsupportedBitDepth(self.bits_per_sample)
        );
        ensure!(self.channel_count > 0, ContainerError::NoChannels);
        ensure!(
            self.sampling_frequency > 0,
            ContainerError::InvalidSamplingFrequency(self.sampling_frequency)
        );
        ensure!(self.block_size > 0, ContainerError::InvalidBlockSize);
        Ok(())
    }

    /// Speaker layout named by the `fmt ` channel type code.
    pub fn channel_layout(&self) -> &'static str {
        match self.channel_type {
            1 => "mono",
            2 => "stereo",
            3 => "3 channels",
            4 => "quad",
            5 => "4 channels",
            6 => "5 channels",
            7 => "5.1 channels",
            _ => "unknown",
        }
    }
}

fn expect_chunk<R: Read + Seek>(reader: &mut BinaryReader<R>, id: &[u8; 4]) -> Result<u64> {
    let start = reader.position()?;
    let found = reader.read_id()?;
    if &found != id {
        bail!(ContainerError::BadMagic {
            expected: id_str(id),
            found: id_str(&found),
        });
    }
    Ok(start)
}

/// Moves to the end of a chunk whose declared size differs from what was read.
fn resync<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    start: u64,
    declared: u64,
    consumed: u64,
) -> Result<()> {
    if declared != consumed {
        log::debug!("Chunk at {start} declares {declared} bytes, parsed {consumed}");
        reader.seek(start.saturating_add(declared))?;
    }
    Ok(())
}

pub struct DsfReader<R: Read + Seek> {
    reader: BinaryReader<R>,
    header: DsfHeader,
    tags: Option<TrackTags>,
    playhead: Playhead,
    blocks_read: u64,
}

impl<R: Read + Seek> DsfReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        let mut reader = BinaryReader::new(inner)?;
        let header = DsfHeader::read(&mut reader)?;
        header.validate()?;

        if options.codec.is_some() {
            log::debug!("DSF streams are uncompressed, ignoring frame codec");
        }

        let channels = header.channel_count as usize;
        let block_size = header.block_size as u64;
        let blocks = header.sample_count.div_ceil(8).div_ceil(block_size);
        let needed = blocks
            .checked_mul(block_size)
            .and_then(|n| n.checked_mul(channels as u64))
            .ok_or(ContainerError::LengthOverflow("fmt "))?;
        if header.data_size < needed {
            log_or_err!(
                options,
                Level::Warn,
                ChunkWarning::Malformed {
                    id: id_str(ids::DATA),
                    offset: header.data_start - DATA_HEADER_LEN,
                    reason: format!("holds {} bytes, sample count needs {needed}", header.data_size),
                }
            );
        }

        let tags = read_tags(&mut reader, &header);

        let buffer = SlidingBuffer::new(channels, options.buffer_length, IDLE_BYTE)?;
        let block = BlockBuffer::new(channels, header.block_size as usize, BlockLayout::Planar);

        let mut dsf = Self {
            reader,
            header,
            tags,
            playhead: Playhead::new(buffer, block, IDLE_BYTE),
            blocks_read: 0,
        };
        dsf.rewind()?;

        log::debug!(
            "DSF: {} channels at {} Hz, {} samples, block size {}",
            dsf.header.channel_count,
            dsf.header.sampling_frequency,
            dsf.header.sample_count,
            dsf.header.block_size
        );
        Ok(dsf)
    }

    pub fn header(&self) -> &DsfHeader {
        &self.header
    }

    /// Blocks loaded since the reader was opened.
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    fn total_bytes(&self) -> u64 {
        self.header.sample_count.div_ceil(8)
    }
}

fn read_tags<R: Read + Seek>(reader: &mut BinaryReader<R>, header: &DsfHeader) -> Option<TrackTags> {
    let pointer = header.metadata_pointer;
    if pointer == 0 || pointer >= header.file_size || pointer >= reader.len() {
        return None;
    }

    let read = |reader: &mut BinaryReader<R>| -> Result<Option<TrackTags>> {
        reader.seek(pointer)?;
        let mut head = [0u8; ID3_HEADER_LEN];
        reader.read_exact(&mut head)?;
        let Some(len) = id3v2_tag_len(&head) else {
            return Ok(None);
        };
        reader.seek(pointer)?;
        let bytes = reader.read_vec(len)?;
        Ok(TrackTags::from_id3_bytes(&bytes))
    };

    match read(reader) {
        Ok(tags) => tags,
        Err(e) => {
            log::debug!("{}", ChunkWarning::Tag(e.to_string()));
            None
        }
    }
}

fn load_block<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    block: &mut BlockBuffer,
    blocks_read: &mut u64,
) -> BlockStatus {
    let wanted = block.channels() * block.bytes_per_channel();
    match reader.read_up_to(block.data_mut()) {
        Ok(n) if n == wanted => {
            *blocks_read += 1;
            BlockStatus::Ready
        }
        Ok(n) => {
            log::debug!("DSF block {} is short: {n} of {wanted} bytes", *blocks_read);
            BlockStatus::Ended
        }
        Err(e) => {
            log::warn!("DSF block {} failed: {e}", *blocks_read);
            BlockStatus::Ended
        }
    }
}

impl<R: Read + Seek> SampleSource for DsfReader<R> {
    fn sampling_frequency(&self) -> u32 {
        self.header.sampling_frequency
    }

    fn channel_count(&self) -> usize {
        self.header.channel_count as usize
    }

    fn total_length(&self) -> u64 {
        self.header.sample_count
    }

    fn position(&self) -> i64 {
        self.playhead.byte_position() * 8
    }

    fn step(&mut self) -> bool {
        let total = self.total_bytes();
        let Self {
            reader,
            playhead,
            blocks_read,
            ..
        } = self;
        playhead.step(total, |block| load_block(reader, block, blocks_read))
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(self.header.data_start)?;
        self.playhead.reset();
        Ok(())
    }

    fn buffer(&self) -> &SlidingBuffer {
        &self.playhead.buffer
    }

    fn set_buffer_length(&mut self, len: usize) -> Result<()> {
        self.playhead.buffer.resize(len, IDLE_BYTE)?;
        self.rewind()
    }

    fn msb_first(&self) -> bool {
        false
    }

    fn tags_for(&self, track: usize) -> Option<&TrackTags> {
        if track == 0 { self.tags.as_ref() } else { None }
    }
}
