//! Reader for the recursive DSDIFF container.
//!
//! ## Layout
//!
//! A `FRM8` form of type `DSD ` holds the version, the `PROP` property
//! form and exactly one sound data chunk. Raw `DSD ` data is byte
//! interleaved by channel; `DST ` data is a sequence of `DSTF` frames that
//! an external [`FrameCodec`] turns back into interleaved bytes.
//!
//! Optional chunks carry comments, per-track ID3 tags, the edited master
//! information (`DIIN`) with its track markers, and a DST frame index.
//! Chunks the reader does not understand are skipped by size.

use std::io::{Read, Seek};

use anyhow::{Result, bail, ensure};
use log::Level;

use crate::log_or_err;
use crate::source::buffer::{BlockBuffer, BlockLayout, BlockStatus, Playhead};
use crate::source::{FrameCodec, IDLE_BYTE, ReaderOptions, SampleSource, SlidingBuffer};
use crate::structs::chunk::{ChunkHeader, HEADER_LEN, ids, read_children};
use crate::structs::comment::Comment;
use crate::structs::marker::{AbsoluteStartTime, TrackMarker, TrackSpan, derive_tracks};
use crate::structs::tags::TrackTags;
use crate::utils::errors::{ChunkWarning, CodecError, ContainerError};
use crate::utils::reader::{BinaryReader, SliceReader, id_str};

/// Bytes per channel staged at once from a raw `DSD ` chunk.
const RAW_BLOCK_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Dsd,
    Dst,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::Dsd => "DSD",
            Compression::Dst => "DST",
        }
    }
}

/// One `DSTI` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstFrameIndex {
    pub offset: u64,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstInfo {
    pub frame_count: u32,
    pub frame_rate: u16,
    /// Offset of the first `DSTF` chunk header.
    pub frames_start: u64,
    /// End of the `DST ` chunk payload.
    pub region_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundData {
    Dsd { start: u64, size: u64 },
    Dst(DstInfo),
}

impl SoundData {
    pub fn compression(&self) -> Compression {
        match self {
            SoundData::Dsd { .. } => Compression::Dsd,
            SoundData::Dst(_) => Compression::Dst,
        }
    }
}

/// Everything parsed from the chunk tree.
#[derive(Debug, Clone, Default)]
pub struct DffHeader {
    pub version: u32,
    pub sampling_frequency: u32,
    pub channel_ids: Vec<String>,
    pub compression_id: String,
    pub compression_name: String,
    pub anchor: AbsoluteStartTime,
    pub loudspeaker_config: Option<u16>,
    pub comments: Vec<Comment>,
    /// One entry per `ID3 ` chunk in file order.
    pub tags: Vec<TrackTags>,
    pub edited_master_id: Option<String>,
    pub disc_artist: Option<String>,
    pub disc_title: Option<String>,
    pub markers: Vec<TrackMarker>,
    pub dst_index: Vec<DstFrameIndex>,
    pub sound: Option<SoundData>,
}

struct HeaderParser<'a, R: Read + Seek> {
    reader: &'a mut BinaryReader<R>,
    fail_level: Level,
    header: DffHeader,
    seen: Vec<[u8; 4]>,
}

impl<'a, R: Read + Seek> HeaderParser<'a, R> {
    fn new(reader: &'a mut BinaryReader<R>, fail_level: Level) -> Self {
        Self {
            reader,
            fail_level,
            header: DffHeader::default(),
            seen: Vec::new(),
        }
    }

    fn warn(&self, warning: ChunkWarning) -> Result<()> {
        log_or_err!(self, Level::Warn, warning);
        Ok(())
    }

    fn children(&mut self, parent: &ChunkHeader, skip: u64) -> Result<Vec<ChunkHeader>> {
        Ok(read_children(
            self.reader,
            parent.data_start() + skip,
            parent.data_end(),
        )?)
    }

    fn read_form_type(&mut self, chunk: &ChunkHeader, expected: &[u8; 4]) -> Result<()> {
        self.reader.seek(chunk.data_start())?;
        let found = self.reader.read_id()?;
        if &found != expected {
            bail!(ContainerError::BadFormType {
                expected: id_str(expected),
                found: id_str(&found),
            });
        }
        Ok(())
    }

    /// Records `chunk` and reports whether it is the first of its kind.
    fn first_of(&mut self, chunk: &ChunkHeader) -> Result<bool> {
        if self.seen.contains(&chunk.id) {
            self.warn(ChunkWarning::Repeated {
                id: chunk.name(),
                offset: chunk.start,
            })?;
            return Ok(false);
        }
        self.seen.push(chunk.id);
        Ok(true)
    }

    fn malformed(&self, chunk: &ChunkHeader, reason: impl ToString) -> Result<()> {
        self.warn(ChunkWarning::Malformed {
            id: chunk.name(),
            offset: chunk.start,
            reason: reason.to_string(),
        })
    }

    fn parse(mut self) -> Result<DffHeader> {
        let form = ChunkHeader::read(self.reader, 0)?;
        if !form.is(ids::FRM8) {
            bail!(ContainerError::BadMagic {
                expected: id_str(ids::FRM8),
                found: form.name(),
            });
        }
        self.read_form_type(&form, ids::DSD)?;

        for chunk in self.children(&form, 4)? {
            self.top_level(&chunk)?;
        }

        ensure!(self.seen.contains(ids::FVER), ContainerError::MissingChunk("FVER"));
        ensure!(self.seen.contains(ids::PROP), ContainerError::MissingChunk("PROP"));
        let Some(sound) = self.header.sound else {
            bail!(ContainerError::MissingChunk("DSD "));
        };

        let declared = self.header.compression_id.as_bytes();
        let found = match sound.compression() {
            Compression::Dsd => ids::DSD,
            Compression::Dst => ids::DST,
        };
        if declared != found {
            self.warn(ChunkWarning::Malformed {
                id: id_str(ids::CMPR),
                offset: 0,
                reason: format!(
                    "declares '{}' but sound data is '{}'",
                    self.header.compression_id,
                    id_str(found)
                ),
            })?;
        }

        Ok(self.header)
    }

    fn top_level(&mut self, chunk: &ChunkHeader) -> Result<()> {
        match &chunk.id {
            ids::FVER => {
                if self.first_of(chunk)? {
                    self.reader.seek(chunk.data_start())?;
                    self.header.version = self.reader.read_be()?;
                }
            }
            ids::PROP => {
                if self.first_of(chunk)? {
                    self.parse_prop(chunk)?;
                }
            }
            ids::DSD | ids::DST => {
                if self.header.sound.is_some() {
                    self.warn(ChunkWarning::Repeated {
                        id: chunk.name(),
                        offset: chunk.start,
                    })?;
                } else if chunk.is(ids::DSD) {
                    let start = chunk.data_start();
                    let available = self.reader.len().saturating_sub(start);
                    if chunk.size > available {
                        self.warn(ChunkWarning::Malformed {
                            id: chunk.name(),
                            offset: chunk.start,
                            reason: format!(
                                "declares {} bytes, only {available} remain",
                                chunk.size
                            ),
                        })?;
                    }
                    self.header.sound = Some(SoundData::Dsd {
                        start,
                        size: chunk.size.min(available),
                    });
                } else {
                    self.header.sound = Some(SoundData::Dst(self.parse_dst(chunk)?));
                }
            }
            ids::COMT => {
                let body = chunk.read_body(self.reader)?;
                match Comment::parse_all(&body) {
                    Ok(comments) => self.header.comments.extend(comments),
                    Err(e) => self.malformed(chunk, e)?,
                }
            }
            ids::ID3 => {
                let body = chunk.read_body(self.reader)?;
                match TrackTags::from_id3_bytes(&body) {
                    Some(tags) => self.header.tags.push(tags),
                    None => {
                        self.warn(ChunkWarning::Tag(format!(
                            "'ID3 ' chunk at offset {} is not a valid tag",
                            chunk.start
                        )))?;
                        self.header.tags.push(TrackTags::default());
                    }
                }
            }
            ids::DIIN => {
                if self.first_of(chunk)? {
                    self.parse_diin(chunk)?;
                }
            }
            ids::DSTI => {
                if self.first_of(chunk)? {
                    let body = chunk.read_body(self.reader)?;
                    let mut reader = SliceReader::from_slice(&body);
                    for _ in 0..body.len() / 12 {
                        self.header.dst_index.push(DstFrameIndex {
                            offset: reader.read_be()?,
                            length: reader.read_be()?,
                        });
                    }
                }
            }
            _ => self.warn(ChunkWarning::Unknown {
                id: chunk.name(),
                offset: chunk.start,
            })?,
        }
        Ok(())
    }

    fn parse_prop(&mut self, prop: &ChunkHeader) -> Result<()> {
        self.read_form_type(prop, ids::SND)?;

        let mut seen: Vec<[u8; 4]> = Vec::new();
        for sub in self.children(prop, 4)? {
            if seen.contains(&sub.id) {
                self.warn(ChunkWarning::Repeated {
                    id: sub.name(),
                    offset: sub.start,
                })?;
                continue;
            }
            seen.push(sub.id);

            match &sub.id {
                ids::FS => {
                    self.reader.seek(sub.data_start())?;
                    self.header.sampling_frequency = self.reader.read_be()?;
                }
                ids::CHNL => {
                    let body = sub.read_body(self.reader)?;
                    let mut reader = SliceReader::from_slice(&body);
                    let count = reader.read_be::<u16>()?;
                    self.header.channel_ids = (0..count)
                        .map(|_| reader.read_id().map(|id| id_str(&id)))
                        .collect::<Result<_, _>>()?;
                }
                ids::CMPR => {
                    let body = sub.read_body(self.reader)?;
                    let mut reader = SliceReader::from_slice(&body);
                    let id = reader.read_id()?;
                    let len = reader.read_u8()? as usize;
                    self.header.compression_id = id_str(&id);
                    self.header.compression_name = reader.read_text(len)?;
                    if &id != ids::DSD && &id != ids::DST {
                        bail!(ContainerError::UnsupportedCompression(id_str(&id)));
                    }
                }
                ids::ABSS => {
                    let body = sub.read_body(self.reader)?;
                    self.header.anchor = AbsoluteStartTime::parse(&body)?;
                }
                ids::LSCO => {
                    self.reader.seek(sub.data_start())?;
                    self.header.loudspeaker_config = Some(self.reader.read_be()?);
                }
                _ => self.warn(ChunkWarning::Unknown {
                    id: sub.name(),
                    offset: sub.start,
                })?,
            }
        }

        ensure!(seen.contains(ids::FS), ContainerError::MissingProperty("FS"));
        ensure!(seen.contains(ids::CHNL), ContainerError::MissingProperty("CHNL"));
        ensure!(seen.contains(ids::CMPR), ContainerError::MissingProperty("CMPR"));
        Ok(())
    }

    /// Locates the frame rate and the first frame; frames themselves are
    /// read lazily during playback.
    fn parse_dst(&mut self, dst: &ChunkHeader) -> Result<DstInfo> {
        let end = dst.data_end().min(self.reader.len());
        let mut pos = dst.data_start();
        let mut frte = None;
        let mut frames_start = None;

        while pos + HEADER_LEN <= end && (frte.is_none() || frames_start.is_none()) {
            let sub = ChunkHeader::read(self.reader, pos)?;
            match &sub.id {
                ids::FRTE if frte.is_none() => {
                    self.reader.seek(sub.data_start())?;
                    let frames = self.reader.read_be::<u32>()?;
                    let rate = self.reader.read_be::<u16>()?;
                    frte = Some((frames, rate));
                }
                ids::FRTE => self.warn(ChunkWarning::Repeated {
                    id: sub.name(),
                    offset: sub.start,
                })?,
                ids::DSTF => {
                    frames_start.get_or_insert(sub.start);
                }
                ids::DSTC => {}
                _ => self.warn(ChunkWarning::Unknown {
                    id: sub.name(),
                    offset: sub.start,
                })?,
            }
            pos = sub.next();
        }

        let (frame_count, frame_rate) = frte.ok_or(ContainerError::MissingChunk("FRTE"))?;
        let frames_start = frames_start.ok_or(ContainerError::MissingChunk("DSTF"))?;
        ensure!(frame_rate > 0, ContainerError::InvalidFrameRate);

        Ok(DstInfo {
            frame_count,
            frame_rate,
            frames_start,
            region_end: dst.data_end(),
        })
    }

    fn parse_diin(&mut self, diin: &ChunkHeader) -> Result<()> {
        for sub in self.children(diin, 0)? {
            match &sub.id {
                ids::EMID => {
                    let body = sub.read_body(self.reader)?;
                    let text = String::from_utf8_lossy(&body)
                        .trim_end_matches('\0')
                        .to_string();
                    self.header.edited_master_id = Some(text);
                }
                ids::MARK => {
                    let body = sub.read_body(self.reader)?;
                    match TrackMarker::parse(&body) {
                        Ok(marker) => self.header.markers.push(marker),
                        Err(e) => self.malformed(&sub, e)?,
                    }
                }
                ids::DIAR | ids::DITI => {
                    let body = sub.read_body(self.reader)?;
                    let mut reader = SliceReader::from_slice(&body);
                    let len = reader.read_be::<u32>()? as usize;
                    let text = reader.read_text(len)?;
                    if sub.is(ids::DIAR) {
                        self.header.disc_artist = Some(text);
                    } else {
                        self.header.disc_title = Some(text);
                    }
                }
                _ => self.warn(ChunkWarning::Unknown {
                    id: sub.name(),
                    offset: sub.start,
                })?,
            }
        }
        Ok(())
    }
}

enum Stream {
    Raw {
        start: u64,
        end: u64,
        cursor: u64,
    },
    Dst {
        info: DstInfo,
        codec: Box<dyn FrameCodec>,
        next_frame: u64,
        frames_decoded: u64,
    },
}

pub struct DffReader<R: Read + Seek> {
    reader: BinaryReader<R>,
    header: DffHeader,
    total_length: u64,
    tracks: Vec<TrackSpan>,
    disc_tags: Option<TrackTags>,
    stream: Stream,
    playhead: Playhead,
}

impl<R: Read + Seek> DffReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        let mut reader = BinaryReader::new(inner)?;
        let header = HeaderParser::new(&mut reader, options.fail_level).parse()?;

        let channels = header.channel_ids.len();
        let fs = header.sampling_frequency;
        ensure!(channels > 0, ContainerError::NoChannels);
        ensure!(fs > 0, ContainerError::InvalidSamplingFrequency(fs));

        let (stream, total_length, block_len) = match header.sound {
            Some(SoundData::Dsd { start, size }) => {
                if options.codec.is_some() {
                    log::debug!("DSDIFF stream is uncompressed, ignoring frame codec");
                }
                let stream = Stream::Raw {
                    start,
                    end: start.saturating_add(size),
                    cursor: start,
                };
                let total_length = (size / channels as u64)
                    .checked_mul(8)
                    .ok_or(ContainerError::LengthOverflow("DSD "))?;
                (stream, total_length, RAW_BLOCK_LEN)
            }
            Some(SoundData::Dst(info)) => {
                let Some(mut codec) = options.codec else {
                    bail!(ContainerError::MissingCodec);
                };
                let frame_samples = fs / info.frame_rate as u32;
                let frame_bytes = (frame_samples / 8) as usize;
                ensure!(frame_bytes > 0, ContainerError::InvalidFrameRate);

                codec.init(channels, fs / 44_100)?;
                let stream = Stream::Dst {
                    info,
                    codec,
                    next_frame: info.frames_start,
                    frames_decoded: 0,
                };
                (
                    stream,
                    info.frame_count as u64 * frame_samples as u64,
                    frame_bytes,
                )
            }
            None => bail!(ContainerError::MissingChunk("DSD ")),
        };

        let tracks = derive_tracks(&header.markers, &header.anchor, fs, total_length);
        let disc_tags = (header.disc_artist.is_some() || header.disc_title.is_some()).then(|| {
            TrackTags {
                artist: header.disc_artist.clone(),
                album: header.disc_title.clone(),
                ..Default::default()
            }
        });

        let buffer = SlidingBuffer::new(channels, options.buffer_length, IDLE_BYTE)?;
        let block = BlockBuffer::new(channels, block_len, BlockLayout::Interleaved);

        let mut dff = Self {
            reader,
            header,
            total_length,
            tracks,
            disc_tags,
            stream,
            playhead: Playhead::new(buffer, block, IDLE_BYTE),
        };
        dff.rewind()?;

        log::debug!(
            "DSDIFF: {} channels at {} Hz, {} samples, {}, {} track(s)",
            channels,
            fs,
            dff.total_length,
            dff.compression().name(),
            dff.tracks.len()
        );
        Ok(dff)
    }

    pub fn header(&self) -> &DffHeader {
        &self.header
    }

    pub fn tracks(&self) -> &[TrackSpan] {
        &self.tracks
    }

    pub fn compression(&self) -> Compression {
        match self.stream {
            Stream::Raw { .. } => Compression::Dsd,
            Stream::Dst { .. } => Compression::Dst,
        }
    }

    pub fn dst_info(&self) -> Option<&DstInfo> {
        match &self.stream {
            Stream::Dst { info, .. } => Some(info),
            Stream::Raw { .. } => None,
        }
    }
}

fn load_raw<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    block: &mut BlockBuffer,
    cursor: &mut u64,
    end: u64,
) -> BlockStatus {
    let wanted = block.channels() * block.bytes_per_channel();
    let available = end.saturating_sub(*cursor).min(wanted as u64) as usize;

    let data = block.data_mut();
    data[available..].fill(IDLE_BYTE);
    match reader.read_up_to(&mut data[..available]) {
        Ok(n) if n == available => {
            *cursor += n as u64;
            BlockStatus::Ready
        }
        Ok(n) => {
            log::debug!("DSDIFF data at {} is short: {n} of {available} bytes", *cursor);
            BlockStatus::Ended
        }
        Err(e) => {
            log::warn!("DSDIFF data read at {} failed: {e}", *cursor);
            BlockStatus::Ended
        }
    }
}

fn load_frame<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    block: &mut BlockBuffer,
    info: &DstInfo,
    codec: &mut dyn FrameCodec,
    next_frame: &mut u64,
    frames_decoded: &mut u64,
) -> BlockStatus {
    loop {
        if *next_frame + HEADER_LEN > info.region_end {
            log::debug!("No DST frames left after {} decoded", *frames_decoded);
            return BlockStatus::Ended;
        }

        let chunk = match ChunkHeader::read(reader, *next_frame) {
            Ok(chunk) => chunk,
            Err(e) => {
                log::warn!("DST frame header at {} unreadable: {e}", *next_frame);
                return BlockStatus::Ended;
            }
        };
        *next_frame = chunk.next();

        if chunk.is(ids::DSTC) {
            continue;
        }

        let frame = *frames_decoded;
        *frames_decoded += 1;

        if !chunk.is(ids::DSTF) {
            log::warn!("Expected a DST frame at {}, found '{}'", chunk.start, chunk.name());
            return BlockStatus::Damaged;
        }

        let body = match chunk.read_body(reader) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("DST frame {frame} unreadable: {e}");
                return BlockStatus::Ended;
            }
        };

        return match codec.decode(&body, block.data_mut(), info.frame_count) {
            Ok(()) => BlockStatus::Ready,
            Err(e) => {
                log::warn!(
                    "{}",
                    CodecError::DecodeFailed {
                        frame,
                        reason: e.to_string(),
                    }
                );
                BlockStatus::Damaged
            }
        };
    }
}

impl<R: Read + Seek> SampleSource for DffReader<R> {
    fn sampling_frequency(&self) -> u32 {
        self.header.sampling_frequency
    }

    fn channel_count(&self) -> usize {
        self.header.channel_ids.len()
    }

    fn total_length(&self) -> u64 {
        self.total_length
    }

    fn position(&self) -> i64 {
        self.playhead.byte_position() * 8
    }

    fn step(&mut self) -> bool {
        let total = self.total_length.div_ceil(8);
        let Self {
            reader,
            stream,
            playhead,
            ..
        } = self;

        match stream {
            Stream::Raw { end, cursor, .. } => {
                playhead.step(total, |block| load_raw(reader, block, cursor, *end))
            }
            Stream::Dst {
                info,
                codec,
                next_frame,
                frames_decoded,
            } => playhead.step(total, |block| {
                load_frame(
                    reader,
                    block,
                    info,
                    codec.as_mut(),
                    next_frame,
                    frames_decoded,
                )
            }),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.stream {
            Stream::Raw { start, cursor, .. } => {
                self.reader.seek(*start)?;
                *cursor = *start;
            }
            Stream::Dst {
                info,
                next_frame,
                frames_decoded,
                ..
            } => {
                *next_frame = info.frames_start;
                *frames_decoded = 0;
            }
        }
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
        true
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_start(&self, track: usize) -> u64 {
        self.tracks.get(track).map_or(0, |t| t.start)
    }

    fn track_end(&self, track: usize) -> u64 {
        self.tracks.get(track).map_or(self.total_length, |t| t.end)
    }

    fn tags_for(&self, track: usize) -> Option<&TrackTags> {
        self.header
            .tags
            .get(track)
            .filter(|tags| !tags.is_empty())
            .or(self.disc_tags.as_ref())
    }
}

impl<R: Read + Seek> Drop for DffReader<R> {
    fn drop(&mut self) {
        if let Stream::Dst { codec, .. } = &mut self.stream {
            codec.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use id3::{Tag, TagLike, Version};

    pub(crate) fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u64).to_be_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn form(form_type: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let mut body = form_type.to_vec();
        children.iter().for_each(|c| body.extend_from_slice(c));
        body
    }

    pub(crate) fn prop(fs: u32, channels: usize, compression: &[u8; 4]) -> Vec<u8> {
        let mut chnl = (channels as u16).to_be_bytes().to_vec();
        for ch in 0..channels {
            chnl.extend_from_slice(format!("C{ch:03}").as_bytes());
        }
        let mut cmpr = compression.to_vec();
        cmpr.push(14);
        cmpr.extend_from_slice(b"not compressed");

        chunk(
            ids::PROP,
            &form(
                ids::SND,
                &[
                    chunk(ids::FS, &fs.to_be_bytes()),
                    chunk(ids::CHNL, &chnl),
                    chunk(ids::CMPR, &cmpr),
                ],
            ),
        )
    }

    pub(crate) fn fver() -> Vec<u8> {
        chunk(ids::FVER, &0x0105_0000u32.to_be_bytes())
    }

    pub(crate) fn frm8(children: &[Vec<u8>]) -> Vec<u8> {
        chunk(ids::FRM8, &form(ids::DSD, children))
    }

    fn open(data: Vec<u8>) -> Result<DffReader<Cursor<Vec<u8>>>> {
        DffReader::new(Cursor::new(data), ReaderOptions::default())
    }

    /// Stereo data where channel 0 counts up and channel 1 counts down.
    fn counting(bytes_per_channel: usize) -> Vec<u8> {
        (0..bytes_per_channel)
            .flat_map(|i| [i as u8, !(i as u8)])
            .collect()
    }

    fn mark(samples: u32, mark_type: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&samples.to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&mark_type.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        chunk(ids::MARK, &body)
    }

    fn id3_chunk(title: &str) -> Vec<u8> {
        let mut tag = Tag::new();
        tag.set_title(title);
        let mut bytes = Vec::new();
        tag.write_to(&mut bytes, Version::Id3v23).unwrap();
        chunk(ids::ID3, &bytes)
    }

    #[test]
    fn raw_stream_interleaves_channels() -> Result<()> {
        let data = frm8(&[
            fver(),
            prop(2_822_400, 2, ids::DSD),
            chunk(ids::DSD, &counting(1500)),
        ]);
        let mut dff = open(data)?;

        assert_eq!(dff.total_length(), 12_000);
        assert_eq!(dff.channel_count(), 2);
        assert!(dff.msb_first());
        assert_eq!(dff.compression(), Compression::Dsd);
        assert_eq!(dff.header().version, 0x0105_0000);
        assert_eq!(dff.header().channel_ids, ["C000", "C001"]);

        for i in 0..1500 {
            assert!(dff.step(), "step {i} failed");
            assert_eq!(dff.buffer().get(0, 0), i as u8);
            assert_eq!(dff.buffer().get(1, 0), !(i as u8));
        }
        assert!(!dff.step());
        assert_eq!(dff.buffer().get(0, 0), IDLE_BYTE);
        Ok(())
    }

    #[test]
    fn odd_sized_chunks_are_padded() -> Result<()> {
        let mut comment = 1u16.to_be_bytes().to_vec();
        comment.extend_from_slice(&2020u16.to_be_bytes());
        comment.extend_from_slice(&[1, 2, 3, 4]);
        comment.extend_from_slice(&0u16.to_be_bytes());
        comment.extend_from_slice(&0u16.to_be_bytes());
        comment.extend_from_slice(&3u32.to_be_bytes());
        comment.extend_from_slice(b"abc");
        assert_eq!(comment.len() % 2, 1);

        let data = frm8(&[
            fver(),
            chunk(ids::COMT, &comment),
            prop(2_822_400, 1, ids::DSD),
            chunk(ids::DSD, &[0x0F; 3]),
        ]);
        let mut dff = open(data)?;

        assert_eq!(dff.header().comments.len(), 1);
        assert_eq!(dff.header().comments[0].text, "abc");
        assert_eq!(dff.total_length(), 24);
        assert!(dff.step());
        assert_eq!(dff.buffer().get(0, 0), 0x0F);
        Ok(())
    }

    #[test]
    fn unknown_chunks_are_skipped_unless_strict() -> Result<()> {
        let data = frm8(&[
            fver(),
            chunk(b"XTRA", &[1, 2, 3]),
            prop(2_822_400, 1, ids::DSD),
            chunk(ids::DSD, &[0; 8]),
        ]);
        assert!(open(data.clone()).is_ok());

        let strict = ReaderOptions {
            fail_level: Level::Warn,
            ..Default::default()
        };
        let err = DffReader::new(Cursor::new(data), strict)
            .err()
            .map(|e| e.downcast::<ChunkWarning>());
        assert!(matches!(err, Some(Ok(ChunkWarning::Unknown { .. }))));
        Ok(())
    }

    /// A `DSD ` chunk header declaring `size` followed by `data`, unpadded.
    fn sound_header(size: u64, data: &[u8]) -> Vec<u8> {
        let mut out = ids::DSD.to_vec();
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn oversized_sound_chunk_is_clamped_to_file() -> Result<()> {
        for declared in [u64::MAX / 4, u64::MAX] {
            let data = frm8(&[
                fver(),
                prop(2_822_400, 2, ids::DSD),
                sound_header(declared, &counting(500)),
            ]);
            let mut dff = open(data)?;

            assert_eq!(dff.total_length(), 4_000);
            for _ in 0..500 {
                assert!(dff.step());
            }
            assert!(!dff.step());
        }
        Ok(())
    }

    #[test]
    fn oversized_sound_chunk_fails_in_strict_mode() {
        let data = frm8(&[
            fver(),
            prop(2_822_400, 2, ids::DSD),
            sound_header(u64::MAX, &counting(8)),
        ]);
        let strict = ReaderOptions {
            fail_level: Level::Warn,
            ..Default::default()
        };
        let err = DffReader::new(Cursor::new(data), strict)
            .err()
            .map(|e| e.downcast::<ChunkWarning>());
        assert!(matches!(err, Some(Ok(ChunkWarning::Malformed { .. }))));
    }

    #[test]
    fn missing_property_is_reported() {
        let prop = chunk(
            ids::PROP,
            &form(ids::SND, &[chunk(ids::CHNL, &[0, 1, b'S', b'L', b'F', b'T'])]),
        );
        let data = frm8(&[fver(), prop, chunk(ids::DSD, &[0; 8])]);
        let err = open(data).err().map(|e| e.downcast::<ContainerError>());
        assert!(matches!(
            err,
            Some(Ok(ContainerError::MissingProperty("FS")))
        ));
    }

    #[test]
    fn missing_sound_data_is_reported() {
        let data = frm8(&[fver(), prop(2_822_400, 2, ids::DSD)]);
        let err = open(data).err().map(|e| e.downcast::<ContainerError>());
        assert!(matches!(err, Some(Ok(ContainerError::MissingChunk(_)))));
    }

    #[test]
    fn rejects_wrong_form_type() {
        let data = chunk(ids::FRM8, &form(b"AIFF", &[fver()]));
        let err = open(data).err().map(|e| e.downcast::<ContainerError>());
        assert!(matches!(err, Some(Ok(ContainerError::BadFormType { .. }))));
    }

    #[test]
    fn markers_define_tracks() -> Result<()> {
        let diin = chunk(
            ids::DIIN,
            &[
                chunk(ids::EMID, b"master-01"),
                mark(100, 0),
                mark(500, 1),
                mark(600, 0),
                mark(900, 0),
            ]
            .concat(),
        );
        let data = frm8(&[
            fver(),
            prop(2_822_400, 2, ids::DSD),
            diin,
            chunk(ids::DSD, &[0; 2000]),
            id3_chunk("First"),
            id3_chunk("Second"),
        ]);
        let dff = open(data)?;

        assert_eq!(dff.track_count(), 2);
        assert_eq!((dff.track_start(0), dff.track_end(0)), (100, 499));
        assert_eq!((dff.track_start(1), dff.track_end(1)), (600, 899));
        assert_eq!(dff.header().edited_master_id.as_deref(), Some("master-01"));
        assert_eq!(
            dff.tags_for(1).and_then(|t| t.title.as_deref()),
            Some("Second")
        );
        assert!(dff.tags_for(2).is_none());
        Ok(())
    }

    #[test]
    fn disc_text_backs_missing_tags() -> Result<()> {
        let mut artist = 6u32.to_be_bytes().to_vec();
        artist.extend_from_slice(b"Artist");
        let mut title = 4u32.to_be_bytes().to_vec();
        title.extend_from_slice(b"Disc");

        let diin = chunk(
            ids::DIIN,
            &[chunk(ids::DIAR, &artist), chunk(ids::DITI, &title)].concat(),
        );
        let data = frm8(&[
            fver(),
            prop(2_822_400, 1, ids::DSD),
            diin,
            chunk(ids::DSD, &[0; 8]),
        ]);
        let dff = open(data)?;

        let tags = dff.tags_for(0).expect("disc tags");
        assert_eq!(tags.artist.as_deref(), Some("Artist"));
        assert_eq!(tags.album.as_deref(), Some("Disc"));
        Ok(())
    }

    #[test]
    fn frame_index_entries_are_twelve_bytes() -> Result<()> {
        let mut index = Vec::new();
        for (offset, length) in [(1000u64, 300u32), (1300, 280)] {
            index.extend_from_slice(&offset.to_be_bytes());
            index.extend_from_slice(&length.to_be_bytes());
        }
        let data = frm8(&[
            fver(),
            prop(2_822_400, 1, ids::DSD),
            chunk(ids::DSD, &[0; 8]),
            chunk(ids::DSTI, &index),
        ]);
        let dff = open(data)?;

        assert_eq!(
            dff.header().dst_index,
            [
                DstFrameIndex { offset: 1000, length: 300 },
                DstFrameIndex { offset: 1300, length: 280 },
            ]
        );
        Ok(())
    }

    #[derive(Default)]
    struct CodecLog {
        init: Option<(usize, u32)>,
        decoded: u32,
        closed: u32,
    }

    /// Fills each frame with its first byte; 0xEE marks a corrupt frame.
    struct MockCodec(Rc<RefCell<CodecLog>>);

    impl FrameCodec for MockCodec {
        fn init(&mut self, channels: usize, ratio: u32) -> Result<()> {
            self.0.borrow_mut().init = Some((channels, ratio));
            Ok(())
        }

        fn decode(&mut self, frame: &[u8], out: &mut [u8], frame_count_hint: u32) -> Result<()> {
            assert_eq!(frame_count_hint, 3);
            self.0.borrow_mut().decoded += 1;
            match frame.first() {
                Some(0xEE) | None => bail!("corrupt frame"),
                Some(&b) => {
                    out.fill(b);
                    Ok(())
                }
            }
        }

        fn close(&mut self) {
            self.0.borrow_mut().closed += 1;
        }
    }

    fn dst_file(frames: &[u8]) -> Vec<u8> {
        let mut frte = 3u32.to_be_bytes().to_vec();
        frte.extend_from_slice(&75u16.to_be_bytes());

        let mut children = vec![chunk(ids::FRTE, &frte)];
        for &first in frames {
            children.push(chunk(ids::DSTF, &[first, 0x00, 0x01]));
            children.push(chunk(ids::DSTC, &[0, 0, 0, 0]));
        }

        frm8(&[
            fver(),
            prop(2_822_400, 2, ids::DST),
            chunk(ids::DST, &children.concat()),
        ])
    }

    fn open_dst(data: Vec<u8>, log: &Rc<RefCell<CodecLog>>) -> Result<DffReader<Cursor<Vec<u8>>>> {
        let options = ReaderOptions {
            codec: Some(Box::new(MockCodec(log.clone()))),
            ..Default::default()
        };
        DffReader::new(Cursor::new(data), options)
    }

    #[test]
    fn dst_frames_go_through_codec() -> Result<()> {
        let log = Rc::new(RefCell::new(CodecLog::default()));
        let mut dff = open_dst(dst_file(&[0x11, 0xEE, 0x33]), &log)?;

        let frame_bytes = 2_822_400 / 75 / 8;
        assert_eq!(dff.total_length(), 3 * 2_822_400 / 75);
        assert_eq!(dff.compression(), Compression::Dst);
        assert_eq!(log.borrow().init, Some((2, 64)));

        for _ in 0..frame_bytes {
            assert!(dff.step());
        }
        assert_eq!(dff.buffer().get(1, 0), 0x11);

        for _ in 0..frame_bytes {
            assert!(!dff.step());
        }
        assert_eq!(dff.buffer().get(0, 0), IDLE_BYTE);

        for _ in 0..frame_bytes {
            assert!(dff.step());
        }
        assert_eq!(dff.buffer().get(0, 0), 0x33);
        assert!(!dff.step());
        assert_eq!(log.borrow().decoded, 3);

        drop(dff);
        assert_eq!(log.borrow().closed, 1);
        Ok(())
    }

    #[test]
    fn dst_rewind_restarts_at_first_frame() -> Result<()> {
        let log = Rc::new(RefCell::new(CodecLog::default()));
        let mut dff = open_dst(dst_file(&[0x11, 0x22, 0x33]), &log)?;

        for _ in 0..10_000 {
            dff.step();
        }
        dff.rewind()?;
        dff.rewind()?;
        assert_eq!(dff.position(), -8);

        assert!(dff.step());
        assert_eq!(dff.buffer().get(0, 0), 0x11);
        Ok(())
    }

    #[test]
    fn missing_frames_fail_steps() -> Result<()> {
        let log = Rc::new(RefCell::new(CodecLog::default()));
        let mut dff = open_dst(dst_file(&[0x11]), &log)?;

        let frame_bytes = 2_822_400 / 75 / 8;
        for _ in 0..frame_bytes {
            assert!(dff.step());
        }
        assert!(dff.samples_available());
        assert!(!dff.step());
        assert!(!dff.step());
        Ok(())
    }

    #[test]
    fn dst_without_codec_is_rejected() {
        let err = open(dst_file(&[0x11])).err().map(|e| e.downcast::<ContainerError>());
        assert!(matches!(err, Some(Ok(ContainerError::MissingCodec))));
    }
}
