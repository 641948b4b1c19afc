//! Core Audio Format writer for linear PCM.
//!
//! The file is laid out as `desc`, an optional `chan`, an optional `info`
//! string chunk and then `data`. The data size is written as unknown (-1)
//! up front and patched by [`CafWriter::finish`].

use std::io::{self, Seek, SeekFrom, Write};

use crate::byteorder::WriteBytesBe;
use crate::impl_u32_enum;
use crate::pcm::{Endianness, SampleFormat, Samples, pack};
use dsdd_macros::{ToBytes, caf_chunk_type};

const FILE_TYPE: &[u8; 4] = b"caff";
const FILE_VERSION: u16 = 1;

const FORMAT_FLAG_IS_FLOAT: u32 = 1 << 0;

pub trait CafChunk {
    fn chunk_type(&self) -> [u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        writer.write_all(&self.chunk_type())?;
        writer.write_all(&(data.len() as u64).to_be_bytes())?;
        writer.write_all(&data)
    }
}

#[derive(Debug, ToBytes)]
#[caf_chunk_type(b"desc")]
pub struct AudioDescription {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl AudioDescription {
    /// Big-endian linear PCM, one frame per packet.
    pub fn linear_pcm(sample_rate: u32, channels: u32, format: SampleFormat) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            format_id: u32::from_be_bytes(*b"lpcm"),
            format_flags: if format.is_float() {
                FORMAT_FLAG_IS_FLOAT
            } else {
                0
            },
            bytes_per_packet: format.bytes() as u32 * channels,
            frames_per_packet: 1,
            channels_per_frame: channels,
            bits_per_channel: format.bits(),
        }
    }
}

#[allow(non_camel_case_types)]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayoutTag {
    Mono = (100 << 16) | 1,
    Stereo = (101 << 16) | 2,
    /// L R Ls Rs
    Quadraphonic = (108 << 16) | 4,
    /// L R C
    MPEG_3_0_A = (113 << 16) | 3,
    /// L R C Ls Rs
    MPEG_5_0_A = (117 << 16) | 5,
    /// L R C LFE Ls Rs
    MPEG_5_1_A = (121 << 16) | 6,
    /// L R C LFE
    DVD_10 = (136 << 16) | 4,
}

impl_u32_enum!(ChannelLayoutTag);

impl ChannelLayoutTag {
    /// Layout for the channel orders used by DSD masters.
    pub fn for_channels(channels: usize, has_lfe: bool) -> Option<Self> {
        Some(match (channels, has_lfe) {
            (1, _) => ChannelLayoutTag::Mono,
            (2, _) => ChannelLayoutTag::Stereo,
            (3, _) => ChannelLayoutTag::MPEG_3_0_A,
            (4, false) => ChannelLayoutTag::Quadraphonic,
            (4, true) => ChannelLayoutTag::DVD_10,
            (5, _) => ChannelLayoutTag::MPEG_5_0_A,
            (6, _) => ChannelLayoutTag::MPEG_5_1_A,
            _ => return None,
        })
    }
}

#[derive(Debug, ToBytes)]
#[caf_chunk_type(b"chan")]
pub struct ChannelLayout {
    pub channel_layout_tag: ChannelLayoutTag,
    pub channel_bitmap: u32,
    pub number_channel_descriptions: u32,
}

impl ChannelLayout {
    pub fn with_tag(tag: ChannelLayoutTag) -> Self {
        Self {
            channel_layout_tag: tag,
            channel_bitmap: 0,
            number_channel_descriptions: 0,
        }
    }
}

/// `info` chunk: a count followed by NUL-terminated key/value pairs.
#[derive(Debug, Default)]
pub struct Information {
    pub entries: Vec<(String, String)>,
}

impl CafChunk for Information {
    fn chunk_type(&self) -> [u8; 4] {
        *b"info"
    }

    fn chunk_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        (self.entries.len() as u32).write_be(&mut data);
        for (key, value) in &self.entries {
            for s in [key, value] {
                data.extend(s.bytes().filter(|&b| b != 0));
                data.push(0);
            }
        }
        data
    }
}

/// Writes a CAF file whose data length is unknown until [`finish`](Self::finish).
pub struct CafWriter<W: Write + Seek> {
    writer: W,
    format: SampleFormat,
    data_size_position: u64,
    data_written: u64,
    scratch: Vec<u8>,
    finished: bool,
}

impl<W: Write + Seek> CafWriter<W> {
    /// Writes the file header and every chunk up to the start of the audio data.
    pub fn new(
        mut writer: W,
        description: &AudioDescription,
        layout: Option<&ChannelLayout>,
        info: Option<&Information>,
        format: SampleFormat,
    ) -> io::Result<Self> {
        writer.write_all(FILE_TYPE)?;
        writer.write_all(&FILE_VERSION.to_be_bytes())?;
        writer.write_all(&0u16.to_be_bytes())?;

        description.write_to(&mut writer)?;
        if let Some(layout) = layout {
            layout.write_to(&mut writer)?;
        }
        if let Some(info) = info.filter(|i| !i.entries.is_empty()) {
            info.write_to(&mut writer)?;
        }

        writer.write_all(b"data")?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&(-1i64).to_be_bytes())?;
        // edit count
        writer.write_all(&0u32.to_be_bytes())?;

        Ok(Self {
            writer,
            format,
            data_size_position,
            data_written: 0,
            scratch: Vec::new(),
            finished: false,
        })
    }

    pub fn write_samples(&mut self, samples: Samples) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Writer already finished",
            ));
        }
        self.scratch.clear();
        pack(samples, self.format, Endianness::Big, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.data_written += self.scratch.len() as u64;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Replaces the unknown data size with the real one.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer
            .write_all(&((self.data_written + 4) as i64).to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for CafWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn be_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn be_u64(bytes: &[u8], at: usize) -> u64 {
        u64::from_be_bytes(bytes[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn stereo_24_bit_layout() -> io::Result<()> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let format = SampleFormat::Int(24);
            let desc = AudioDescription::linear_pcm(352_800, 2, format);
            let layout = ChannelLayout::with_tag(ChannelLayoutTag::Stereo);
            let mut writer = CafWriter::new(&mut cursor, &desc, Some(&layout), None, format)?;
            writer.write_samples(Samples::Int(&[0x123456, -1]))?;
            assert_eq!(writer.data_written(), 6);
            writer.finish()?;
        }
        let bytes = cursor.into_inner();

        assert_eq!(&bytes[0..4], b"caff");
        assert_eq!(&bytes[8..12], b"desc");
        assert_eq!(be_u64(&bytes, 12), 32);
        assert_eq!(f64::from_be_bytes(bytes[20..28].try_into().unwrap()), 352_800.0);
        assert_eq!(&bytes[28..32], b"lpcm");
        assert_eq!(be_u32(&bytes, 32), 0);
        assert_eq!(be_u32(&bytes, 36), 6);
        assert_eq!(be_u32(&bytes, 48), 24);

        assert_eq!(&bytes[52..56], b"chan");
        assert_eq!(be_u64(&bytes, 56), 12);
        assert_eq!(be_u32(&bytes, 64), ChannelLayoutTag::Stereo as u32);

        assert_eq!(&bytes[76..80], b"data");
        assert_eq!(be_u64(&bytes, 80), 4 + 6);
        assert_eq!(&bytes[92..], &[0x12, 0x34, 0x56, 0xFF, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn info_strings_are_nul_terminated() {
        let info = Information {
            entries: vec![
                ("artist".into(), "Someone".into()),
                ("title".into(), "Song".into()),
            ],
        };
        let data = info.chunk_data();
        assert_eq!(be_u32(&data, 0), 2);
        assert_eq!(&data[4..], b"artist\0Someone\0title\0Song\0");
    }

    #[test]
    fn float_flag_and_size_patched_on_drop() -> io::Result<()> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let format = SampleFormat::Float;
            let desc = AudioDescription::linear_pcm(176_400, 1, format);
            let info = Information {
                entries: vec![("album".into(), "A".into())],
            };
            let mut writer = CafWriter::new(&mut cursor, &desc, None, Some(&info), format)?;
            writer.write_samples(Samples::Float(&[0.5; 3]))?;
        }
        let bytes = cursor.into_inner();

        assert_eq!(be_u32(&bytes, 32), FORMAT_FLAG_IS_FLOAT);
        assert_eq!(be_u32(&bytes, 48), 32);

        let info_at = 52;
        assert_eq!(&bytes[info_at..info_at + 4], b"info");
        let info_len = be_u64(&bytes, info_at + 4);
        let data_at = info_at + 12 + info_len as usize;
        assert_eq!(&bytes[data_at..data_at + 4], b"data");
        assert_eq!(be_u64(&bytes, data_at + 4), 4 + 12);
        Ok(())
    }
}
