//! Sony Wave64 writer.
//!
//! Wave64 replaces the RIFF FourCCs with GUIDs and widens every size to
//! 64 bits, so files of any length are valid. Chunk sizes include their
//! 24 byte header and chunks are padded to eight bytes.

use std::io::{self, Seek, SeekFrom, Write};

use crate::byteorder::WriteBytesLe;
use crate::pcm::{Endianness, SampleFormat, Samples, pack};
use dsdd_macros::ToBytes;

pub const W64_RIFF_GUID: [u8; 16] = [
    0x72, 0x69, 0x66, 0x66, 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00,
];
pub const W64_WAVE_GUID: [u8; 16] = [
    0x77, 0x61, 0x76, 0x65, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
pub const W64_FMT_GUID: [u8; 16] = [
    0x66, 0x6D, 0x74, 0x20, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
pub const W64_DATA_GUID: [u8; 16] = [
    0x64, 0x61, 0x74, 0x61, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

const CHUNK_HEADER_LEN: u64 = 24;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

#[derive(Debug, ToBytes)]
struct WaveFormat {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl WaveFormat {
    fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        let block_align = channels * format.bytes() as u16;
        Self {
            format_tag: if format.is_float() {
                WAVE_FORMAT_IEEE_FLOAT
            } else {
                WAVE_FORMAT_PCM
            },
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: format.bits() as u16,
        }
    }
}

pub struct W64Writer<W: Write + Seek> {
    writer: W,
    format: SampleFormat,
    file_size_position: u64,
    data_size_position: u64,
    data_written: u64,
    scratch: Vec<u8>,
    finished: bool,
}

impl<W: Write + Seek> W64Writer<W> {
    /// Writes the `riff`, `fmt ` and `data` headers with zero sizes.
    pub fn new(mut writer: W, sample_rate: u32, channels: u16, format: SampleFormat) -> io::Result<Self> {
        writer.write_all(&W64_RIFF_GUID)?;
        let file_size_position = writer.stream_position()?;
        writer.write_all(&0u64.to_le_bytes())?;
        writer.write_all(&W64_WAVE_GUID)?;

        let mut fmt = Vec::new();
        WaveFormat::new(sample_rate, channels, format).write_le(&mut fmt);
        writer.write_all(&W64_FMT_GUID)?;
        writer.write_all(&(CHUNK_HEADER_LEN + fmt.len() as u64).to_le_bytes())?;
        writer.write_all(&fmt)?;

        writer.write_all(&W64_DATA_GUID)?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            writer,
            format,
            file_size_position,
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
        pack(samples, self.format, Endianness::Little, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.data_written += self.scratch.len() as u64;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Pads the data chunk and patches the data and file sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }

        let padding = (8 - self.data_written % 8) % 8;
        self.writer.write_all(&[0u8; 8][..padding as usize])?;
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer
            .write_all(&(CHUNK_HEADER_LEN + self.data_written).to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(self.file_size_position))?;
        self.writer.write_all(&end.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for W64Writer<W> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish();
        }
    }
}
