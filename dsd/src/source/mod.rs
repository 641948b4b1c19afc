//! Sample sources: a uniform window over raw DSD bytes.
//!
//! Every container reader exposes the same [`SampleSource`] capability set.
//! A source keeps one sliding ring per channel; each [`SampleSource::step`]
//! pushes one new byte (eight DSD samples) per channel to the front of its
//! ring. Downstream consumers such as the decimator read the rings directly.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Result;

use crate::structs::tags::TrackTags;
use crate::utils::errors::ContainerError;

pub mod buffer;
pub mod codec;
pub mod dff;
pub mod dsf;

pub use buffer::{DEFAULT_BUFFER_LENGTH, SlidingBuffer};
pub use codec::FrameCodec;
pub use dff::DffReader;
pub use dsf::DsfReader;

/// Byte emitted in place of data when a stream is exhausted or damaged.
pub const IDLE_BYTE: u8 = 0x69;

/// Position reported before the first step, one byte before sample 0.
pub const START_POSITION: i64 = -8;

pub trait SampleSource {
    fn sampling_frequency(&self) -> u32;

    fn channel_count(&self) -> usize;

    /// DSD samples per channel.
    fn total_length(&self) -> u64;

    /// Sample index of the newest byte in the window, [`START_POSITION`]
    /// after a rewind.
    fn position(&self) -> i64;

    /// Advances one byte per channel. Returns `false` once the data is
    /// exhausted or the current block is damaged; idle bytes are pushed then.
    fn step(&mut self) -> bool;

    /// Returns to the first data byte with idle-filled rings.
    fn rewind(&mut self) -> Result<()>;

    fn buffer(&self) -> &SlidingBuffer;

    /// Resizes every ring and rewinds. Zero is rejected.
    fn set_buffer_length(&mut self, len: usize) -> Result<()>;

    /// Whether bit 7 of each byte is the earliest sample in time.
    fn msb_first(&self) -> bool;

    fn idle_byte(&self) -> u8 {
        IDLE_BYTE
    }

    fn track_count(&self) -> usize {
        1
    }

    fn track_start(&self, _track: usize) -> u64 {
        0
    }

    fn track_end(&self, _track: usize) -> u64 {
        self.total_length()
    }

    fn tags_for(&self, _track: usize) -> Option<&TrackTags> {
        None
    }

    /// Whether another byte per channel remains.
    fn samples_available(&self) -> bool {
        self.position() + 8 < self.total_length() as i64
    }

    fn position_seconds(&self) -> f64 {
        self.position().max(0) as f64 / self.sampling_frequency() as f64
    }

    fn length_seconds(&self) -> f64 {
        self.total_length() as f64 / self.sampling_frequency() as f64
    }

    fn position_percent(&self) -> f64 {
        match self.total_length() {
            0 => 0.0,
            len => self.position().max(0) as f64 * 100.0 / len as f64,
        }
    }
}

/// Container kind detected by [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Dsf,
    Dff,
}

impl ContainerKind {
    /// Detects the container from the leading four bytes, then from the extension.
    pub fn detect(magic: &[u8], path: &Path) -> Option<Self> {
        match magic {
            b"DSD " => return Some(ContainerKind::Dsf),
            b"FRM8" => return Some(ContainerKind::Dff),
            _ => {}
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dsf" => Some(ContainerKind::Dsf),
            "dff" => Some(ContainerKind::Dff),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Dsf => "DSF",
            ContainerKind::Dff => "DSDIFF",
        }
    }
}

/// Settings applied while a reader parses its header.
pub struct ReaderOptions {
    /// Anomalies at or above this level abort parsing instead of being logged.
    pub fail_level: log::Level,
    pub buffer_length: usize,
    /// Decoder for DST compressed DSDIFF streams.
    pub codec: Option<Box<dyn FrameCodec>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            buffer_length: DEFAULT_BUFFER_LENGTH,
            codec: None,
        }
    }
}

type FileInput = BufReader<File>;

/// A reader for either container, selected at open time.
pub enum DsdSource {
    Dsf(DsfReader<FileInput>),
    Dff(DffReader<FileInput>),
}

/// Opens `path` as a DSF or DSDIFF source.
pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<DsdSource> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    let got = file.read(&mut magic)?;

    let kind = ContainerKind::detect(&magic[..got], path)
        .ok_or_else(|| ContainerError::UnsupportedInput(path.display().to_string()))?;
    log::debug!("Opening {} as {}", path.display(), kind.name());

    let input = BufReader::new(file);
    Ok(match kind {
        ContainerKind::Dsf => DsdSource::Dsf(DsfReader::new(input, options)?),
        ContainerKind::Dff => DsdSource::Dff(DffReader::new(input, options)?),
    })
}

impl DsdSource {
    pub fn kind(&self) -> ContainerKind {
        match self {
            DsdSource::Dsf(_) => ContainerKind::Dsf,
            DsdSource::Dff(_) => ContainerKind::Dff,
        }
    }
}

macro_rules! delegate {
    ($self:ident, $reader:ident => $body:expr) => {
        match $self {
            DsdSource::Dsf($reader) => $body,
            DsdSource::Dff($reader) => $body,
        }
    };
}

impl SampleSource for DsdSource {
    fn sampling_frequency(&self) -> u32 {
        delegate!(self, r => r.sampling_frequency())
    }

    fn channel_count(&self) -> usize {
        delegate!(self, r => r.channel_count())
    }

    fn total_length(&self) -> u64 {
        delegate!(self, r => r.total_length())
    }

    fn position(&self) -> i64 {
        delegate!(self, r => r.position())
    }

    fn step(&mut self) -> bool {
        delegate!(self, r => r.step())
    }

    fn rewind(&mut self) -> Result<()> {
        delegate!(self, r => r.rewind())
    }

    fn buffer(&self) -> &SlidingBuffer {
        delegate!(self, r => r.buffer())
    }

    fn set_buffer_length(&mut self, len: usize) -> Result<()> {
        delegate!(self, r => r.set_buffer_length(len))
    }

    fn msb_first(&self) -> bool {
        delegate!(self, r => r.msb_first())
    }

    fn idle_byte(&self) -> u8 {
        delegate!(self, r => r.idle_byte())
    }

    fn track_count(&self) -> usize {
        delegate!(self, r => r.track_count())
    }

    fn track_start(&self, track: usize) -> u64 {
        delegate!(self, r => r.track_start(track))
    }

    fn track_end(&self, track: usize) -> u64 {
        delegate!(self, r => r.track_end(track))
    }

    fn tags_for(&self, track: usize) -> Option<&TrackTags> {
        delegate!(self, r => r.tags_for(track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_by_signature_before_extension() {
        let path = Path::new("music.dff");
        assert_eq!(ContainerKind::detect(b"DSD ", path), Some(ContainerKind::Dsf));
        assert_eq!(ContainerKind::detect(b"FRM8", Path::new("a.dsf")), Some(ContainerKind::Dff));
        assert_eq!(ContainerKind::detect(b"RIFF", path), Some(ContainerKind::Dff));
        assert_eq!(ContainerKind::detect(b"", Path::new("A.DSF")), Some(ContainerKind::Dsf));
        assert_eq!(ContainerKind::detect(b"RIFF", Path::new("a.wav")), None);
        assert_eq!(ContainerKind::detect(b"RIFF", Path::new("noext")), None);
    }

    #[test]
    fn open_rejects_unknown_input() -> Result<()> {
        let path = std::env::temp_dir().join("dsd_source_open_unknown.wav");
        File::create(&path)?.write_all(b"RIFF....WAVE")?;

        let err = open(&path, ReaderOptions::default()).err();
        std::fs::remove_file(&path)?;

        let err = err.map(|e| e.downcast::<ContainerError>());
        assert!(matches!(err, Some(Ok(ContainerError::UnsupportedInput(_)))));
        Ok(())
    }
}
