use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::super::command::AudioFormat;
use crate::caf::{AudioDescription, CafWriter, ChannelLayout, ChannelLayoutTag, Information};
use crate::pcm::{Endianness, SampleFormat, Samples, pack};
use crate::wav::W64Writer;
use dsd::structs::tags::TrackTags;

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn create_path_with_suffix(base_path: &Path, suffix: &str) -> PathBuf {
    base_path.with_file_name(format!("{}.{suffix}", file_name_of(base_path)))
}

/// Keeps `base_path` when it already ends in `ext`, otherwise appends it.
pub fn create_path_with_extension(base_path: &Path, ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing) if existing == ext => base_path.to_path_buf(),
        Some(_) => create_path_with_suffix(base_path, ext),
        None => base_path.with_extension(ext),
    }
}

/// Output path for the whole run, before any per-track naming.
pub fn base_output_path(input: &Path, output: Option<&Path>, format: AudioFormat) -> PathBuf {
    match output {
        Some(path) => create_path_with_extension(path, format.extension()),
        None => input.with_extension(format.extension()),
    }
}

/// `track N - <name>` beside `base` when there is more than one track.
pub fn track_path(base: &Path, index: usize, track_count: usize) -> PathBuf {
    if track_count <= 1 {
        return base.to_path_buf();
    }
    base.with_file_name(format!("track {} - {}", index + 1, file_name_of(base)))
}

/// Stream parameters shared by every file of one run.
#[derive(Debug, Clone, Copy)]
pub struct OutputSpec {
    pub format: AudioFormat,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channels: usize,
    pub has_lfe: bool,
}

pub enum AudioWriter {
    Pcm {
        writer: BufWriter<File>,
        format: SampleFormat,
        scratch: Vec<u8>,
    },
    Caf(CafWriter<BufWriter<File>>),
    W64(W64Writer<BufWriter<File>>),
}

impl AudioWriter {
    pub fn create(path: &Path, spec: &OutputSpec, tags: Option<&TrackTags>) -> Result<Self> {
        log::info!("Creating audio file: {}", path.display());
        let file = BufWriter::new(File::create(path)?);

        Ok(match spec.format {
            AudioFormat::Pcm => AudioWriter::Pcm {
                writer: file,
                format: spec.sample_format,
                scratch: Vec::new(),
            },
            AudioFormat::Caf => {
                let description = AudioDescription::linear_pcm(
                    spec.sample_rate,
                    spec.channels as u32,
                    spec.sample_format,
                );
                let layout = ChannelLayoutTag::for_channels(spec.channels, spec.has_lfe)
                    .map(ChannelLayout::with_tag);
                let info = Information {
                    entries: tags
                        .map(|t| {
                            t.entries()
                                .into_iter()
                                .map(|(k, v)| (k.to_string(), v))
                                .collect()
                        })
                        .unwrap_or_default(),
                };
                AudioWriter::Caf(CafWriter::new(
                    file,
                    &description,
                    layout.as_ref(),
                    Some(&info),
                    spec.sample_format,
                )?)
            }
            AudioFormat::W64 => AudioWriter::W64(W64Writer::new(
                file,
                spec.sample_rate,
                spec.channels as u16,
                spec.sample_format,
            )?),
        })
    }

    pub fn write_samples(&mut self, samples: Samples) -> Result<()> {
        match self {
            AudioWriter::Pcm {
                writer,
                format,
                scratch,
            } => {
                scratch.clear();
                pack(samples, *format, Endianness::Little, scratch);
                writer.write_all(scratch)?;
            }
            AudioWriter::Caf(w) => w.write_samples(samples)?,
            AudioWriter::W64(w) => w.write_samples(samples)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self {
            AudioWriter::Pcm { mut writer, .. } => writer.flush()?,
            AudioWriter::Caf(mut w) => {
                w.finish()?;
                log::debug!("CAF data chunk holds {} bytes", w.data_written());
            }
            AudioWriter::W64(mut w) => {
                w.finish()?;
                log::debug!("W64 data chunk holds {} bytes", w.data_written());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_are_prefixed_only_when_several() {
        let base = Path::new("/music/out.caf");
        assert_eq!(track_path(base, 0, 1), PathBuf::from("/music/out.caf"));
        assert_eq!(track_path(base, 1, 3), PathBuf::from("/music/track 2 - out.caf"));
    }

    #[test]
    fn default_output_replaces_input_extension() {
        let path = base_output_path(Path::new("album.dff"), None, AudioFormat::W64);
        assert_eq!(path, PathBuf::from("album.w64"));
    }

    #[test]
    fn explicit_output_keeps_or_appends_extension() {
        let keep = base_output_path(Path::new("x.caf"), Some(Path::new("y.caf")), AudioFormat::Caf);
        assert_eq!(keep, PathBuf::from("y.caf"));

        let append =
            base_output_path(Path::new("x.dsf"), Some(Path::new("y.v2")), AudioFormat::Pcm);
        assert_eq!(append, PathBuf::from("y.v2.pcm"));

        let bare = base_output_path(Path::new("x.dsf"), Some(Path::new("out")), AudioFormat::Caf);
        assert_eq!(bare, PathBuf::from("out.caf"));
    }

    #[test]
    fn manifest_sits_beside_output() {
        let path = create_path_with_suffix(Path::new("dir/out.caf"), "tracks.yaml");
        assert_eq!(path, PathBuf::from("dir/out.caf.tracks.yaml"));
    }

    #[test]
    fn raw_pcm_is_little_endian() -> Result<()> {
        let path = std::env::temp_dir().join(format!("dsdd-raw-{}.pcm", std::process::id()));
        let spec = OutputSpec {
            format: AudioFormat::Pcm,
            sample_format: SampleFormat::Int(16),
            sample_rate: 352_800,
            channels: 2,
            has_lfe: false,
        };
        let mut writer = AudioWriter::create(&path, &spec, None)?;
        writer.write_samples(Samples::Int(&[0x0102, -1]))?;
        writer.finish()?;

        let bytes = std::fs::read(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(bytes, [0x02, 0x01, 0xFF, 0xFF]);
        Ok(())
    }
}
