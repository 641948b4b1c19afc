use anyhow::Result;

use super::tracks::Bounds;
use crate::pcm::{SampleFormat, Samples};
use dsd::process::decimate::Decimator;
use dsd::process::dop::{DOP_SAMPLES_PER_FRAME, DopPacker};
use dsd::source::SampleSource;

pub const BLOCK_FRAMES: usize = 1024;

/// A converter that produces interleaved frames at increasing positions.
pub trait Renderer {
    /// Position of the next frame, in the unit of its track bounds.
    fn position(&self) -> f64;
    /// Position advance per frame.
    fn frame_step(&self) -> f64;
    /// Position units per second.
    fn position_rate(&self) -> f64;
    /// Advances the source without producing output.
    fn skip(&mut self);
    fn render(&mut self, frames: usize) -> Samples<'_>;
    fn failed_steps(&self) -> u64;
}

/// Renders the frames inside `bounds` into `sink`: whole blocks while one
/// fits, then single frames. Returns the number of frames produced.
pub fn render_track<R, F>(renderer: &mut R, bounds: Bounds, mut sink: F) -> Result<u64>
where
    R: Renderer + ?Sized,
    F: FnMut(Samples, u64) -> Result<()>,
{
    if renderer.position() >= bounds.start + renderer.frame_step() {
        log::warn!(
            "Track start {:.0} is behind the current position {:.0}, rendering from there",
            bounds.start,
            renderer.position()
        );
    }
    while renderer.position() < bounds.start {
        renderer.skip();
    }

    let mut written = 0u64;
    let block_span = BLOCK_FRAMES as f64 * renderer.frame_step();
    while renderer.position() <= bounds.end - block_span {
        sink(renderer.render(BLOCK_FRAMES), BLOCK_FRAMES as u64)?;
        written += BLOCK_FRAMES as u64;
    }
    while renderer.position() <= bounds.end {
        sink(renderer.render(1), 1)?;
        written += 1;
    }
    Ok(written)
}

/// Scaling, dither and clipping for PCM output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmSettings {
    pub format: SampleFormat,
    pub scale: f64,
    pub dither: f64,
    pub clip: f64,
}

impl PcmSettings {
    pub fn new(format: SampleFormat, gain_db: f64, dither: bool) -> Self {
        let gain = 10f64.powf(gain_db / 20.0);
        match format {
            SampleFormat::Float => Self {
                format,
                scale: gain,
                dither: 0.0,
                clip: 1.0,
            },
            SampleFormat::Int(bits) => {
                let full_scale = (1u64 << (bits - 1)) as f64;
                Self {
                    format,
                    scale: gain * full_scale,
                    dither: if dither { 1.0 } else { 0.0 },
                    clip: full_scale - 1.0,
                }
            }
        }
    }
}

pub struct PcmRenderer<'a, S: SampleSource + ?Sized> {
    decimator: Decimator<'a, S>,
    settings: PcmSettings,
    ints: Vec<i32>,
    floats: Vec<f32>,
}

impl<'a, S: SampleSource + ?Sized> PcmRenderer<'a, S> {
    pub fn new(decimator: Decimator<'a, S>, settings: PcmSettings) -> Self {
        Self {
            decimator,
            settings,
            ints: Vec::new(),
            floats: Vec::new(),
        }
    }

    pub fn decimator(&self) -> &Decimator<'a, S> {
        &self.decimator
    }
}

impl<S: SampleSource + ?Sized> Renderer for PcmRenderer<'_, S> {
    fn position(&self) -> f64 {
        self.decimator.position()
    }

    fn frame_step(&self) -> f64 {
        1.0
    }

    fn position_rate(&self) -> f64 {
        self.decimator.output_frequency() as f64
    }

    fn skip(&mut self) {
        self.decimator.step();
    }

    fn render(&mut self, frames: usize) -> Samples<'_> {
        let len = frames * self.decimator.source().channel_count();
        let PcmSettings {
            format,
            scale,
            dither,
            clip,
        } = self.settings;

        match format {
            SampleFormat::Float => {
                self.floats.resize(len, 0.0);
                self.decimator.fill_samples(&mut self.floats, scale, dither, clip);
                Samples::Float(&self.floats)
            }
            SampleFormat::Int(_) => {
                self.ints.resize(len, 0);
                self.decimator.fill_samples(&mut self.ints, scale, dither, clip);
                Samples::Int(&self.ints)
            }
        }
    }

    fn failed_steps(&self) -> u64 {
        self.decimator.failed_steps()
    }
}

pub struct DopRenderer<'a, S: SampleSource + ?Sized> {
    packer: DopPacker<'a, S>,
    words: Vec<i32>,
}

impl<'a, S: SampleSource + ?Sized> DopRenderer<'a, S> {
    pub fn new(packer: DopPacker<'a, S>) -> Self {
        Self {
            packer,
            words: Vec::new(),
        }
    }
}

impl<S: SampleSource + ?Sized> Renderer for DopRenderer<'_, S> {
    /// First DSD sample of the next frame.
    fn position(&self) -> f64 {
        (self.packer.position() + 8) as f64
    }

    fn frame_step(&self) -> f64 {
        DOP_SAMPLES_PER_FRAME as f64
    }

    fn position_rate(&self) -> f64 {
        self.packer.source().sampling_frequency() as f64
    }

    fn skip(&mut self) {
        self.packer.skip_byte();
    }

    fn render(&mut self, frames: usize) -> Samples<'_> {
        let len = frames * self.packer.source().channel_count();
        self.words.resize(len, 0);
        self.packer.fill_samples(&mut self.words);
        Samples::Int(&self.words)
    }

    fn failed_steps(&self) -> u64 {
        self.packer.failed_steps()
    }
}
