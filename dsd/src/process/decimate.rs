use anyhow::{Result, ensure};

use crate::source::SampleSource;
use crate::structs::filter::{FilterBank, FilterTable, SUPPORTED_RATIOS};
use crate::utils::dither::TpdfDither;
use crate::utils::errors::ConfigError;

/// Output sample formats the decimator can produce.
pub trait PcmSample: Copy + Default {
    /// Converts a scaled, dithered and clipped value.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_int_sample {
    ($($ty:ty),*) => {
        $(impl PcmSample for $ty {
            #[inline]
            fn from_f64(value: f64) -> Self {
                value.round() as $ty
            }
        })*
    };
}

impl_int_sample!(i16, i32, i64);

impl PcmSample for f32 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl PcmSample for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Validates an input/output rate pair and returns the decimation ratio.
pub fn decimation_ratio(input: u32, output: u32) -> Result<u32> {
    ensure!(
        output > 0 && input % output == 0 && SUPPORTED_RATIOS.contains(&(input / output)),
        ConfigError::UnsupportedRatio { input, output }
    );
    Ok(input / output)
}

/// Converts the byte window of a source into PCM at an integral fraction
/// of its rate.
///
/// The decimator borrows the source for its whole lifetime and advances it
/// by `ratio / 8` bytes per output sample.
pub struct Decimator<'a, S: SampleSource + ?Sized> {
    source: &'a mut S,
    table: FilterTable,
    ratio: u32,
    n_step: usize,
    tzero: usize,
    output_frequency: u32,
    dither: TpdfDither,
    failed_steps: u64,
}

impl<'a, S: SampleSource + ?Sized> Decimator<'a, S> {
    /// Uses the built-in filter bank for the ratio.
    pub fn new(source: &'a mut S, output_frequency: u32) -> Result<Self> {
        let input = source.sampling_frequency();
        let ratio = decimation_ratio(input, output_frequency)?;
        let bank = FilterBank::for_ratio(ratio).ok_or(ConfigError::UnsupportedRatio {
            input,
            output: output_frequency,
        })?;
        Self::with_bank(source, output_frequency, &bank)
    }

    pub fn with_bank(source: &'a mut S, output_frequency: u32, bank: &FilterBank) -> Result<Self> {
        let ratio = decimation_ratio(source.sampling_frequency(), output_frequency)?;
        let table = FilterTable::build(bank, source.msb_first());

        if source.buffer().capacity() < table.len() {
            log::debug!("Growing sample window to {} bytes", table.len());
            source.set_buffer_length(table.len())?;
        }

        log::debug!(
            "Decimating {} Hz by {ratio} with {} taps (tzero {})",
            source.sampling_frequency(),
            bank.taps(),
            bank.tzero()
        );

        Ok(Self {
            source,
            table,
            ratio,
            n_step: (ratio / 8) as usize,
            tzero: bank.tzero(),
            output_frequency,
            dither: TpdfDither::default(),
            failed_steps: 0,
        })
    }

    #[inline]
    pub fn ratio(&self) -> u32 {
        self.ratio
    }

    #[inline]
    pub fn output_frequency(&self) -> u32 {
        self.output_frequency
    }

    pub fn source(&self) -> &S {
        &*self.source
    }

    /// Output samples per channel covering the whole source.
    pub fn output_length(&self) -> u64 {
        self.source.total_length() / self.ratio as u64
    }

    /// First output sample whose filter window holds only real data.
    pub fn first_valid_sample(&self) -> f64 {
        self.table.len() as f64 / self.n_step as f64 - self.tzero as f64 / self.ratio as f64
    }

    /// Last output sample before the window runs into trailing idle data.
    pub fn last_valid_sample(&self) -> f64 {
        self.output_length() as f64 - self.tzero as f64 / self.ratio as f64
    }

    /// Output sample index aligned with the filter centre.
    pub fn position(&self) -> f64 {
        (self.source.position() - self.tzero as i64) as f64 / self.ratio as f64
    }

    pub fn position_seconds(&self) -> f64 {
        self.source.position_seconds()
    }

    pub fn position_percent(&self) -> f64 {
        self.source.position_percent()
    }

    /// Source steps that returned no data while the stream still had bytes
    /// left, i.e. damaged or truncated input. Running past the end is not
    /// counted.
    pub fn failed_steps(&self) -> u64 {
        self.failed_steps
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.source.rewind()
    }

    /// Advances one output sample without producing it.
    pub fn step(&mut self) {
        for _ in 0..self.n_step {
            let available = self.source.samples_available();
            if !self.source.step() && available {
                self.failed_steps += 1;
            }
        }
    }

    /// Fills `buf` with interleaved frames.
    ///
    /// Each value is scaled, then gets TPDF dither when `dither_peak > 0`
    /// and is clipped to `±clip` when `clip > 0`.
    ///
    /// # Panics
    ///
    /// Panics if `buf.len()` is not a multiple of the channel count.
    pub fn fill_samples<T: PcmSample>(
        &mut self,
        buf: &mut [T],
        scale: f64,
        dither_peak: f64,
        clip: f64,
    ) {
        let channels = self.source.channel_count();
        assert!(
            channels > 0 && buf.len() % channels == 0,
            "buffer length {} is not a multiple of {channels} channels",
            buf.len()
        );

        for frame in buf.chunks_exact_mut(channels) {
            for (ch, out) in frame.iter_mut().enumerate() {
                let mut value = self.table.convolve(self.source.buffer().channel(ch)) * scale;
                if dither_peak > 0.0 {
                    value += self.dither.sample(dither_peak);
                }
                if clip > 0.0 {
                    value = value.clamp(-clip, clip);
                }
                *out = T::from_f64(value);
            }
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DsfReader;
    use crate::source::dsf::tests::DsfBuilder;
    use std::io::Cursor;

    fn constant_source(byte: u8, bytes_per_channel: usize) -> Result<DsfReader<Cursor<Vec<u8>>>> {
        DsfBuilder::stereo(
            bytes_per_channel as u32,
            bytes_per_channel as u64 * 8,
            vec![byte; bytes_per_channel * 2],
        )
        .open()
    }

    #[test]
    fn rejects_unsupported_ratios() -> Result<()> {
        let mut source = constant_source(0x69, 64)?;
        for output in [44_100, 300_000, 2_822_400, 0] {
            let err = Decimator::new(&mut source, output)
                .err()
                .map(|e| e.downcast::<ConfigError>());
            assert!(
                matches!(err, Some(Ok(ConfigError::UnsupportedRatio { .. }))),
                "{output} Hz should be rejected"
            );
        }
        Ok(())
    }

    #[test]
    fn output_length_follows_ratio() -> Result<()> {
        let mut source = constant_source(0x69, 8192)?;
        for (output, expected) in [(352_800, 8192), (176_400, 4096), (88_200, 2048)] {
            let decimator = Decimator::new(&mut source, output)?;
            assert_eq!(decimator.output_length(), expected);
        }
        Ok(())
    }

    #[test]
    fn valid_range_accounts_for_group_delay() -> Result<()> {
        let mut source = constant_source(0x69, 8192)?;
        let decimator = Decimator::new(&mut source, 352_800)?;

        assert_eq!(decimator.ratio(), 8);
        assert_eq!(decimator.first_valid_sample(), 65.0 - 32.0);
        assert_eq!(decimator.last_valid_sample(), 8192.0 - 32.0);
        assert_eq!(decimator.position(), (-8.0 - 256.0) / 8.0);
        Ok(())
    }

    #[test]
    fn short_window_grows_and_rewinds() -> Result<()> {
        let mut source = constant_source(0x69, 1024)?;
        source.set_buffer_length(4)?;
        source.step();

        let decimator = Decimator::new(&mut source, 88_200)?;
        assert_eq!(decimator.source().buffer().capacity(), (64 * 32 + 1usize).div_ceil(8));
        assert_eq!(decimator.source().position(), -8);
        Ok(())
    }

    #[test]
    fn idle_input_gives_flat_output() -> Result<()> {
        let mut source = constant_source(0x69, 4096)?;
        let mut decimator = Decimator::new(&mut source, 176_400)?;

        let mut first = vec![0f64; 2 * 1024];
        decimator.fill_samples(&mut first, 1.0, 0.0, 0.0);
        decimator.rewind()?;
        let mut second = vec![0f64; 2 * 1024];
        decimator.fill_samples(&mut second, 1.0, 0.0, 0.0);
        assert_eq!(first, second);

        let dc = first[0];
        assert!(dc.abs() < 0.1);
        for frame in first.chunks_exact(2) {
            assert!((frame[0] - dc).abs() < 1e-12);
            assert!((frame[1] - dc).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn full_scale_input_clips() -> Result<()> {
        let mut source = constant_source(0xFF, 4096)?;
        let mut decimator = Decimator::new(&mut source, 352_800)?;
        for _ in 0..100 {
            decimator.step();
        }

        let mut out = [0i16; 8];
        decimator.fill_samples(&mut out, 32_768.0, 1.0, 32_767.0);
        assert!(out.iter().all(|&s| s == 32_767));

        let mut float = [0f32; 2];
        decimator.fill_samples(&mut float, 1.0, 0.0, 0.0);
        assert!((float[0] - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn dither_is_reproducible() -> Result<()> {
        let run = || -> Result<Vec<i32>> {
            let mut source = constant_source(0x69, 2048)?;
            let mut decimator = Decimator::new(&mut source, 352_800)?;
            let mut out = vec![0i32; 2 * 256];
            decimator.fill_samples(&mut out, 8_388_608.0, 1.0, 8_388_607.0);
            Ok(out)
        };
        assert_eq!(run()?, run()?);
        Ok(())
    }

    #[test]
    fn truncated_data_counts_failed_steps() -> Result<()> {
        // Header claims two blocks per channel, the file carries one.
        let mut source = DsfBuilder::stereo(64, 128 * 8, vec![0x69; 128]).open()?;
        let mut decimator = Decimator::new(&mut source, 88_200)?;
        let mut out = vec![0i64; 2 * 20];
        decimator.fill_samples(&mut out, 1.0, 0.0, 0.0);
        assert_eq!(decimator.failed_steps(), 20 * 4 - 64);
        Ok(())
    }

    #[test]
    fn running_past_the_end_is_not_a_failure() -> Result<()> {
        let mut source = constant_source(0x69, 64)?;
        let mut decimator = Decimator::new(&mut source, 88_200)?;
        let mut out = vec![0i64; 2 * 20];
        decimator.fill_samples(&mut out, 1.0, 0.0, 0.0);
        assert_eq!(decimator.failed_steps(), 0);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn odd_buffer_length_panics() {
        let mut source = constant_source(0x69, 64).unwrap();
        let mut decimator = Decimator::new(&mut source, 352_800).unwrap();
        let mut out = [0i32; 3];
        decimator.fill_samples(&mut out, 1.0, 0.0, 0.0);
    }
}
