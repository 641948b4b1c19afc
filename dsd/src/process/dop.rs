use anyhow::{Result, bail};

use crate::source::SampleSource;
use crate::utils::errors::ConfigError;

/// DSD bytes carried per DoP word.
pub const DOP_BYTES_PER_FRAME: u64 = 2;

/// DSD samples carried per DoP word.
pub const DOP_SAMPLES_PER_FRAME: u64 = DOP_BYTES_PER_FRAME * 8;

const MARKERS: [u8; 2] = [0x05, 0xFA];

/// PCM rate carrying a DSD stream at `fs`, if DoP defines one.
pub fn dop_frequency(fs: u32) -> Option<u32> {
    match fs {
        2_822_400 | 5_644_800 => Some(fs / DOP_SAMPLES_PER_FRAME as u32),
        _ => None,
    }
}

/// Packs sixteen DSD samples per channel into each 24-bit PCM word.
///
/// The top byte of every word is the DoP marker, which alternates between
/// frames; the lower two bytes carry the older and then the newer DSD byte
/// with the earliest sample in the most significant bit.
pub struct DopPacker<'a, S: SampleSource + ?Sized> {
    source: &'a mut S,
    output_frequency: u32,
    frame_count: u64,
    failed_steps: u64,
}

impl<'a, S: SampleSource + ?Sized> DopPacker<'a, S> {
    pub fn new(source: &'a mut S) -> Result<Self> {
        let fs = source.sampling_frequency();
        let Some(output_frequency) = dop_frequency(fs) else {
            bail!(ConfigError::UnsupportedDopRate(fs));
        };
        Ok(Self {
            source,
            output_frequency,
            frame_count: 0,
            failed_steps: 0,
        })
    }

    #[inline]
    pub fn output_frequency(&self) -> u32 {
        self.output_frequency
    }

    pub fn source(&self) -> &S {
        &*self.source
    }

    pub fn output_length(&self) -> u64 {
        self.source.total_length() / DOP_SAMPLES_PER_FRAME
    }

    /// Position in DSD samples of the newest packed byte.
    pub fn position(&self) -> i64 {
        self.source.position()
    }

    /// Steps that failed while the stream still had bytes left.
    pub fn failed_steps(&self) -> u64 {
        self.failed_steps
    }

    /// Returns the source to its first byte and restarts the marker sequence.
    pub fn rewind(&mut self) -> Result<()> {
        self.frame_count = 0;
        self.source.rewind()
    }

    /// Advances the source one DSD byte without producing output.
    pub fn skip_byte(&mut self) {
        let available = self.source.samples_available();
        if !self.source.step() && available {
            self.failed_steps += 1;
        }
    }

    /// Fills `buf` with interleaved DoP words, sign-extended from 24 bits.
    ///
    /// # Panics
    ///
    /// Panics if `buf.len()` is not a multiple of the channel count.
    pub fn fill_samples(&mut self, buf: &mut [i32]) {
        let channels = self.source.channel_count();
        assert!(
            channels > 0 && buf.len() % channels == 0,
            "buffer length {} is not a multiple of {channels} channels",
            buf.len()
        );
        let msb_first = self.source.msb_first();

        for frame in buf.chunks_exact_mut(channels) {
            for _ in 0..DOP_BYTES_PER_FRAME {
                self.skip_byte();
            }
            let marker = MARKERS[(self.frame_count % 2) as usize];
            self.frame_count += 1;

            let window = self.source.buffer();
            for (ch, out) in frame.iter_mut().enumerate() {
                let (mut older, mut newer) = (window.get(ch, 1), window.get(ch, 0));
                if !msb_first {
                    older = older.reverse_bits();
                    newer = newer.reverse_bits();
                }
                let word = u32::from_be_bytes([0, marker, older, newer]);
                *out = ((word << 8) as i32) >> 8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderOptions;
    use crate::source::dff::DffReader;
    use crate::source::dff::tests::{chunk, fver, frm8, prop};
    use crate::source::dsf::tests::DsfBuilder;
    use crate::structs::chunk::ids;
    use std::io::Cursor;

    #[test]
    fn rates_follow_dop_standard() {
        assert_eq!(dop_frequency(2_822_400), Some(176_400));
        assert_eq!(dop_frequency(5_644_800), Some(352_800));
        assert_eq!(dop_frequency(11_289_600), None);
        assert_eq!(dop_frequency(3_072_000), None);
    }

    #[test]
    fn packs_older_byte_in_the_middle() -> Result<()> {
        let data = frm8(&[
            fver(),
            prop(2_822_400, 1, ids::DSD),
            chunk(ids::DSD, &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]),
        ]);
        let mut source = DffReader::new(Cursor::new(data), ReaderOptions::default())?;
        let mut packer = DopPacker::new(&mut source)?;
        assert_eq!(packer.output_length(), 3);

        let mut out = [0i32; 3];
        packer.fill_samples(&mut out);
        assert_eq!(out[0], 0x05_1234);
        assert_eq!(out[1], (0xFF_FA_5678u32 as i32));
        assert_eq!(out[2], 0x05_9ABC);
        assert_eq!(packer.position(), 5 * 8);
        Ok(())
    }

    #[test]
    fn lsb_first_bytes_are_reversed() -> Result<()> {
        let mut data = vec![0u8; 16];
        data[0] = 0x01;
        data[1] = 0x80;
        let mut source = DsfBuilder::stereo(8, 64, data).open()?;
        let mut packer = DopPacker::new(&mut source)?;

        let mut out = [0i32; 2];
        packer.fill_samples(&mut out);
        assert_eq!(out[0], 0x05_8001);
        assert_eq!(out[1], 0x05_0000);
        Ok(())
    }

    #[test]
    fn markers_alternate_and_restart_on_rewind() -> Result<()> {
        let mut source = DsfBuilder::stereo(8, 64, vec![0; 16]).open()?;
        let mut packer = DopPacker::new(&mut source)?;

        let mut out = [0i32; 8];
        packer.fill_samples(&mut out);
        let markers: Vec<u8> = out.iter().map(|&w| (w >> 16) as u8).collect();
        assert_eq!(markers, [0x05, 0x05, 0xFA, 0xFA, 0x05, 0x05, 0xFA, 0xFA]);

        packer.rewind()?;
        let mut first = [0i32; 2];
        packer.fill_samples(&mut first);
        assert_eq!((first[0] >> 16) as u8, 0x05);
        Ok(())
    }

    #[test]
    fn rejects_unsupported_rates() -> Result<()> {
        let data = frm8(&[
            fver(),
            prop(11_289_600, 1, ids::DSD),
            chunk(ids::DSD, &[0; 4]),
        ]);
        let mut source = DffReader::new(Cursor::new(data), ReaderOptions::default())?;
        let err = DopPacker::new(&mut source)
            .err()
            .map(|e| e.downcast::<ConfigError>());
        assert!(matches!(err, Some(Ok(ConfigError::UnsupportedDopRate(11_289_600)))));
        Ok(())
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn odd_buffer_length_panics() {
        let mut source = DsfBuilder::stereo(8, 64, vec![0; 16]).open().unwrap();
        let mut packer = DopPacker::new(&mut source).unwrap();
        let mut out = [0i32; 3];
        packer.fill_samples(&mut out);
    }
}
