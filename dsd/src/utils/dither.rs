//! Dithering utilities for PCM quantization.
//!
//! Provides a small deterministic PRNG and the triangular-PDF dither used
//! by the decimator before rounding to integer output.

const DEFAULT_SEED: u64 = 0xb2c1_01f4_425b_987e;

fn split_mix_64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// xoshiro128++ generator seeded through SplitMix64.
#[derive(Debug, Clone)]
pub struct Xoshiro128pp {
    s: [u32; 4],
}

impl Xoshiro128pp {
    pub fn new(mut seed: u64) -> Self {
        let a = split_mix_64(&mut seed);
        let b = split_mix_64(&mut seed);

        Self {
            s: [
                (a & 0xffff_ffff) as u32,
                (a >> 32) as u32,
                (b & 0xffff_ffff) as u32,
                (b >> 32) as u32,
            ],
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let result = self.s[0]
            .wrapping_add(self.s[3])
            .rotate_left(7)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 9;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(11);

        result
    }

    /// Uniform value in `[0, 1)`.
    #[inline]
    pub fn next_unit(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }
}

impl Default for Xoshiro128pp {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

/// Triangular-PDF dither source.
///
/// Each draw is the difference of two independent uniform values scaled by
/// the peak amplitude, so the result lies in `(-peak, peak)`.
#[derive(Debug, Clone, Default)]
pub struct TpdfDither {
    prng: Xoshiro128pp,
}

impl TpdfDither {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            prng: Xoshiro128pp::new(seed),
        }
    }

    #[inline]
    pub fn sample(&mut self, peak: f64) -> f64 {
        let r1 = self.prng.next_unit();
        let r2 = self.prng.next_unit();
        (r1 - r2) * peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sequences_repeat() {
        let mut a = Xoshiro128pp::new(42);
        let mut b = Xoshiro128pp::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn tpdf_stays_within_peak() {
        let mut dither = TpdfDither::default();
        let mut sum = 0.0;
        for _ in 0..10_000 {
            let v = dither.sample(1.0);
            assert!(v > -1.0 && v < 1.0);
            sum += v;
        }
        // zero mean within a loose bound
        assert!((sum / 10_000.0).abs() < 0.05);
    }

    #[test]
    fn zero_peak_is_silent() {
        let mut dither = TpdfDither::with_seed(7);
        assert_eq!(dither.sample(0.0), 0.0);
    }
}
