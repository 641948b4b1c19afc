//! Decimation filters and their byte lookup tables.
//!
//! A one bit stream convolved with an FIR filter only ever multiplies each
//! coefficient by +1 or -1, so every group of eight taps can be collapsed
//! into a 256 entry table indexed by the raw DSD byte.
//!
//! ## Table layout
//!
//! Row `t` covers taps `8t..8t+8` and is indexed by the byte that is `t`
//! bytes older than the newest one. The last row may cover fewer than eight
//! taps when the filter length is not a multiple of eight.

use std::f64::consts::PI;

use anyhow::{Result, ensure};

use crate::utils::errors::ConfigError;

/// Decimation ratios with a built-in filter.
pub const SUPPORTED_RATIOS: [u32; 3] = [8, 16, 32];

/// Taps per unit of decimation ratio in the built-in banks.
const TAPS_PER_RATIO: usize = 64;

/// Passband edge relative to the output sampling rate.
const CUTOFF: f64 = 0.45;

/// FIR coefficients plus the group delay of the filter in input samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    coefficients: Vec<f64>,
    tzero: usize,
}

impl FilterBank {
    pub fn new(coefficients: Vec<f64>, tzero: usize) -> Result<Self> {
        ensure!(!coefficients.is_empty(), ConfigError::EmptyFilterBank);
        Ok(Self {
            coefficients,
            tzero,
        })
    }

    /// Built-in linear phase low-pass bank for `ratio`.
    pub fn for_ratio(ratio: u32) -> Option<Self> {
        if !SUPPORTED_RATIOS.contains(&ratio) {
            return None;
        }
        let taps = TAPS_PER_RATIO * ratio as usize + 1;
        Some(Self::windowed_sinc(taps, CUTOFF / ratio as f64))
    }

    /// Blackman windowed sinc with unity DC gain.
    ///
    /// `cutoff` is in cycles per input sample and must lie in `(0, 0.5)`.
    pub fn windowed_sinc(taps: usize, cutoff: f64) -> Self {
        let taps = taps.max(1);
        let m = (taps - 1) as f64;
        let center = m / 2.0;

        let mut coefficients: Vec<f64> = (0..taps)
            .map(|n| {
                let x = n as f64 - center;
                let sinc = if x == 0.0 {
                    2.0 * cutoff
                } else {
                    (2.0 * PI * cutoff * x).sin() / (PI * x)
                };
                let window = if taps == 1 {
                    1.0
                } else {
                    0.42 - 0.5 * (2.0 * PI * n as f64 / m).cos()
                        + 0.08 * (4.0 * PI * n as f64 / m).cos()
                };
                sinc * window
            })
            .collect();

        let gain: f64 = coefficients.iter().sum();
        if gain != 0.0 {
            coefficients.iter_mut().for_each(|c| *c /= gain);
        }

        Self {
            coefficients,
            tzero: (taps - 1) / 2,
        }
    }

    #[inline]
    pub fn taps(&self) -> usize {
        self.coefficients.len()
    }

    #[inline]
    pub fn tzero(&self) -> usize {
        self.tzero
    }

    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Partial convolution sums for every byte value, one row per eight taps.
#[derive(Debug, Clone)]
pub struct FilterTable {
    rows: Vec<[f64; 256]>,
}

impl FilterTable {
    /// Builds the table for a source whose bytes hold their earliest sample in
    /// bit 7 (`msb_first`) or in bit 0.
    pub fn build(bank: &FilterBank, msb_first: bool) -> Self {
        let taps = bank.taps();
        let row_count = taps.div_ceil(8);
        let coefs = bank.coefficients();

        let rows = (0..row_count)
            .map(|t| {
                let k = (taps - t * 8).min(8);
                let mut row = [0f64; 256];
                for (byte, entry) in row.iter_mut().enumerate() {
                    // b counts back from the newest sample of the byte
                    *entry = (0..k)
                        .map(|b| {
                            let bit = if msb_first { b } else { 7 - b };
                            let value = if byte & (1 << bit) != 0 { 1.0 } else { -1.0 };
                            value * coefs[t * 8 + b]
                        })
                        .sum();
                }
                row
            })
            .collect();

        Self { rows }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn lookup(&self, row: usize, byte: u8) -> f64 {
        self.rows[row][byte as usize]
    }

    /// Convolves one channel history, newest byte first.
    #[inline]
    pub fn convolve<'a>(&self, history: impl IntoIterator<Item = &'a u8>) -> f64 {
        self.rows
            .iter()
            .zip(history)
            .map(|(row, &byte)| row[byte as usize])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golden_bank() -> FilterBank {
        let mut coefs = vec![0.0; 9];
        coefs[0] = 1.0;
        coefs[8] = 0.5;
        FilterBank::new(coefs, 4).unwrap()
    }

    #[test]
    fn table_length_rounds_up() {
        let table = FilterTable::build(&golden_bank(), true);
        assert_eq!(table.len(), 2);

        let bank = FilterBank::for_ratio(8).unwrap();
        assert_eq!(FilterTable::build(&bank, true).len(), bank.taps().div_ceil(8));
    }

    #[test]
    fn golden_values_msb_first() {
        let table = FilterTable::build(&golden_bank(), true);
        assert_eq!(table.lookup(0, 0x01), 1.0);
        assert_eq!(table.lookup(0, 0x00), -1.0);
        assert_eq!(table.lookup(0, 0x80), -1.0);
        assert_eq!(table.lookup(1, 0x01), 0.5);
        assert_eq!(table.lookup(1, 0xFE), -0.5);
    }

    #[test]
    fn golden_values_lsb_first() {
        let table = FilterTable::build(&golden_bank(), false);
        assert_eq!(table.lookup(0, 0x80), 1.0);
        assert_eq!(table.lookup(0, 0x01), -1.0);
        assert_eq!(table.lookup(1, 0x80), 0.5);
    }

    #[test]
    fn bit_order_tables_mirror_each_other() {
        let bank = FilterBank::for_ratio(16).unwrap();
        let msb = FilterTable::build(&bank, true);
        let lsb = FilterTable::build(&bank, false);

        for row in 0..msb.len() {
            for byte in 0..=255u8 {
                assert_eq!(msb.lookup(row, byte), lsb.lookup(row, byte.reverse_bits()));
            }
        }
    }

    #[test]
    fn tables_are_deterministic() {
        let bank = FilterBank::for_ratio(32).unwrap();
        let a = FilterTable::build(&bank, true);
        let b = FilterTable::build(&bank, true);
        for row in 0..a.len() {
            for byte in 0..=255u8 {
                assert_eq!(a.lookup(row, byte).to_bits(), b.lookup(row, byte).to_bits());
            }
        }
    }

    #[test]
    fn builtin_banks_have_unity_gain() {
        for ratio in SUPPORTED_RATIOS {
            let bank = FilterBank::for_ratio(ratio).unwrap();
            let gain: f64 = bank.coefficients().iter().sum();
            assert!((gain - 1.0).abs() < 1e-9);
            assert_eq!(bank.tzero(), (bank.taps() - 1) / 2);
        }
        assert!(FilterBank::for_ratio(4).is_none());
    }

    #[test]
    fn all_ones_saturates_to_gain() {
        let bank = FilterBank::for_ratio(8).unwrap();
        let table = FilterTable::build(&bank, true);
        let history = vec![0xFFu8; table.len()];
        assert!((table.convolve(&history) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_bank_is_rejected() {
        assert!(FilterBank::new(Vec::new(), 0).is_err());
    }
}
