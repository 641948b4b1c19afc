//! Interleaved sample blocks and their on-disk packing.

/// Sample encoding of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed integer, 16, 24 or 32 bits.
    Int(u32),
    /// IEEE 754 single precision.
    Float,
}

impl SampleFormat {
    pub fn bits(self) -> u32 {
        match self {
            SampleFormat::Int(bits) => bits,
            SampleFormat::Float => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// A block of interleaved frames as produced by the converters.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    /// Integer samples right-aligned in 32 bits.
    Int(&'a [i32]),
    Float(&'a [f32]),
}

/// Appends `samples` to `dst` in the layout of `format`.
///
/// Integer samples keep their low `format.bytes()` bytes.
pub fn pack(samples: Samples, format: SampleFormat, order: Endianness, dst: &mut Vec<u8>) {
    match samples {
        Samples::Int(values) => {
            let width = format.bytes();
            dst.reserve(values.len() * width);
            for &v in values {
                match order {
                    Endianness::Big => dst.extend_from_slice(&v.to_be_bytes()[4 - width..]),
                    Endianness::Little => dst.extend_from_slice(&v.to_le_bytes()[..width]),
                }
            }
        }
        Samples::Float(values) => {
            dst.reserve(values.len() * 4);
            for &v in values {
                match order {
                    Endianness::Big => dst.extend_from_slice(&v.to_be_bytes()),
                    Endianness::Little => dst.extend_from_slice(&v.to_le_bytes()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_keep_low_bytes() {
        let mut be = Vec::new();
        pack(
            Samples::Int(&[0x123456, -1]),
            SampleFormat::Int(24),
            Endianness::Big,
            &mut be,
        );
        assert_eq!(be, [0x12, 0x34, 0x56, 0xFF, 0xFF, 0xFF]);

        let mut le = Vec::new();
        pack(
            Samples::Int(&[0x1234, -2]),
            SampleFormat::Int(16),
            Endianness::Little,
            &mut le,
        );
        assert_eq!(le, [0x34, 0x12, 0xFE, 0xFF]);
    }

    #[test]
    fn floats_are_four_bytes() {
        let mut out = Vec::new();
        pack(
            Samples::Float(&[1.0, -0.5]),
            SampleFormat::Float,
            Endianness::Big,
            &mut out,
        );
        assert_eq!(out, [0x3F, 0x80, 0x00, 0x00, 0xBF, 0x00, 0x00, 0x00]);
    }
}
