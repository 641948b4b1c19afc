//! Field-by-field serialization used by the container writers.

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t {
            #[inline]
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&self.to_le_bytes());
            }
        }
        impl WriteBytesBe for $t {
            #[inline]
            fn write_be(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&self.to_be_bytes());
            }
        }
    )+ }
}

impl_num!(u8, u16, i16, u32, i32, u64, f32, f64);

impl<T: WriteBytesLe, const N: usize> WriteBytesLe for [T; N] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

impl<T: WriteBytesBe, const N: usize> WriteBytesBe for [T; N] {
    #[inline]
    fn write_be(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_be(dst));
    }
}

/// Implements both traits for a `#[repr(u32)]` enum.
#[macro_export]
macro_rules! impl_u32_enum {
    ($t:ty) => {
        impl $crate::byteorder::WriteBytesLe for $t {
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as u32).to_le_bytes())
            }
        }
        impl $crate::byteorder::WriteBytesBe for $t {
            fn write_be(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as u32).to_be_bytes())
            }
        }
    };
}
