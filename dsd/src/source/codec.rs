//! Boundary to an external DST frame decoder.

use anyhow::Result;

/// Decodes one compressed DST frame into raw DSD bytes.
///
/// Implementations are supplied by the caller; the reader owns the codec for
/// its whole lifetime and calls [`FrameCodec::close`] exactly once on drop.
pub trait FrameCodec {
    /// Prepares the codec for `channels` channels at `ratio` times 44.1 kHz.
    fn init(&mut self, channels: usize, ratio: u32) -> Result<()>;

    /// Decodes `frame` into `out`, which holds `channels * frame_bytes`
    /// channel-interleaved bytes.
    fn decode(&mut self, frame: &[u8], out: &mut [u8], frame_count_hint: u32) -> Result<()>;

    fn close(&mut self) {}
}
