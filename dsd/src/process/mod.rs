/// FIR decimation of the one bit stream to multi-bit PCM.
///
/// Provides the [`Decimator`](decimate::Decimator), which convolves the
/// sliding window of a [`SampleSource`](crate::source::SampleSource) with a
/// byte lookup table and emits integer or float samples.
pub mod decimate;

/// DSD over PCM framing.
///
/// Provides the [`DopPacker`](dop::DopPacker), which packs raw DSD bytes
/// into 24-bit PCM words behind alternating DoP markers.
pub mod dop;
