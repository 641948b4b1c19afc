#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! A DSD stream is a single bit per sample at 64 or more times 44.1 kHz.
//! Both containers store it as bytes holding eight consecutive samples;
//! DSF puts the earliest sample in bit 0, DSDIFF in bit 7.
//!
//! ### Sample Window
//!
//! Every reader implements [`source::SampleSource`]. Each step pushes one
//! byte per channel onto a sliding window, newest first, and the processors
//! below read that window directly.
//!
//! ### Decimation
//!
//! Convolving a one bit signal only ever adds or subtracts coefficients, so
//! each group of eight taps collapses into a 256 entry table indexed by the
//! raw byte. One output sample costs one table lookup per eight taps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dsd::process::decimate::Decimator;
//! use dsd::source::{self, ReaderOptions, SampleSource};
//!
//! let mut reader = source::open("input.dsf", ReaderOptions::default())?;
//! let channels = reader.channel_count();
//!
//! let mut decimator = Decimator::new(&mut reader, 352_800)?;
//! let mut pcm = vec![0i32; 1024 * channels];
//!
//! // 24-bit output with TPDF dither
//! let scale = (1i64 << 23) as f64;
//! decimator.fill_samples(&mut pcm, scale, 1.0, scale - 1.0);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Conversion of the sample window.
///
/// 1. **Decimation** ([`process::decimate`]): FIR low-pass and downsampling to PCM.
/// 2. **DoP** ([`process::dop`]): DSD over PCM framing.
pub mod process;

/// Container readers behind a common sample window.
///
/// - **Sources** ([`source::SampleSource`]): Capability set shared by all readers
/// - **DSF** ([`source::dsf`]): Flat little-endian container
/// - **DSDIFF** ([`source::dff`]): Recursive big-endian container
/// - **Codec** ([`source::codec`]): DST frame decoder boundary
pub mod source;

/// Data structures representing container and filter components.
///
/// - **Chunks** ([`structs::chunk`]): Chunk headers and identifiers
/// - **Markers** ([`structs::marker`]): Track markers and derived tracks
/// - **Comments** ([`structs::comment`]): DSDIFF comments
/// - **Tags** ([`structs::tags`]): ID3v2 tag fields
/// - **Filters** ([`structs::filter`]): Filter banks and byte lookup tables
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Reader** ([`utils::reader`]): Endian-aware primitive reads
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Dithering** ([`utils::dither`]): TPDF noise
pub mod utils;
