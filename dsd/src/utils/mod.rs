//! Utility functions and supporting infrastructure.
//!
//! Provides endian-aware binary reads, error types, and the dither
//! generator used during PCM quantization.

pub mod dither;
pub mod errors;
pub mod reader;
