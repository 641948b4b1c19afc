//! Data structures representing container and filter components.
//!
//! Contains chunk headers, track markers, comments and tags parsed from the
//! containers, along with the filter banks and lookup tables used by the
//! decimator.

pub mod chunk;
pub mod comment;
pub mod filter;
pub mod marker;
pub mod tags;
