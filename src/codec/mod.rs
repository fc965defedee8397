//! Codec-specific framing applied before packetization.

/// ADTS headers for AAC
pub mod aac;
/// H.264/H.265 parameter sets and NAL helpers
pub mod h26x;
/// Opus control headers and descriptor constants
pub mod opus;

pub use aac::AacConfig;
pub use h26x::{NALUnitType, ParameterSets};
