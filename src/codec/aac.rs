//! ADTS framing for raw AAC access units.
//!
//! Encoders hand out raw AAC frames; a TS stream of type 0x0F expects every
//! frame to be preceded by a 7-byte ADTS header.

use crate::error::{Result, TsError};

pub const ADTS_HEADER_SIZE: usize = 7;

/// Largest ADTS frame (header included) expressible in 13 bits.
pub const ADTS_MAX_FRAME_SIZE: usize = 0x1FFF;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Main = 0,
    LC = 1,
    SSR = 2,
    LTP = 3,
}

/// Stream parameters needed to write ADTS headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacConfig {
    pub profile: ProfileType,
    pub sample_rate_index: u8,
    pub channel_configuration: u8,
}

impl Default for AacConfig {
    fn default() -> Self {
        Self {
            profile: ProfileType::LC,
            sample_rate_index: 4, // 44100 Hz
            channel_configuration: 2,
        }
    }
}

impl AacConfig {
    /// Builds an LC config; fails for sample rates ADTS cannot signal.
    pub fn new(sample_rate: u32, stereo: bool) -> Result<Self> {
        let index = SAMPLE_RATES
            .iter()
            .position(|&rate| rate == sample_rate)
            .ok_or_else(|| {
                TsError::Config(format!("unsupported AAC sample rate: {}", sample_rate))
            })?;
        Ok(Self {
            profile: ProfileType::LC,
            sample_rate_index: index as u8,
            channel_configuration: if stereo { 2 } else { 1 },
        })
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[self.sample_rate_index as usize]
    }

    /// ADTS header for a raw frame of `payload_len` bytes (MPEG-4, no CRC).
    pub fn adts_header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_SIZE]> {
        let frame_len = payload_len + ADTS_HEADER_SIZE;
        if frame_len > ADTS_MAX_FRAME_SIZE {
            return Err(TsError::Codec(format!(
                "AAC frame too large for ADTS: {} bytes",
                payload_len
            )));
        }
        let channels = self.channel_configuration;
        Ok([
            0xFF,
            0xF1,
            ((self.profile as u8) << 6) | (self.sample_rate_index << 2) | ((channels >> 2) & 0x01),
            ((channels & 0x03) << 6) | ((frame_len >> 11) as u8 & 0x03),
            (frame_len >> 3) as u8,
            ((frame_len as u8 & 0x07) << 5) | 0x1F,
            0xFC,
        ])
    }
}
