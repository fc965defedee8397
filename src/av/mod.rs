use std::fmt;
use std::str::FromStr;

use crate::error::TsError;

/// Elementary stream codecs the sender knows about.
///
/// `G711` exists so configuration can name it; no packetizer accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    H264,
    H265,
    AAC,
    OPUS,
    G711,
}

impl CodecType {
    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::H264 | CodecType::H265)
    }

    pub fn is_audio(&self) -> bool {
        !self.is_video()
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecType::H264 => "H264",
            CodecType::H265 => "H265",
            CodecType::AAC => "AAC",
            CodecType::OPUS => "OPUS",
            CodecType::G711 => "G711",
        };
        f.write_str(name)
    }
}

impl FromStr for CodecType {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(CodecType::H264),
            "h265" | "hevc" => Ok(CodecType::H265),
            "aac" => Ok(CodecType::AAC),
            "opus" => Ok(CodecType::OPUS),
            "g711" | "pcma" | "pcmu" => Ok(CodecType::G711),
            other => Err(TsError::Config(format!("unknown codec: {}", other))),
        }
    }
}

mod packet;
pub use packet::*;
