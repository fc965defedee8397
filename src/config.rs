use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::av::CodecType;
use crate::error::{Result, TsError};
use crate::format::ts::injection::{DEFAULT_DESCRIPTION_INTERVAL, DEFAULT_TABLE_INTERVAL};
use crate::format::ts::types::TS_PACKET_SIZE;

pub const DEFAULT_MTU: usize = 1500;
/// SRT data packet header.
pub const DEFAULT_TRANSPORT_HEADER_SIZE: usize = 16;
pub const DEFAULT_CACHE_SIZE: usize = 200;

/// Settings for a [`TsSender`](crate::sender::TsSender).
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    pub mtu: usize,
    /// Bytes the transport adds to every packet it sends.
    pub transport_header_size: usize,
    /// Queue capacity in entries (access units or table bursts).
    pub cache_size: usize,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub video_codec: CodecType,
    pub audio_codec: CodecType,
    /// PAT/PMT retransmission period.
    pub table_interval: Duration,
    /// SDT retransmission period.
    pub description_interval: Duration,
    /// Put parameter sets in front of every keyframe, not only after changes.
    pub repeat_parameter_sets: bool,
    pub logging: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            transport_header_size: DEFAULT_TRANSPORT_HEADER_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            video_enabled: true,
            audio_enabled: true,
            video_codec: CodecType::H264,
            audio_codec: CodecType::AAC,
            table_interval: DEFAULT_TABLE_INTERVAL,
            description_interval: DEFAULT_DESCRIPTION_INTERVAL,
            repeat_parameter_sets: false,
            logging: true,
        }
    }
}

impl SenderConfig {
    /// Defaults overlaid with `TSSEND_*` environment variables.
    ///
    /// Recognized: `TSSEND_MTU`, `TSSEND_CACHE_SIZE`, `TSSEND_VIDEO_CODEC`,
    /// `TSSEND_AUDIO_CODEC`, `TSSEND_LOGGING`. A variable that is set but
    /// does not parse is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(mtu) = parse_var(&lookup, "TSSEND_MTU")? {
            config.mtu = mtu;
        }
        if let Some(cache_size) = parse_var(&lookup, "TSSEND_CACHE_SIZE")? {
            config.cache_size = cache_size;
        }
        if let Some(codec) = parse_var(&lookup, "TSSEND_VIDEO_CODEC")? {
            config.video_codec = codec;
        }
        if let Some(codec) = parse_var(&lookup, "TSSEND_AUDIO_CODEC")? {
            config.audio_codec = codec;
        }
        if let Some(value) = lookup("TSSEND_LOGGING") {
            config.logging = parse_flag(&value)
                .ok_or_else(|| TsError::Config(format!("TSSEND_LOGGING: invalid flag {:?}", value)))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Bytes available for TS packets in one transport packet.
    pub fn max_payload_size(&self) -> usize {
        self.mtu.saturating_sub(self.transport_header_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size() < TS_PACKET_SIZE {
            return Err(TsError::Config(format!(
                "MTU {} with a {} byte header cannot carry a TS packet",
                self.mtu, self.transport_header_size
            )));
        }
        if self.cache_size == 0 {
            return Err(TsError::Config("cache size must be at least 1".into()));
        }
        if !self.video_codec.is_video() {
            return Err(TsError::Config(format!("{} is not a video codec", self.video_codec)));
        }
        if !self.audio_codec.is_audio() {
            return Err(TsError::Config(format!("{} is not an audio codec", self.audio_codec)));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| TsError::Config(format!("{}: {}", key, e)))
        })
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SenderConfig::default();
        assert_eq!(config.max_payload_size(), 1484);
        assert_eq!(config.max_payload_size() / TS_PACKET_SIZE, 7);
        assert!(config.validate().is_ok());
        assert_eq!(SenderConfig::from_lookup(lookup(&[])).unwrap(), config);
    }

    #[test]
    fn test_env_overlay() {
        let config = SenderConfig::from_lookup(lookup(&[
            ("TSSEND_MTU", "1316"),
            ("TSSEND_CACHE_SIZE", " 50 "),
            ("TSSEND_VIDEO_CODEC", "hevc"),
            ("TSSEND_AUDIO_CODEC", "Opus"),
            ("TSSEND_LOGGING", "off"),
        ]))
        .unwrap();
        assert_eq!(config.mtu, 1316);
        assert_eq!(config.cache_size, 50);
        assert_eq!(config.video_codec, CodecType::H265);
        assert_eq!(config.audio_codec, CodecType::OPUS);
        assert!(!config.logging);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for vars in [
            [("TSSEND_MTU", "big")],
            [("TSSEND_MTU", "100")],
            [("TSSEND_CACHE_SIZE", "0")],
            [("TSSEND_VIDEO_CODEC", "aac")],
            [("TSSEND_AUDIO_CODEC", "vp9")],
            [("TSSEND_LOGGING", "maybe")],
        ] {
            let err = SenderConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(err.is_config(), "{:?} should fail", vars);
        }
    }
}
