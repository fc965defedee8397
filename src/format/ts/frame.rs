//! Access unit packetization: codec framing, PES, TS packets.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

use super::packetizer::{into_transport_packets, packets_per_chunk, write_payload, Stuffing};
use super::pes::PESPacket;
use super::psi::Descriptor;
use super::registry::TableRegistry;
use super::types::*;
use crate::av::{CodecType, PacketKind, TransportPacket};
use crate::codec::aac::AacConfig;
use crate::codec::h26x::{leading_nal_type, ParameterSets};
use crate::codec::opus;
use crate::error::{Result, TsError};

/// Wraps one framed access unit into a PES and splits it across TS packets
/// on the codec's track.
fn packetize_unit(
    registry: &mut TableRegistry,
    codec: CodecType,
    per_chunk: usize,
    payload: Bytes,
    pts: Duration,
    is_key: bool,
) -> Result<Vec<TransportPacket>> {
    let pcr_pid = registry.pcr_pid();
    let track = registry
        .track_mut(codec)
        .ok_or_else(|| TsError::Config(format!("no {} track configured", codec)))?;
    let pid = track.pid();

    let field = AdaptationField {
        random_access: is_key,
        pcr: (pcr_pid == Some(pid)).then(|| time_to_pcr(pts)),
    };
    let first_field = (field.random_access || field.pcr.is_some()).then_some(field);

    let pes = PESPacket::new(stream_id(codec), payload).with_pts(pts).to_bytes();
    let mut buf = BytesMut::with_capacity((pes.len() / TS_PAYLOAD_SIZE + 2) * TS_PACKET_SIZE);
    write_payload(&mut buf, pid, &pes, first_field, Stuffing::AdaptationField, || {
        track.next_continuity()
    });
    Ok(into_transport_packets(buf.freeze(), per_chunk, PacketKind::MediaUnit, is_key))
}

fn check_not_empty(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(TsError::InvalidData("empty access unit".into()));
    }
    Ok(())
}

/// H.264/H.265 packetizer.
///
/// Parameter sets are cached and put in front of the first keyframe after
/// they change or after a reset, unless that keyframe already starts with
/// them.
#[derive(Debug)]
pub struct VideoPacketizer {
    codec: CodecType,
    per_chunk: usize,
    parameter_sets: Option<ParameterSets>,
    pending_parameter_sets: bool,
    repeat_parameter_sets: bool,
}

impl VideoPacketizer {
    pub fn new(codec: CodecType, max_payload_size: usize) -> Result<Self> {
        if !codec.is_video() {
            return Err(TsError::Config(format!("{} is not a video codec", codec)));
        }
        Ok(Self {
            codec,
            per_chunk: packets_per_chunk(max_payload_size)?,
            parameter_sets: None,
            pending_parameter_sets: false,
            repeat_parameter_sets: false,
        })
    }

    /// Prefix parameter sets on every keyframe instead of only after changes.
    pub fn with_repeated_parameter_sets(mut self, repeat: bool) -> Self {
        self.repeat_parameter_sets = repeat;
        self
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    pub fn set_parameter_sets(&mut self, sets: ParameterSets) -> Result<()> {
        if sets.codec() != self.codec {
            return Err(TsError::Config(format!(
                "parameter sets for {} given to a {} packetizer",
                sets.codec(),
                self.codec
            )));
        }
        if self.parameter_sets.as_ref() != Some(&sets) {
            self.parameter_sets = Some(sets);
            self.pending_parameter_sets = true;
        }
        Ok(())
    }

    pub fn packetize(
        &mut self,
        registry: &mut TableRegistry,
        data: &[u8],
        pts: Duration,
        is_key: bool,
    ) -> Result<Vec<TransportPacket>> {
        check_not_empty(data)?;
        let mut payload = BytesMut::with_capacity(data.len());
        let sets = self.parameter_sets.as_ref().filter(|_| is_key);
        if let Some(sets) = sets {
            let carries_sets = leading_nal_type(self.codec, data)
                .map(|nal| nal.is_parameter_set())
                .unwrap_or(false);
            if (self.pending_parameter_sets || self.repeat_parameter_sets) && !carries_sets {
                payload.put_slice(sets.as_bytes());
            }
        }
        let consumed_sets = sets.is_some();
        payload.put_slice(data);
        let packets = packetize_unit(registry, self.codec, self.per_chunk, payload.freeze(), pts, is_key)?;
        if consumed_sets {
            self.pending_parameter_sets = false;
        }
        Ok(packets)
    }

    /// Re-arms the parameter set prefix; `clear` also forgets the sets.
    pub fn reset(&mut self, clear: bool) {
        if clear {
            self.parameter_sets = None;
        }
        self.pending_parameter_sets = self.parameter_sets.is_some();
    }
}

#[derive(Debug)]
pub struct AacPacketizer {
    config: AacConfig,
    per_chunk: usize,
}

impl AacPacketizer {
    fn packetize(&self, registry: &mut TableRegistry, data: &[u8], pts: Duration) -> Result<Vec<TransportPacket>> {
        // encoders configured for ADTS output already carry the header
        let has_adts = data.len() >= 2 && data[0] == 0xff && data[1] & 0xf0 == 0xf0;
        let mut payload = BytesMut::with_capacity(data.len() + 7);
        if !has_adts {
            payload.put_slice(&self.config.adts_header(data.len())?);
        }
        payload.put_slice(data);
        packetize_unit(registry, CodecType::AAC, self.per_chunk, payload.freeze(), pts, false)
    }
}

#[derive(Debug)]
pub struct OpusPacketizer {
    channels: u8,
    per_chunk: usize,
}

impl OpusPacketizer {
    fn packetize(&self, registry: &mut TableRegistry, data: &[u8], pts: Duration) -> Result<Vec<TransportPacket>> {
        let header = opus::control_header(data.len());
        let mut payload = BytesMut::with_capacity(header.len() + data.len());
        payload.put_slice(&header);
        payload.put_slice(data);
        packetize_unit(registry, CodecType::OPUS, self.per_chunk, payload.freeze(), pts, false)
    }
}

/// Audio packetizer selected by codec.
#[derive(Debug)]
pub enum AudioPacketizer {
    Aac(AacPacketizer),
    Opus(OpusPacketizer),
}

impl AudioPacketizer {
    /// Packetizer with default stream parameters (44.1 kHz stereo).
    pub fn new(codec: CodecType, max_payload_size: usize) -> Result<Self> {
        Self::with_info(codec, 44100, true, max_payload_size)
    }

    pub fn with_info(codec: CodecType, sample_rate: u32, stereo: bool, max_payload_size: usize) -> Result<Self> {
        let per_chunk = packets_per_chunk(max_payload_size)?;
        match codec {
            CodecType::AAC => Ok(AudioPacketizer::Aac(AacPacketizer {
                config: AacConfig::new(sample_rate, stereo)?,
                per_chunk,
            })),
            CodecType::OPUS => Ok(AudioPacketizer::Opus(OpusPacketizer {
                channels: if stereo { 2 } else { 1 },
                per_chunk,
            })),
            other => Err(TsError::Config(format!("Unsupported codec: {}", other))),
        }
    }

    pub fn codec(&self) -> CodecType {
        match self {
            AudioPacketizer::Aac(_) => CodecType::AAC,
            AudioPacketizer::Opus(_) => CodecType::OPUS,
        }
    }

    /// ES descriptors the PMT must carry for this stream.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        match self {
            AudioPacketizer::Aac(_) => Vec::new(),
            AudioPacketizer::Opus(opus) => vec![
                Descriptor::new(DESCRIPTOR_REGISTRATION, *opus::OPUS_REGISTRATION),
                Descriptor::new(DESCRIPTOR_EXTENSION, vec![opus::OPUS_EXTENSION_TAG, opus.channels]),
            ],
        }
    }

    pub fn packetize(&mut self, registry: &mut TableRegistry, data: &[u8], pts: Duration) -> Result<Vec<TransportPacket>> {
        check_not_empty(data)?;
        match self {
            AudioPacketizer::Aac(aac) => aac.packetize(registry, data, pts),
            AudioPacketizer::Opus(opus) => opus.packetize(registry, data, pts),
        }
    }
}
