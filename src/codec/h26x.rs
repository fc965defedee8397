//! H.264/H.265 parameter sets and NAL inspection.

use bytes::{BufMut, Bytes, BytesMut};

use crate::av::CodecType;
use crate::error::{Result, TsError};

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    Slice,
    Idr,
    Vps,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl NALUnitType {
    /// Reads the type from the first byte(s) of a NAL header.
    pub fn parse(codec: CodecType, header: u8) -> Self {
        match codec {
            CodecType::H265 => match (header >> 1) & 0x3F {
                0..=9 => NALUnitType::Slice,
                16..=21 => NALUnitType::Idr,
                32 => NALUnitType::Vps,
                33 => NALUnitType::Sps,
                34 => NALUnitType::Pps,
                35 => NALUnitType::AccessUnitDelimiter,
                other => NALUnitType::Other(other),
            },
            _ => match header & 0x1F {
                1 => NALUnitType::Slice,
                5 => NALUnitType::Idr,
                7 => NALUnitType::Sps,
                8 => NALUnitType::Pps,
                9 => NALUnitType::AccessUnitDelimiter,
                other => NALUnitType::Other(other),
            },
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NALUnitType::Vps | NALUnitType::Sps | NALUnitType::Pps)
    }
}

/// Length of the Annex-B start code at the front of `data`, if any.
fn start_code_len(data: &[u8]) -> Option<usize> {
    if data.starts_with(&START_CODE) {
        Some(4)
    } else if data.starts_with(&START_CODE[1..]) {
        Some(3)
    } else {
        None
    }
}

/// Type of the first NAL unit in an Annex-B buffer.
pub fn first_nal_type(codec: CodecType, data: &[u8]) -> Option<NALUnitType> {
    let offset = start_code_len(data)?;
    data.get(offset).map(|&b| NALUnitType::parse(codec, b))
}

/// Type of the first NAL unit that is not an access unit delimiter.
pub fn leading_nal_type(codec: CodecType, data: &[u8]) -> Option<NALUnitType> {
    let nal = first_nal_type(codec, data)?;
    if nal != NALUnitType::AccessUnitDelimiter {
        return Some(nal);
    }
    let offset = start_code_len(data)?;
    let next = data[offset..].windows(3).position(|w| w == [0, 0, 1])? + offset;
    data.get(next + 3).map(|&b| NALUnitType::parse(codec, b))
}

fn push_annexb(buf: &mut BytesMut, nal: &[u8]) {
    if start_code_len(nal).is_none() {
        buf.put_slice(&START_CODE);
    }
    buf.put_slice(nal);
}

/// Codec configuration prepended to keyframes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    codec: CodecType,
    annexb: Bytes,
}

impl ParameterSets {
    /// Validates the sets required by `codec` and joins them in VPS, SPS, PPS
    /// order, adding start codes where missing.
    pub fn new(codec: CodecType, sps: &[u8], pps: Option<&[u8]>, vps: Option<&[u8]>) -> Result<Self> {
        if sps.is_empty() {
            return Err(TsError::Config("empty SPS".into()));
        }
        let pps = pps.filter(|p| !p.is_empty());
        let vps = vps.filter(|v| !v.is_empty());
        let mut buf = BytesMut::new();
        match codec {
            CodecType::H264 => {
                let pps = pps.ok_or_else(|| TsError::Config("H264 requires a PPS".into()))?;
                push_annexb(&mut buf, sps);
                push_annexb(&mut buf, pps);
            }
            CodecType::H265 => {
                let (vps, pps) = vps
                    .zip(pps)
                    .ok_or_else(|| TsError::Config("H265 requires a VPS and a PPS".into()))?;
                push_annexb(&mut buf, vps);
                push_annexb(&mut buf, sps);
                push_annexb(&mut buf, pps);
            }
            other => {
                return Err(TsError::Config(format!(
                    "{} is not a video codec",
                    other
                )))
            }
        }
        Ok(Self {
            codec,
            annexb: buf.freeze(),
        })
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.annexb
    }
}
