use bytes::{BufMut, BytesMut};
use std::time::Duration;

use crate::av::CodecType;

// Stream IDs
pub const STREAM_ID_VIDEO: u8 = 0xe0;
pub const STREAM_ID_AUDIO: u8 = 0xc0;
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_SDT: u16 = 0x0011;
pub const PID_PMT: u16 = 0x1000;
pub const PID_FIRST_ELEMENTARY: u16 = 0x0100;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_SDT: u8 = 0x42;

// Elementary Stream Types
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;

// Descriptor tags
pub const DESCRIPTOR_REGISTRATION: u8 = 0x05;
pub const DESCRIPTOR_SERVICE: u8 = 0x48;
pub const DESCRIPTOR_EXTENSION: u8 = 0x7f;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;

const PTS_MASK: u64 = 0x1_FFFF_FFFF;

/// PMT stream type for a codec, `None` when TS has no mapping for it.
pub fn stream_type(codec: CodecType) -> Option<u8> {
    match codec {
        CodecType::H264 => Some(STREAM_TYPE_H264),
        CodecType::H265 => Some(STREAM_TYPE_H265),
        CodecType::AAC => Some(STREAM_TYPE_AAC),
        CodecType::OPUS => Some(STREAM_TYPE_PRIVATE_PES),
        CodecType::G711 => None,
    }
}

/// PES stream_id for a codec.
pub fn stream_id(codec: CodecType) -> u8 {
    match codec {
        CodecType::H264 | CodecType::H265 => STREAM_ID_VIDEO,
        CodecType::OPUS => STREAM_ID_PRIVATE_1,
        _ => STREAM_ID_AUDIO,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TSHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(TS_SYNC_BYTE);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = (self.scrambling_control & 0x03) << 6;
        if self.adaptation_field_exists {
            b3 |= 0x20;
        }
        if self.contains_payload {
            b3 |= 0x10;
        }
        b3 |= self.continuity_counter & 0x0f;
        buf.put_u8(b3);
    }

    /// Parses the 4-byte header of a TS packet.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < TS_HEADER_SIZE || data[0] != TS_SYNC_BYTE {
            return None;
        }
        Some(Self {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            transport_priority: data[1] & 0x20 != 0,
            pid: (((data[1] & 0x1f) as u16) << 8) | data[2] as u16,
            scrambling_control: data[3] >> 6,
            adaptation_field_exists: data[3] & 0x20 != 0,
            contains_payload: data[3] & 0x10 != 0,
            continuity_counter: data[3] & 0x0f,
        })
    }
}

/// Flags carried in the adaptation field of a media packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationField {
    pub random_access: bool,
    /// Program clock reference in 27 MHz ticks.
    pub pcr: Option<u64>,
}

impl AdaptationField {
    /// Bytes needed before stuffing: length byte, flags, optional PCR.
    pub fn min_len(&self) -> usize {
        2 + if self.pcr.is_some() { 6 } else { 0 }
    }

    /// Writes an adaptation field of exactly `total` bytes, length byte
    /// included, padding with 0xFF. A pure stuffing field of one byte is a
    /// lone zero length byte.
    pub fn write_to(field: Option<&AdaptationField>, total: usize, buf: &mut BytesMut) {
        buf.put_u8((total - 1) as u8);
        if total == 1 {
            return;
        }
        let field = field.copied().unwrap_or_default();
        let mut flags = 0u8;
        if field.random_access {
            flags |= 0x40;
        }
        if field.pcr.is_some() {
            flags |= 0x10;
        }
        buf.put_u8(flags);
        let mut written = 2;
        if let Some(pcr) = field.pcr {
            write_pcr(buf, pcr);
            written += 6;
        }
        buf.put_bytes(0xff, total - written);
    }
}

fn write_pcr(buf: &mut BytesMut, pcr: u64) {
    let base = (pcr / 300) & PTS_MASK;
    let ext = pcr % 300;
    buf.put_u32((base >> 1) as u32);
    buf.put_u8((((base & 0x01) << 7) as u8) | 0x7e | ((ext >> 8) as u8 & 0x01));
    buf.put_u8(ext as u8);
}

/// Presentation time in 90 kHz ticks, wrapped to 33 bits.
pub fn time_to_pts(time: Duration) -> u64 {
    (time.as_micros() * PTS_HZ as u128 / 1_000_000) as u64 & PTS_MASK
}

/// Program clock in 27 MHz ticks.
pub fn time_to_pcr(time: Duration) -> u64 {
    time_to_pts(time) * (PCR_HZ / PTS_HZ)
}
