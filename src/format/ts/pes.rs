use super::types::{time_to_pts, STREAM_ID_VIDEO};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Fixed part of a PES header: start code, stream id, length, two flag bytes
/// and the header data length.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Packetized Elementary Stream (PES) header.
///
/// Only the fields the sender emits are modelled: the PTS and the data
/// alignment flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/private)
    pub stream_id: u8,
    /// Set when the payload starts with an access unit
    pub data_alignment: bool,
    /// Presentation Time Stamp in 90 kHz ticks (33 bits)
    pub pts: Option<u64>,
}

impl PESHeader {
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            data_alignment: true,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(time_to_pts(pts));
        self
    }

    /// Bytes of optional header data following the fixed part.
    pub fn header_data_len(&self) -> usize {
        if self.pts.is_some() {
            5
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_len()
    }

    /// Writes the header for a payload of `payload_len` bytes.
    ///
    /// Video PES whose length overflows 16 bits are written unbounded
    /// (length 0), which H.222.0 allows only for video streams.
    pub fn write_to(&self, buf: &mut BytesMut, payload_len: usize) {
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);

        let packet_length = 3 + self.header_data_len() + payload_len;
        if packet_length > u16::MAX as usize || self.stream_id == STREAM_ID_VIDEO {
            buf.put_u16(0);
        } else {
            buf.put_u16(packet_length as u16);
        }

        // '10' marker, no scrambling, priority, copyright or original flags
        let mut flags = 0x80u8;
        if self.data_alignment {
            flags |= 0x04;
        }
        buf.put_u8(flags);

        // PTS only, never a DTS
        buf.put_u8(if self.pts.is_some() { 0x80 } else { 0x00 });
        buf.put_u8(self.header_data_len() as u8);

        if let Some(pts) = self.pts {
            write_timestamp(buf, 0x20, pts);
        }
    }
}

/// A complete PES packet ready to be split into TS packets.
#[derive(Debug, Clone)]
pub struct PESPacket {
    pub header: PESHeader,
    pub payload: Bytes,
}

impl PESPacket {
    pub fn new(stream_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            header: PESHeader::new(stream_id),
            payload: payload.into(),
        }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.header = self.header.with_pts(pts);
        self
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.header.write_to(&mut buf, self.payload.len());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF;
    buf.put_u8(marker | ((ts >> 29) & 0x0e) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xfffe) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xfffe) | 0x01) as u16);
}

/// Splits a serialized PES packet into its header and payload, returning the
/// payload. Used to check reassembly of packetized units.
pub fn pes_payload(pes: &[u8]) -> Option<&[u8]> {
    if pes.len() < PES_FIXED_HEADER_SIZE || pes[..3] != [0x00, 0x00, 0x01] {
        return None;
    }
    let start = PES_FIXED_HEADER_SIZE + pes[8] as usize;
    pes.get(start..)
}
