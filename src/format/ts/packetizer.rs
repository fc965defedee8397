//! Fixed-size TS packet writing and grouping into transport packets.

use bytes::{BufMut, Bytes, BytesMut};

use super::registry::TableId;
use super::types::*;
use crate::av::{PacketKind, PacketPosition, TransportPacket};
use crate::error::{Result, TsError};

/// How the last packet of a payload is filled up to 188 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stuffing {
    /// Grow the adaptation field (PES data).
    AdaptationField,
    /// Append 0xFF after the data (PSI sections).
    Payload,
}

/// Number of whole TS packets that fit into one transport packet.
pub fn packets_per_chunk(max_payload_size: usize) -> Result<usize> {
    match max_payload_size / TS_PACKET_SIZE {
        0 => Err(TsError::Config(format!(
            "max payload size {} cannot hold a {} byte TS packet",
            max_payload_size, TS_PACKET_SIZE
        ))),
        n => Ok(n),
    }
}

/// Writes `payload` as consecutive TS packets on `pid` and returns how many
/// were written.
///
/// The first packet carries the unit start flag and `first_field`.
/// `continuity` is called once per packet for the counter to stamp.
pub fn write_payload(
    buf: &mut BytesMut,
    pid: u16,
    payload: &[u8],
    first_field: Option<AdaptationField>,
    stuffing: Stuffing,
    mut continuity: impl FnMut() -> u8,
) -> usize {
    let mut offset = 0;
    let mut count = 0;
    loop {
        let field = if count == 0 { first_field } else { None };
        let field_len = field.as_ref().map(AdaptationField::min_len).unwrap_or(0);
        let room = TS_PAYLOAD_SIZE - field_len;
        let take = (payload.len() - offset).min(room);
        let padding = room - take;

        let af_total = match stuffing {
            Stuffing::AdaptationField => field_len + padding,
            Stuffing::Payload => field_len,
        };

        let header = TSHeader {
            payload_unit_start: count == 0,
            pid,
            adaptation_field_exists: af_total > 0,
            continuity_counter: continuity(),
            ..Default::default()
        };
        header.write_to(buf);
        if af_total > 0 {
            AdaptationField::write_to(field.as_ref(), af_total, buf);
        }
        buf.put_slice(&payload[offset..offset + take]);
        if stuffing == Stuffing::Payload {
            buf.put_bytes(0xff, padding);
        }

        offset += take;
        count += 1;
        if offset >= payload.len() {
            return count;
        }
    }
}

/// Groups consecutive TS packets into transport packets of at most
/// `per_chunk` TS packets each.
///
/// Media chunks are positioned Start/Middle/End (or Single); every metadata
/// chunk stands alone.
pub fn into_transport_packets(
    mut data: Bytes,
    per_chunk: usize,
    kind: PacketKind,
    is_key: bool,
) -> Vec<TransportPacket> {
    let chunk_size = per_chunk * TS_PACKET_SIZE;
    let count = data.len().div_ceil(chunk_size);
    let mut packets = Vec::with_capacity(count);
    for index in 0..count {
        let take = data.len().min(chunk_size);
        let position = match kind {
            PacketKind::MediaUnit => PacketPosition::of(index, count),
            PacketKind::Metadata => PacketPosition::Single,
        };
        packets.push(TransportPacket::new(data.split_to(take), kind, position).with_key_flag(is_key));
    }
    packets
}

/// Saved table PID counters, see [`TablePacketizer::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableContinuity {
    association: u8,
    map: u8,
    description: u8,
}

/// Serializes PSI sections into TS packets.
///
/// Continuity is kept per table PID, independent of the media PIDs. The
/// counter holds the value last stamped on that PID: a burst written with
/// `increase_continuity` advances it first, one written without reuses it
/// for the first packet of each section.
#[derive(Debug)]
pub struct TablePacketizer {
    per_chunk: usize,
    association: u8,
    map: u8,
    description: u8,
}

impl TablePacketizer {
    pub fn new(max_payload_size: usize) -> Result<Self> {
        Ok(Self {
            per_chunk: packets_per_chunk(max_payload_size)?,
            association: 0,
            map: 0,
            description: 0,
        })
    }

    pub fn continuity(&self, table: TableId) -> u8 {
        match table {
            TableId::Association => self.association,
            TableId::Map => self.map,
            TableId::Description => self.description,
        }
    }

    fn counter_mut(&mut self, table: TableId) -> &mut u8 {
        match table {
            TableId::Association => &mut self.association,
            TableId::Map => &mut self.map,
            TableId::Description => &mut self.description,
        }
    }

    pub fn write(&mut self, tables: &[(TableId, Bytes)], increase_continuity: bool) -> Vec<TransportPacket> {
        let mut buf = BytesMut::new();
        for (table, section) in tables {
            let counter = self.counter_mut(*table);
            if increase_continuity {
                *counter = (*counter + 1) & 0x0f;
            }
            let mut section_with_pointer = BytesMut::with_capacity(section.len() + 1);
            section_with_pointer.put_u8(0); // pointer_field
            section_with_pointer.put_slice(section);

            let mut first = true;
            write_payload(
                &mut buf,
                table.pid(),
                &section_with_pointer,
                None,
                Stuffing::Payload,
                || {
                    if !first {
                        *counter = (*counter + 1) & 0x0f;
                    }
                    first = false;
                    *counter
                },
            );
        }
        into_transport_packets(buf.freeze(), self.per_chunk, PacketKind::Metadata, false)
    }

    /// Current counters, to be put back with [`restore`](Self::restore)
    /// when a written burst never reaches the wire.
    pub fn snapshot(&self) -> TableContinuity {
        TableContinuity {
            association: self.association,
            map: self.map,
            description: self.description,
        }
    }

    pub fn restore(&mut self, state: TableContinuity) {
        self.association = state.association;
        self.map = state.map;
        self.description = state.description;
    }

    pub fn reset(&mut self) {
        self.association = 0;
        self.map = 0;
        self.description = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(data: &[u8]) -> Vec<TSHeader> {
        data.chunks(TS_PACKET_SIZE)
            .map(|p| TSHeader::parse(p).unwrap())
            .collect()
    }

    #[test]
    fn test_packets_per_chunk() {
        assert_eq!(packets_per_chunk(1500 - 16).unwrap(), 7);
        assert_eq!(packets_per_chunk(188).unwrap(), 1);
        assert!(packets_per_chunk(187).unwrap_err().is_config());
    }

    #[test]
    fn test_short_payload_is_stuffed_in_adaptation_field() {
        let mut buf = BytesMut::new();
        let mut cc = 0u8;
        let written = write_payload(&mut buf, 0x100, &[1, 2, 3], None, Stuffing::AdaptationField, || {
            cc += 1;
            cc
        });
        assert_eq!(written, 1);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        let header = TSHeader::parse(&buf).unwrap();
        assert!(header.payload_unit_start);
        assert!(header.adaptation_field_exists);
        assert_eq!(header.continuity_counter, 1);
        assert_eq!(buf[4] as usize, TS_PAYLOAD_SIZE - 3 - 1);
        assert_eq!(&buf[185..], &[1, 2, 3]);
    }

    #[test]
    fn test_one_byte_of_stuffing() {
        let payload = vec![0xab; TS_PAYLOAD_SIZE - 1];
        let mut buf = BytesMut::new();
        write_payload(&mut buf, 0x100, &payload, None, Stuffing::AdaptationField, || 0);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(buf[4], 0);
        assert_eq!(&buf[5..], &payload[..]);
    }

    #[test]
    fn test_multi_packet_payload() {
        let payload = vec![0x11; TS_PAYLOAD_SIZE * 2 + 10];
        let field = AdaptationField {
            random_access: true,
            pcr: Some(0),
        };
        let mut buf = BytesMut::new();
        let mut cc = 0u8;
        let written = write_payload(&mut buf, 0x101, &payload, Some(field), Stuffing::AdaptationField, || {
            let current = cc;
            cc = (cc + 1) & 0x0f;
            current
        });
        assert_eq!(written, 3);
        let headers = headers(&buf);
        assert_eq!(
            headers.iter().map(|h| h.continuity_counter).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(headers[0].payload_unit_start && !headers[1].payload_unit_start);
        assert!(headers[0].adaptation_field_exists);
        assert!(!headers[1].adaptation_field_exists);
        assert!(headers[2].adaptation_field_exists);
    }

    #[test]
    fn test_transport_packet_grouping() {
        let data = Bytes::from(vec![0u8; TS_PACKET_SIZE * 15]);
        let packets = into_transport_packets(data, 7, PacketKind::MediaUnit, true);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].len(), 7 * TS_PACKET_SIZE);
        assert_eq!(packets[2].len(), TS_PACKET_SIZE);
        assert_eq!(
            packets.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![PacketPosition::Start, PacketPosition::Middle, PacketPosition::End]
        );
        assert!(packets.iter().all(|p| p.is_key));
    }

    #[test]
    fn test_table_continuity_flag() {
        let mut packetizer = TablePacketizer::new(1316).unwrap();
        let pat = Bytes::from_static(&[0x00, 0xb0, 0x0d, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x01, 0xe0, 0x20, 0xa2, 0xc3, 0x29, 0x41]);
        let tables = [(TableId::Association, pat.clone())];

        let initial = packetizer.write(&tables, false);
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].kind, PacketKind::Metadata);
        assert_eq!(initial[0].position, PacketPosition::Single);
        assert_eq!(headers(&initial[0].data)[0].continuity_counter, 0);

        // same logical burst again without advancing
        let repeated = packetizer.write(&tables, false);
        assert_eq!(repeated[0].data, initial[0].data);

        let injected = packetizer.write(&tables, true);
        assert_eq!(headers(&injected[0].data)[0].continuity_counter, 1);
        assert_eq!(packetizer.continuity(TableId::Association), 1);
        assert_eq!(packetizer.continuity(TableId::Map), 0);

        // pointer field then the section, then 0xff fill
        let packet = &injected[0].data;
        assert_eq!(packet[4], 0);
        assert_eq!(&packet[5..5 + pat.len()], pat.as_ref());
        assert!(packet[5 + pat.len()..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_restore_rewinds_discarded_burst() {
        let mut packetizer = TablePacketizer::new(1316).unwrap();
        let section = Bytes::from_static(&[0x00, 0xb0, 0x05]);
        let tables = [(TableId::Association, section.clone()), (TableId::Map, section)];
        packetizer.write(&tables, false);

        let saved = packetizer.snapshot();
        packetizer.write(&tables, true);
        assert_eq!(packetizer.continuity(TableId::Map), 1);
        packetizer.restore(saved);
        assert_eq!(packetizer.snapshot(), saved);

        let resent = packetizer.write(&tables, true);
        let counters: Vec<u8> = headers(&resent[0].data).iter().map(|h| h.continuity_counter).collect();
        assert_eq!(counters, vec![1, 1]);
    }

    #[test]
    fn test_table_burst_chunking() {
        let mut packetizer = TablePacketizer::new(2 * TS_PACKET_SIZE).unwrap();
        let section = Bytes::from_static(&[0x42, 0xf0, 0x05]);
        let tables = [
            (TableId::Association, section.clone()),
            (TableId::Map, section.clone()),
            (TableId::Description, section),
        ];
        let packets = packetizer.write(&tables, true);
        assert_eq!(packets.len(), 2);
        let pids: Vec<u16> = packets
            .iter()
            .flat_map(|p| headers(&p.data))
            .map(|h| h.pid)
            .collect();
        assert_eq!(pids, vec![PID_PAT, PID_PMT, PID_SDT]);
    }
}
