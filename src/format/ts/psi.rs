//! PSI/SI section serialization: PAT, PMT and SDT.

use bytes::{BufMut, Bytes, BytesMut};

use super::types::*;
use crate::error::{Result, TsError};
use crate::utils::crc32_mpeg2;

/// Longest `section_length` a PAT/PMT/SDT may declare.
pub const MAX_SECTION_LENGTH: usize = 1021;

const SECTION_HEADER_SIZE: usize = 8;
const CRC_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

impl Descriptor {
    pub fn new(tag: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        2 + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag);
        buf.put_u8(self.data.len() as u8);
        buf.put_slice(&self.data);
    }
}

fn descriptors_len(descriptors: &[Descriptor]) -> usize {
    descriptors.iter().map(Descriptor::len).sum()
}

/// Wraps a table body into a long-form section with version and CRC.
///
/// `indicator_bits` are the four bits in front of `section_length`:
/// 0xB for PAT/PMT, 0xF for DVB tables such as the SDT.
fn write_section(
    table_id: u8,
    indicator_bits: u16,
    table_id_extension: u16,
    version: u8,
    body: &[u8],
) -> Result<Bytes> {
    let section_length = 5 + body.len() + CRC_SIZE;
    if section_length > MAX_SECTION_LENGTH {
        return Err(TsError::InvalidData(format!(
            "section 0x{:02x} too long: {} bytes",
            table_id, section_length
        )));
    }

    let mut buf = BytesMut::with_capacity(3 + section_length);
    buf.put_u8(table_id);
    buf.put_u16((indicator_bits << 12) | section_length as u16);
    buf.put_u16(table_id_extension);
    // reserved '11', version, current_next_indicator
    buf.put_u8(0xc0 | ((version & 0x1f) << 1) | 0x01);
    buf.put_u8(0); // section_number
    buf.put_u8(0); // last_section_number
    buf.put_slice(body);

    let crc = crc32_mpeg2(&buf);
    buf.put_u32(crc);
    Ok(buf.freeze())
}

/// Version field of a serialized section.
pub fn section_version(section: &[u8]) -> Option<u8> {
    section.get(5).map(|b| (b >> 1) & 0x1f)
}

/// Body of a serialized section, between the 8-byte header and the CRC.
pub fn section_body(section: &[u8]) -> Option<&[u8]> {
    if section.len() < SECTION_HEADER_SIZE + CRC_SIZE {
        return None;
    }
    section.get(SECTION_HEADER_SIZE..section.len() - CRC_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    pub program_map_pid: u16,
}

/// Program association table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub entries: Vec<PATEntry>,
}

impl PAT {
    pub fn to_section(&self, version: u8) -> Result<Bytes> {
        let mut body = BytesMut::with_capacity(self.entries.len() * 4);
        for entry in &self.entries {
            body.put_u16(entry.program_number);
            body.put_u16(0xe000 | (entry.program_map_pid & 0x1fff));
        }
        write_section(TABLE_ID_PAT, 0xb, self.transport_stream_id, version, &body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

/// Program map table for a single program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    pub fn to_section(&self, version: u8) -> Result<Bytes> {
        let mut body = BytesMut::new();
        body.put_u16(0xe000 | (self.pcr_pid & 0x1fff));

        body.put_u16(0xf000 | (descriptors_len(&self.program_descriptors) as u16 & 0x3ff));
        for desc in &self.program_descriptors {
            desc.write_to(&mut body);
        }

        for info in &self.elementary_stream_infos {
            body.put_u8(info.stream_type);
            body.put_u16(0xe000 | (info.elementary_pid & 0x1fff));
            body.put_u16(0xf000 | (descriptors_len(&info.descriptors) as u16 & 0x3ff));
            for desc in &info.descriptors {
                desc.write_to(&mut body);
            }
        }

        write_section(TABLE_ID_PMT, 0xb, self.program_number, version, &body)
    }
}

/// Name and provider of the single advertised service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_id: u16,
    pub provider: String,
    pub name: String,
}

impl ServiceInfo {
    fn service_descriptor(&self) -> Result<Descriptor> {
        let provider = self.provider.as_bytes();
        let name = self.name.as_bytes();
        let len = 3 + provider.len() + name.len();
        if len > u8::MAX as usize {
            return Err(TsError::Config(format!(
                "service provider and name too long: {} bytes",
                provider.len() + name.len()
            )));
        }
        let mut data = Vec::with_capacity(len);
        data.push(0x01); // digital television service
        data.push(provider.len() as u8);
        data.extend_from_slice(provider);
        data.push(name.len() as u8);
        data.extend_from_slice(name);
        Ok(Descriptor::new(DESCRIPTOR_SERVICE, data))
    }
}

/// Service description table (actual transport stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SDT {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: Vec<ServiceInfo>,
}

impl SDT {
    pub fn to_section(&self, version: u8) -> Result<Bytes> {
        let mut body = BytesMut::new();
        body.put_u16(self.original_network_id);
        body.put_u8(0xff); // reserved_future_use

        for service in &self.services {
            let descriptor = service.service_descriptor()?;
            body.put_u16(service.service_id);
            // reserved, no EIT schedule, no EIT present/following
            body.put_u8(0xfc);
            // running_status = 4 (running), free_CA_mode = 0
            body.put_u16(0x8000 | (descriptor.len() as u16 & 0x0fff));
            descriptor.write_to(&mut body);
        }

        write_section(TABLE_ID_SDT, 0xf, self.transport_stream_id, version, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pat_matches_captured_stream() {
        let pat = PAT {
            transport_stream_id: 1,
            entries: vec![PATEntry {
                program_number: 1,
                program_map_pid: 0x20,
            }],
        };
        let section = pat.to_section(0).unwrap();
        assert_eq!(
            section.as_ref(),
            &[
                0x00, 0xb0, 0x0d, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x01, 0xe0, 0x20, 0xa2, 0xc3,
                0x29, 0x41
            ]
        );
        assert_eq!(crc32_mpeg2(&section), 0);
    }

    #[test]
    fn test_pmt_layout() {
        let pmt = PMT {
            program_number: 1,
            pcr_pid: 0x100,
            program_descriptors: Vec::new(),
            elementary_stream_infos: vec![
                ElementaryStreamInfo {
                    stream_type: STREAM_TYPE_H264,
                    elementary_pid: 0x100,
                    descriptors: Vec::new(),
                },
                ElementaryStreamInfo {
                    stream_type: STREAM_TYPE_PRIVATE_PES,
                    elementary_pid: 0x101,
                    descriptors: vec![Descriptor::new(DESCRIPTOR_REGISTRATION, *b"Opus")],
                },
            ],
        };
        let section = pmt.to_section(3).unwrap();
        assert_eq!(section[0], TABLE_ID_PMT);
        assert_eq!(section_version(&section), Some(3));
        let body = section_body(&section).unwrap();
        assert_eq!(&body[..4], &[0xe1, 0x00, 0xf0, 0x00]);
        assert_eq!(&body[4..9], &[0x1b, 0xe1, 0x00, 0xf0, 0x00]);
        assert_eq!(&body[9..14], &[0x06, 0xe1, 0x01, 0xf0, 0x06]);
        assert_eq!(&body[14..], &[0x05, 0x04, b'O', b'p', b'u', b's']);
        assert_eq!(crc32_mpeg2(&section), 0);
    }

    #[test]
    fn test_sdt_service_descriptor() {
        let sdt = SDT {
            transport_stream_id: 1,
            original_network_id: 0xff01,
            services: vec![ServiceInfo {
                service_id: 1,
                provider: "ab".into(),
                name: "xyz".into(),
            }],
        };
        let section = sdt.to_section(31).unwrap();
        assert_eq!(section[0], TABLE_ID_SDT);
        assert_eq!(section[1] & 0xf0, 0xf0);
        assert_eq!(section_version(&section), Some(31));
        let body = section_body(&section).unwrap();
        assert_eq!(
            body,
            &[
                0xff, 0x01, 0xff, 0x00, 0x01, 0xfc, 0x80, 0x0a, 0x48, 0x08, 0x01, 0x02, b'a', b'b',
                0x03, b'x', b'y', b'z'
            ]
        );
    }

    #[test]
    fn test_oversized_service_name_rejected() {
        let sdt = SDT {
            transport_stream_id: 1,
            original_network_id: 1,
            services: vec![ServiceInfo {
                service_id: 1,
                provider: "p".repeat(200),
                name: "n".repeat(100),
            }],
        };
        assert!(sdt.to_section(0).is_err());
    }
}
