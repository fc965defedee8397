//! Opus access units as carried in MPEG-TS (ETSI TS 102 366 style mapping).

/// Registration descriptor format identifier.
pub const OPUS_REGISTRATION: &[u8; 4] = b"Opus";

/// DVB extension descriptor tag value for the Opus audio descriptor.
pub const OPUS_EXTENSION_TAG: u8 = 0x80;

/// Control header placed in front of every Opus packet.
///
/// 11-bit prefix 0x3FF, no trim flags, no control extension, then the packet
/// size coded as a run of 0xFF bytes plus a final remainder byte.
pub fn control_header(payload_len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(3 + payload_len / 255);
    header.push(0x7F);
    header.push(0xE0);
    header.extend(std::iter::repeat(0xFF).take(payload_len / 255));
    header.push((payload_len % 255) as u8);
    header
}
