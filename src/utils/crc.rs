/// CRC32 as used by MPEG-2 PSI sections (ITU-T H.222.0 annex A).
///
/// Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final
/// XOR. A section followed by its own CRC checks to zero.
const CRC32_MPEG2: u32 = 0x04C11DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_MPEG2
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Computes the MPEG-2 CRC32 of `data`.
///
/// ```
/// use tssend::utils::crc32_mpeg2;
///
/// assert_eq!(crc32_mpeg2(&[0x01, 0x01]), 0xD66FB816);
/// ```
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
        let index = ((crc >> 24) ^ byte as u32) & 0xFF;
        (crc << 8) ^ TABLE[index as usize]
    })
}
