//! # Utility Functions
//!
//! Helpers shared by the transport stream writers.
//!
//! ## CRC Calculation
//!
//! Every PSI section (PAT, PMT, SDT) ends with an MPEG-2 CRC32:
//!
//! ```rust
//! use tssend::utils::crc32_mpeg2;
//!
//! # fn main() {
//! let section = [0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE0, 0x20];
//! let crc = crc32_mpeg2(&section);
//! println!("CRC32: {:08x}", crc);
//! # }
//! ```

/// CRC calculation implementations
pub mod crc;

pub use crc::crc32_mpeg2;
