//! # MPEG Transport Stream (TS) writing
//!
//! Everything needed to turn access units into 188-byte TS packets:
//!
//! - TS packet headers, adaptation fields and clock conversions
//! - PES packets with PTS
//! - PSI/SI sections (PAT, PMT, SDT) and the registry that versions them
//! - the injection policy deciding when tables are retransmitted
//! - frame and table packetizers producing transport packets
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use tssend::av::CodecType;
//! use tssend::format::ts::{AudioPacketizer, TableId, TablePacketizer, TableRegistry, TS_PACKET_SIZE};
//!
//! # fn main() -> tssend::Result<()> {
//! let mut registry = TableRegistry::new();
//! registry.add_track(CodecType::AAC)?;
//! registry.rebuild()?;
//!
//! let mut tables = TablePacketizer::new(1316)?;
//! let pat = registry.current(TableId::Association)?.unwrap();
//! let burst = tables.write(&[(TableId::Association, pat)], false);
//! assert_eq!(burst[0].len(), TS_PACKET_SIZE);
//!
//! let mut audio = AudioPacketizer::new(CodecType::AAC, 1316)?;
//! let packets = audio.packetize(&mut registry, &[0x21, 0x00], Duration::ZERO)?;
//! assert!(packets.iter().all(|p| p.len() % TS_PACKET_SIZE == 0));
//! # Ok(())
//! # }
//! ```

/// Access unit packetizers
pub mod frame;

/// Table retransmission policy
pub mod injection;

/// TS packet writing and transport packet grouping
pub mod packetizer;

/// PES packet handling
pub mod pes;

/// PSI/SI section serialization
pub mod psi;

/// Track set and table versions
pub mod registry;

/// Core TS types and constants
pub mod types;

pub use frame::{AudioPacketizer, VideoPacketizer};
pub use injection::{InjectionPolicy, TableToSend};
pub use packetizer::TablePacketizer;
pub use pes::{PESHeader, PESPacket};
pub use registry::{TableId, TableRegistry, Track};
pub use types::{
    TSHeader,
    PID_PAT,
    PID_PMT,
    PID_SDT,
    STREAM_TYPE_AAC,
    STREAM_TYPE_H264,
    STREAM_TYPE_H265,
    TS_PACKET_SIZE,
};
