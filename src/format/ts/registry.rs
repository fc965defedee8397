//! Track set and PSI/SI table state.
//!
//! The registry is the only place table bytes are produced. Each table keeps
//! its last serialized form together with the version it was built with, so
//! retransmissions are byte-identical and the version only moves when the
//! content does.

use bytes::Bytes;
use log::debug;

use super::psi::{Descriptor, ElementaryStreamInfo, PATEntry, ServiceInfo, PAT, PMT, SDT};
use super::types::*;
use crate::av::CodecType;
use crate::error::{Result, TsError};

pub const PROGRAM_NUMBER: u16 = 1;
pub const TRANSPORT_STREAM_ID: u16 = 1;
pub const ORIGINAL_NETWORK_ID: u16 = 0xff01;
pub const DEFAULT_PROVIDER: &str = "tssend";
pub const DEFAULT_SERVICE_NAME: &str = "tssend service";

/// PID used in a PMT when no stream carries a PCR.
const PID_NULL: u16 = 0x1fff;

/// The three metadata tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableId {
    /// Program association table
    Association,
    /// Program map table
    Map,
    /// Service description table
    Description,
}

impl TableId {
    pub fn pid(&self) -> u16 {
        match self {
            TableId::Association => PID_PAT,
            TableId::Map => PID_PMT,
            TableId::Description => PID_SDT,
        }
    }
}

/// One elementary stream and its continuity counter.
#[derive(Debug, Clone)]
pub struct Track {
    pid: u16,
    codec: CodecType,
    stream_type: u8,
    continuity: u8,
    descriptors: Vec<Descriptor>,
}

impl Track {
    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    /// Counter value the next packet on this PID will carry.
    pub fn continuity(&self) -> u8 {
        self.continuity
    }

    /// Returns the counter for the next packet and advances it mod 16.
    pub fn next_continuity(&mut self) -> u8 {
        let current = self.continuity;
        self.continuity = (current + 1) & 0x0f;
        current
    }
}

#[derive(Debug, Default)]
struct TableState {
    version: u8,
    cached: Option<Bytes>,
    built: bool,
}

impl TableState {
    /// Stores freshly built bytes; every build after the first is a new
    /// version.
    fn store(&mut self, build: impl FnOnce(u8) -> Result<Bytes>) -> Result<Bytes> {
        let version = if self.built {
            (self.version + 1) & 0x1f
        } else {
            self.version
        };
        let bytes = build(version)?;
        self.version = version;
        self.built = true;
        self.cached = Some(bytes.clone());
        Ok(bytes)
    }

    fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[derive(Debug)]
pub struct TableRegistry {
    tracks: Vec<Track>,
    next_pid: u16,
    service: ServiceInfo,
    pat: TableState,
    pmt: TableState,
    sdt: TableState,
    pmt_dirty: bool,
    map_generation: u64,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_pid: PID_FIRST_ELEMENTARY,
            service: ServiceInfo {
                service_id: PROGRAM_NUMBER,
                provider: DEFAULT_PROVIDER.to_string(),
                name: DEFAULT_SERVICE_NAME.to_string(),
            },
            pat: TableState::default(),
            pmt: TableState::default(),
            sdt: TableState::default(),
            pmt_dirty: true,
            map_generation: 0,
        }
    }

    /// Drops every track and restarts PID assignment at the baseline.
    ///
    /// Table versions survive, so the next map a decoder sees after a
    /// reconfiguration carries a new version.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_pid = PID_FIRST_ELEMENTARY;
        self.pmt.invalidate();
        self.pmt_dirty = true;
    }

    pub fn add_track(&mut self, codec: CodecType) -> Result<u16> {
        self.add_track_with_descriptors(codec, Vec::new())
    }

    /// Adds a track with ES-level descriptors and returns its PID.
    pub fn add_track_with_descriptors(
        &mut self,
        codec: CodecType,
        descriptors: Vec<Descriptor>,
    ) -> Result<u16> {
        let stream_type = stream_type(codec)
            .ok_or_else(|| TsError::Config(format!("unsupported codec: {}", codec)))?;
        if self.next_pid >= PID_PMT {
            return Err(TsError::Config("no PIDs left for another track".into()));
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.tracks.push(Track {
            pid,
            codec,
            stream_type,
            continuity: 0,
            descriptors,
        });
        self.pmt_dirty = true;
        debug!("added {} track on PID 0x{:04x}", codec, pid);
        Ok(pid)
    }

    /// Replaces the ES descriptors of the `codec` track and republishes the
    /// PMT if they differ. PIDs and continuity counters are kept. Returns
    /// whether the map changed.
    pub fn set_track_descriptors(&mut self, codec: CodecType, descriptors: Vec<Descriptor>) -> Result<bool> {
        let track = self
            .track_mut(codec)
            .ok_or_else(|| TsError::Config(format!("no {} track configured", codec)))?;
        if track.descriptors == descriptors {
            return Ok(false);
        }
        track.descriptors = descriptors;
        self.pmt_dirty = true;
        self.rebuild()?;
        Ok(true)
    }

    /// Regenerates the PMT if the track set changed since the last build.
    pub fn rebuild(&mut self) -> Result<()> {
        if !self.pmt_dirty && self.pmt.cached.is_some() {
            return Ok(());
        }
        let pmt = PMT {
            program_number: PROGRAM_NUMBER,
            pcr_pid: self.pcr_pid().unwrap_or(PID_NULL),
            program_descriptors: Vec::new(),
            elementary_stream_infos: self
                .tracks
                .iter()
                .map(|track| ElementaryStreamInfo {
                    stream_type: track.stream_type,
                    elementary_pid: track.pid,
                    descriptors: track.descriptors.clone(),
                })
                .collect(),
        };
        self.pmt.store(|version| pmt.to_section(version))?;
        self.pmt_dirty = false;
        self.map_generation += 1;
        debug!("rebuilt PMT, version {}", self.pmt.version);
        Ok(())
    }

    /// Changes the advertised service; the SDT is rebuilt on next access.
    pub fn set_service(&mut self, provider: &str, name: &str) -> Result<()> {
        if provider.len() + name.len() + 3 > u8::MAX as usize {
            return Err(TsError::Config(format!(
                "service provider and name too long: {} bytes",
                provider.len() + name.len()
            )));
        }
        if self.service.provider == provider && self.service.name == name {
            return Ok(());
        }
        self.service.provider = provider.to_string();
        self.service.name = name.to_string();
        self.sdt.invalidate();
        Ok(())
    }

    /// Latest serialized section for `table`.
    ///
    /// PAT and SDT are built on first access; the PMT is `None` until
    /// [`rebuild`](Self::rebuild) has run.
    pub fn current(&mut self, table: TableId) -> Result<Option<Bytes>> {
        match table {
            TableId::Association => {
                if let Some(bytes) = &self.pat.cached {
                    return Ok(Some(bytes.clone()));
                }
                let pat = PAT {
                    transport_stream_id: TRANSPORT_STREAM_ID,
                    entries: vec![PATEntry {
                        program_number: PROGRAM_NUMBER,
                        program_map_pid: PID_PMT,
                    }],
                };
                self.pat.store(|version| pat.to_section(version)).map(Some)
            }
            TableId::Map => Ok(self.pmt.cached.clone()),
            TableId::Description => {
                if let Some(bytes) = &self.sdt.cached {
                    return Ok(Some(bytes.clone()));
                }
                let sdt = SDT {
                    transport_stream_id: TRANSPORT_STREAM_ID,
                    original_network_id: ORIGINAL_NETWORK_ID,
                    services: vec![self.service.clone()],
                };
                self.sdt.store(|version| sdt.to_section(version)).map(Some)
            }
        }
    }

    pub fn version(&self, table: TableId) -> u8 {
        match table {
            TableId::Association => self.pat.version,
            TableId::Map => self.pmt.version,
            TableId::Description => self.sdt.version,
        }
    }

    /// Counts PMT builds; changes whenever the track set was republished.
    pub fn map_generation(&self) -> u64 {
        self.map_generation
    }

    /// True when tracks changed and the PMT has not been rebuilt yet.
    pub fn is_map_dirty(&self) -> bool {
        self.pmt_dirty
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_mut(&mut self, codec: CodecType) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|track| track.codec == codec)
    }

    /// Video track if there is one, else the first track.
    pub fn pcr_pid(&self) -> Option<u16> {
        self.tracks
            .iter()
            .find(|track| track.codec.is_video())
            .or_else(|| self.tracks.first())
            .map(|track| track.pid)
    }
}
