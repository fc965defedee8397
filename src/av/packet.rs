use bytes::Bytes;

/// What a transport packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// PAT, PMT or SDT sections.
    Metadata,
    /// PES data of one access unit.
    MediaUnit,
}

/// Role of a transport packet within the access unit it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPosition {
    Single,
    Start,
    Middle,
    End,
}

impl PacketPosition {
    /// Position of chunk `index` out of `count` chunks.
    pub fn of(index: usize, count: usize) -> Self {
        match (index, count) {
            (_, 1) => PacketPosition::Single,
            (0, _) => PacketPosition::Start,
            (i, n) if i + 1 == n => PacketPosition::End,
            _ => PacketPosition::Middle,
        }
    }
}

/// One unit of wire output: a whole number of 188-byte TS packets.
#[derive(Debug, Clone)]
pub struct TransportPacket {
    pub data: Bytes,
    pub kind: PacketKind,
    pub position: PacketPosition,
    pub is_key: bool,
}

impl TransportPacket {
    pub fn new(data: impl Into<Bytes>, kind: PacketKind, position: PacketPosition) -> Self {
        Self {
            data: data.into(),
            kind,
            position,
            is_key: false,
        }
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
