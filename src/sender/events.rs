//! Notifications sent upstream by a running sender.

/// Whether the link keeps up with the produced stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throughput {
    Unknown,
    /// Queued bytes did not grow over the sample window.
    Sufficient,
    /// Queued bytes grew at every sample in the window.
    Insufficient,
}

/// One-second snapshot of the outgoing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingStats {
    /// Bits per second over the last sample period.
    pub bitrate: u64,
    pub bytes_sent: u64,
    pub bytes_queued: u64,
    pub throughput: Throughput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderEvent {
    /// The transport rejected a write; the sender loop has ended.
    ConnectionFailed(String),
    StreamingStats(StreamingStats),
}
