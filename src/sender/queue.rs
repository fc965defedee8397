//! Bounded FIFO between producers and the sender loop.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::av::TransportPacket;
use crate::error::{Result, TsError};

/// What a queue entry carries, for counting sent and dropped frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tables,
    Video,
    Audio,
}

/// One access unit's packets, or one table burst, moved as a group.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub kind: EntryKind,
    pub packets: Vec<TransportPacket>,
    bytes: usize,
}

impl QueueEntry {
    pub fn new(kind: EntryKind, packets: Vec<TransportPacket>) -> Self {
        let bytes = packets.iter().map(TransportPacket::len).sum();
        Self {
            kind,
            packets,
            bytes,
        }
    }

    /// Total bytes of all packets in the entry.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Capacity-limited FIFO. Never grows past its capacity and never evicts.
#[derive(Debug)]
pub struct BoundedQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    bytes: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(TsError::Config("queue capacity must be at least 1".into()));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            bytes: 0,
        })
    }

    /// Appends `entry`, handing it back untouched when the queue is full.
    pub fn push(&mut self, entry: QueueEntry) -> std::result::Result<(), QueueEntry> {
        if self.is_full() {
            return Err(entry);
        }
        self.bytes += entry.bytes();
        self.entries.push_back(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        self.bytes -= entry.bytes();
        Some(entry)
    }

    /// Moves entries in order into `other` until either side runs out.
    /// Returns how many were moved.
    pub fn drain_into(&mut self, other: &mut BoundedQueue) -> usize {
        let mut moved = 0;
        while !other.is_full() {
            let Some(entry) = self.pop() else { break };
            // room was checked above
            let _ = other.push(entry);
            moved += 1;
        }
        moved
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// The queue shared by producers and the sender loop.
///
/// Pushes never wait; only [`pop_wait`](Self::pop_wait) suspends.
#[derive(Debug)]
pub struct SendQueue {
    inner: Mutex<BoundedQueue>,
    notify: Notify,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(BoundedQueue::new(capacity)?),
            notify: Notify::new(),
        })
    }

    pub fn push(&self, entry: QueueEntry) -> std::result::Result<(), QueueEntry> {
        self.inner.lock().push(entry)?;
        self.notify.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.inner.lock().pop()
    }

    /// Waits up to `timeout` for an entry.
    pub async fn pop_wait(&self, timeout: Duration) -> Option<QueueEntry> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.try_pop() {
                return Some(entry);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Replaces the queue with one of `capacity`, keeping its contents in
    /// order. Fails without touching anything if they would not fit.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        let mut queue = self.inner.lock();
        if capacity < queue.len() {
            return Err(TsError::Config(format!(
                "cannot resize queue to {} while it holds {} entries",
                capacity,
                queue.len()
            )));
        }
        let mut resized = BoundedQueue::new(capacity)?;
        queue.drain_into(&mut resized);
        *queue = resized;
        Ok(())
    }

    /// True when occupancy is at or above `percentage` of capacity.
    pub fn has_congestion(&self, percentage: f32) -> Result<bool> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(TsError::Config(format!(
                "congestion percentage {} outside 0..=100",
                percentage
            )));
        }
        let queue = self.inner.lock();
        let occupancy = queue.len() as f32 / queue.capacity() as f32;
        Ok(occupancy >= percentage / 100.0)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn queued_bytes(&self) -> usize {
        self.inner.lock().bytes()
    }
}
