//! Bitrate and throughput estimation from per-second samples.

use std::collections::VecDeque;
use std::time::Duration;

use super::events::{StreamingStats, Throughput};

/// Number of queued-bytes samples a throughput verdict needs.
pub const HISTORY_LEN: usize = 3;

/// Classifies queue growth over the last [`HISTORY_LEN`] samples.
#[derive(Debug, Default)]
pub struct BitrateEstimator {
    history: VecDeque<u64>,
}

impl BitrateEstimator {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Folds one sample period into the history and reports it.
    ///
    /// `bytes_sent` is what went out during `elapsed`; `bytes_queued` is the
    /// queue backlog at the end of it.
    pub fn sample(&mut self, bytes_sent: u64, bytes_queued: u64, elapsed: Duration) -> StreamingStats {
        let secs = elapsed.as_secs_f64();
        let bitrate = if secs > 0.0 {
            (bytes_sent as f64 * 8.0 / secs) as u64
        } else {
            0
        };

        self.history.push_back(bytes_queued);
        let throughput = if self.history.len() >= HISTORY_LEN {
            let growing = self
                .history
                .iter()
                .zip(self.history.iter().skip(1))
                .filter(|(a, b)| a < b)
                .count();
            self.history.pop_front();
            match growing {
                n if n == HISTORY_LEN - 1 => Throughput::Insufficient,
                0 => Throughput::Sufficient,
                _ => Throughput::Unknown,
            }
        } else {
            Throughput::Unknown
        };

        StreamingStats {
            bitrate,
            bytes_sent,
            bytes_queued,
            throughput,
        }
    }
}
