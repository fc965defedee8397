//! When to (re)send PSI/SI tables alongside media.

use std::time::{Duration, Instant};

use super::registry::TableRegistry;

pub const DEFAULT_TABLE_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_DESCRIPTION_INTERVAL: Duration = Duration::from_secs(2);

/// Tables to send ahead of a media frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableToSend {
    None,
    AssociationAndMap,
    Description,
    All,
}

/// Decides per outgoing frame whether tables must go out first.
///
/// A new track set always wins: PAT and PMT must precede any media packet
/// that depends on them. The SDT rides on keyframes, and a periodic full
/// burst bounds how long a late-joining decoder waits.
#[derive(Debug, Clone)]
pub struct InjectionPolicy {
    table_interval: Duration,
    description_interval: Duration,
    sent_generation: Option<u64>,
    last_tables: Option<Instant>,
    last_description: Option<Instant>,
}

impl Default for InjectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_INTERVAL, DEFAULT_DESCRIPTION_INTERVAL)
    }
}

impl InjectionPolicy {
    pub fn new(table_interval: Duration, description_interval: Duration) -> Self {
        Self {
            table_interval,
            description_interval,
            sent_generation: None,
            last_tables: None,
            last_description: None,
        }
    }

    pub fn should_send(&mut self, is_key: bool, registry: &TableRegistry) -> TableToSend {
        self.should_send_at(is_key, registry, Instant::now())
    }

    pub fn should_send_at(&mut self, is_key: bool, registry: &TableRegistry, now: Instant) -> TableToSend {
        let description_due = elapsed(self.last_description, now, self.description_interval);

        let decision = if self.sent_generation != Some(registry.map_generation()) {
            if description_due {
                TableToSend::All
            } else {
                TableToSend::AssociationAndMap
            }
        } else if is_key && description_due {
            TableToSend::Description
        } else if elapsed(self.last_tables, now, self.table_interval) {
            TableToSend::All
        } else {
            TableToSend::None
        };

        match decision {
            TableToSend::All => {
                self.mark_tables_sent(registry, now);
                self.last_description = Some(now);
            }
            TableToSend::AssociationAndMap => self.mark_tables_sent(registry, now),
            TableToSend::Description => self.last_description = Some(now),
            TableToSend::None => {}
        }
        decision
    }

    /// Records a full burst sent outside the per-frame decision (stream
    /// start).
    pub fn mark_all_sent(&mut self, registry: &TableRegistry, now: Instant) {
        self.mark_tables_sent(registry, now);
        self.last_description = Some(now);
    }

    pub fn reset(&mut self) {
        self.sent_generation = None;
        self.last_tables = None;
        self.last_description = None;
    }

    fn mark_tables_sent(&mut self, registry: &TableRegistry, now: Instant) {
        self.sent_generation = Some(registry.map_generation());
        self.last_tables = Some(now);
    }
}

fn elapsed(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}
