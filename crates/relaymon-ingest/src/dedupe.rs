use relaymon_common::types::LogEntry;
use std::collections::{HashSet, VecDeque};

/// Seen-set cap: twice the rolling display cap of 1000 entries.
pub const DEFAULT_SEEN_CAP: usize = 2000;

/// Drops entries already observed across polls of the same source.
///
/// The seen set is bounded: once it exceeds the cap it is trimmed to the
/// most recently inserted cap-sized suffix. Eviction follows insertion
/// order, not access order.
pub struct EntryDeduper {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl EntryDeduper {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Stable identity key for one entry: enough fields that two distinct
    /// requests in the same second still differ via the repeat counter.
    pub fn key(entry: &LogEntry) -> String {
        let ts = entry
            .start_utc
            .map(|t| t.timestamp_millis().to_string())
            .or_else(|| entry.start_local.clone())
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}|{}",
            ts, entry.request_count, entry.path, entry.method, entry.client_host, entry.status
        )
    }

    /// Filter out entries whose key is already in the seen set, recording
    /// the keys of the survivors. Applying the same input twice yields an
    /// empty second result.
    pub fn dedupe(&mut self, entries: Vec<LogEntry>) -> Vec<LogEntry> {
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = Self::key(&entry);
            if self.seen.insert(key.clone()) {
                self.order.push_back(key);
                fresh.push(entry);
            }
        }
        self.trim();
        fresh
    }

    fn trim(&mut self) {
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for EntryDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAP)
    }
}
