use crate::aggregator;
use chrono::{DateTime, Utc};
use relaymon_common::types::{AlertInterval, GeoLocation, LogEntry, WindowSnapshot};
use relaymon_storage::RecordStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Default top-N limit for window-scoped facet groupings.
pub const DEFAULT_WINDOW_TOP_N: usize = 10;

type PairKey = (String, AlertInterval);

/// Persists fixed-window metric snapshots on a per-interval cadence.
///
/// Each (agent, interval) pair independently tracks when it last
/// snapshotted; a pair is due when unset or a full interval has elapsed.
/// An in-progress guard drops overlapping invocations instead of queuing
/// them; the next external trigger re-checks due intervals.
pub struct WindowSnapshotter {
    store: Arc<dyn RecordStore>,
    last_snapshot: Mutex<HashMap<PairKey, DateTime<Utc>>>,
    in_progress: AtomicBool,
    top_n: usize,
}

impl WindowSnapshotter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_top_n(store, DEFAULT_WINDOW_TOP_N)
    }

    pub fn with_top_n(store: Arc<dyn RecordStore>, top_n: usize) -> Self {
        Self {
            store,
            last_snapshot: Mutex::new(HashMap::new()),
            in_progress: AtomicBool::new(false),
            top_n,
        }
    }

    /// Snapshot every due interval against the given entry set. Returns
    /// the number of snapshots written; an overlapping call is a no-op.
    pub fn process_entries(
        &self,
        agent_id: &str,
        agent_name: &str,
        entries: &[LogEntry],
        geo: &[GeoLocation],
    ) -> usize {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(agent_id, "Snapshot pass already in progress, skipping");
            return 0;
        }

        let now = Utc::now();
        let mut written = 0;

        for interval in AlertInterval::ALL {
            if !self.is_due(agent_id, interval, now) {
                continue;
            }
            if self.snapshot_interval(agent_id, agent_name, interval, entries, geo, now) {
                written += 1;
            }
        }

        self.in_progress.store(false, Ordering::Release);
        written
    }

    fn is_due(&self, agent_id: &str, interval: AlertInterval, now: DateTime<Utc>) -> bool {
        let last_snapshot = self.last_snapshot.lock().unwrap();
        match last_snapshot.get(&(agent_id.to_string(), interval)) {
            Some(last) => now - *last >= interval.duration(),
            None => true,
        }
    }

    /// Compute and persist one window. An empty window is still persisted
    /// with zeroed metrics to keep the cadence regular for consumers.
    /// Returns false on storage failure; the pair stays due so the next
    /// pass retries.
    fn snapshot_interval(
        &self,
        agent_id: &str,
        agent_name: &str,
        interval: AlertInterval,
        entries: &[LogEntry],
        geo: &[GeoLocation],
        now: DateTime<Utc>,
    ) -> bool {
        let window_start = now - interval.duration();
        let scoped: Vec<LogEntry> = entries
            .iter()
            .filter(|e| {
                e.start_utc
                    .map(|ts| ts >= window_start && ts <= now)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let snapshot = WindowSnapshot {
            id: relaymon_common::id::next_id(),
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            created_at: now,
            window_start,
            window_end: now,
            interval,
            entry_count: scoped.len() as u64,
            metrics: aggregator::window_metrics(&scoped, geo, self.top_n),
        };

        if let Err(e) = self.store.insert_window_snapshot(snapshot) {
            tracing::error!(
                agent_id,
                interval = %interval,
                error = %e,
                "Failed to persist window snapshot"
            );
            return false;
        }

        self.last_snapshot
            .lock()
            .unwrap()
            .insert((agent_id.to_string(), interval), now);
        tracing::debug!(
            agent_id,
            interval = %interval,
            entries = scoped.len(),
            "Window snapshot persisted"
        );
        true
    }
}
