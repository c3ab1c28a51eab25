use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use relaymon_alert::engine::AlertEngine;
use relaymon_common::types::{DashboardMetrics, LogEntry};
use relaymon_ingest::buffer::BatchConsumer;
use relaymon_metrics::aggregator::{self, ROLLING_DISPLAY_CAP};
use relaymon_metrics::snapshotter::WindowSnapshotter;
use relaymon_storage::RecordStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RetentionSettings;
use crate::source::LineSource;

/// Owns the pipeline singletons and the background task lifecycle.
///
/// Constructed once at startup and shared by `Arc`; every background
/// task observes the same `watch` shutdown signal.
pub struct ServiceCoordinator {
    store: Arc<dyn RecordStore>,
    snapshotter: Arc<WindowSnapshotter>,
    engine: Arc<AlertEngine>,
    retention: RetentionSettings,
    sources: Mutex<Vec<Arc<LineSource>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        snapshotter: Arc<WindowSnapshotter>,
        engine: Arc<AlertEngine>,
        retention: RetentionSettings,
    ) -> Self {
        Self {
            store,
            snapshotter,
            engine,
            retention,
            sources: Mutex::new(Vec::new()),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a poller to be spawned on the next `start()`.
    pub fn add_source(&self, source: Arc<LineSource>) {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(source);
    }

    /// True when every registered source's most recent poll succeeded.
    /// False while no source is registered or before the first poll.
    pub fn is_connected(&self) -> bool {
        let sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
        !sources.is_empty() && sources.iter().all(|s| s.is_connected())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Spawn the retention loop and every registered source poller.
    /// Calling on a running coordinator is a no-op.
    pub fn start(&self) {
        let mut shutdown = self.shutdown.lock().unwrap_or_else(|p| p.into_inner());
        if shutdown.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *shutdown = Some(tx);

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.push(self.spawn_retention_loop(rx.clone()));
        for source in self
            .sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
        {
            let source = source.clone();
            tasks.push(tokio::spawn(source.run(rx.clone())));
        }
        info!("service coordinator started");
    }

    /// Signal shutdown and detach all background tasks.
    pub fn stop(&self) {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(sender) = sender else {
            return;
        };
        let _ = sender.send(true);
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
        {
            task.abort();
        }
        info!("service coordinator stopped");
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// Single processing entry point after each aggregation pass:
    /// snapshot due windows first, then evaluate alert rules.
    pub async fn process_metrics(
        &self,
        agent_id: &str,
        agent_name: &str,
        metrics: &DashboardMetrics,
        entries: &[LogEntry],
    ) {
        let written = self
            .snapshotter
            .process_entries(agent_id, agent_name, entries, &[]);
        if written > 0 {
            info!(agent_id = %agent_id, snapshots = written, "window snapshots written");
        }
        self.engine.evaluate(agent_id, agent_name, metrics).await;
    }

    fn spawn_retention_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let store = self.store.clone();
        let retention_days = self.retention.snapshot_retention_days;
        let period = Duration::from_secs(self.retention.prune_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // consume the immediate first tick
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                        match store.prune_snapshots_before(cutoff) {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "pruned expired window snapshots"),
                            Err(err) => warn!(error = %err, "snapshot prune failed"),
                        }
                    }
                }
            }
        })
    }
}

/// Batch consumer bridging the ingestion buffer to the coordinator.
///
/// Keeps a bounded rolling window of the most recent entries per agent;
/// each delivered batch extends the window, re-aggregates it, and routes
/// the result through [`ServiceCoordinator::process_metrics`].
pub struct RollingConsumer {
    coordinator: Arc<ServiceCoordinator>,
    agent_id: String,
    agent_name: String,
    window: Mutex<VecDeque<LogEntry>>,
}

impl RollingConsumer {
    pub fn new(coordinator: Arc<ServiceCoordinator>, agent_id: String, agent_name: String) -> Self {
        Self {
            coordinator,
            agent_id,
            agent_name,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Window contents in display order, newest first. The aggregator
    /// takes its recent-error slice from the front of this list.
    pub(crate) fn entries_for_display(&self) -> Vec<LogEntry> {
        self.window
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .rev()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BatchConsumer for RollingConsumer {
    async fn consume(&self, batch: Vec<LogEntry>) {
        {
            let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
            window.extend(batch);
            while window.len() > ROLLING_DISPLAY_CAP {
                window.pop_front();
            }
        }
        let entries = self.entries_for_display();

        let metrics = aggregator::aggregate(&entries, &[]);
        self.coordinator
            .process_metrics(&self.agent_id, &self.agent_name, &metrics, &entries)
            .await;
    }
}
