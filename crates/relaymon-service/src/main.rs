use std::sync::Arc;
use std::time::Duration;

use relaymon_alert::engine::AlertEngine;
use relaymon_common::id;
use relaymon_ingest::buffer::{BufferConfig, IngestionBuffer};
use relaymon_metrics::snapshotter::WindowSnapshotter;
use relaymon_notify::dispatcher::NotificationDispatcher;
use relaymon_service::config::ServiceConfig;
use relaymon_service::coordinator::{RollingConsumer, ServiceCoordinator};
use relaymon_service::source::LineSource;
use relaymon_storage::memory::MemoryStore;
use relaymon_storage::RecordStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relaymon.toml".to_string());
    let config = ServiceConfig::load(&config_path)?;
    info!(config = %config_path, "configuration loaded");

    id::init(config.id.machine_id, config.id.node_id);

    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let dispatcher = NotificationDispatcher::with_timeout(Duration::from_secs(
        config.notify.delivery_timeout_secs,
    ));
    let engine = Arc::new(AlertEngine::new(store.clone(), dispatcher));
    let snapshotter = Arc::new(WindowSnapshotter::new(store.clone()));
    let coordinator = Arc::new(ServiceCoordinator::new(
        store,
        snapshotter,
        engine,
        config.retention.clone(),
    ));

    if config.agent.source_url.is_empty() {
        anyhow::bail!("agent.source_url is required");
    }
    let agent_id = id::next_id();
    let consumer = Arc::new(RollingConsumer::new(
        coordinator.clone(),
        agent_id,
        config.agent.name.clone(),
    ));
    let buffer = Arc::new(IngestionBuffer::new(
        BufferConfig::new(
            config.buffer.flush_interval_ms,
            config.buffer.max_batch_size,
        ),
        consumer,
    ));
    coordinator.add_source(Arc::new(LineSource::new(
        config.agent.source_url.clone(),
        Duration::from_secs(config.agent.poll_interval_secs),
        Duration::from_secs(config.agent.fetch_timeout_secs),
        buffer,
    )));

    coordinator.start();
    info!(agent = %config.agent.name, url = %config.agent.source_url, "relaymon running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    coordinator.stop();
    Ok(())
}
