use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Service configuration loaded from a TOML file. Every field has a
/// default so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub id: IdSettings,
}

/// The monitored log source this instance polls.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Raw-line endpoint, one access-log line per text line.
    #[serde(default)]
    pub source_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferSettings {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySettings {
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSettings {
    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: i64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

/// Snowflake generator coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct IdSettings {
    #[serde(default = "default_machine_id")]
    pub machine_id: i32,
    #[serde(default = "default_node_id")]
    pub node_id: i32,
}

fn default_agent_name() -> String {
    "default".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_batch_size() -> usize {
    250
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_snapshot_retention_days() -> i64 {
    7
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_machine_id() -> i32 {
    1
}

fn default_node_id() -> i32 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            source_url: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            snapshot_retention_days: default_snapshot_retention_days(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl Default for IdSettings {
    fn default() -> Self {
        Self {
            machine_id: default_machine_id(),
            node_id: default_node_id(),
        }
    }
}

impl ServiceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}
