//! Record store seam for agents, webhooks, alert rules, notification
//! history, and window snapshots.
//!
//! The pipeline only depends on the [`RecordStore`] trait; the default
//! [`memory::MemoryStore`] keeps everything in process memory. A durable
//! engine is an external concern and plugs in behind the same trait.

pub mod memory;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use relaymon_common::types::{
    AgentRecord, AlertInterval, AlertRule, NotificationRecord, Webhook, WindowSnapshot,
};

/// Errors surfaced by a record-store engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id exists.
    #[error("Store: {kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The underlying engine failed (I/O, serialization, corruption).
    #[error("Store: backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence surface consumed by the pipeline.
///
/// Implementations must be `Send + Sync`: the snapshotter and the alert
/// engine both hold the store behind an `Arc`.
pub trait RecordStore: Send + Sync {
    // Agents
    fn list_agents(&self) -> Result<Vec<AgentRecord>>;
    fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>>;
    fn add_agent(&self, agent: AgentRecord) -> Result<()>;
    fn update_agent(&self, agent: AgentRecord) -> Result<()>;
    fn delete_agent(&self, id: &str) -> Result<()>;

    // Webhooks
    fn list_webhooks(&self) -> Result<Vec<Webhook>>;
    fn get_webhook(&self, id: &str) -> Result<Option<Webhook>>;
    fn add_webhook(&self, webhook: Webhook) -> Result<()>;
    fn update_webhook(&self, webhook: Webhook) -> Result<()>;
    fn delete_webhook(&self, id: &str) -> Result<()>;

    // Alert rules
    fn list_alert_rules(&self) -> Result<Vec<AlertRule>>;
    fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>>;
    fn add_alert_rule(&self, rule: AlertRule) -> Result<()>;
    fn update_alert_rule(&self, rule: AlertRule) -> Result<()>;
    fn delete_alert_rule(&self, id: &str) -> Result<()>;

    /// Appends one dispatch-attempt record. Records are write-once.
    fn insert_notification_record(&self, record: NotificationRecord) -> Result<()>;

    /// Most recent notification records first, up to `limit`.
    fn list_notification_records(&self, limit: usize) -> Result<Vec<NotificationRecord>>;

    /// Appends one window snapshot. Snapshots are never mutated.
    fn insert_window_snapshot(&self, snapshot: WindowSnapshot) -> Result<()>;

    /// Snapshots for one agent, optionally filtered by interval, newest
    /// first.
    fn list_window_snapshots(
        &self,
        agent_id: &str,
        interval: Option<AlertInterval>,
    ) -> Result<Vec<WindowSnapshot>>;

    /// Removes snapshots created before `cutoff`. Returns the number
    /// removed.
    fn prune_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
