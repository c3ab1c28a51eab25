use crate::{RecordStore, Result, StoreError};
use chrono::{DateTime, Utc};
use relaymon_common::types::{
    AgentRecord, AlertInterval, AlertRule, NotificationRecord, Webhook, WindowSnapshot,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process record store. Backs tests and single-instance deployments;
/// a poisoned lock is recovered rather than propagated since every write
/// is a whole-value replacement.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    agents: HashMap<String, AgentRecord>,
    webhooks: HashMap<String, Webhook>,
    rules: HashMap<String, AlertRule>,
    notifications: Vec<NotificationRecord>,
    snapshots: Vec<WindowSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for MemoryStore {
    fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let mut agents: Vec<_> = self.lock().agents.values().cloned().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.lock().agents.get(id).cloned())
    }

    fn add_agent(&self, agent: AgentRecord) -> Result<()> {
        self.lock().agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    fn update_agent(&self, agent: AgentRecord) -> Result<()> {
        let mut state = self.lock();
        if !state.agents.contains_key(&agent.id) {
            return Err(StoreError::NotFound {
                kind: "agent",
                id: agent.id,
            });
        }
        state.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    fn delete_agent(&self, id: &str) -> Result<()> {
        self.lock()
            .agents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: id.to_string(),
            })
    }

    fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let mut webhooks: Vec<_> = self.lock().webhooks.values().cloned().collect();
        webhooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(webhooks)
    }

    fn get_webhook(&self, id: &str) -> Result<Option<Webhook>> {
        Ok(self.lock().webhooks.get(id).cloned())
    }

    fn add_webhook(&self, webhook: Webhook) -> Result<()> {
        self.lock().webhooks.insert(webhook.id.clone(), webhook);
        Ok(())
    }

    fn update_webhook(&self, webhook: Webhook) -> Result<()> {
        let mut state = self.lock();
        if !state.webhooks.contains_key(&webhook.id) {
            return Err(StoreError::NotFound {
                kind: "webhook",
                id: webhook.id,
            });
        }
        state.webhooks.insert(webhook.id.clone(), webhook);
        Ok(())
    }

    fn delete_webhook(&self, id: &str) -> Result<()> {
        self.lock()
            .webhooks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "webhook",
                id: id.to_string(),
            })
    }

    fn list_alert_rules(&self) -> Result<Vec<AlertRule>> {
        let mut rules: Vec<_> = self.lock().rules.values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }

    fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        Ok(self.lock().rules.get(id).cloned())
    }

    fn add_alert_rule(&self, rule: AlertRule) -> Result<()> {
        self.lock().rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn update_alert_rule(&self, rule: AlertRule) -> Result<()> {
        let mut state = self.lock();
        if !state.rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound {
                kind: "alert rule",
                id: rule.id,
            });
        }
        state.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn delete_alert_rule(&self, id: &str) -> Result<()> {
        self.lock()
            .rules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "alert rule",
                id: id.to_string(),
            })
    }

    fn insert_notification_record(&self, record: NotificationRecord) -> Result<()> {
        self.lock().notifications.push(record);
        Ok(())
    }

    fn list_notification_records(&self, limit: usize) -> Result<Vec<NotificationRecord>> {
        let state = self.lock();
        Ok(state
            .notifications
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn insert_window_snapshot(&self, snapshot: WindowSnapshot) -> Result<()> {
        self.lock().snapshots.push(snapshot);
        Ok(())
    }

    fn list_window_snapshots(
        &self,
        agent_id: &str,
        interval: Option<AlertInterval>,
    ) -> Result<Vec<WindowSnapshot>> {
        let state = self.lock();
        Ok(state
            .snapshots
            .iter()
            .rev()
            .filter(|s| s.agent_id == agent_id)
            .filter(|s| interval.map_or(true, |i| s.interval == i))
            .cloned()
            .collect())
    }

    fn prune_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut state = self.lock();
        let before = state.snapshots.len();
        state.snapshots.retain(|s| s.created_at >= cutoff);
        Ok(before - state.snapshots.len())
    }
}
