use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use relaymon_common::id;
use relaymon_common::types::{
    AlertData, AlertParameter, AlertRule, DashboardMetrics, DeliveryStatus, NotificationRecord,
    TriggerCondition,
};
use relaymon_notify::dispatcher::NotificationDispatcher;
use relaymon_storage::RecordStore;
use tracing::{debug, info, warn};

/// Facet rows included in an alert payload.
const ALERT_TOP_N: usize = 10;

/// Evaluates stored alert rules against fresh metrics and drives
/// notification delivery for the rules that fire.
///
/// Per-rule execution times live in memory only; a restart re-arms every
/// interval rule.
pub struct AlertEngine {
    store: Arc<dyn RecordStore>,
    dispatcher: NotificationDispatcher,
    last_execution: Mutex<HashMap<String, DateTime<Utc>>>,
    in_progress: AtomicBool,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn RecordStore>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            store,
            dispatcher,
            last_execution: Mutex::new(HashMap::new()),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Evaluate all rules for one agent. Returns the number of rules
    /// that fired.
    pub async fn evaluate(
        &self,
        agent_id: &str,
        agent_name: &str,
        metrics: &DashboardMetrics,
    ) -> usize {
        self.evaluate_at(agent_id, agent_name, metrics, Utc::now())
            .await
    }

    /// Evaluation body with an explicit clock.
    pub async fn evaluate_at(
        &self,
        agent_id: &str,
        agent_name: &str,
        metrics: &DashboardMetrics,
        now: DateTime<Utc>,
    ) -> usize {
        // One pass at a time; an overlapping call is dropped, the next
        // aggregation tick re-evaluates anyway.
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!(agent_id = %agent_id, "alert evaluation already in progress, skipping");
            return 0;
        }

        let fired = self.run_pass(agent_id, agent_name, metrics, now).await;
        self.in_progress.store(false, Ordering::Release);
        fired
    }

    async fn run_pass(
        &self,
        agent_id: &str,
        agent_name: &str,
        metrics: &DashboardMetrics,
        now: DateTime<Utc>,
    ) -> usize {
        let rules = match self.store.list_alert_rules() {
            Ok(rules) => rules,
            Err(err) => {
                warn!(error = %err, "failed to load alert rules");
                return 0;
            }
        };

        let mut fired = 0;
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            if rule
                .agent_id
                .as_deref()
                .map_or(false, |scoped| scoped != agent_id)
            {
                continue;
            }
            if !self.is_eligible(&rule, metrics, now) {
                continue;
            }

            // Recorded before dispatch so delivery failures do not cause
            // an immediate re-fire on the next pass.
            {
                let mut last = self
                    .last_execution
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                last.insert(rule.id.clone(), now);
            }

            info!(rule_id = %rule.id, rule_name = %rule.name, agent_id = %agent_id, "alert rule fired");
            let data = build_alert_data(agent_id, agent_name, metrics, now);
            self.dispatch_rule(&rule, &data).await;
            fired += 1;
        }
        fired
    }

    fn is_eligible(&self, rule: &AlertRule, metrics: &DashboardMetrics, now: DateTime<Utc>) -> bool {
        match &rule.trigger {
            TriggerCondition::Interval { interval } => {
                let last = self
                    .last_execution
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .get(&rule.id)
                    .copied();
                match last {
                    None => true,
                    Some(last) => now - last >= interval.duration(),
                }
            }
            TriggerCondition::Threshold => rule
                .parameters
                .iter()
                .filter(|p| p.enabled)
                .any(|p| threshold_exceeded(p.parameter, p.threshold, metrics)),
            TriggerCondition::Event => true,
        }
    }

    /// Delivers one fired rule to each of its webhooks, recording every
    /// attempt. One webhook failing does not stop the others.
    async fn dispatch_rule(&self, rule: &AlertRule, data: &AlertData) {
        for webhook_id in &rule.webhook_ids {
            let webhook = match self.store.get_webhook(webhook_id) {
                Ok(Some(webhook)) => webhook,
                Ok(None) => {
                    warn!(rule_id = %rule.id, webhook_id = %webhook_id, "webhook not found, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(rule_id = %rule.id, webhook_id = %webhook_id, error = %err, "webhook lookup failed, skipping");
                    continue;
                }
            };
            if !webhook.enabled {
                debug!(rule_id = %rule.id, webhook_id = %webhook_id, "webhook disabled, skipping");
                continue;
            }

            let outcome = self
                .dispatcher
                .send(&webhook, &rule.name, data, &rule.parameters)
                .await;

            let record = NotificationRecord {
                id: id::next_id(),
                rule_id: rule.id.clone(),
                webhook_id: webhook.id.clone(),
                agent_id: data.agent_id.clone(),
                status: if outcome.success {
                    DeliveryStatus::Success
                } else {
                    DeliveryStatus::Failed
                },
                error_message: outcome.error,
                payload: outcome.payload,
                created_at: Utc::now(),
            };
            if let Err(err) = self.store.insert_notification_record(record) {
                warn!(rule_id = %rule.id, webhook_id = %webhook_id, error = %err, "failed to persist notification record");
            }
        }
    }
}

fn threshold_exceeded(
    parameter: AlertParameter,
    threshold: Option<f64>,
    metrics: &DashboardMetrics,
) -> bool {
    let Some(threshold) = threshold else {
        return false;
    };
    let value = match parameter {
        AlertParameter::ErrorRate => metrics.error_rate,
        AlertParameter::AvgResponseTime => metrics.avg_response_time_ms,
        AlertParameter::RequestCount => metrics.total_requests as f64,
        _ => return false,
    };
    value > threshold
}

fn build_alert_data(
    agent_id: &str,
    agent_name: &str,
    metrics: &DashboardMetrics,
    now: DateTime<Utc>,
) -> AlertData {
    AlertData {
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        timestamp: now,
        request_count: metrics.total_requests,
        error_rate: metrics.error_rate,
        avg_response_time_ms: metrics.avg_response_time_ms,
        p95_response_time_ms: metrics.p95_response_time_ms,
        p99_response_time_ms: metrics.p99_response_time_ms,
        status_buckets: metrics.status_buckets.clone(),
        routes: top_slice(&metrics.routes),
        services: top_slice(&metrics.services),
        routers: top_slice(&metrics.routers),
        request_hosts: top_slice(&metrics.request_hosts),
        client_ips: top_slice(&metrics.client_ips),
        user_agents: top_slice(&metrics.user_agents),
    }
}

fn top_slice<T: Clone>(items: &[T]) -> Vec<T> {
    items[..items.len().min(ALERT_TOP_N)].to_vec()
}
