use crate::memory::MemoryStore;
use crate::{RecordStore, StoreError};
use chrono::{Duration, Utc};
use relaymon_common::types::{
    AgentRecord, AlertInterval, AlertRule, ChannelKind, DeliveryStatus, NotificationRecord,
    TriggerCondition, Webhook, WindowMetrics, WindowSnapshot,
};

fn agent(id: &str, name: &str) -> AgentRecord {
    AgentRecord {
        id: id.to_string(),
        name: name.to_string(),
        source_url: "http://proxy:8080/logs".to_string(),
        enabled: true,
        created_at: Utc::now(),
    }
}

fn snapshot(agent_id: &str, interval: AlertInterval, age_hours: i64) -> WindowSnapshot {
    let created = Utc::now() - Duration::hours(age_hours);
    WindowSnapshot {
        id: relaymon_common::id::next_id(),
        agent_id: agent_id.to_string(),
        agent_name: agent_id.to_string(),
        created_at: created,
        window_start: created - interval.duration(),
        window_end: created,
        interval,
        entry_count: 0,
        metrics: WindowMetrics::empty(),
    }
}

#[test]
fn agent_crud_roundtrip() {
    let store = MemoryStore::new();
    store.add_agent(agent("a1", "edge-1")).unwrap();
    store.add_agent(agent("a2", "edge-2")).unwrap();

    assert_eq!(store.list_agents().unwrap().len(), 2);
    assert_eq!(store.get_agent("a1").unwrap().unwrap().name, "edge-1");

    let mut updated = agent("a1", "edge-1-renamed");
    updated.enabled = false;
    store.update_agent(updated).unwrap();
    assert!(!store.get_agent("a1").unwrap().unwrap().enabled);

    store.delete_agent("a2").unwrap();
    assert!(store.get_agent("a2").unwrap().is_none());
}

#[test]
fn update_missing_record_is_not_found() {
    let store = MemoryStore::new();
    let err = store.update_agent(agent("ghost", "ghost")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { kind: "agent", .. }));

    let err = store.delete_webhook("ghost").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { kind: "webhook", .. }));
}

#[test]
fn webhook_and_rule_crud() {
    let store = MemoryStore::new();
    store
        .add_webhook(Webhook {
            id: "w1".to_string(),
            name: "ops-discord".to_string(),
            kind: ChannelKind::Discord,
            url: "https://discord.com/api/webhooks/1/abc".to_string(),
            enabled: true,
        })
        .unwrap();
    store
        .add_alert_rule(AlertRule {
            id: "r1".to_string(),
            name: "hourly summary".to_string(),
            enabled: true,
            agent_id: None,
            webhook_ids: vec!["w1".to_string()],
            trigger: TriggerCondition::Interval {
                interval: AlertInterval::H1,
            },
            parameters: Vec::new(),
        })
        .unwrap();

    assert_eq!(store.list_webhooks().unwrap().len(), 1);
    let rule = store.get_alert_rule("r1").unwrap().unwrap();
    assert_eq!(
        rule.trigger,
        TriggerCondition::Interval {
            interval: AlertInterval::H1
        }
    );
}

#[test]
fn notification_records_are_append_only_newest_first() {
    let store = MemoryStore::new();
    for i in 0..5 {
        store
            .insert_notification_record(NotificationRecord {
                id: format!("n{i}"),
                rule_id: "r1".to_string(),
                webhook_id: "w1".to_string(),
                agent_id: "a1".to_string(),
                status: DeliveryStatus::Success,
                error_message: None,
                payload: "{}".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
    }
    let records = store.list_notification_records(3).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].id, "n4");
}

#[test]
fn snapshot_listing_filters_by_agent_and_interval() {
    let store = MemoryStore::new();
    store
        .insert_window_snapshot(snapshot("a1", AlertInterval::M5, 0))
        .unwrap();
    store
        .insert_window_snapshot(snapshot("a1", AlertInterval::H1, 0))
        .unwrap();
    store
        .insert_window_snapshot(snapshot("a2", AlertInterval::M5, 0))
        .unwrap();

    assert_eq!(store.list_window_snapshots("a1", None).unwrap().len(), 2);
    assert_eq!(
        store
            .list_window_snapshots("a1", Some(AlertInterval::M5))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn prune_removes_only_old_snapshots() {
    let store = MemoryStore::new();
    store
        .insert_window_snapshot(snapshot("a1", AlertInterval::M5, 100))
        .unwrap();
    store
        .insert_window_snapshot(snapshot("a1", AlertInterval::M5, 0))
        .unwrap();

    let removed = store
        .prune_snapshots_before(Utc::now() - Duration::hours(48))
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.list_window_snapshots("a1", None).unwrap().len(), 1);
}
