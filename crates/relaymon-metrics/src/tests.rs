use crate::aggregator::{aggregate, percentile, ua_identifier, window_metrics};
use crate::snapshotter::WindowSnapshotter;
use chrono::{Duration, Utc};
use relaymon_common::types::{AlertInterval, GeoLocation, LogEntry};
use relaymon_storage::memory::MemoryStore;
use relaymon_storage::RecordStore;
use std::sync::Arc;

fn make_entry(path: &str, status: i64, duration_ms: i64, secs_ago: i64) -> LogEntry {
    LogEntry {
        path: path.to_string(),
        method: "GET".to_string(),
        status,
        duration_ns: duration_ms * 1_000_000,
        service_name: "web".to_string(),
        router_name: "web@docker".to_string(),
        client_host: "10.0.0.9".to_string(),
        request_host: "example.com".to_string(),
        user_agent: "curl/8.5.0".to_string(),
        start_utc: Some(Utc::now() - Duration::seconds(secs_ago)),
        ..LogEntry::default()
    }
}

#[test]
fn degenerate_input_yields_zeroed_snapshot() {
    let empty = aggregate(&[], &[]);
    assert_eq!(empty.total_requests, 0);
    assert_eq!(empty.requests_per_second, 0.0);
    assert!(empty.timeline.is_empty());

    let single = aggregate(&[make_entry("/a", 200, 5, 0)], &[]);
    assert_eq!(single.requests_per_second, 0.0);
    assert!(single.timeline.is_empty());
}

#[test]
fn status_buckets_and_error_rate_scenario() {
    // 3 lines for /health with 200, 1 line for /api/x with 500.
    let entries = vec![
        make_entry("/health", 200, 2, 30),
        make_entry("/health", 200, 3, 20),
        make_entry("/health", 200, 2, 10),
        make_entry("/api/x", 500, 40, 0),
    ];
    let metrics = aggregate(&entries, &[]);
    assert_eq!(metrics.status_buckets.status_2xx, 3);
    assert_eq!(metrics.status_buckets.status_5xx, 1);
    assert_eq!(metrics.error_rate, 25.0);
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.recent_errors.len(), 1);
    assert_eq!(metrics.recent_errors[0].path, "/api/x");
}

#[test]
fn requests_per_second_uses_observed_span() {
    // 10 entries across 9 seconds.
    let entries: Vec<LogEntry> = (0..10).map(|i| make_entry("/a", 200, 5, i)).collect();
    let metrics = aggregate(&entries, &[]);
    assert!((metrics.requests_per_second - 10.0 / 9.0).abs() < 0.01);
}

#[test]
fn percentile_is_always_a_member_of_the_input() {
    let sorted = vec![1.0, 2.0, 5.0, 9.0, 20.0, 50.0, 120.0];
    for p in 0..=100 {
        let v = percentile(&sorted, p as f64);
        assert!(sorted.contains(&v), "p{p} returned non-member {v}");
    }
    assert_eq!(percentile(&sorted, 100.0), 120.0);
    assert_eq!(percentile(&sorted, 0.0), 1.0);
}

#[test]
fn top_facets_sorted_by_count_capped_at_ten() {
    let mut entries = Vec::new();
    for route in 0..15 {
        for _ in 0..=route {
            entries.push(make_entry(&format!("/r{route}"), 200, 5, 0));
        }
    }
    // Two parseable timestamps so we pass the degenerate check.
    entries.push(make_entry("/r0", 200, 5, 60));
    let metrics = aggregate(&entries, &[]);
    assert_eq!(metrics.routes.len(), 10);
    assert_eq!(metrics.routes[0].key, "/r14");
    assert!(metrics.routes[0].count >= metrics.routes[9].count);
}

#[test]
fn user_agents_fold_into_others_beyond_eleven() {
    let mut entries = Vec::new();
    for i in 0..14 {
        let mut e = make_entry("/a", 200, 5, i);
        // Distinct unclassified product tokens.
        e.user_agent = format!("client-{i}/1.0");
        entries.push(e);
    }
    let metrics = aggregate(&entries, &[]);
    assert_eq!(metrics.user_agents.len(), 12);
    let others = metrics.user_agents.last().unwrap();
    assert_eq!(others.identifier, "Others");
    assert_eq!(others.count, 3);
}

#[test]
fn ua_identifier_extracts_canonical_tokens() {
    assert_eq!(ua_identifier("curl/8.5.0"), "curl");
    assert_eq!(
        ua_identifier("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"),
        "Chrome"
    );
    assert_eq!(
        ua_identifier("Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15"),
        "Safari"
    );
    assert_eq!(ua_identifier("Googlebot/2.1 (+http://www.google.com/bot.html)"), "Bot");
    assert_eq!(ua_identifier("kube-probe/1.29"), "kube-probe");
    assert_eq!(ua_identifier(""), "Unknown");
    assert_eq!(ua_identifier("something-custom/9.9"), "something-custom");
}

#[test]
fn timeline_has_twenty_buckets_covering_all_entries() {
    let entries: Vec<LogEntry> = (0..50).map(|i| make_entry("/a", 200, 5, i * 10)).collect();
    let metrics = aggregate(&entries, &[]);
    assert_eq!(metrics.timeline.len(), 20);
    let total: u64 = metrics.timeline.iter().map(|b| b.count).sum();
    assert_eq!(total, 50);
}

#[test]
fn geo_annotations_attach_to_client_ips() {
    let mut entries = vec![make_entry("/a", 200, 5, 0), make_entry("/a", 200, 5, 60)];
    entries[0].x_forwarded_for = "203.0.113.7".to_string();
    entries[1].x_forwarded_for = "203.0.113.7".to_string();
    let geo = vec![GeoLocation {
        ip: "203.0.113.7".to_string(),
        country: Some("DE".to_string()),
        city: Some("Berlin".to_string()),
        lat: None,
        lon: None,
    }];
    let metrics = aggregate(&entries, &geo);
    let row = metrics
        .client_ips
        .iter()
        .find(|c| c.ip == "203.0.113.7")
        .expect("forwarded IP grouped");
    assert_eq!(row.country.as_deref(), Some("DE"));
    assert_eq!(row.city.as_deref(), Some("Berlin"));
}

#[test]
fn window_metrics_empty_input_is_zeroed() {
    let m = window_metrics(&[], &[], 10);
    assert_eq!(m.request_count, 0);
    assert_eq!(m.error_rate, 0.0);
    assert!(m.routes.is_empty());
}

#[test]
fn snapshotter_writes_all_intervals_once() {
    let store = Arc::new(MemoryStore::new());
    let snapshotter = WindowSnapshotter::new(store.clone());
    let entries: Vec<LogEntry> = (0..10).map(|i| make_entry("/a", 200, 5, i)).collect();

    let written = snapshotter.process_entries("a1", "edge-1", &entries, &[]);
    assert_eq!(written, AlertInterval::ALL.len());

    let snapshots = store.list_window_snapshots("a1", None).unwrap();
    assert_eq!(snapshots.len(), 7);
    for s in &snapshots {
        assert_eq!(s.window_end - s.window_start, s.interval.duration());
        assert!(s.entry_count > 0);
    }
}

#[test]
fn snapshotter_does_not_duplicate_within_shortest_interval() {
    let store = Arc::new(MemoryStore::new());
    let snapshotter = WindowSnapshotter::new(store.clone());
    let entries: Vec<LogEntry> = (0..10).map(|i| make_entry("/a", 200, 5, i)).collect();

    snapshotter.process_entries("a1", "edge-1", &entries, &[]);
    // Immediately again, well inside the 5m floor.
    let written = snapshotter.process_entries("a1", "edge-1", &entries, &[]);
    assert_eq!(written, 0);
    assert_eq!(store.list_window_snapshots("a1", None).unwrap().len(), 7);
}

#[test]
fn snapshotter_persists_empty_windows() {
    let store = Arc::new(MemoryStore::new());
    let snapshotter = WindowSnapshotter::new(store.clone());

    let written = snapshotter.process_entries("a1", "edge-1", &[], &[]);
    assert_eq!(written, 7);
    let snapshots = store.list_window_snapshots("a1", None).unwrap();
    assert!(snapshots.iter().all(|s| s.entry_count == 0));
}

#[test]
fn snapshotter_tracks_agents_independently() {
    let store = Arc::new(MemoryStore::new());
    let snapshotter = WindowSnapshotter::new(store.clone());
    let entries: Vec<LogEntry> = (0..5).map(|i| make_entry("/a", 200, 5, i)).collect();

    snapshotter.process_entries("a1", "edge-1", &entries, &[]);
    let written = snapshotter.process_entries("a2", "edge-2", &entries, &[]);
    assert_eq!(written, 7, "second agent has its own cadence state");
}
