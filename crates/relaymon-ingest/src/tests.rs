use crate::buffer::{BatchConsumer, BufferConfig, IngestionBuffer};
use crate::dedupe::EntryDeduper;
use crate::parser::{parse, parse_many};
use async_trait::async_trait;
use relaymon_common::types::LogEntry;
use std::sync::{Arc, Mutex};

fn structured_line(path: &str, status: i64) -> String {
    format!(
        r#"{{"ClientAddr":"10.0.0.9:52110","ClientHost":"10.0.0.9","RequestMethod":"GET","RequestPath":"{path}","RequestProtocol":"HTTP/1.1","DownstreamStatus":{status},"Duration":12500000,"RouterName":"web@docker","ServiceName":"web","StartUTC":"2024-06-01T10:00:00Z","RequestCount":7,"request_User-Agent":"curl/8.5.0"}}"#
    )
}

#[test]
fn structured_line_parses_canonical_fields() {
    let entry = parse(&structured_line("/api/users", 200)).expect("should parse");
    assert_eq!(entry.method, "GET");
    assert_eq!(entry.path, "/api/users");
    assert_eq!(entry.status, 200);
    assert_eq!(entry.duration_ns, 12_500_000);
    assert_eq!(entry.router_name, "web@docker");
    assert_eq!(entry.request_count, 7);
    assert_eq!(entry.user_agent, "curl/8.5.0");
    assert!(entry.start_utc.is_some());
}

#[test]
fn structured_line_without_timestamp_is_rejected() {
    let line = r#"{"RequestMethod":"GET","RequestPath":"/x","DownstreamStatus":200}"#;
    assert!(parse(line).is_none());
}

#[test]
fn structured_line_without_status_method_or_level_is_rejected() {
    let line = r#"{"StartUTC":"2024-06-01T10:00:00Z","RouterName":"web@docker"}"#;
    assert!(parse(line).is_none());
}

#[test]
fn structured_line_with_level_only_is_accepted() {
    let line = r#"{"time":"2024-06-01T10:00:00Z","level":"error","msg":"backend unreachable"}"#;
    let entry = parse(line).expect("level lines are accepted");
    assert_eq!(entry.severity_level.as_deref(), Some("error"));
}

#[test]
fn structured_line_accepts_historical_spellings() {
    let line = r#"{"startUTC":"2024-06-01T10:00:00Z","requestMethod":"POST","requestPath":"/v2","downstreamStatus":"201","duration":"900000"}"#;
    let entry = parse(line).expect("camelCase spellings accepted");
    assert_eq!(entry.method, "POST");
    // Numeric strings coerce to integers.
    assert_eq!(entry.status, 201);
    assert_eq!(entry.duration_ns, 900_000);
}

#[test]
fn forwarded_headers_are_captured_without_duplication() {
    let line = r#"{"StartUTC":"2024-06-01T10:00:00Z","RequestMethod":"GET","request_User-Agent":"curl/8.5.0","request_X-Forwarded-For":"203.0.113.7, 10.0.0.1","request_Accept-Encoding":"gzip","origin_X-Cache":"HIT"}"#;
    let entry = parse(line).expect("should parse");
    assert_eq!(entry.x_forwarded_for, "203.0.113.7, 10.0.0.1");
    assert_eq!(entry.client_ip(), "203.0.113.7");
    assert_eq!(
        entry.additional_headers.get("request_Accept_Encoding"),
        Some(&"gzip".to_string())
    );
    assert_eq!(
        entry.additional_headers.get("origin_X_Cache"),
        Some(&"HIT".to_string())
    );
    // Explicitly captured headers never land in the open map.
    assert!(!entry.additional_headers.contains_key("request_User_Agent"));
    assert!(!entry
        .additional_headers
        .contains_key("request_X_Forwarded_For"));
}

#[test]
fn fallback_line_parses() {
    let line = r#"192.168.1.50:41234 - - [01/Jun/2024:10:00:00 +0000] "GET /health HTTP/1.1" 200 512 "-" "kube-probe/1.29" 42 "web@docker" "http://10.0.0.3:8080" 3ms"#;
    let entry = parse(line).expect("fallback format should parse");
    assert_eq!(entry.client_host, "192.168.1.50");
    assert_eq!(entry.client_port, "41234");
    assert_eq!(entry.method, "GET");
    assert_eq!(entry.path, "/health");
    assert_eq!(entry.status, 200);
    assert_eq!(entry.content_size, 512);
    assert_eq!(entry.request_count, 42);
    assert_eq!(entry.router_name, "web@docker");
    assert_eq!(entry.service_url, "http://10.0.0.3:8080");
    assert_eq!(entry.duration_ns, 3_000_000);
    assert!(entry.start_utc.is_some());
}

#[test]
fn garbage_is_rejected_not_an_error() {
    assert!(parse("not a log line at all").is_none());
    assert!(parse("{broken json").is_none());
    assert!(parse("").is_none());
}

#[test]
fn parse_many_preserves_order_and_filters_rejects() {
    let lines = vec![
        structured_line("/a", 200),
        "garbage".to_string(),
        structured_line("/b", 404),
        structured_line("/c", 500),
    ];
    let entries = parse_many(&lines);
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/a", "/b", "/c"]);
}

fn entry(path: &str, count: u64) -> LogEntry {
    LogEntry {
        path: path.to_string(),
        method: "GET".to_string(),
        client_host: "10.0.0.9".to_string(),
        status: 200,
        request_count: count,
        start_local: Some("t0".to_string()),
        ..LogEntry::default()
    }
}

#[test]
fn dedupe_is_idempotent_over_a_shared_seen_set() {
    let mut deduper = EntryDeduper::default();
    let batch: Vec<LogEntry> = (0..10).map(|i| entry("/x", i)).collect();

    let first = deduper.dedupe(batch.clone());
    assert_eq!(first.len(), 10);

    let second = deduper.dedupe(batch);
    assert!(second.is_empty(), "same input twice yields nothing new");
}

#[test]
fn dedupe_evicts_oldest_when_over_cap() {
    let mut deduper = EntryDeduper::new(5);
    deduper.dedupe((0..8).map(|i| entry("/x", i)).collect());
    assert_eq!(deduper.len(), 5);

    // The three oldest were evicted and pass through again.
    let replay = deduper.dedupe((0..3).map(|i| entry("/x", i)).collect());
    assert_eq!(replay.len(), 3);
}

struct CollectingConsumer {
    batches: Mutex<Vec<Vec<LogEntry>>>,
}

#[async_trait]
impl BatchConsumer for CollectingConsumer {
    async fn consume(&self, batch: Vec<LogEntry>) {
        self.batches.lock().unwrap().push(batch);
    }
}

#[tokio::test]
async fn buffer_flushes_in_batch_sized_chunks_in_order() {
    let consumer = Arc::new(CollectingConsumer {
        batches: Mutex::new(Vec::new()),
    });
    let buffer = IngestionBuffer::new(BufferConfig::new(5000, 4), consumer.clone());

    // Crossing max_batch_size schedules the flush itself.
    buffer.push((0..10).map(|i| entry("/x", i)).collect());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert!(buffer.is_empty());
    let batches = consumer.batches.lock().unwrap();
    assert!(!batches.is_empty());
    for batch in batches.iter() {
        assert!(batch.len() <= 4);
    }
    let counts: Vec<u64> = batches.iter().flatten().map(|e| e.request_count).collect();
    assert_eq!(counts, (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn buffer_idle_timer_flushes_small_batches() {
    let consumer = Arc::new(CollectingConsumer {
        batches: Mutex::new(Vec::new()),
    });
    // 50ms is the configured floor.
    let buffer = IngestionBuffer::new(BufferConfig::new(10, 100), consumer.clone());

    buffer.push(vec![entry("/x", 1), entry("/x", 2)]);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let batches = consumer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn buffer_manual_flush_drains_below_batch_size() {
    let consumer = Arc::new(CollectingConsumer {
        batches: Mutex::new(Vec::new()),
    });
    // timer far out so only the explicit flush can deliver
    let buffer = IngestionBuffer::new(BufferConfig::new(60_000, 100), consumer.clone());

    buffer.push(vec![entry("/x", 1), entry("/x", 2), entry("/x", 3)]);
    buffer.flush().await;

    assert!(buffer.is_empty());
    let batches = consumer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn buffer_delivers_everything_under_concurrent_pushes() {
    let consumer = Arc::new(CollectingConsumer {
        batches: Mutex::new(Vec::new()),
    });
    let buffer = Arc::new(IngestionBuffer::new(BufferConfig::new(50, 8), consumer.clone()));

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let buffer = buffer.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25u64 {
                buffer.push(vec![entry("/x", t * 25 + i)]);
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // every pushed entry reaches the consumer, none stranded behind an
    // aborted timer
    assert!(buffer.is_empty());
    let total: usize = consumer.batches.lock().unwrap().iter().map(|b| b.len()).sum();
    assert_eq!(total, 100);
}

#[tokio::test]
async fn buffer_clear_discards_content_and_timer() {
    let consumer = Arc::new(CollectingConsumer {
        batches: Mutex::new(Vec::new()),
    });
    let buffer = IngestionBuffer::new(BufferConfig::new(10, 100), consumer.clone());

    buffer.push(vec![entry("/x", 1)]);
    buffer.clear();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert!(consumer.batches.lock().unwrap().is_empty());
    assert!(buffer.is_empty());
}
