use chrono::{DateTime, Utc};
use regex::Regex;
use relaymon_common::types::LogEntry;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Ordered candidate keys per canonical field. Structured lines have been
/// emitted with several historical spellings; the first present, non-null
/// key wins.
const TIMESTAMP_KEYS: &[&str] = &["StartUTC", "startUTC", "time", "timestamp"];
const START_LOCAL_KEYS: &[&str] = &["StartLocal", "startLocal"];
const CLIENT_ADDR_KEYS: &[&str] = &["ClientAddr", "clientAddr", "client_addr"];
const CLIENT_HOST_KEYS: &[&str] = &["ClientHost", "clientHost", "client_host"];
const CLIENT_PORT_KEYS: &[&str] = &["ClientPort", "clientPort", "client_port"];
const METHOD_KEYS: &[&str] = &["RequestMethod", "requestMethod", "method"];
const PATH_KEYS: &[&str] = &["RequestPath", "requestPath", "path"];
const PROTOCOL_KEYS: &[&str] = &["RequestProtocol", "requestProtocol", "protocol"];
const SCHEME_KEYS: &[&str] = &["RequestScheme", "requestScheme", "scheme"];
const STATUS_KEYS: &[&str] = &["DownstreamStatus", "downstreamStatus", "status", "StatusCode"];
const ORIGIN_STATUS_KEYS: &[&str] = &["OriginStatus", "originStatus"];
const DURATION_KEYS: &[&str] = &["Duration", "duration"];
const ORIGIN_DURATION_KEYS: &[&str] = &["OriginDuration", "originDuration"];
const CONTENT_SIZE_KEYS: &[&str] = &[
    "DownstreamContentSize",
    "downstreamContentSize",
    "ContentSize",
    "contentSize",
    "size",
];
const ORIGIN_CONTENT_SIZE_KEYS: &[&str] = &["OriginContentSize", "originContentSize"];
const ROUTER_KEYS: &[&str] = &["RouterName", "routerName"];
const SERVICE_NAME_KEYS: &[&str] = &["ServiceName", "serviceName"];
const SERVICE_URL_KEYS: &[&str] = &["ServiceURL", "serviceURL", "ServiceUrl", "serviceUrl"];
const ENTRY_POINT_KEYS: &[&str] = &["entryPointName", "EntryPointName"];
const REQUEST_HOST_KEYS: &[&str] = &["RequestHost", "requestHost"];
const REQUEST_ADDR_KEYS: &[&str] = &["RequestAddr", "requestAddr"];
const REQUEST_COUNT_KEYS: &[&str] = &["RequestCount", "requestCount"];
const LEVEL_KEYS: &[&str] = &["level", "Level"];
const REFERER_KEYS: &[&str] = &[
    "request_Referer",
    "request_referer",
    "RequestReferer",
    "Referer",
    "referer",
];
const USER_AGENT_KEYS: &[&str] = &[
    "request_User-Agent",
    "request_user_agent",
    "RequestUserAgent",
    "User-Agent",
    "user_agent",
];
const X_FORWARDED_FOR_KEYS: &[&str] = &[
    "request_X-Forwarded-For",
    "request_x_forwarded_for",
    "RequestXForwardedFor",
    "X-Forwarded-For",
];
const X_REAL_IP_KEYS: &[&str] = &[
    "request_X-Real-Ip",
    "request_x_real_ip",
    "RequestXRealIp",
    "X-Real-Ip",
];

/// Prefixes marking a structured key as a forwarded header eligible for
/// generic capture into `additional_headers`.
const HEADER_PREFIXES: &[&str] = &["request_", "downstream_", "origin_"];

/// Parse one raw log line into a canonical entry.
///
/// Lines whose trimmed form starts with `{` are probed as structured JSON
/// first; on rejection the fixed-grammar fallback format is attempted.
/// Absence of a match is an ordinary outcome, not an error.
pub fn parse(line: &str) -> Option<LogEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        if let Some(entry) = parse_structured(trimmed) {
            return Some(entry);
        }
    }
    parse_fallback(trimmed)
}

/// Parse a batch of lines, filtering out rejects and preserving order.
pub fn parse_many(lines: &[String]) -> Vec<LogEntry> {
    lines.iter().filter_map(|l| parse(l)).collect()
}

fn parse_structured(line: &str) -> Option<LogEntry> {
    let value: Value = serde_json::from_str(line).ok()?;
    let map = value.as_object()?;

    // Acceptance gate: a timestamp plus at least one of status, method,
    // or a recognized severity level.
    let raw_timestamp = first_string(map, TIMESTAMP_KEYS)?;
    let status = first_i64(map, STATUS_KEYS);
    let method = first_string(map, METHOD_KEYS);
    let level = first_string(map, LEVEL_KEYS)
        .filter(|l| matches!(l.as_str(), "error" | "warn" | "info"));
    if status.is_none() && method.is_none() && level.is_none() {
        return None;
    }

    let mut entry = LogEntry {
        client_addr: first_string(map, CLIENT_ADDR_KEYS).unwrap_or_default(),
        client_host: first_string(map, CLIENT_HOST_KEYS).unwrap_or_default(),
        client_port: first_string(map, CLIENT_PORT_KEYS).unwrap_or_default(),
        method: method.unwrap_or_default(),
        path: first_string(map, PATH_KEYS).unwrap_or_default(),
        protocol: first_string(map, PROTOCOL_KEYS).unwrap_or_default(),
        scheme: first_string(map, SCHEME_KEYS).unwrap_or_default(),
        status: status.unwrap_or(0),
        origin_status: first_i64(map, ORIGIN_STATUS_KEYS),
        duration_ns: first_i64(map, DURATION_KEYS).unwrap_or(0),
        origin_duration_ns: first_i64(map, ORIGIN_DURATION_KEYS),
        content_size: first_i64(map, CONTENT_SIZE_KEYS).unwrap_or(0),
        origin_content_size: first_i64(map, ORIGIN_CONTENT_SIZE_KEYS),
        router_name: first_string(map, ROUTER_KEYS).unwrap_or_default(),
        service_name: first_string(map, SERVICE_NAME_KEYS).unwrap_or_default(),
        service_url: first_string(map, SERVICE_URL_KEYS).unwrap_or_default(),
        entry_point: first_string(map, ENTRY_POINT_KEYS).unwrap_or_default(),
        request_host: first_string(map, REQUEST_HOST_KEYS).unwrap_or_default(),
        request_addr: first_string(map, REQUEST_ADDR_KEYS).unwrap_or_default(),
        request_count: first_i64(map, REQUEST_COUNT_KEYS).unwrap_or(0).max(0) as u64,
        start_utc: parse_timestamp(&raw_timestamp),
        start_local: first_string(map, START_LOCAL_KEYS).or(Some(raw_timestamp)),
        referer: first_string(map, REFERER_KEYS).unwrap_or_default(),
        user_agent: first_string(map, USER_AGENT_KEYS).unwrap_or_default(),
        x_forwarded_for: first_string(map, X_FORWARDED_FOR_KEYS).unwrap_or_default(),
        x_real_ip: first_string(map, X_REAL_IP_KEYS).unwrap_or_default(),
        severity_level: level,
        ..LogEntry::default()
    };

    // Generic forwarded-header capture. Keys already taken by an explicit
    // alias list are skipped so nothing lands twice.
    for (key, val) in map {
        if !HEADER_PREFIXES.iter().any(|p| key.starts_with(p)) {
            continue;
        }
        if is_explicit_header_key(key) {
            continue;
        }
        if let Some(s) = value_as_string(val) {
            entry
                .additional_headers
                .insert(key.replace('-', "_"), s);
        }
    }

    if entry.client_host.is_empty() && !entry.client_addr.is_empty() {
        let (host, port) = split_host_port(&entry.client_addr);
        entry.client_host = host;
        if entry.client_port.is_empty() {
            entry.client_port = port;
        }
    }

    Some(entry)
}

fn is_explicit_header_key(key: &str) -> bool {
    REFERER_KEYS.contains(&key)
        || USER_AGENT_KEYS.contains(&key)
        || X_FORWARDED_FOR_KEYS.contains(&key)
        || X_REAL_IP_KEYS.contains(&key)
}

/// Fixed-grammar fallback format:
/// `clientaddr - identity [timestamp] "METHOD path protocol" status size
///  "referer" "useragent" count "router" "serviceURL" Nms`
fn fallback_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(\S+)\s+-\s+(\S+)\s+\[([^\]]+)\]\s+"(\S+)\s+(\S+)\s+([^"]+)"\s+(\d+)\s+(\d+|-)\s+"([^"]*)"\s+"([^"]*)"\s+(\d+)\s+"([^"]*)"\s+"([^"]*)"\s+(\d+)ms$"#,
        )
        .expect("fallback log format regex is valid")
    })
}

fn parse_fallback(line: &str) -> Option<LogEntry> {
    let caps = fallback_regex().captures(line)?;

    let client_addr = caps[1].to_string();
    let (client_host, client_port) = split_host_port(&client_addr);
    let raw_timestamp = caps[3].to_string();
    let duration_ms: i64 = caps[14].parse().ok()?;

    Some(LogEntry {
        client_addr,
        client_host,
        client_port,
        method: caps[4].to_string(),
        path: caps[5].to_string(),
        protocol: caps[6].to_string(),
        status: caps[7].parse().ok()?,
        content_size: caps[8].parse().unwrap_or(0),
        referer: caps[9].to_string(),
        user_agent: caps[10].to_string(),
        request_count: caps[11].parse().unwrap_or(0),
        router_name: caps[12].to_string(),
        service_url: caps[13].to_string(),
        duration_ns: duration_ms.saturating_mul(1_000_000),
        start_utc: parse_timestamp(&raw_timestamp),
        start_local: Some(raw_timestamp),
        ..LogEntry::default()
    })
}

/// Parse a timestamp in RFC 3339 or common-log (`02/Jan/2006:15:04:05
/// -0700`) form. Unparseable values are kept raw on the entry.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(ts.with_timezone(&Utc));
    }
    None
}

fn split_host_port(addr: &str) -> (String, String) {
    match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
            (host.to_string(), port.to_string())
        }
        _ => (addr.to_string(), String::new()),
    }
}

/// First present, non-null value among `keys`, coerced to a string.
fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(value_as_string)
}

/// First present, non-null value among `keys`, coerced to an integer.
/// Numeric strings coerce; anything else is treated as absent.
fn first_i64(map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| map.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
