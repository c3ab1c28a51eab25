use chrono::{DateTime, Duration, Utc};
use relaymon_common::types::{
    ClientIpCount, DashboardMetrics, ErrorEntry, FacetCount, GeoLocation, LogEntry, StatusBuckets,
    TimelineBucket, UserAgentCount, WindowMetrics,
};
use std::collections::HashMap;

/// Cap on the rolling entry set, in display order (newest first).
pub const ROLLING_DISPLAY_CAP: usize = 1000;

const TIMELINE_BUCKETS: i64 = 20;
const TOP_N: usize = 10;
/// User agents keep one extra row before the "Others" aggregate.
const USER_AGENT_TOP_N: usize = 11;
const RECENT_ERRORS_CAP: usize = 50;

/// Compute the rolling metrics snapshot from a bounded entry set.
///
/// Pure: no hidden state, safe to call repeatedly with different inputs.
/// Entries are expected in display order (newest first); 0 or 1 entries
/// yield an all-zero snapshot.
pub fn aggregate(entries: &[LogEntry], geo: &[GeoLocation]) -> DashboardMetrics {
    if entries.len() <= 1 {
        return DashboardMetrics::empty();
    }

    let geo_by_ip = index_geo(geo);
    let durations = sorted_durations_ms(entries);
    let (status_buckets, error_rate) = status_and_error_rate(entries);

    DashboardMetrics {
        total_requests: entries.len() as u64,
        requests_per_second: requests_per_second(entries),
        avg_response_time_ms: mean(&durations),
        p95_response_time_ms: percentile(&durations, 95.0),
        p99_response_time_ms: percentile(&durations, 99.0),
        status_buckets,
        error_rate,
        routes: top_facets(entries, TOP_N, |e| &e.path),
        services: top_facets(entries, TOP_N, |e| &e.service_name),
        routers: top_facets(entries, TOP_N, |e| &e.router_name),
        request_hosts: top_facets(entries, TOP_N, |e| &e.request_host),
        request_addrs: top_facets(entries, TOP_N, |e| &e.request_addr),
        client_ips: top_client_ips(entries, &geo_by_ip, TOP_N),
        user_agents: top_user_agents(entries, USER_AGENT_TOP_N),
        timeline: timeline(entries),
        recent_errors: recent_errors(entries),
    }
}

/// Compute the same facets scoped to a fixed-window entry subset, at a
/// configurable top-N limit. Degenerate input yields zeroed metrics so an
/// empty window still produces a persistable record.
pub fn window_metrics(entries: &[LogEntry], geo: &[GeoLocation], top_n: usize) -> WindowMetrics {
    if entries.is_empty() {
        return WindowMetrics::empty();
    }

    let geo_by_ip = index_geo(geo);
    let durations = sorted_durations_ms(entries);
    let (status_buckets, error_rate) = status_and_error_rate(entries);

    WindowMetrics {
        request_count: entries.len() as u64,
        error_rate,
        avg_response_time_ms: mean(&durations),
        p95_response_time_ms: percentile(&durations, 95.0),
        p99_response_time_ms: percentile(&durations, 99.0),
        status_buckets,
        routes: top_facets(entries, top_n, |e| &e.path),
        services: top_facets(entries, top_n, |e| &e.service_name),
        routers: top_facets(entries, top_n, |e| &e.router_name),
        request_hosts: top_facets(entries, top_n, |e| &e.request_host),
        request_addrs: top_facets(entries, top_n, |e| &e.request_addr),
        client_ips: top_client_ips(entries, &geo_by_ip, top_n),
        user_agents: top_user_agents(entries, top_n + 1),
    }
}

/// Requests per second over the observed span. Zero when fewer than two
/// entries carry a parseable timestamp or the span is not positive.
fn requests_per_second(entries: &[LogEntry]) -> f64 {
    let timestamps: Vec<DateTime<Utc>> = entries.iter().filter_map(|e| e.start_utc).collect();
    if timestamps.len() < 2 {
        return 0.0;
    }
    let min = timestamps.iter().min().copied().unwrap_or_default();
    let max = timestamps.iter().max().copied().unwrap_or_default();
    let span_secs = (max - min).num_milliseconds() as f64 / 1000.0;
    if span_secs <= 0.0 {
        return 0.0;
    }
    entries.len() as f64 / span_secs
}

fn sorted_durations_ms(entries: &[LogEntry]) -> Vec<f64> {
    let mut durations: Vec<f64> = entries.iter().map(|e| e.duration_ms()).collect();
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    durations
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// P-th percentile of an ascending-sorted list: index
/// `ceil(p/100 * n) - 1`, clamped to >= 0. The result is always a member
/// of the input list.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

fn status_and_error_rate(entries: &[LogEntry]) -> (StatusBuckets, f64) {
    let mut buckets = StatusBuckets::default();
    let mut errors = 0u64;
    for entry in entries {
        match entry.status {
            200..=299 => buckets.status_2xx += 1,
            300..=399 => buckets.status_3xx += 1,
            400..=499 => buckets.status_4xx += 1,
            500..=599 => buckets.status_5xx += 1,
            _ => {}
        }
        if entry.is_error() {
            errors += 1;
        }
    }
    let rate = if entries.is_empty() {
        0.0
    } else {
        errors as f64 / entries.len() as f64 * 100.0
    };
    (buckets, rate)
}

/// Group entries by a key, compute count and average duration per group,
/// and keep the `limit` largest groups. Empty keys are skipped.
fn top_facets<'a, F>(entries: &'a [LogEntry], limit: usize, key: F) -> Vec<FacetCount>
where
    F: Fn(&'a LogEntry) -> &'a str,
{
    let mut groups: HashMap<&str, (u64, f64)> = HashMap::new();
    for entry in entries {
        let k = key(entry);
        if k.is_empty() {
            continue;
        }
        let slot = groups.entry(k).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += entry.duration_ms();
    }
    let mut facets: Vec<FacetCount> = groups
        .into_iter()
        .map(|(key, (count, total_ms))| FacetCount {
            key: key.to_string(),
            count,
            avg_duration_ms: total_ms / count as f64,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    facets.truncate(limit);
    facets
}

fn index_geo(geo: &[GeoLocation]) -> HashMap<&str, &GeoLocation> {
    geo.iter().map(|g| (g.ip.as_str(), g)).collect()
}

fn top_client_ips(
    entries: &[LogEntry],
    geo_by_ip: &HashMap<&str, &GeoLocation>,
    limit: usize,
) -> Vec<ClientIpCount> {
    let mut groups: HashMap<&str, (u64, f64)> = HashMap::new();
    for entry in entries {
        let ip = entry.client_ip();
        if ip.is_empty() {
            continue;
        }
        let slot = groups.entry(ip).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += entry.duration_ms();
    }
    let mut ips: Vec<ClientIpCount> = groups
        .into_iter()
        .map(|(ip, (count, total_ms))| {
            let geo = geo_by_ip.get(ip);
            ClientIpCount {
                ip: ip.to_string(),
                count,
                avg_duration_ms: total_ms / count as f64,
                country: geo.and_then(|g| g.country.clone()),
                city: geo.and_then(|g| g.city.clone()),
            }
        })
        .collect();
    ips.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
    ips.truncate(limit);
    ips
}

/// Group by canonical user-agent identifier: keep the `limit` largest
/// groups and fold the remainder into one "Others" row.
fn top_user_agents(entries: &[LogEntry], limit: usize) -> Vec<UserAgentCount> {
    let mut groups: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        *groups.entry(ua_identifier(&entry.user_agent)).or_insert(0) += 1;
    }
    let mut agents: Vec<UserAgentCount> = groups
        .into_iter()
        .map(|(identifier, count)| UserAgentCount { identifier, count })
        .collect();
    agents.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    if agents.len() > limit {
        let others: u64 = agents[limit..].iter().map(|a| a.count).sum();
        agents.truncate(limit);
        agents.push(UserAgentCount {
            identifier: "Others".to_string(),
            count: others,
        });
    }
    agents
}

/// Canonical identifier token for a raw user-agent string.
///
/// Order matters: Chrome ships "Safari" in its UA, Edge and Opera ship
/// "Chrome" in theirs.
pub fn ua_identifier(ua: &str) -> String {
    if ua.is_empty() {
        return "Unknown".to_string();
    }
    let lower = ua.to_lowercase();
    if lower.contains("bot") || lower.contains("spider") || lower.contains("crawler") {
        return "Bot".to_string();
    }
    for (needle, ident) in [
        ("kube-probe", "kube-probe"),
        ("curl", "curl"),
        ("wget", "wget"),
        ("python-requests", "Python"),
        ("go-http-client", "Go"),
        ("postmanruntime", "Postman"),
        ("edg", "Edge"),
        ("opr/", "Opera"),
        ("opera", "Opera"),
        ("chrome", "Chrome"),
        ("firefox", "Firefox"),
        ("safari", "Safari"),
    ] {
        if lower.contains(needle) {
            return ident.to_string();
        }
    }
    // Fall back to the leading product token.
    ua.split(['/', ' '])
        .next()
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

/// 20 equal-width buckets spanning `[min_ts, max(max_ts, min_ts + 60s)]`,
/// bucket width `ceil(span / 20)` seconds, entries assigned by integer
/// division.
fn timeline(entries: &[LogEntry]) -> Vec<TimelineBucket> {
    let timestamps: Vec<DateTime<Utc>> = entries.iter().filter_map(|e| e.start_utc).collect();
    if timestamps.len() < 2 {
        return Vec::new();
    }
    let min = timestamps.iter().min().copied().unwrap_or_default();
    let max = timestamps.iter().max().copied().unwrap_or_default();
    let end = std::cmp::max(max, min + Duration::seconds(60));
    let span_secs = (end - min).num_seconds();
    let width_secs = (span_secs + TIMELINE_BUCKETS - 1) / TIMELINE_BUCKETS;
    let width_secs = width_secs.max(1);

    let mut counts = [0u64; TIMELINE_BUCKETS as usize];
    for ts in &timestamps {
        let offset = (*ts - min).num_seconds();
        let idx = (offset / width_secs).clamp(0, TIMELINE_BUCKETS - 1) as usize;
        counts[idx] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| TimelineBucket {
            start: min + Duration::seconds(i as i64 * width_secs),
            count,
        })
        .collect()
}

/// The most recent error entries (status >= 400), in input (display)
/// order, capped at 50.
fn recent_errors(entries: &[LogEntry]) -> Vec<ErrorEntry> {
    entries
        .iter()
        .filter(|e| e.is_error())
        .take(RECENT_ERRORS_CAP)
        .map(|e| ErrorEntry {
            timestamp: e.start_utc,
            method: e.method.clone(),
            path: e.path.clone(),
            status: e.status,
            service_name: e.service_name.clone(),
            client_ip: e.client_ip().to_string(),
        })
        .collect()
}
