use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One normalized reverse-proxy access-log record.
///
/// Produced by the parser from either a structured (JSON) line or the
/// fixed-grammar fallback format. Immutable once constructed; the optional
/// geolocation annotation is attached by an external enrichment step
/// before the entry enters the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub client_addr: String,
    pub client_host: String,
    pub client_port: String,
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub scheme: String,
    /// Status code returned downstream (to the client).
    pub status: i64,
    /// Status code returned by the origin service, when reported.
    pub origin_status: Option<i64>,
    /// Total request duration in nanoseconds.
    pub duration_ns: i64,
    /// Origin round-trip duration in nanoseconds, when reported.
    pub origin_duration_ns: Option<i64>,
    pub content_size: i64,
    pub origin_content_size: Option<i64>,
    pub router_name: String,
    pub service_name: String,
    pub service_url: String,
    pub entry_point: String,
    pub request_host: String,
    pub request_addr: String,
    /// Repeat counter assigned by the proxy (monotonic per connection).
    pub request_count: u64,
    /// Start timestamp in UTC, when the source value was parseable.
    pub start_utc: Option<DateTime<Utc>>,
    /// Raw local-time string as emitted by the proxy.
    pub start_local: Option<String>,
    pub referer: String,
    pub user_agent: String,
    pub x_forwarded_for: String,
    pub x_real_ip: String,
    /// Severity level for non-access structured lines (error/warn/info).
    pub severity_level: Option<String>,
    /// Forwarded headers not covered by an explicit field, hyphens
    /// normalized to underscores.
    pub additional_headers: HashMap<String, String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl LogEntry {
    /// Request duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration_ns as f64 / 1_000_000.0
    }

    /// Best-available client IP: X-Forwarded-For first hop, then
    /// X-Real-Ip, then the client host from the connection.
    pub fn client_ip(&self) -> &str {
        if !self.x_forwarded_for.is_empty() {
            return self
                .x_forwarded_for
                .split(',')
                .next()
                .map(str::trim)
                .unwrap_or(&self.x_forwarded_for);
        }
        if !self.x_real_ip.is_empty() {
            return &self.x_real_ip;
        }
        &self.client_host
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            client_addr: String::new(),
            client_host: String::new(),
            client_port: String::new(),
            method: String::new(),
            path: String::new(),
            protocol: String::new(),
            scheme: String::new(),
            status: 0,
            origin_status: None,
            duration_ns: 0,
            origin_duration_ns: None,
            content_size: 0,
            origin_content_size: None,
            router_name: String::new(),
            service_name: String::new(),
            service_url: String::new(),
            entry_point: String::new(),
            request_host: String::new(),
            request_addr: String::new(),
            request_count: 0,
            start_utc: None,
            start_local: None,
            referer: String::new(),
            user_agent: String::new(),
            x_forwarded_for: String::new(),
            x_real_ip: String::new(),
            severity_level: None,
            additional_headers: HashMap::new(),
            country: None,
            city: None,
        }
    }
}

/// Geolocation annotation supplied by an external enrichment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoLocation {
    pub ip: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Request counts bucketed by status-code class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBuckets {
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
}

/// One top-N grouping row (route, service, router, host, address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetCount {
    pub key: String,
    pub count: u64,
    pub avg_duration_ms: f64,
}

/// Top-N client IP row with the opportunistic geo annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIpCount {
    pub ip: String,
    pub count: u64,
    pub avg_duration_ms: f64,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Top-N user-agent row keyed by the canonical identifier token
/// (e.g. "Chrome", "curl"), not the raw user-agent string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgentCount {
    pub identifier: String,
    pub count: u64,
}

/// One of the 20 equal-width timeline buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub start: DateTime<Utc>,
    pub count: u64,
}

/// Condensed view of one recent error entry (status >= 400).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub method: String,
    pub path: String,
    pub status: i64,
    pub service_name: String,
    pub client_ip: String,
}

/// Rolling metrics snapshot computed over the most recent bounded set of
/// entries. Entirely recomputed on each aggregation pass; transient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    pub status_buckets: StatusBuckets,
    /// Percentage of entries with status >= 400.
    pub error_rate: f64,
    pub routes: Vec<FacetCount>,
    pub services: Vec<FacetCount>,
    pub routers: Vec<FacetCount>,
    pub request_hosts: Vec<FacetCount>,
    pub request_addrs: Vec<FacetCount>,
    pub client_ips: Vec<ClientIpCount>,
    pub user_agents: Vec<UserAgentCount>,
    pub timeline: Vec<TimelineBucket>,
    pub recent_errors: Vec<ErrorEntry>,
}

impl DashboardMetrics {
    /// All-zero snapshot for degenerate input (0 or 1 entries).
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            requests_per_second: 0.0,
            avg_response_time_ms: 0.0,
            p95_response_time_ms: 0.0,
            p99_response_time_ms: 0.0,
            status_buckets: StatusBuckets::default(),
            error_rate: 0.0,
            routes: Vec::new(),
            services: Vec::new(),
            routers: Vec::new(),
            request_hosts: Vec::new(),
            request_addrs: Vec::new(),
            client_ips: Vec::new(),
            user_agents: Vec::new(),
            timeline: Vec::new(),
            recent_errors: Vec::new(),
        }
    }
}

/// One of the seven fixed alert intervals.
///
/// # Examples
///
/// ```
/// use relaymon_common::types::AlertInterval;
///
/// let i: AlertInterval = "5m".parse().unwrap();
/// assert_eq!(i, AlertInterval::M5);
/// assert_eq!(i.to_string(), "5m");
/// assert_eq!(i.duration().num_minutes(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertInterval {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "24h")]
    H24,
}

impl AlertInterval {
    pub const ALL: [AlertInterval; 7] = [
        AlertInterval::M5,
        AlertInterval::M15,
        AlertInterval::M30,
        AlertInterval::H1,
        AlertInterval::H6,
        AlertInterval::H12,
        AlertInterval::H24,
    ];

    pub fn duration(&self) -> Duration {
        match self {
            AlertInterval::M5 => Duration::minutes(5),
            AlertInterval::M15 => Duration::minutes(15),
            AlertInterval::M30 => Duration::minutes(30),
            AlertInterval::H1 => Duration::hours(1),
            AlertInterval::H6 => Duration::hours(6),
            AlertInterval::H12 => Duration::hours(12),
            AlertInterval::H24 => Duration::hours(24),
        }
    }
}

impl std::fmt::Display for AlertInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertInterval::M5 => "5m",
            AlertInterval::M15 => "15m",
            AlertInterval::M30 => "30m",
            AlertInterval::H1 => "1h",
            AlertInterval::H6 => "6h",
            AlertInterval::H12 => "12h",
            AlertInterval::H24 => "24h",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(AlertInterval::M5),
            "15m" => Ok(AlertInterval::M15),
            "30m" => Ok(AlertInterval::M30),
            "1h" => Ok(AlertInterval::H1),
            "6h" => Ok(AlertInterval::H6),
            "12h" => Ok(AlertInterval::H12),
            "24h" => Ok(AlertInterval::H24),
            _ => Err(format!("unknown alert interval: {s}")),
        }
    }
}

/// Metrics computed over one fixed time window, scoped to a top-N limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub request_count: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    pub status_buckets: StatusBuckets,
    pub routes: Vec<FacetCount>,
    pub services: Vec<FacetCount>,
    pub routers: Vec<FacetCount>,
    pub request_hosts: Vec<FacetCount>,
    pub request_addrs: Vec<FacetCount>,
    pub client_ips: Vec<ClientIpCount>,
    pub user_agents: Vec<UserAgentCount>,
}

impl WindowMetrics {
    pub fn empty() -> Self {
        Self {
            request_count: 0,
            error_rate: 0.0,
            avg_response_time_ms: 0.0,
            p95_response_time_ms: 0.0,
            p99_response_time_ms: 0.0,
            status_buckets: StatusBuckets::default(),
            routes: Vec::new(),
            services: Vec::new(),
            routers: Vec::new(),
            request_hosts: Vec::new(),
            request_addrs: Vec::new(),
            client_ips: Vec::new(),
            user_agents: Vec::new(),
        }
    }
}

/// Persisted metrics snapshot for one (agent, interval) window.
///
/// Never mutated after creation; retained until the retention loop
/// removes it. `window_end - window_start` always equals the nominal
/// interval duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub interval: AlertInterval,
    pub entry_count: u64,
    pub metrics: WindowMetrics,
}

/// How an alert rule decides trigger eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger_type", rename_all = "lowercase")]
pub enum TriggerCondition {
    /// Fires on a fixed cadence; carries the cadence interval.
    Interval { interval: AlertInterval },
    /// Fires when at least one enabled parameter threshold is exceeded.
    Threshold,
    /// Always eligible. No event source is defined for this trigger yet;
    /// semantics pending product clarification.
    Event,
}

/// One metric facet an alert rule can include in its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertParameter {
    ErrorRate,
    AvgResponseTime,
    RequestCount,
    StatusBuckets,
    TopRoutes,
    TopServices,
    TopRouters,
    TopHosts,
    TopClientIps,
    TopUserAgents,
}

impl AlertParameter {
    /// Section title used by the notification renderers.
    pub fn title(&self) -> &'static str {
        match self {
            AlertParameter::ErrorRate => "Error Rate",
            AlertParameter::AvgResponseTime => "Avg Response Time",
            AlertParameter::RequestCount => "Requests",
            AlertParameter::StatusBuckets => "Status Codes",
            AlertParameter::TopRoutes => "Top Routes",
            AlertParameter::TopServices => "Top Services",
            AlertParameter::TopRouters => "Top Routers",
            AlertParameter::TopHosts => "Top Hosts",
            AlertParameter::TopClientIps => "Top Client IPs",
            AlertParameter::TopUserAgents => "Top User Agents",
        }
    }
}

/// Per-parameter configuration on an alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub parameter: AlertParameter,
    #[serde(default = "default_parameter_enabled")]
    pub enabled: bool,
    /// Top-N limit for list facets.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Numeric threshold for threshold-triggered rules.
    #[serde(default)]
    pub threshold: Option<f64>,
}

fn default_parameter_enabled() -> bool {
    true
}

/// User-defined alert rule. Created and edited externally; this core only
/// reads it and keeps per-rule last-execution bookkeeping in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// When set, the rule applies only to this agent.
    pub agent_id: Option<String>,
    pub webhook_ids: Vec<String>,
    #[serde(flatten)]
    pub trigger: TriggerCondition,
    pub parameters: Vec<ParameterConfig>,
}

/// Notification channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Discord,
    Telegram,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Discord => write!(f, "discord"),
            ChannelKind::Telegram => write!(f, "telegram"),
        }
    }
}

/// Delivery endpoint for alert notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub url: String,
    pub enabled: bool,
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// Write-once record of one notification dispatch attempt.
///
/// `status == Failed` always carries a non-empty `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub rule_id: String,
    pub webhook_id: String,
    pub agent_id: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    /// Serialized payload as sent on the wire.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Monitored agent (one proxy instance / log source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload handed to the notification renderers when a rule fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertData {
    pub agent_id: String,
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    pub request_count: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    pub status_buckets: StatusBuckets,
    pub routes: Vec<FacetCount>,
    pub services: Vec<FacetCount>,
    pub routers: Vec<FacetCount>,
    pub request_hosts: Vec<FacetCount>,
    pub client_ips: Vec<ClientIpCount>,
    pub user_agents: Vec<UserAgentCount>,
}
