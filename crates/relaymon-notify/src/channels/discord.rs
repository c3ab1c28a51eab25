use super::limited;
use crate::Renderer;
use relaymon_common::types::{AlertData, AlertParameter, ParameterConfig};
use serde_json::{json, Value};

const EMBED_USERNAME: &str = "relaymon";
const EMBED_FOOTER: &str = "relaymon alerts";
/// Embed accent: red above 50% error rate, amber above 10%, blue below.
const COLOR_RED: u32 = 0xE7_4C_3C;
const COLOR_AMBER: u32 = 0xE6_7E_22;
const COLOR_BLUE: u32 = 0x34_98_DB;

/// Renders the embed-style payload for Discord webhooks.
pub struct DiscordRenderer;

impl Renderer for DiscordRenderer {
    fn render(&self, title: &str, data: &AlertData, parameters: &[ParameterConfig]) -> Value {
        let mut fields = Vec::new();
        for param in parameters.iter().filter(|p| p.enabled) {
            if let Some((value, inline)) = field_value(param, data) {
                fields.push(json!({
                    "name": param.parameter.title(),
                    "value": value,
                    "inline": inline,
                }));
            }
        }

        json!({
            "username": EMBED_USERNAME,
            "embeds": [{
                "title": title,
                "description": format!(
                    "Agent **{}** ({} requests in window)",
                    data.agent_name, data.request_count
                ),
                "color": embed_color(data.error_rate),
                "timestamp": data.timestamp.to_rfc3339(),
                "footer": { "text": EMBED_FOOTER },
                "author": { "name": data.agent_name },
                "fields": fields,
            }]
        })
    }
}

fn embed_color(error_rate: f64) -> u32 {
    if error_rate >= 50.0 {
        COLOR_RED
    } else if error_rate >= 10.0 {
        COLOR_AMBER
    } else {
        COLOR_BLUE
    }
}

/// Field body for one enabled parameter, or `None` when the facet has no
/// data. Scalar fields render inline; list fields take the full width.
fn field_value(param: &ParameterConfig, data: &AlertData) -> Option<(String, bool)> {
    match param.parameter {
        AlertParameter::ErrorRate => Some((format!("{:.2}%", data.error_rate), true)),
        AlertParameter::AvgResponseTime => {
            Some((format!("{:.1} ms", data.avg_response_time_ms), true))
        }
        AlertParameter::RequestCount => Some((data.request_count.to_string(), true)),
        AlertParameter::StatusBuckets => {
            let b = &data.status_buckets;
            if b.status_2xx + b.status_3xx + b.status_4xx + b.status_5xx == 0 {
                return None;
            }
            Some((
                format!(
                    "2xx: {}\n3xx: {}\n4xx: {}\n5xx: {}",
                    b.status_2xx, b.status_3xx, b.status_4xx, b.status_5xx
                ),
                true,
            ))
        }
        AlertParameter::TopRoutes => facet_field(limited(&data.routes, param)),
        AlertParameter::TopServices => facet_field(limited(&data.services, param)),
        AlertParameter::TopRouters => facet_field(limited(&data.routers, param)),
        AlertParameter::TopHosts => facet_field(limited(&data.request_hosts, param)),
        AlertParameter::TopClientIps => {
            let ips = limited(&data.client_ips, param);
            if ips.is_empty() {
                return None;
            }
            let lines: Vec<String> = ips
                .iter()
                .map(|ip| {
                    let geo = match (&ip.city, &ip.country) {
                        (Some(city), Some(country)) => format!(" ({city}, {country})"),
                        (None, Some(country)) => format!(" ({country})"),
                        _ => String::new(),
                    };
                    format!("`{}` {} req{}", ip.ip, ip.count, geo)
                })
                .collect();
            Some((lines.join("\n"), false))
        }
        AlertParameter::TopUserAgents => {
            let agents = limited(&data.user_agents, param);
            if agents.is_empty() {
                return None;
            }
            let lines: Vec<String> = agents
                .iter()
                .map(|ua| format!("{} {} req", ua.identifier, ua.count))
                .collect();
            Some((lines.join("\n"), false))
        }
    }
}

fn facet_field(facets: &[relaymon_common::types::FacetCount]) -> Option<(String, bool)> {
    if facets.is_empty() {
        return None;
    }
    let lines: Vec<String> = facets
        .iter()
        .map(|f| format!("`{}` {} req (avg {:.1} ms)", f.key, f.count, f.avg_duration_ms))
        .collect();
    Some((lines.join("\n"), false))
}
