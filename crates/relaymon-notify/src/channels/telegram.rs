use super::limited;
use crate::Renderer;
use relaymon_common::types::{AlertData, AlertParameter, ParameterConfig};
use serde_json::{json, Value};

const SIGNATURE: &str = "sent by relaymon";

/// Renders the markdown text payload for Telegram bot webhooks.
pub struct TelegramRenderer;

impl Renderer for TelegramRenderer {
    fn render(&self, title: &str, data: &AlertData, parameters: &[ParameterConfig]) -> Value {
        let mut sections = Vec::new();
        sections.push(format!(
            "*{}*\nAgent: *{}*\nTime: `{}`",
            title,
            data.agent_name,
            data.timestamp.to_rfc3339()
        ));

        for param in parameters.iter().filter(|p| p.enabled) {
            if let Some(body) = section_body(param, data) {
                sections.push(format!("*{}*\n{}", param.parameter.title(), body));
            }
        }

        sections.push(format!("_{SIGNATURE}_"));

        json!({
            "text": sections.join("\n\n"),
            "parse_mode": "Markdown",
        })
    }
}

fn section_body(param: &ParameterConfig, data: &AlertData) -> Option<String> {
    match param.parameter {
        AlertParameter::ErrorRate => Some(format!("{:.2}%", data.error_rate)),
        AlertParameter::AvgResponseTime => Some(format!("{:.1} ms", data.avg_response_time_ms)),
        AlertParameter::RequestCount => Some(data.request_count.to_string()),
        AlertParameter::StatusBuckets => {
            let b = &data.status_buckets;
            if b.status_2xx + b.status_3xx + b.status_4xx + b.status_5xx == 0 {
                return None;
            }
            Some(format!(
                "2xx: {} | 3xx: {} | 4xx: {} | 5xx: {}",
                b.status_2xx, b.status_3xx, b.status_4xx, b.status_5xx
            ))
        }
        AlertParameter::TopRoutes => facet_section(limited(&data.routes, param)),
        AlertParameter::TopServices => facet_section(limited(&data.services, param)),
        AlertParameter::TopRouters => facet_section(limited(&data.routers, param)),
        AlertParameter::TopHosts => facet_section(limited(&data.request_hosts, param)),
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
            Some(lines.join("\n"))
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
            Some(lines.join("\n"))
        }
    }
}

fn facet_section(facets: &[relaymon_common::types::FacetCount]) -> Option<String> {
    if facets.is_empty() {
        return None;
    }
    let lines: Vec<String> = facets
        .iter()
        .map(|f| format!("`{}` {} req (avg {:.1} ms)", f.key, f.count, f.avg_duration_ms))
        .collect();
    Some(lines.join("\n"))
}
