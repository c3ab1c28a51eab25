use std::time::Duration;

use relaymon_common::types::{AlertData, ChannelKind, ParameterConfig, Webhook};
use tracing::{debug, warn};

use crate::channels::{DiscordRenderer, TelegramRenderer};
use crate::error::NotifyError;
use crate::Renderer;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Upstream error bodies are truncated to keep notification records small.
const MAX_ERROR_BODY: usize = 512;

/// Result of one delivery attempt, flattened for record keeping.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Serialized payload as sent, recorded regardless of outcome.
    pub payload: String,
}

/// Delivers rendered alert payloads to webhook endpoints.
///
/// One attempt per call, no retry. Callers that want retry semantics
/// wrap the dispatcher rather than configuring it here.
pub struct NotificationDispatcher {
    client: reqwest::Client,
    discord: DiscordRenderer,
    telegram: TelegramRenderer,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            discord: DiscordRenderer,
            telegram: TelegramRenderer,
        }
    }

    /// Render the payload for the webhook's channel and POST it.
    ///
    /// Never returns an error; failures are captured in the outcome so
    /// the caller can write a notification record either way.
    pub async fn send(
        &self,
        webhook: &Webhook,
        title: &str,
        data: &AlertData,
        parameters: &[ParameterConfig],
    ) -> DispatchOutcome {
        let renderer: &dyn Renderer = match webhook.kind {
            ChannelKind::Discord => &self.discord,
            ChannelKind::Telegram => &self.telegram,
        };
        let body = renderer.render(title, data, parameters);
        let payload = body.to_string();

        match self.post(&webhook.url, &body).await {
            Ok(()) => {
                debug!(webhook_id = %webhook.id, kind = %webhook.kind, "notification delivered");
                DispatchOutcome {
                    success: true,
                    error: None,
                    payload,
                }
            }
            Err(err) => {
                warn!(webhook_id = %webhook.id, kind = %webhook.kind, error = %err, "notification delivery failed");
                DispatchOutcome {
                    success: false,
                    error: Some(err.to_string()),
                    payload,
                }
            }
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<(), NotifyError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let mut text = response.text().await.unwrap_or_default();
        text.truncate(MAX_ERROR_BODY);
        Err(NotifyError::Api {
            status: status.as_u16(),
            body: text,
        })
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
