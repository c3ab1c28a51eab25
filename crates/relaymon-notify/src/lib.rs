//! Notification rendering and delivery.
//!
//! A [`Renderer`] turns an alert payload into one channel's wire format;
//! [`dispatcher::NotificationDispatcher`] picks the renderer for a
//! webhook's channel kind and delivers the payload, reporting a plain
//! success/failure outcome. Retry policy deliberately lives outside this
//! crate; a failed delivery is final here.

pub mod channels;
pub mod dispatcher;
pub mod error;


use relaymon_common::types::{AlertData, ParameterConfig};

/// Renders an alert payload into a channel-specific wire value.
///
/// Implementations iterate the same ordered parameter list and emit a
/// titled section per enabled parameter only when the corresponding
/// metric facet has data; absent data omits the section entirely.
pub trait Renderer: Send + Sync {
    /// The JSON body POSTed to the webhook delivery URL.
    fn render(
        &self,
        title: &str,
        data: &AlertData,
        parameters: &[ParameterConfig],
    ) -> serde_json::Value;
}
