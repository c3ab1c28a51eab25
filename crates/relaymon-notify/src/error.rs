/// Errors raised while delivering a notification.
///
/// The dispatcher flattens these into its success/failure outcome; the
/// enum exists so delivery internals can use `?` and still produce a
/// human-readable message for the notification record.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The HTTP request itself failed (connect, DNS, timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Payload serialization failed.
    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
