use thiserror::Error;

/// The feature request was rejected or the feed could not be reached.
///
/// This is the only error in the daemon that is surfaced synchronously to the
/// caller of [`crate::subscription::FeatureSubscriptionManager::request_features`];
/// everything else is contained and logged where it occurs.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("feed unreachable: {0}")]
    FeedUnreachable(String),
    #[error("feature request rejected: {0}")]
    Rejected(String),
    /// The feed task dropped the request before answering it.
    #[error("feed task closed the request channel")]
    ChannelClosed,
}

/// A per-category payload failed to decode.
///
/// Category-scoped and recoverable: the normalizer keeps the previous value,
/// marks the category stale, and never lets this escape the pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("field `{field}` is not an integer (got {raw:?})")]
    NotAnInteger { field: &'static str, raw: String },
    #[error("field `{field}` is not valid JSON: {source}")]
    BadJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("field `{field}` has an unexpected shape")]
    UnexpectedShape { field: &'static str },
}

/// Transport-level loss of the feed connection.
///
/// Pauses ingestion and triggers a backoff resubscription; not fatal.
#[derive(Debug, Error)]
#[error("feed disconnected: {reason}")]
pub struct FeedDisconnect {
    pub reason: String,
}

impl FeedDisconnect {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// A downstream subscriber failed while handling a published update.
///
/// Isolated per listener: delivery to the remaining listeners continues.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListenerError {
    pub message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A window-chrome call failed during a visibility toggle.
#[derive(Debug, Error)]
pub enum ChromeError {
    #[error("overlay window not found")]
    WindowNotFound,
    #[error("window chrome is unavailable on this platform")]
    Unsupported,
    #[error("{0}")]
    Platform(String),
}
