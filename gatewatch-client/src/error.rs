//! Error taxonomy for feed acquisition.

use gatewatch_types::FeedId;
use thiserror::Error;

/// Errors raised while acquiring or managing a feed.
///
/// [`FeedError::Cancelled`] is not a failure: it is the expected outcome of
/// stopping or reconfiguring a feed and is never reported to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// Request failed to complete.
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Malformed response body or chunk.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request exceeded its time budget.
    #[error("Request timed out")]
    Timeout,

    /// The operation was cancelled by its owner.
    #[error("Cancelled")]
    Cancelled,

    /// Caller supplied an unusable configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A poll loop already exists for the feed.
    #[error("Feed '{0}' is already running")]
    AlreadyRunning(FeedId),

    /// No poll loop exists for the feed.
    #[error("Feed '{0}' is not running")]
    NotRunning(FeedId),

    /// A stream is already open for the feed.
    #[error("Feed '{0}' is already streaming")]
    AlreadyStreaming(FeedId),
}

impl FeedError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FeedError::Cancelled)
    }

    /// HTTP status code, if the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FeedError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else if err.is_body() || err.is_decode() {
            // JSON goes through serde_json and no content-encoding is
            // negotiated, so these only come from a body read that broke off.
            FeedError::Network(describe(&err))
        } else if let Some(status) = err.status() {
            FeedError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

/// Error message followed by its sources, e.g. the hyper cause of a body error.
#[cfg(feature = "http")]
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}
