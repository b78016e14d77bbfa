//! Feed identity and per-feed configuration.

use std::fmt;
use std::time::Duration;

use crate::TimeRange;

/// Identity of one logical telemetry source (a chart or a log view).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FeedId(String);

impl FeedId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FeedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Transport used to keep a feed current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FeedMode {
    /// Periodic pull.
    #[default]
    Poll,
    /// Long-lived chunked stream.
    Stream,
}

impl FeedMode {
    pub fn label(&self) -> &'static str {
        match self {
            FeedMode::Poll => "poll",
            FeedMode::Stream => "stream",
        }
    }
}

/// Default upper bound on a single poll request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of one feed.
///
/// Replacing a feed's config is all-or-nothing: in-flight requests for the
/// old config are invalidated and the feed's buffers are reset.
///
/// # Example
///
/// ```rust
/// use gatewatch_types::{FeedConfig, FeedMode, TimeRange};
/// use std::time::Duration;
///
/// let config = FeedConfig::poll(TimeRange::minutes(30).unwrap(), Duration::from_secs(5));
/// assert_eq!(config.mode, FeedMode::Poll);
///
/// // Requests never outlive the refresh interval.
/// assert_eq!(config.effective_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Time range requested from the backend and used as window horizon.
    pub range: TimeRange,
    /// Delay between the completion of one request and the next.
    pub refresh_interval: Duration,
    pub mode: FeedMode,
    /// Upper bound on a single poll request.
    pub request_timeout: Duration,
}

impl FeedConfig {
    /// A polling configuration with the default request timeout.
    pub fn poll(range: TimeRange, refresh_interval: Duration) -> Self {
        Self {
            range,
            refresh_interval,
            mode: FeedMode::Poll,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_mode(mut self, mode: FeedMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Timeout applied to a poll request: never longer than the refresh
    /// interval, so a slow backend cannot pile requests up.
    pub fn effective_timeout(&self) -> Duration {
        self.request_timeout.min(self.refresh_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_timeout_uses_smaller_bound() {
        let range = TimeRange::hours(1).unwrap();
        let fast = FeedConfig::poll(range, Duration::from_millis(500));
        assert_eq!(fast.effective_timeout(), Duration::from_millis(500));

        let slow = FeedConfig::poll(range, Duration::from_secs(60));
        assert_eq!(slow.effective_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_builders_replace_fields() {
        let config = FeedConfig::poll(TimeRange::hours(1).unwrap(), Duration::from_secs(1))
            .with_range(TimeRange::minutes(5).unwrap())
            .with_mode(FeedMode::Stream);
        assert_eq!(config.range.to_string(), "5m");
        assert_eq!(config.mode, FeedMode::Stream);
    }
}
