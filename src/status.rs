//! Per-feed status reporting.
//!
//! Poll loops and streams report outcomes through [`StatusSink`]; the
//! [`StatusBoard`] keeps the latest state of every feed for display.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use gatewatch_client::FeedError;
use gatewatch_types::FeedId;

/// Consecutive failures after which a feed is shown as degraded.
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Receives acquisition outcomes.
///
/// Implementations must be cheap and non-blocking: they are called from
/// inside poll loops.
pub trait StatusSink: Send + Sync {
    fn report_success(&self, feed: &FeedId);

    fn report_error(&self, feed: &FeedId, error: &FeedError);

    /// The feed was stopped on purpose.
    fn report_stopped(&self, feed: &FeedId);
}

/// Coarse status shown next to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeedState {
    /// No outcome yet.
    Pending,
    Live,
    /// Repeated failures; last-known-good data is still shown.
    Degraded,
    Stopped,
}

impl FeedState {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            FeedState::Pending => "..",
            FeedState::Live => "OK",
            FeedState::Degraded => "WARN",
            FeedState::Stopped => "OFF",
        }
    }
}

/// Latest known status of one feed.
#[derive(Debug, Clone)]
pub struct FeedStatus {
    pub state: FeedState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<Instant>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: FeedState::Pending,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
        }
    }
}

/// Overwrite-latest status store shared by all feeds.
#[derive(Debug, Default)]
pub struct StatusBoard {
    feeds: RwLock<HashMap<FeedId, FeedStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed: &FeedId) -> Option<FeedStatus> {
        self.feeds.read().get(feed).cloned()
    }

    pub fn state(&self, feed: &FeedId) -> FeedState {
        self.feeds
            .read()
            .get(feed)
            .map(|s| s.state)
            .unwrap_or(FeedState::Pending)
    }

    /// All feeds, sorted by id.
    pub fn snapshot(&self) -> Vec<(FeedId, FeedStatus)> {
        let mut all: Vec<_> = self
            .feeds
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn update(&self, feed: &FeedId, f: impl FnOnce(&mut FeedStatus)) {
        let mut feeds = self.feeds.write();
        f(feeds.entry(feed.clone()).or_default());
    }
}

impl StatusSink for StatusBoard {
    fn report_success(&self, feed: &FeedId) {
        self.update(feed, |s| {
            s.state = FeedState::Live;
            s.consecutive_failures = 0;
            s.last_success = Some(Instant::now());
        });
    }

    fn report_error(&self, feed: &FeedId, error: &FeedError) {
        if error.is_cancelled() {
            return;
        }
        self.update(feed, |s| {
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_error = Some(error.to_string());
            if s.consecutive_failures >= DEGRADED_AFTER_FAILURES {
                s.state = FeedState::Degraded;
            }
        });
    }

    fn report_stopped(&self, feed: &FeedId) {
        self.update(feed, |s| {
            s.state = FeedState::Stopped;
            s.consecutive_failures = 0;
        });
    }
}
