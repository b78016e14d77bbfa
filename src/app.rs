//! Dashboard composition and control handling.
//!
//! The [`Dashboard`] owns every feed and turns user control changes into
//! scheduler and tail operations. A log feed is either polled or followed,
//! never both.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use gatewatch_client::FeedError;
use gatewatch_types::{ConnectionState, FeedConfig, FeedId, FeedMode, FeedPayload, LogQuery, TimeRange};

use crate::data::SharedWindow;
use crate::events::ControlEvent;
use crate::health::HealthReader;
use crate::scheduler::{FeedSink, PollingScheduler};
use crate::source::{LogSource, PollSource};
use crate::status::{StatusBoard, StatusSink};
use crate::tail::{LogBuffers, SharedLog, StreamingTail};

/// What a feed carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Series,
    Log,
}

impl FeedKind {
    pub fn label(&self) -> &'static str {
        match self {
            FeedKind::Series => "series",
            FeedKind::Log => "log",
        }
    }
}

enum FeedSource {
    Series(Arc<dyn PollSource<FeedPayload>>),
    Log {
        source: Arc<dyn PollSource<String>>,
        query: LogQuery,
    },
}

struct FeedEntry {
    /// Last accepted configuration, kept while the feed is stopped.
    config: FeedConfig,
    source: FeedSource,
}

impl FeedEntry {
    fn kind(&self) -> FeedKind {
        match self.source {
            FeedSource::Series(_) => FeedKind::Series,
            FeedSource::Log { .. } => FeedKind::Log,
        }
    }
}

/// Every feed of one dashboard and the state they write into.
pub struct Dashboard {
    feeds: HashMap<FeedId, FeedEntry>,
    window: SharedWindow,
    logs: LogBuffers,
    status: Arc<StatusBoard>,
    health: HealthReader,
    series: PollingScheduler<FeedPayload>,
    log_polls: PollingScheduler<String>,
    tail: StreamingTail,
}

impl Dashboard {
    /// Create an empty dashboard.
    ///
    /// `log_source` opens follow-mode streams for every log feed.
    pub fn new(log_source: Arc<dyn LogSource>, health: HealthReader, log_buffer_bytes: usize) -> Self {
        Self::with_window(SharedWindow::new(), log_source, health, log_buffer_bytes)
    }

    pub fn with_window(
        window: SharedWindow,
        log_source: Arc<dyn LogSource>,
        health: HealthReader,
        log_buffer_bytes: usize,
    ) -> Self {
        let status = Arc::new(StatusBoard::new());
        let logs = LogBuffers::new(log_buffer_bytes);
        Self {
            feeds: HashMap::new(),
            series: PollingScheduler::new(Arc::new(window.clone()), status.clone()),
            log_polls: PollingScheduler::new(Arc::new(logs.clone()), status.clone()),
            tail: StreamingTail::new(log_source, logs.clone(), status.clone()),
            window,
            logs,
            status,
            health,
        }
    }

    /// Add a numeric feed and start polling it.
    pub fn add_series_feed(
        &mut self,
        feed: FeedId,
        source: Arc<dyn PollSource<FeedPayload>>,
        config: FeedConfig,
    ) -> Result<(), FeedError> {
        if self.feeds.contains_key(&feed) {
            return Err(FeedError::AlreadyRunning(feed));
        }
        self.series.start(feed.clone(), source.clone(), config.clone())?;
        self.feeds.insert(
            feed,
            FeedEntry {
                config,
                source: FeedSource::Series(source),
            },
        );
        Ok(())
    }

    /// Add a log feed. A config in stream mode starts following right away.
    pub fn add_log_feed(
        &mut self,
        feed: FeedId,
        source: Arc<dyn PollSource<String>>,
        query: LogQuery,
        config: FeedConfig,
    ) -> Result<(), FeedError> {
        if self.feeds.contains_key(&feed) {
            return Err(FeedError::AlreadyRunning(feed));
        }
        match config.mode {
            FeedMode::Stream => self.tail.begin(feed.clone(), query.clone())?,
            FeedMode::Poll => self.log_polls.start(feed.clone(), source.clone(), config.clone())?,
        }
        self.feeds.insert(
            feed,
            FeedEntry {
                config,
                source: FeedSource::Log { source, query },
            },
        );
        Ok(())
    }

    /// Apply one control change.
    pub fn apply(&mut self, event: ControlEvent) -> Result<(), FeedError> {
        tracing::debug!(?event, "applying control event");
        match event {
            ControlEvent::SetRange { feed, range } => self.set_range(&feed, &range),
            ControlEvent::SetRefresh { feed, interval_ms } => self.set_refresh(&feed, interval_ms),
            ControlEvent::SetFollow { feed, on } => self.set_follow(&feed, on),
            ControlEvent::Reload(feed) => self.reload(&feed),
            ControlEvent::Stop(feed) => self.stop(&feed),
        }
    }

    fn set_range(&mut self, feed: &FeedId, text: &str) -> Result<(), FeedError> {
        self.entry(feed)?;
        let range = match text.parse::<TimeRange>() {
            Ok(range) => range,
            Err(e) => {
                let error = FeedError::InvalidConfig(format!("range '{}': {}", text, e));
                self.halt(feed);
                self.status.report_error(feed, &error);
                tracing::warn!(%feed, error = %error, "rejected range");
                return Err(error);
            }
        };

        let entry = self.entry_mut(feed)?;
        entry.config = entry.config.clone().with_range(range);
        self.apply_config(feed)
    }

    fn set_refresh(&mut self, feed: &FeedId, interval_ms: u64) -> Result<(), FeedError> {
        if interval_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "refresh interval must be greater than zero".into(),
            ));
        }
        let entry = self.entry_mut(feed)?;
        entry.config = entry
            .config
            .clone()
            .with_refresh_interval(Duration::from_millis(interval_ms));
        self.apply_config(feed)
    }

    /// Put a changed config into effect. A live stream keeps it for when
    /// polling resumes; a stream that has already ended falls back to polling.
    fn apply_config(&mut self, feed: &FeedId) -> Result<(), FeedError> {
        if self.tail.is_streaming(feed) {
            return Ok(());
        }
        self.entry_mut(feed)?.config.mode = FeedMode::Poll;
        self.poll(feed)
    }

    fn set_follow(&mut self, feed: &FeedId, on: bool) -> Result<(), FeedError> {
        let entry = self.entry(feed)?;
        let query = match &entry.source {
            FeedSource::Log { query, .. } => query.clone(),
            FeedSource::Series(_) => {
                return Err(FeedError::InvalidConfig(format!(
                    "feed '{}' has no follow mode",
                    feed
                )))
            }
        };

        if on {
            if self.tail.is_streaming(feed) {
                return Ok(());
            }
            self.log_polls.stop(feed);
            self.entry_mut(feed)?.config.mode = FeedMode::Stream;
            self.tail.begin(feed.clone(), query)
        } else {
            self.resume_polling(feed)
        }
    }

    /// Manual refresh.
    fn reload(&mut self, feed: &FeedId) -> Result<(), FeedError> {
        let entry = self.entry(feed)?;
        if entry.kind() == FeedKind::Log && entry.config.mode == FeedMode::Stream {
            return self.resume_polling(feed);
        }
        self.poll(feed)
    }

    fn stop(&mut self, feed: &FeedId) -> Result<(), FeedError> {
        match self.entry(feed)?.kind() {
            FeedKind::Series => {
                self.series.stop(feed);
            }
            FeedKind::Log => {
                self.log_polls.stop(feed);
                self.tail.cancel(feed);
            }
        }
        self.status.report_stopped(feed);
        Ok(())
    }

    /// Leave follow mode and poll again, starting with an immediate request.
    fn resume_polling(&mut self, feed: &FeedId) -> Result<(), FeedError> {
        self.tail.cancel(feed);
        self.entry_mut(feed)?.config.mode = FeedMode::Poll;
        self.poll(feed)
    }

    /// (Re)start polling with the entry's config, resetting the feed's data.
    fn poll(&mut self, feed: &FeedId) -> Result<(), FeedError> {
        let entry = self
            .feeds
            .get(feed)
            .ok_or_else(|| FeedError::NotRunning(feed.clone()))?;
        let config = entry.config.clone();
        match &entry.source {
            FeedSource::Series(source) => restart(
                &mut self.series,
                &self.window,
                feed,
                source.clone(),
                config,
            ),
            FeedSource::Log { source, .. } => restart(
                &mut self.log_polls,
                &self.logs,
                feed,
                source.clone(),
                config,
            ),
        }
    }

    /// Stop all acquisition for a feed and clear its data.
    fn halt(&mut self, feed: &FeedId) {
        match self.kind(feed) {
            Some(FeedKind::Series) => {
                self.series.stop(feed);
                self.window.reset(feed);
            }
            Some(FeedKind::Log) => {
                self.log_polls.stop(feed);
                self.tail.cancel(feed);
                self.logs.reset(feed);
                if let Some(entry) = self.feeds.get_mut(feed) {
                    entry.config.mode = FeedMode::Poll;
                }
            }
            None => {}
        }
    }

    fn entry(&self, feed: &FeedId) -> Result<&FeedEntry, FeedError> {
        self.feeds
            .get(feed)
            .ok_or_else(|| FeedError::NotRunning(feed.clone()))
    }

    fn entry_mut(&mut self, feed: &FeedId) -> Result<&mut FeedEntry, FeedError> {
        self.feeds
            .get_mut(feed)
            .ok_or_else(|| FeedError::NotRunning(feed.clone()))
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    /// Display buffer of a log feed.
    pub fn log(&self, feed: &FeedId) -> SharedLog {
        self.logs.get(feed)
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn connection(&self) -> ConnectionState {
        self.health.current()
    }

    /// Configuration the feed runs with, or last ran with if stopped.
    pub fn config(&self, feed: &FeedId) -> Option<&FeedConfig> {
        self.feeds.get(feed).map(|e| &e.config)
    }

    pub fn kind(&self, feed: &FeedId) -> Option<FeedKind> {
        self.feeds.get(feed).map(FeedEntry::kind)
    }

    /// All feeds, sorted.
    pub fn feeds(&self) -> Vec<FeedId> {
        let mut feeds: Vec<_> = self.feeds.keys().cloned().collect();
        feeds.sort();
        feeds
    }

    pub fn is_polling(&self, feed: &FeedId) -> bool {
        self.series.is_running(feed) || self.log_polls.is_running(feed)
    }

    pub fn is_following(&self, feed: &FeedId) -> bool {
        self.kind(feed) == Some(FeedKind::Log) && self.tail.follow(feed)
    }

    /// Stop every feed and wait for background tasks.
    pub async fn shutdown(&mut self) {
        self.series.shutdown().await;
        self.log_polls.shutdown().await;
        self.tail.shutdown().await;
        tracing::info!("dashboard shut down");
    }
}

fn restart<P>(
    scheduler: &mut PollingScheduler<P>,
    sink: &dyn FeedSink<P>,
    feed: &FeedId,
    source: Arc<dyn PollSource<P>>,
    config: FeedConfig,
) -> Result<(), FeedError>
where
    P: Hash + Send + 'static,
{
    if scheduler.is_running(feed) {
        scheduler.reconfigure(feed, config)
    } else {
        sink.reset(feed);
        scheduler.start(feed.clone(), source, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::now_ms;
    use crate::health::HealthTracker;
    use crate::status::FeedState;
    use async_trait::async_trait;
    use futures_util::{stream, StreamExt};
    use gatewatch_client::ChunkStream;
    use gatewatch_types::Sample;
    use std::fmt::Debug;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a clone of `value` every time, counting calls.
    #[derive(Debug)]
    struct Fixed<P> {
        value: P,
        calls: AtomicUsize,
    }

    impl<P> Fixed<P> {
        fn new(value: P) -> Arc<Self> {
            Arc::new(Self {
                value,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<P> PollSource<P> for Fixed<P>
    where
        P: Clone + Debug + Send + Sync + 'static,
    {
        async fn fetch(&self, _range: &TimeRange) -> Result<P, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }

        fn description(&self) -> &str {
            "fixed"
        }
    }

    /// Streams that never produce anything until cancelled.
    #[derive(Debug, Default)]
    struct Silent {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl LogSource for Silent {
        async fn open(&self, _query: &LogQuery) -> Result<ChunkStream, FeedError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(stream::pending().boxed())
        }

        fn description(&self) -> &str {
            "silent"
        }
    }

    /// Streams that deliver one chunk and then end.
    #[derive(Debug, Default)]
    struct Brief;

    #[async_trait]
    impl LogSource for Brief {
        async fn open(&self, _query: &LogQuery) -> Result<ChunkStream, FeedError> {
            Ok(stream::iter(vec![Ok(b"bye\n".to_vec())]).boxed())
        }

        fn description(&self) -> &str {
            "brief"
        }
    }

    fn dashboard(streams: Arc<Silent>) -> Dashboard {
        let (_tx, health) = HealthTracker::create();
        Dashboard::new(streams, health, 1024)
    }

    fn config() -> FeedConfig {
        FeedConfig::poll(TimeRange::hours(1).unwrap(), Duration::from_secs(5))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn system() -> FeedId {
        FeedId::from("system")
    }

    fn logs() -> FeedId {
        FeedId::from("logs")
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_range_stops_and_clears() {
        let source = Fixed::new(
            FeedPayload::builder()
                .sample("system", Sample::at(now_ms()).with("cpu_percent", 20.0))
                .build(),
        );
        let mut dash = dashboard(Arc::default());
        dash.add_series_feed(system(), source.clone(), config()).unwrap();
        settle().await;
        assert_eq!(source.calls(), 1);
        assert!(dash.window().lock().has_feed(&system()));

        let result = dash.apply(ControlEvent::SetRange {
            feed: system(),
            range: "45x".into(),
        });
        assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
        assert!(!dash.is_polling(&system()));
        assert!(!dash.window().lock().has_feed(&system()));
        let status = dash.status().get(&system()).unwrap();
        assert!(status.last_error.unwrap().contains("45x"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1);

        dash.apply(ControlEvent::SetRange {
            feed: system(),
            range: "30m".into(),
        })
        .unwrap();
        settle().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(
            dash.config(&system()).map(|c| c.range),
            Some(TimeRange::minutes(30).unwrap())
        );
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_change_reconfigures() {
        let source = Fixed::new(FeedPayload::new());
        let mut dash = dashboard(Arc::default());
        dash.add_series_feed(system(), source.clone(), config()).unwrap();
        settle().await;

        assert!(matches!(
            dash.apply(ControlEvent::SetRefresh {
                feed: system(),
                interval_ms: 0
            }),
            Err(FeedError::InvalidConfig(_))
        ));
        dash.apply(ControlEvent::SetRefresh {
            feed: system(),
            interval_ms: 1000,
        })
        .unwrap();
        settle().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(
            dash.config(&system()).map(|c| c.refresh_interval),
            Some(Duration::from_secs(1))
        );
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn follow_toggles_between_poll_and_stream() {
        let streams = Arc::new(Silent::default());
        let source = Fixed::new(String::from("boot\n"));
        let mut dash = dashboard(streams.clone());
        dash.add_log_feed(logs(), source.clone(), LogQuery::new(), config())
            .unwrap();
        settle().await;
        assert_eq!(dash.log(&logs()).text(), "boot\n");

        dash.apply(ControlEvent::SetFollow { feed: logs(), on: true })
            .unwrap();
        settle().await;
        assert!(dash.is_following(&logs()));
        assert!(!dash.is_polling(&logs()));
        assert_eq!(streams.opened.load(Ordering::SeqCst), 1);
        assert!(dash.log(&logs()).is_empty());

        dash.apply(ControlEvent::SetFollow { feed: logs(), on: false })
            .unwrap();
        assert!(!dash.is_following(&logs()));
        assert!(dash.is_polling(&logs()));
        settle().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(dash.config(&logs()).map(|c| c.mode), Some(FeedMode::Poll));
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reload_while_following_resumes_polling() {
        let source = Fixed::new(String::new());
        let mut dash = dashboard(Arc::default());
        dash.add_log_feed(
            logs(),
            source.clone(),
            LogQuery::new(),
            config().with_mode(FeedMode::Stream),
        )
        .unwrap();
        settle().await;
        assert!(dash.is_following(&logs()));
        assert_eq!(source.calls(), 0);

        dash.apply(ControlEvent::Reload(logs())).unwrap();
        settle().await;
        assert!(!dash.is_following(&logs()));
        assert_eq!(source.calls(), 1);
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_reload() {
        let source = Fixed::new(FeedPayload::new());
        let mut dash = dashboard(Arc::default());
        dash.add_series_feed(system(), source.clone(), config()).unwrap();
        settle().await;

        dash.apply(ControlEvent::Stop(system())).unwrap();
        assert!(!dash.is_polling(&system()));
        assert_eq!(dash.status().state(&system()), FeedState::Stopped);

        dash.apply(ControlEvent::Reload(system())).unwrap();
        settle().await;
        assert!(dash.is_polling(&system()));
        assert_eq!(source.calls(), 2);
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn changes_after_stream_end_resume_polling() {
        let (_tx, health) = HealthTracker::create();
        let mut dash = Dashboard::new(Arc::new(Brief), health, 1024);
        let source = Fixed::new(String::from("polled\n"));
        dash.add_log_feed(
            logs(),
            source.clone(),
            LogQuery::new(),
            config().with_mode(FeedMode::Stream),
        )
        .unwrap();
        settle().await;
        assert!(!dash.is_following(&logs()));
        assert_eq!(dash.log(&logs()).text(), "bye\n");
        assert_eq!(source.calls(), 0);

        dash.apply(ControlEvent::SetRange {
            feed: logs(),
            range: "30m".into(),
        })
        .unwrap();
        settle().await;
        assert!(dash.is_polling(&logs()));
        assert_eq!(source.calls(), 1);
        assert_eq!(dash.config(&logs()).map(|c| c.mode), Some(FeedMode::Poll));
        assert_eq!(dash.log(&logs()).text(), "polled\n");

        dash.apply(ControlEvent::SetRefresh {
            feed: logs(),
            interval_ms: 1000,
        })
        .unwrap();
        settle().await;
        assert_eq!(source.calls(), 2);
        dash.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn changes_while_following_are_kept_for_later() {
        let streams = Arc::new(Silent::default());
        let source = Fixed::new(String::new());
        let mut dash = dashboard(streams.clone());
        dash.add_log_feed(
            logs(),
            source.clone(),
            LogQuery::new(),
            config().with_mode(FeedMode::Stream),
        )
        .unwrap();
        settle().await;

        dash.apply(ControlEvent::SetRefresh {
            feed: logs(),
            interval_ms: 2000,
        })
        .unwrap();
        settle().await;
        assert!(dash.is_following(&logs()));
        assert!(!dash.is_polling(&logs()));
        assert_eq!(source.calls(), 0);
        assert_eq!(dash.config(&logs()).map(|c| c.mode), Some(FeedMode::Stream));
        dash.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_feeds_and_kinds_are_rejected() {
        let mut dash = dashboard(Arc::default());
        dash.add_series_feed(system(), Fixed::new(FeedPayload::new()), config())
            .unwrap();

        assert_eq!(
            dash.apply(ControlEvent::Reload(logs())),
            Err(FeedError::NotRunning(logs()))
        );
        assert!(matches!(
            dash.apply(ControlEvent::SetFollow { feed: system(), on: true }),
            Err(FeedError::InvalidConfig(_))
        ));
        assert_eq!(
            dash.add_series_feed(system(), Fixed::new(FeedPayload::new()), config()),
            Err(FeedError::AlreadyRunning(system()))
        );
        assert_eq!(dash.kind(&system()), Some(FeedKind::Series));
        dash.shutdown().await;
    }
}
