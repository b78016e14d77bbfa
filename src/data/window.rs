//! Rolling per-series buffers backing the dashboard charts.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use gatewatch_types::{FeedConfig, FeedId, FeedPayload, Sample, SeriesKey};

use crate::scheduler::FeedSink;

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// What happened to a sample offered to a [`SeriesBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Added after the newest sample.
    Appended,
    /// Added before the newest sample, at its sorted position.
    Inserted,
    /// Replaced a sample with the same timestamp.
    Replaced,
}

/// Chronological samples for one series.
///
/// Timestamps are strictly increasing: a sample whose timestamp is already
/// present replaces the existing one.
#[derive(Debug, Clone, Default)]
pub struct SeriesBuffer {
    samples: VecDeque<Sample>,
}

impl SeriesBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a sample at its sorted position.
    ///
    /// Arrival order is not trusted: overlapping requests and small backend
    /// clock regressions both produce out-of-order samples.
    pub fn insert(&mut self, sample: Sample) -> Placement {
        let ts = sample.timestamp_ms();

        match self.samples.back() {
            None => {
                self.samples.push_back(sample);
                return Placement::Appended;
            }
            Some(last) if last.timestamp_ms() < ts => {
                self.samples.push_back(sample);
                return Placement::Appended;
            }
            _ => {}
        }

        let idx = self.samples.partition_point(|s| s.timestamp_ms() < ts);
        if self.samples.get(idx).is_some_and(|s| s.timestamp_ms() == ts) {
            self.samples[idx] = sample;
            Placement::Replaced
        } else {
            self.samples.insert(idx, sample);
            Placement::Inserted
        }
    }

    /// Drop samples older than `cutoff_ms` from the front.
    ///
    /// Returns the number of samples removed.
    pub fn evict_before(&mut self, cutoff_ms: i64) -> usize {
        let mut evicted = 0;
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp_ms() < cutoff_ms)
        {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Chart-ready `(seconds since epoch, value)` points for one field.
    ///
    /// Samples that do not carry the field are skipped.
    pub fn points(&self, field: &str) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.get(field).map(|v| (s.timestamp_ms() as f64 / 1000.0, v)))
            .collect()
    }
}

/// Counters describing one [`TimeSeriesWindow::ingest`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub appended: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// Samples already outside the horizon when they arrived.
    pub stale: usize,
    pub evicted: usize,
}

/// Per-feed, per-series rolling buffers.
///
/// Buffers are created the first time a key is seen and only removed by
/// [`reset`](Self::reset). A key missing from one payload keeps its history
/// so a sensor that drops out for a tick does not lose its chart.
#[derive(Debug, Default)]
pub struct TimeSeriesWindow {
    feeds: HashMap<FeedId, BTreeMap<SeriesKey, SeriesBuffer>>,
}

impl TimeSeriesWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a payload into the feed's buffers and trim them to `horizon`.
    pub fn ingest(
        &mut self,
        feed: &FeedId,
        payload: FeedPayload,
        horizon: Duration,
        now_ms: i64,
    ) -> IngestStats {
        let cutoff = now_ms.saturating_sub(horizon.as_millis() as i64);
        let series = self.feeds.entry(feed.clone()).or_default();
        let mut stats = IngestStats::default();

        for keyed in payload {
            let buffer = series.entry(keyed.key).or_default();
            if keyed.sample.timestamp_ms() < cutoff {
                stats.stale += 1;
                continue;
            }
            match buffer.insert(keyed.sample) {
                Placement::Appended => stats.appended += 1,
                Placement::Inserted => stats.inserted += 1,
                Placement::Replaced => stats.replaced += 1,
            }
        }

        // Trim every series of the feed, including ones absent from this
        // payload, so the horizon holds for the whole feed.
        for buffer in series.values_mut() {
            stats.evicted += buffer.evict_before(cutoff);
        }

        stats
    }

    /// Drop all buffers of a feed. Returns whether the feed had any.
    pub fn reset(&mut self, feed: &FeedId) -> bool {
        self.feeds.remove(feed).is_some()
    }

    pub fn series(&self, feed: &FeedId) -> Option<&BTreeMap<SeriesKey, SeriesBuffer>> {
        self.feeds.get(feed)
    }

    pub fn buffer(&self, feed: &FeedId, key: &str) -> Option<&SeriesBuffer> {
        self.feeds.get(feed)?.get(key)
    }

    /// Series keys of a feed, sorted.
    pub fn keys(&self, feed: &FeedId) -> Vec<&SeriesKey> {
        self.feeds
            .get(feed)
            .map(|series| series.keys().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, feed: &FeedId, key: &str) -> Option<&Sample> {
        self.buffer(feed, key)?.latest()
    }

    pub fn points(&self, feed: &FeedId, key: &str, field: &str) -> Vec<(f64, f64)> {
        self.buffer(feed, key)
            .map(|b| b.points(field))
            .unwrap_or_default()
    }

    /// Total samples buffered for a feed.
    pub fn sample_count(&self, feed: &FeedId) -> usize {
        self.feeds
            .get(feed)
            .map(|series| series.values().map(SeriesBuffer::len).sum())
            .unwrap_or(0)
    }

    pub fn has_feed(&self, feed: &FeedId) -> bool {
        self.feeds.contains_key(feed)
    }
}

/// A [`TimeSeriesWindow`] shared between poll loops and readers.
///
/// Poll loops write through the [`FeedSink`] impl; readers take the lock
/// briefly to copy out what they render.
#[derive(Debug, Clone)]
pub struct SharedWindow {
    inner: Arc<Mutex<TimeSeriesWindow>>,
    clock: fn() -> i64,
}

impl Default for SharedWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedWindow {
    pub fn new() -> Self {
        Self::with_clock(now_ms)
    }

    /// Use a custom clock for horizon trimming.
    pub fn with_clock(clock: fn() -> i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimeSeriesWindow::new())),
            clock,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, TimeSeriesWindow> {
        self.inner.lock()
    }
}

impl FeedSink<FeedPayload> for SharedWindow {
    fn ingest(&self, feed: &FeedId, payload: FeedPayload, config: &FeedConfig) {
        let now = (self.clock)();
        let stats = self
            .inner
            .lock()
            .ingest(feed, payload, config.range.as_duration(), now);
        tracing::trace!(%feed, ?stats, "window ingest");
    }

    fn reset(&self, feed: &FeedId) {
        self.inner.lock().reset(feed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    fn feed() -> FeedId {
        FeedId::from("disk-io")
    }

    fn cpu(ts: i64, value: f64) -> Sample {
        Sample::at(ts).with("cpu_percent", value)
    }

    fn timestamps(buffer: &SeriesBuffer) -> Vec<i64> {
        buffer.iter().map(Sample::timestamp_ms).collect()
    }

    #[test]
    fn new_buffer_is_empty() {
        let b = SeriesBuffer::new();
        assert!(b.is_empty());
        assert!(b.latest().is_none());
        assert!(b.points("cpu_percent").is_empty());
    }

    #[test]
    fn insert_appends_in_order() {
        let mut b = SeriesBuffer::new();
        assert_eq!(b.insert(cpu(1, 1.0)), Placement::Appended);
        assert_eq!(b.insert(cpu(2, 2.0)), Placement::Appended);
        assert_eq!(timestamps(&b), vec![1, 2]);
    }

    #[test]
    fn insert_same_timestamp_replaces() {
        let mut b = SeriesBuffer::new();
        b.insert(cpu(5, 1.0));
        assert_eq!(b.insert(cpu(5, 9.0)), Placement::Replaced);
        assert_eq!(b.len(), 1);
        assert_eq!(b.latest().unwrap().get("cpu_percent"), Some(9.0));
    }

    #[test]
    fn insert_out_of_order_lands_sorted() {
        let mut b = SeriesBuffer::new();
        b.insert(cpu(10, 1.0));
        b.insert(cpu(30, 3.0));
        assert_eq!(b.insert(cpu(20, 2.0)), Placement::Inserted);
        assert_eq!(b.insert(cpu(5, 0.5)), Placement::Inserted);
        assert_eq!(b.insert(cpu(20, 2.5)), Placement::Replaced);
        assert_eq!(timestamps(&b), vec![5, 10, 20, 30]);
        assert_eq!(b.points("cpu_percent")[2], (0.02, 2.5));
    }

    #[test]
    fn evict_trims_prefix_only() {
        let mut b = SeriesBuffer::new();
        for ts in [1, 2, 3, 4] {
            b.insert(cpu(ts, 0.0));
        }
        assert_eq!(b.evict_before(3), 2);
        assert_eq!(timestamps(&b), vec![3, 4]);
        assert_eq!(b.evict_before(0), 0);
    }

    #[test]
    fn ingest_creates_buffers_per_key() {
        let mut w = TimeSeriesWindow::new();
        let now = 100 * MINUTE;
        let payload = FeedPayload::builder()
            .sample("sda", Sample::at(now).with("read_mbps", 1.0))
            .sample("sdb", Sample::at(now).with("read_mbps", 2.0))
            .build();

        let stats = w.ingest(&feed(), payload, Duration::from_secs(600), now);

        assert_eq!(stats.appended, 2);
        let keys: Vec<&str> = w.keys(&feed()).into_iter().map(SeriesKey::as_str).collect();
        assert_eq!(keys, vec!["sda", "sdb"]);
        assert_eq!(w.latest(&feed(), "sdb").unwrap().get("read_mbps"), Some(2.0));
    }

    #[test]
    fn ingest_enforces_horizon() {
        let mut w = TimeSeriesWindow::new();
        let horizon = Duration::from_secs(30 * 60);

        let old = FeedPayload::builder()
            .sample("system", cpu(0, 1.0))
            .sample("system", cpu(10 * MINUTE, 2.0))
            .build();
        w.ingest(&feed(), old, horizon, 20 * MINUTE);
        assert_eq!(w.sample_count(&feed()), 2);

        let fresh = FeedPayload::builder()
            .sample("system", cpu(35 * MINUTE, 3.0))
            .build();
        let stats = w.ingest(&feed(), fresh, horizon, 35 * MINUTE);

        assert_eq!(stats.evicted, 1);
        let buffer = w.buffer(&feed(), "system").unwrap();
        assert_eq!(timestamps(buffer), vec![10 * MINUTE, 35 * MINUTE]);
    }

    #[test]
    fn ingest_drops_samples_already_outside_horizon() {
        let mut w = TimeSeriesWindow::new();
        let payload = FeedPayload::builder()
            .sample("system", cpu(0, 1.0))
            .sample("system", cpu(59 * MINUTE, 2.0))
            .build();

        let stats = w.ingest(&feed(), payload, Duration::from_secs(600), 60 * MINUTE);

        assert_eq!(stats.stale, 1);
        assert_eq!(w.sample_count(&feed()), 1);
    }

    #[test]
    fn missing_key_keeps_history_but_is_trimmed() {
        let mut w = TimeSeriesWindow::new();
        let horizon = Duration::from_secs(600);

        let both = FeedPayload::builder()
            .sample("cpu_thermal", Sample::at(0).with("temperature_c", 50.0))
            .sample("nvme", Sample::at(0).with("temperature_c", 40.0))
            .build();
        w.ingest(&feed(), both, horizon, 0);

        let only_cpu = FeedPayload::builder()
            .sample("cpu_thermal", Sample::at(MINUTE).with("temperature_c", 51.0))
            .build();
        w.ingest(&feed(), only_cpu, horizon, MINUTE);

        // nvme dropped out for a tick: still there
        assert_eq!(w.buffer(&feed(), "nvme").unwrap().len(), 1);

        let later = FeedPayload::builder()
            .sample("cpu_thermal", Sample::at(11 * MINUTE).with("temperature_c", 52.0))
            .build();
        w.ingest(&feed(), later, horizon, 11 * MINUTE);

        // key retained, samples aged out
        let nvme = w.buffer(&feed(), "nvme").unwrap();
        assert!(nvme.is_empty());
        assert_eq!(w.keys(&feed()).len(), 2);
    }

    #[test]
    fn reset_drops_feed_only() {
        let mut w = TimeSeriesWindow::new();
        let other = FeedId::from("temperatures");
        let payload = FeedPayload::builder().sample("system", cpu(0, 1.0)).build();
        w.ingest(&feed(), payload.clone(), Duration::from_secs(60), 0);
        w.ingest(&other, payload, Duration::from_secs(60), 0);

        assert!(w.reset(&feed()));
        assert!(!w.reset(&feed()));
        assert!(!w.has_feed(&feed()));
        assert_eq!(w.sample_count(&other), 1);
    }

    #[test]
    fn shared_window_uses_config_range_as_horizon() {
        fn fixed_clock() -> i64 {
            60 * MINUTE
        }

        let window = SharedWindow::with_clock(fixed_clock);
        let config = FeedConfig::poll(
            gatewatch_types::TimeRange::minutes(30).unwrap(),
            Duration::from_secs(10),
        );
        let payload = FeedPayload::builder()
            .sample("system", cpu(20 * MINUTE, 1.0))
            .sample("system", cpu(40 * MINUTE, 2.0))
            .build();

        window.ingest(&feed(), payload, &config);

        let guard = window.lock();
        assert_eq!(timestamps(guard.buffer(&feed(), "system").unwrap()), vec![40 * MINUTE]);
        drop(guard);

        window.reset(&feed());
        assert!(!window.lock().has_feed(&feed()));
    }
}
