//! Periodic pull loops, one per feed.
//!
//! A [`PollingScheduler`] owns one background task per feed. Each task
//! fetches from its [`PollSource`], skips payloads identical to the last
//! accepted one, and hands the rest to a [`FeedSink`].
//!
//! Every feed carries a generation counter. [`PollingScheduler::reconfigure`]
//! bumps it under the feed's fence lock, and a task only admits a response
//! while holding the same lock with a matching generation, so a response
//! issued for an old configuration can never land in buffers built for the
//! new one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use gatewatch_client::FeedError;
use gatewatch_types::{FeedConfig, FeedId, FeedMode};

use crate::data::Fingerprint;
use crate::source::PollSource;
use crate::status::{StatusSink, DEGRADED_AFTER_FAILURES};

/// Destination of accepted payloads.
pub trait FeedSink<P>: Send + Sync + 'static {
    /// Merge an accepted payload for `feed`, fetched under `config`.
    fn ingest(&self, feed: &FeedId, payload: P, config: &FeedConfig);

    /// Forget everything held for `feed`.
    fn reset(&self, feed: &FeedId);
}

#[derive(Debug, Default)]
struct FenceState {
    generation: u64,
    fingerprint: Option<Fingerprint>,
    consecutive_failures: u32,
}

struct PollLoop<P> {
    config: FeedConfig,
    source: Arc<dyn PollSource<P>>,
    fence: Arc<Mutex<FenceState>>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<P> PollLoop<P> {
    fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Runs one pull loop per feed.
///
/// Loops are spawned onto the current tokio runtime. Dropping the scheduler
/// closes every stop channel, which ends all loops at their next suspension
/// point.
pub struct PollingScheduler<P> {
    loops: HashMap<FeedId, PollLoop<P>>,
    sink: Arc<dyn FeedSink<P>>,
    status: Arc<dyn StatusSink>,
}

impl<P> PollingScheduler<P>
where
    P: Hash + Send + 'static,
{
    pub fn new(sink: Arc<dyn FeedSink<P>>, status: Arc<dyn StatusSink>) -> Self {
        Self {
            loops: HashMap::new(),
            sink,
            status,
        }
    }

    /// Start polling `feed`, firing the first request immediately.
    pub fn start(
        &mut self,
        feed: FeedId,
        source: Arc<dyn PollSource<P>>,
        config: FeedConfig,
    ) -> Result<(), FeedError> {
        validate(&config)?;
        if self.loops.contains_key(&feed) {
            return Err(FeedError::AlreadyRunning(feed));
        }

        let fence = Arc::new(Mutex::new(FenceState::default()));
        tracing::info!(
            %feed,
            source = source.description(),
            range = %config.range,
            refresh_ms = config.refresh_interval.as_millis() as u64,
            "starting poll loop"
        );
        let poll_loop = self.spawn(feed.clone(), source, config, fence, 0);
        self.loops.insert(feed, poll_loop);
        Ok(())
    }

    /// Replace the configuration of a running feed.
    ///
    /// The in-flight request and pending timer are cancelled, the feed's
    /// fingerprint and sink state are cleared, and a new loop starts with an
    /// immediate request.
    pub fn reconfigure(&mut self, feed: &FeedId, config: FeedConfig) -> Result<(), FeedError> {
        validate(&config)?;
        let old = self
            .loops
            .remove(feed)
            .ok_or_else(|| FeedError::NotRunning(feed.clone()))?;
        old.signal_stop();

        let generation = {
            let mut fence = old.fence.lock();
            fence.generation += 1;
            fence.fingerprint = None;
            fence.consecutive_failures = 0;
            self.sink.reset(feed);
            fence.generation
        };
        tracing::info!(
            %feed,
            generation,
            range = %config.range,
            refresh_ms = config.refresh_interval.as_millis() as u64,
            "reconfiguring poll loop"
        );

        let poll_loop = self.spawn(feed.clone(), old.source, config, old.fence, generation);
        self.loops.insert(feed.clone(), poll_loop);
        Ok(())
    }

    /// Stop polling `feed`. Returns whether a loop was running.
    pub fn stop(&mut self, feed: &FeedId) -> bool {
        let Some(poll_loop) = self.loops.remove(feed) else {
            return false;
        };
        poll_loop.signal_stop();
        poll_loop.fence.lock().generation += 1;
        self.status.report_stopped(feed);
        tracing::info!(%feed, "stopped poll loop");
        true
    }

    pub fn is_running(&self, feed: &FeedId) -> bool {
        self.loops.contains_key(feed)
    }

    /// Current configuration of a running feed.
    pub fn config(&self, feed: &FeedId) -> Option<&FeedConfig> {
        self.loops.get(feed).map(|l| &l.config)
    }

    /// Running feeds, sorted.
    pub fn feeds(&self) -> Vec<FeedId> {
        let mut feeds: Vec<_> = self.loops.keys().cloned().collect();
        feeds.sort();
        feeds
    }

    /// Stop every loop and wait for the tasks to finish.
    pub async fn shutdown(&mut self) {
        let loops: Vec<_> = self.loops.drain().collect();
        for (_, poll_loop) in &loops {
            poll_loop.signal_stop();
        }
        for (feed, poll_loop) in loops {
            if let Err(e) = poll_loop.handle.await {
                tracing::warn!(%feed, error = %e, "poll task ended abnormally");
            }
        }
    }

    fn spawn(
        &self,
        feed: FeedId,
        source: Arc<dyn PollSource<P>>,
        config: FeedConfig,
        fence: Arc<Mutex<FenceState>>,
        generation: u64,
    ) -> PollLoop<P> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = LoopContext {
            feed,
            generation,
            config: config.clone(),
            source: source.clone(),
            sink: self.sink.clone(),
            status: self.status.clone(),
            fence: fence.clone(),
        };
        let handle = tokio::spawn(ctx.run(stop_rx));
        PollLoop {
            config,
            source,
            fence,
            stop_tx,
            handle,
        }
    }
}

fn validate(config: &FeedConfig) -> Result<(), FeedError> {
    if config.refresh_interval.is_zero() {
        return Err(FeedError::InvalidConfig(
            "refresh interval must be greater than zero".into(),
        ));
    }
    if config.request_timeout.is_zero() {
        return Err(FeedError::InvalidConfig(
            "request timeout must be greater than zero".into(),
        ));
    }
    if config.mode == FeedMode::Stream {
        return Err(FeedError::InvalidConfig(
            "feed is in stream mode and cannot be polled".into(),
        ));
    }
    Ok(())
}

/// Everything one loop task needs, captured at spawn.
struct LoopContext<P> {
    feed: FeedId,
    generation: u64,
    config: FeedConfig,
    source: Arc<dyn PollSource<P>>,
    sink: Arc<dyn FeedSink<P>>,
    status: Arc<dyn StatusSink>,
    fence: Arc<Mutex<FenceState>>,
}

impl<P> LoopContext<P>
where
    P: Hash + Send + 'static,
{
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let timeout = self.config.effective_timeout();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                result = tokio::time::timeout(timeout, self.source.fetch(&self.config.range)) => result,
            };

            match outcome {
                Ok(Ok(payload)) => {
                    self.admit(payload);
                }
                Ok(Err(e)) => self.fail(e),
                Err(_) => self.fail(FeedError::Timeout),
            }

            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
            }
        }
        tracing::debug!(feed = %self.feed, generation = self.generation, "poll loop exited");
    }

    /// Forward a payload to the sink unless it is stale or unchanged.
    /// Returns whether the sink received it.
    fn admit(&self, payload: P) -> bool {
        let fingerprint = Fingerprint::of(&payload);
        let mut fence = self.fence.lock();
        if fence.generation != self.generation {
            tracing::debug!(
                feed = %self.feed,
                generation = self.generation,
                current = fence.generation,
                "discarding stale response"
            );
            return false;
        }

        fence.consecutive_failures = 0;
        let changed = fence.fingerprint != Some(fingerprint);
        if changed {
            fence.fingerprint = Some(fingerprint);
            self.sink.ingest(&self.feed, payload, &self.config);
        } else {
            tracing::trace!(feed = %self.feed, "payload unchanged");
        }
        drop(fence);

        self.status.report_success(&self.feed);
        changed
    }

    fn fail(&self, error: FeedError) {
        if error.is_cancelled() {
            return;
        }
        let failures = {
            let mut fence = self.fence.lock();
            if fence.generation != self.generation {
                return;
            }
            fence.consecutive_failures = fence.consecutive_failures.saturating_add(1);
            fence.consecutive_failures
        };

        if failures == DEGRADED_AFTER_FAILURES {
            tracing::warn!(feed = %self.feed, failures, error = %error, "feed degraded");
        } else {
            tracing::warn!(feed = %self.feed, failures, error = %error, "poll failed");
        }
        self.status.report_error(&self.feed, &error);
    }
}
