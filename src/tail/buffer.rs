//! Bounded log display buffers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use gatewatch_types::{FeedConfig, FeedId};

use crate::scheduler::FeedSink;

/// Default bound on a log display buffer.
pub const DEFAULT_LOG_BUFFER_BYTES: usize = 1024 * 1024;

/// Log text kept as the chunks it arrived in.
///
/// When the total size exceeds `max_bytes`, whole chunks are dropped from the
/// front. The newest chunk is always kept, even if it alone exceeds the bound.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<String>,
    bytes: usize,
    max_bytes: usize,
}

impl LogBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Append one chunk. Returns how many old chunks were evicted.
    pub fn push(&mut self, chunk: String) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        self.bytes += chunk.len();
        self.entries.push_back(chunk);

        let mut evicted = 0;
        while self.bytes > self.max_bytes && self.entries.len() > 1 {
            if let Some(old) = self.entries.pop_front() {
                self.bytes -= old.len();
                evicted += 1;
            }
        }
        evicted
    }

    /// Replace the contents with a single body.
    pub fn replace(&mut self, text: String) {
        self.clear();
        self.push(text);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// The whole buffer as one string.
    pub fn text(&self) -> String {
        self.entries.iter().map(String::as_str).collect()
    }

    /// Number of chunks held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[derive(Debug)]
struct LogState {
    buffer: LogBuffer,
    generation: u64,
}

/// The display buffer and follow flag of one log feed.
///
/// Stream sessions write through a generation: opening or closing a session
/// bumps it, and writes tagged with an older generation are dropped. The
/// follow flag is only changed under the same lock.
#[derive(Debug, Clone)]
pub struct SharedLog {
    state: Arc<Mutex<LogState>>,
    follow: Arc<watch::Sender<bool>>,
}

impl SharedLog {
    pub fn new(max_bytes: usize) -> Self {
        let (follow, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(LogState {
                buffer: LogBuffer::new(max_bytes),
                generation: 0,
            })),
            follow: Arc::new(follow),
        }
    }

    /// Whether a follow-mode stream is active.
    pub fn follow(&self) -> bool {
        *self.follow.borrow()
    }

    pub fn subscribe_follow(&self) -> watch::Receiver<bool> {
        self.follow.subscribe()
    }

    pub fn text(&self) -> String {
        self.state.lock().buffer.text()
    }

    pub fn entries(&self) -> Vec<String> {
        self.state.lock().buffer.entries().map(str::to_owned).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.state.lock().buffer.bytes()
    }

    /// Replace the contents with a bounded (non-follow) body.
    pub fn replace(&self, text: String) {
        self.state.lock().buffer.replace(text);
    }

    pub fn clear(&self) {
        self.state.lock().buffer.clear();
    }

    /// Start a new stream session with follow on. Returns its generation.
    pub(crate) fn open_session(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        self.follow.send_replace(true);
        state.generation
    }

    /// Invalidate any session and turn follow off.
    pub(crate) fn close_session(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        self.follow.send_replace(false);
    }

    /// The stream was accepted: clear the buffer for its output.
    pub(crate) fn accept(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.buffer.clear();
        true
    }

    /// Append a decoded chunk if the session is still current.
    pub(crate) fn append(&self, generation: u64, chunk: String) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let evicted = state.buffer.push(chunk);
        if evicted > 0 {
            tracing::trace!(evicted, "log buffer over capacity");
        }
        true
    }

    /// The session ended on its own: turn follow off if still current.
    pub(crate) fn end_session(&self, generation: u64) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.follow.send_replace(false);
        true
    }
}

/// Display buffers of every log feed, created on demand.
///
/// Used as the sink for bounded log bodies: each accepted body replaces the
/// feed's buffer.
#[derive(Debug, Clone)]
pub struct LogBuffers {
    feeds: Arc<Mutex<HashMap<FeedId, SharedLog>>>,
    max_bytes: usize,
}

impl Default for LogBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_BUFFER_BYTES)
    }
}

impl LogBuffers {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            feeds: Arc::new(Mutex::new(HashMap::new())),
            max_bytes,
        }
    }

    /// The buffer for `feed`, created if needed.
    pub fn get(&self, feed: &FeedId) -> SharedLog {
        self.feeds
            .lock()
            .entry(feed.clone())
            .or_insert_with(|| SharedLog::new(self.max_bytes))
            .clone()
    }

    pub fn feeds(&self) -> Vec<FeedId> {
        let mut feeds: Vec<_> = self.feeds.lock().keys().cloned().collect();
        feeds.sort();
        feeds
    }
}

impl FeedSink<String> for LogBuffers {
    fn ingest(&self, feed: &FeedId, payload: String, _config: &FeedConfig) {
        self.get(feed).replace(payload);
    }

    fn reset(&self, feed: &FeedId) {
        self.get(feed).clear();
    }
}
