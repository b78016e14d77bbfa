//! Live log tailing over a chunked response body.
//!
//! ## Submodules
//!
//! - [`buffer`]: Bounded per-feed display buffers and the follow flag
//! - [`decode`]: Incremental UTF-8 decoding across chunk boundaries
//!
//! A [`StreamingTail`] keeps at most one open stream per feed. Each decoded
//! chunk becomes one buffer entry. Cancelling is silent: it turns follow off
//! and fences out anything the aborted read still delivers.

pub mod buffer;
pub mod decode;

pub use buffer::{LogBuffer, LogBuffers, SharedLog, DEFAULT_LOG_BUFFER_BYTES};
pub use decode::ChunkDecoder;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use gatewatch_client::FeedError;
use gatewatch_types::{FeedId, LogQuery};

use crate::source::LogSource;
use crate::status::StatusSink;

struct Session {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Follow-mode log streams, one per feed.
pub struct StreamingTail {
    source: Arc<dyn LogSource>,
    buffers: LogBuffers,
    status: Arc<dyn StatusSink>,
    sessions: HashMap<FeedId, Session>,
}

impl StreamingTail {
    pub fn new(source: Arc<dyn LogSource>, buffers: LogBuffers, status: Arc<dyn StatusSink>) -> Self {
        Self {
            source,
            buffers,
            status,
            sessions: HashMap::new(),
        }
    }

    /// Open a follow-mode stream for `feed`.
    ///
    /// Follow is on as soon as this returns. The display buffer is cleared
    /// once the backend accepts the request.
    pub fn begin(&mut self, feed: FeedId, query: LogQuery) -> Result<(), FeedError> {
        if self.is_streaming(&feed) {
            return Err(FeedError::AlreadyStreaming(feed));
        }

        let log = self.buffers.get(&feed);
        let generation = log.open_session();
        let (stop_tx, stop_rx) = watch::channel(false);
        tracing::info!(
            %feed,
            generation,
            source = self.source.description(),
            service = query.service.as_deref().unwrap_or("*"),
            lines = query.lines,
            "opening log stream"
        );

        let session = StreamSession {
            feed: feed.clone(),
            generation,
            query,
            log,
            source: self.source.clone(),
            status: self.status.clone(),
        };
        let handle = tokio::spawn(session.run(stop_rx));
        self.sessions.insert(feed, Session { stop_tx, handle });
        Ok(())
    }

    /// Abort the stream for `feed`. Follow is off when this returns.
    ///
    /// Returns whether a stream was open.
    pub fn cancel(&mut self, feed: &FeedId) -> bool {
        self.buffers.get(feed).close_session();
        match self.sessions.remove(feed) {
            Some(session) => {
                let _ = session.stop_tx.send(true);
                let active = !session.handle.is_finished();
                if active {
                    tracing::info!(%feed, "cancelled log stream");
                }
                active
            }
            None => false,
        }
    }

    /// Whether a stream task is still running for `feed`.
    pub fn is_streaming(&self, feed: &FeedId) -> bool {
        self.sessions
            .get(feed)
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// The display buffer of `feed`.
    pub fn buffer(&self, feed: &FeedId) -> SharedLog {
        self.buffers.get(feed)
    }

    pub fn follow(&self, feed: &FeedId) -> bool {
        self.buffers.get(feed).follow()
    }

    pub fn subscribe_follow(&self, feed: &FeedId) -> watch::Receiver<bool> {
        self.buffers.get(feed).subscribe_follow()
    }

    /// Cancel every stream and wait for the tasks to finish.
    pub async fn shutdown(&mut self) {
        let sessions: Vec<_> = self.sessions.drain().collect();
        for (feed, session) in sessions {
            self.buffers.get(&feed).close_session();
            let _ = session.stop_tx.send(true);
            if let Err(e) = session.handle.await {
                tracing::warn!(%feed, error = %e, "stream task ended abnormally");
            }
        }
    }
}

struct StreamSession {
    feed: FeedId,
    generation: u64,
    query: LogQuery,
    log: SharedLog,
    source: Arc<dyn LogSource>,
    status: Arc<dyn StatusSink>,
}

impl StreamSession {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let opened = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            result = self.source.open(&self.query) => result,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return self.fail(e),
        };
        if !self.log.accept(self.generation) {
            return;
        }
        self.status.report_success(&self.feed);

        let mut decoder = ChunkDecoder::new();
        let mut chunks = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = stop_rx.changed() => return,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    let text = decoder.decode(&bytes);
                    if text.is_empty() {
                        continue;
                    }
                    if !self.log.append(self.generation, text) {
                        return;
                    }
                    chunks += 1;
                }
                Some(Err(e)) => {
                    self.log.append(self.generation, decoder.finish());
                    return self.fail(e);
                }
                None => {
                    self.log.append(self.generation, decoder.finish());
                    if self.log.end_session(self.generation) {
                        tracing::info!(feed = %self.feed, chunks, "log stream ended");
                    }
                    return;
                }
            }
        }
    }

    fn fail(&self, error: FeedError) {
        if error.is_cancelled() || !self.log.end_session(self.generation) {
            return;
        }
        tracing::warn!(feed = %self.feed, error = %error, "log stream failed");
        self.status.report_error(&self.feed, &error);
    }
}
