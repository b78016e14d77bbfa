//! Backend connection health.
//!
//! The acquisition layer only reads connection state. Whoever owns the
//! connection publishes it through the sender half returned by
//! [`HealthTracker::create`]; [`spawn_probe`] is a minimal publisher that
//! pings the router API on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use gatewatch_client::RouterApi;
use gatewatch_types::ConnectionState;

/// Factory for health channels.
pub struct HealthTracker;

impl HealthTracker {
    /// Create a channel pair for publishing connection state.
    ///
    /// Returns (sender, reader). The initial state is
    /// [`ConnectionState::Disconnected`].
    ///
    /// # Example
    ///
    /// ```
    /// use gatewatch::health::HealthTracker;
    /// use gatewatch::ConnectionState;
    ///
    /// let (tx, reader) = HealthTracker::create();
    /// tx.send_replace(ConnectionState::Connected);
    /// assert!(reader.current().is_connected());
    /// ```
    pub fn create() -> (watch::Sender<ConnectionState>, HealthReader) {
        let (tx, rx) = watch::channel(ConnectionState::default());
        (tx, HealthReader { receiver: rx })
    }
}

/// Read-only view of the connection state.
#[derive(Debug, Clone)]
pub struct HealthReader {
    receiver: watch::Receiver<ConnectionState>,
}

impl HealthReader {
    pub fn current(&self) -> ConnectionState {
        *self.receiver.borrow()
    }

    /// Wait for the next state change.
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

/// Handle for a running probe.
///
/// Drop this handle to stop probing, or call `stop()` to stop and wait.
pub struct ProbeHandle {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stop probing. The state is left at `Disconnected`.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Probe the router API every `interval`, publishing the result.
pub fn spawn_probe(
    api: Arc<RouterApi>,
    state: watch::Sender<ConnectionState>,
    interval: Duration,
) -> ProbeHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        state.send_replace(ConnectionState::Connecting);
        loop {
            let next = tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                result = api.ping() => match result {
                    Ok(()) => ConnectionState::Connected,
                    Err(e) => {
                        tracing::debug!(error = %e, "health probe failed");
                        ConnectionState::Error
                    }
                },
            };
            let previous = state.send_replace(next);
            if previous != next {
                tracing::info!(state = %next, "connection state changed");
            }

            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        state.send_replace(ConnectionState::Disconnected);
    });
    ProbeHandle { stop_tx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let (_tx, reader) = HealthTracker::create();
        assert_eq!(reader.current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reader_sees_changes() {
        let (tx, mut reader) = HealthTracker::create();
        tx.send_replace(ConnectionState::Connecting);
        assert_eq!(reader.changed().await, Some(ConnectionState::Connecting));

        drop(tx);
        assert_eq!(reader.changed().await, None);
        assert_eq!(reader.current(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn probe_against_unreachable_backend() {
        let api = Arc::new(
            RouterApi::builder()
                .endpoint("http://127.0.0.1:9")
                .connect_timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
        );
        let (tx, mut reader) = HealthTracker::create();
        let probe = spawn_probe(api, tx, Duration::from_secs(60));

        let mut seen = Vec::new();
        while let Some(state) = reader.changed().await {
            seen.push(state);
            if state == ConnectionState::Error {
                break;
            }
        }
        assert_eq!(seen.last(), Some(&ConnectionState::Error));

        probe.stop().await;
        assert_eq!(reader.current(), ConnectionState::Disconnected);
    }
}
