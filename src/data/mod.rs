//! In-memory telemetry state.
//!
//! ## Submodules
//!
//! - [`fingerprint`]: Structural digests used to skip unchanged poll results
//! - [`window`]: Per-feed, per-series rolling buffers ([`TimeSeriesWindow`])
//!
//! ## Data Flow
//!
//! ```text
//! FeedPayload (decoded poll)
//!        │
//!        ▼
//! Fingerprint::of() ── unchanged ──▶ dropped
//!        │
//!        ▼
//! TimeSeriesWindow::ingest()
//!        │
//!        ├──▶ sorted insert / same-timestamp replace per SeriesBuffer
//!        │
//!        └──▶ prefix eviction beyond the feed's horizon
//! ```

pub mod fingerprint;
pub mod window;

pub use fingerprint::Fingerprint;
pub use window::{
    now_ms, IngestStats, Placement, SeriesBuffer, SharedWindow, TimeSeriesWindow,
};
