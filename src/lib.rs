//! # gatewatch
//!
//! Telemetry acquisition for a home-router dashboard: keeps time-series
//! charts and a live log tail in sync with a router API that only offers
//! interval polling and chunked streaming.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Dashboard                             │
//! │                                                                  │
//! │  ControlEvent ──▶ PollingScheduler<FeedPayload> ──▶ SharedWindow │
//! │              ├──▶ PollingScheduler<String> ──────▶ LogBuffers    │
//! │              └──▶ StreamingTail ─────────────────▶ LogBuffers    │
//! │                          │                                       │
//! │                          ▼                                       │
//! │                     StatusBoard          HealthReader (read-only)│
//! └──────────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ PollSource / LogSource
//!                     RouterApi (gatewatch-client)
//! ```
//!
//! - **[`scheduler`]**: One pull loop per feed with generation fencing and
//!   unchanged-payload suppression
//! - **[`data`]**: Rolling per-series buffers ([`TimeSeriesWindow`])
//! - **[`tail`]**: Cancellable follow-mode log streams ([`StreamingTail`])
//! - **[`source`]**: The [`PollSource`] and [`LogSource`] seams and their
//!   HTTP implementations
//! - **[`status`]**: Per-feed live/degraded/stopped status
//! - **[`health`]**: Read-only backend connection state
//! - **[`app`]**: The [`Dashboard`] composition root
//! - **[`events`]**: Control events and the command grammar
//! - **[`config`]**: Layered file and environment configuration
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Chart the default feeds from a router
//! gatewatch --endpoint http://192.168.1.1 --token "$TOKEN"
//!
//! # Tail dnsmasq warnings live
//! gatewatch --feeds system --service dnsmasq --priority warning --follow
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use gatewatch::health::HealthTracker;
//! use gatewatch::source::{HttpLogSource, HttpSeriesSource};
//! use gatewatch::{Dashboard, FeedConfig, FeedId, LogQuery, RouterApi, SeriesEndpoint, TimeRange};
//!
//! # tokio_test::block_on(async {
//! let api = Arc::new(RouterApi::builder().endpoint("http://192.168.1.1").build()?);
//! let logs = Arc::new(HttpLogSource::new(api.clone(), LogQuery::new()));
//! let (_health_tx, health) = HealthTracker::create();
//!
//! let mut dashboard = Dashboard::new(logs, health, 1 << 20);
//! let config = FeedConfig::poll(TimeRange::hours(1)?, Duration::from_secs(5));
//! dashboard.add_series_feed(
//!     FeedId::from("system"),
//!     Arc::new(HttpSeriesSource::new(api, SeriesEndpoint::SystemHistory)),
//!     config,
//! )?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod events;
pub mod health;
pub mod scheduler;
pub mod source;
pub mod status;
pub mod tail;

pub use app::{Dashboard, FeedKind};
pub use config::GatewatchConfig;
pub use data::{Fingerprint, SeriesBuffer, SharedWindow, TimeSeriesWindow};
pub use events::{parse_command, Command, ControlEvent};
pub use health::{HealthReader, HealthTracker};
pub use scheduler::{FeedSink, PollingScheduler};
pub use source::{LogSource, PollSource};
pub use status::{FeedState, FeedStatus, StatusBoard, StatusSink};
pub use tail::{LogBuffers, SharedLog, StreamingTail};

pub use gatewatch_client::{FeedError, RouterApi, SeriesEndpoint};
pub use gatewatch_types::{
    ConnectionState, FeedConfig, FeedId, FeedMode, FeedPayload, LogPriority, LogQuery, Sample,
    SeriesKey, TimeRange,
};
