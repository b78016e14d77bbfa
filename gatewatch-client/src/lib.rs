//! # gatewatch-client
//!
//! Transport for the router telemetry API: bearer-authenticated HTTP
//! requests, status mapping, and decoding of response bodies into
//! [`FeedPayload`]s.
//!
//! ## Endpoints
//!
//! - `GET /api/system/current` - instantaneous load, disk I/O, temperatures, clients
//! - `GET /api/system/history?range=<r>` - CPU/memory/load history
//! - `GET /api/system/disk-io/history?range=<r>` - per-device throughput history
//! - `GET /api/system/temperatures/history?range=<r>` - per-sensor history
//! - `GET /api/logs?service=&lines=&priority=&follow=` - bounded or chunked log body
//!
//! The [`FeedError`] taxonomy lives here as well, since every layer above
//! the transport shares it.

pub mod error;
pub mod wire;

#[cfg(feature = "http")]
pub mod api;

pub use error::FeedError;

#[cfg(feature = "http")]
pub use api::{ChunkStream, RouterApi, RouterApiBuilder, SeriesEndpoint, StaticToken, TokenProvider};

// Re-export types for convenience
pub use gatewatch_types::{FeedId, FeedPayload, LogQuery, Sample, SeriesKey, TimeRange};
