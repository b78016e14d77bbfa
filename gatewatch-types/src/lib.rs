//! # gatewatch-types
//!
//! Core types shared by every part of gatewatch: the telemetry feeds a
//! router dashboard pulls from its backend, the samples those feeds carry,
//! and the knobs a user turns to reconfigure them.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature for wire formats and config files
//! - **Structural identity**: Samples and payloads hash structurally so unchanged
//!   poll results can be detected without re-serializing them
//! - **Strict parsing**: Range strings follow `^(\d+)([mhd])$` and nothing else
//!
//! ## Example
//!
//! ```rust
//! use gatewatch_types::{FeedPayload, Sample, TimeRange};
//! use std::time::Duration;
//!
//! let range: TimeRange = "30m".parse().unwrap();
//! assert_eq!(range.as_duration(), Duration::from_secs(30 * 60));
//!
//! let payload = FeedPayload::builder()
//!     .sample("system", Sample::at(1_700_000_000_000).with("cpu_percent", 20.0))
//!     .sample("disk:sda", Sample::at(1_700_000_000_000).with("read_mbps", 1.5))
//!     .build();
//!
//! assert_eq!(payload.len(), 2);
//! ```

mod feed;
mod health;
mod log;
mod range;
mod sample;

pub use feed::*;
pub use health::*;
pub use log::*;
pub use range::*;
pub use sample::*;
