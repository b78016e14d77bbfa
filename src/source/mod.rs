//! Data source abstraction for feed acquisition.
//!
//! The scheduler and the log tail never talk HTTP directly: they pull from
//! a [`PollSource`] or open a [`LogSource`]. The [`http`] submodule backs
//! both with the router API; tests substitute scripted sources.

mod http;

pub use http::{HttpLogSource, HttpSeriesSource};

use std::fmt::Debug;

use async_trait::async_trait;

use gatewatch_client::{ChunkStream, FeedError};
use gatewatch_types::{LogQuery, TimeRange};

/// A pull-based source producing one payload per request.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use gatewatch::source::PollSource;
/// use gatewatch::{FeedError, FeedPayload, Sample, TimeRange};
///
/// #[derive(Debug)]
/// struct Fixed;
///
/// #[async_trait]
/// impl PollSource<FeedPayload> for Fixed {
///     async fn fetch(&self, _range: &TimeRange) -> Result<FeedPayload, FeedError> {
///         Ok(FeedPayload::builder().sample("system", Sample::at(0)).build())
///     }
///
///     fn description(&self) -> &str {
///         "fixed"
///     }
/// }
/// ```
#[async_trait]
pub trait PollSource<P>: Send + Sync + Debug {
    /// Issue one request for the given range.
    ///
    /// Dropping the returned future must abort the request.
    async fn fetch(&self, range: &TimeRange) -> Result<P, FeedError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

/// A push-based source of open-ended log bodies.
#[async_trait]
pub trait LogSource: Send + Sync + Debug {
    /// Open a follow-mode stream.
    ///
    /// Resolves once the backend has accepted the request. A non-success
    /// response is an error here, not an empty stream.
    async fn open(&self, query: &LogQuery) -> Result<ChunkStream, FeedError>;

    fn description(&self) -> &str;
}
