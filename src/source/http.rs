//! Router API backed sources.

use std::sync::Arc;

use async_trait::async_trait;

use gatewatch_client::{ChunkStream, FeedError, RouterApi, SeriesEndpoint};
use gatewatch_types::{FeedPayload, LogQuery, TimeRange};

use super::{LogSource, PollSource};

/// Polls one numeric endpoint of the router API.
#[derive(Debug, Clone)]
pub struct HttpSeriesSource {
    api: Arc<RouterApi>,
    endpoint: SeriesEndpoint,
    description: String,
}

impl HttpSeriesSource {
    pub fn new(api: Arc<RouterApi>, endpoint: SeriesEndpoint) -> Self {
        let description = format!("http: {}{}", api.endpoint(), endpoint.path());
        Self {
            api,
            endpoint,
            description,
        }
    }
}

#[async_trait]
impl PollSource<FeedPayload> for HttpSeriesSource {
    async fn fetch(&self, range: &TimeRange) -> Result<FeedPayload, FeedError> {
        self.api.fetch_series(self.endpoint, range).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Bounded and follow-mode log bodies for one query.
///
/// As a [`PollSource`] it fetches the bounded body using its own query and
/// ignores the range; as a [`LogSource`] it opens follow-mode streams for
/// whatever query it is given.
#[derive(Debug, Clone)]
pub struct HttpLogSource {
    api: Arc<RouterApi>,
    query: LogQuery,
    description: String,
}

impl HttpLogSource {
    pub fn new(api: Arc<RouterApi>, query: LogQuery) -> Self {
        let description = format!(
            "http: {}/api/logs ({})",
            api.endpoint(),
            query.service.as_deref().unwrap_or("all services")
        );
        Self {
            api,
            query,
            description,
        }
    }
}

#[async_trait]
impl PollSource<String> for HttpLogSource {
    async fn fetch(&self, _range: &TimeRange) -> Result<String, FeedError> {
        self.api.logs(&self.query).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn open(&self, query: &LogQuery) -> Result<ChunkStream, FeedError> {
        self.api.follow_logs(query).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}
