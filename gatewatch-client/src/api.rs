//! Router telemetry API over HTTP.
//!
//! All requests carry `Authorization: Bearer <token>` when the configured
//! [`TokenProvider`] yields a token. Obtaining and refreshing that token is
//! the provider's business.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gatewatch_client::api::{RouterApi, SeriesEndpoint};
//! use gatewatch_types::TimeRange;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = RouterApi::builder()
//!         .endpoint("http://192.168.1.1")
//!         .token("secret")
//!         .build()?;
//!
//!     let range = TimeRange::hours(1)?;
//!     let payload = api.fetch_series(SeriesEndpoint::DiskIoHistory, &range).await?;
//!
//!     for keyed in payload.iter() {
//!         println!("{} @ {}", keyed.key, keyed.sample.timestamp_ms());
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use gatewatch_types::{FeedPayload, LogQuery, TimeRange};

use crate::wire::{CurrentSnapshot, DiskIoPoint, HistoryResponse, SystemPoint, TemperaturePoint};
use crate::FeedError;

/// Body chunks of an open-ended response, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, FeedError>>;

/// Longest error body quoted back in an [`FeedError::Http`].
const MAX_ERROR_BODY: usize = 200;

/// Supplies the bearer credential for each request.
pub trait TokenProvider: Send + Sync + Debug {
    /// The current token, or `None` to send the request unauthenticated.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Numeric endpoints of the telemetry API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesEndpoint {
    /// Instantaneous snapshot; the range only sets the window horizon.
    Current,
    SystemHistory,
    DiskIoHistory,
    TemperatureHistory,
}

impl SeriesEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            SeriesEndpoint::Current => "/api/system/current",
            SeriesEndpoint::SystemHistory => "/api/system/history",
            SeriesEndpoint::DiskIoHistory => "/api/system/disk-io/history",
            SeriesEndpoint::TemperatureHistory => "/api/system/temperatures/history",
        }
    }

    /// Whether the endpoint accepts a `range` query parameter.
    pub fn takes_range(&self) -> bool {
        !matches!(self, SeriesEndpoint::Current)
    }

    /// Short name used in config files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            SeriesEndpoint::Current => "current",
            SeriesEndpoint::SystemHistory => "system",
            SeriesEndpoint::DiskIoHistory => "disk-io",
            SeriesEndpoint::TemperatureHistory => "temperatures",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "current" => Some(SeriesEndpoint::Current),
            "system" => Some(SeriesEndpoint::SystemHistory),
            "disk-io" | "disk" => Some(SeriesEndpoint::DiskIoHistory),
            "temperatures" | "temp" => Some(SeriesEndpoint::TemperatureHistory),
            _ => None,
        }
    }

    pub fn all() -> [SeriesEndpoint; 4] {
        [
            SeriesEndpoint::Current,
            SeriesEndpoint::SystemHistory,
            SeriesEndpoint::DiskIoHistory,
            SeriesEndpoint::TemperatureHistory,
        ]
    }
}

/// Client for the router's telemetry API.
#[derive(Debug, Clone)]
pub struct RouterApi {
    client: Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl RouterApi {
    /// Create a new builder for configuring the client.
    pub fn builder() -> RouterApiBuilder {
        RouterApiBuilder::default()
    }

    /// Base URL, without trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(self.url(path));
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch a numeric feed.
    pub async fn fetch_series(
        &self,
        endpoint: SeriesEndpoint,
        range: &TimeRange,
    ) -> Result<FeedPayload, FeedError> {
        let mut request = self.get(endpoint.path());
        if endpoint.takes_range() {
            request = request.query(&[("range", range.to_string())]);
        }

        let response = checked(request.send().await?).await?;

        match endpoint {
            SeriesEndpoint::Current => decode::<CurrentSnapshot>(response).await?.into_payload(),
            SeriesEndpoint::SystemHistory => {
                decode::<HistoryResponse<SystemPoint>>(response).await?.into_payload()
            }
            SeriesEndpoint::DiskIoHistory => {
                decode::<HistoryResponse<DiskIoPoint>>(response).await?.into_payload()
            }
            SeriesEndpoint::TemperatureHistory => {
                decode::<HistoryResponse<TemperaturePoint>>(response).await?.into_payload()
            }
        }
    }

    /// Fetch a bounded log body.
    pub async fn logs(&self, query: &LogQuery) -> Result<String, FeedError> {
        let request = self.get("/api/logs").query(&query.query_pairs(false));
        let response = checked(request.send().await?).await?;
        Ok(response.text().await?)
    }

    /// Open a follow-mode log stream.
    ///
    /// Resolves once the backend has accepted the request; the returned
    /// stream then yields body chunks until the server closes the
    /// connection or the stream is dropped.
    pub async fn follow_logs(&self, query: &LogQuery) -> Result<ChunkStream, FeedError> {
        let request = self.get("/api/logs").query(&query.query_pairs(true));
        let response = checked(request.send().await?).await?;

        Ok(response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .map_err(FeedError::from)
            .boxed())
    }

    /// Cheap reachability check used by connection health probes.
    pub async fn ping(&self) -> Result<(), FeedError> {
        checked(self.get(SeriesEndpoint::Current.path()).send().await?).await?;
        Ok(())
    }
}

/// Map non-2xx responses to [`FeedError::Http`].
async fn checked(response: Response) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => truncate(body.trim(), MAX_ERROR_BODY),
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };

    Err(FeedError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FeedError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Builder for [`RouterApi`].
#[derive(Debug, Default)]
pub struct RouterApiBuilder {
    endpoint: Option<String>,
    tokens: Option<Arc<dyn TokenProvider>>,
    connect_timeout: Option<Duration>,
}

impl RouterApiBuilder {
    /// Set the base URL (e.g., "http://192.168.1.1").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use a fixed bearer token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.tokens = Some(Arc::new(StaticToken::new(token)));
        self
    }

    /// Use a custom token provider.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(provider);
        self
    }

    /// Set the TCP connect timeout (default: 5 seconds).
    ///
    /// Per-request timeouts are applied by the caller; streaming requests
    /// have none.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RouterApi, FeedError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(Duration::from_secs(5)))
            .build()
            .map_err(|e| FeedError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(RouterApi {
            client,
            endpoint,
            tokens: self.tokens.unwrap_or_else(|| Arc::new(StaticToken::none())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let api = RouterApi::builder().build().unwrap();
        assert_eq!(api.endpoint(), "http://localhost:8080");
        assert!(api.tokens.bearer_token().is_none());
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let api = RouterApi::builder()
            .endpoint("http://router.lan/")
            .token("abc")
            .build()
            .unwrap();
        assert_eq!(api.endpoint(), "http://router.lan");
        assert_eq!(api.url("/api/logs"), "http://router.lan/api/logs");
        assert_eq!(api.tokens.bearer_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_header_attached() {
        let api = RouterApi::builder().token("t0k3n").build().unwrap();
        let request = api.get("/api/system/current").build().unwrap();
        let header = request.headers().get(reqwest::header::AUTHORIZATION).unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer t0k3n");
    }

    #[test]
    fn test_no_header_without_token() {
        let api = RouterApi::builder().build().unwrap();
        let request = api.get("/api/system/current").build().unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_endpoint_paths_and_names() {
        for endpoint in SeriesEndpoint::all() {
            assert!(endpoint.path().starts_with("/api/system/"));
            assert_eq!(SeriesEndpoint::from_name(endpoint.name()), Some(endpoint));
        }
        assert!(!SeriesEndpoint::Current.takes_range());
        assert!(SeriesEndpoint::DiskIoHistory.takes_range());
        assert_eq!(SeriesEndpoint::from_name("fans"), None);
    }

    /// Serve one raw HTTP response on a local port, then drop the socket.
    async fn serve_once(response: &'static [u8]) -> RouterApi {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response).await.unwrap();
            socket.flush().await.unwrap();
        });
        RouterApi::builder()
            .endpoint(format!("http://{}", addr))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_follow_rejected_status_is_http_error() {
        let api = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 11\r\nConnection: close\r\n\r\nunavailable",
        )
        .await;
        match api.follow_logs(&LogQuery::new()).await {
            Ok(_) => panic!("stream opened on a 503"),
            Err(e) => assert_eq!(
                e,
                FeedError::Http {
                    status: 503,
                    message: "unavailable".into()
                }
            ),
        }
    }

    #[tokio::test]
    async fn test_follow_dropped_connection_is_network_error() {
        let api = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n6\r\nhello\n\r\n",
        )
        .await;
        let mut stream = match api.follow_logs(&LogQuery::new()).await {
            Ok(stream) => stream,
            Err(e) => panic!("open failed: {}", e),
        };

        assert_eq!(stream.next().await, Some(Ok(b"hello\n".to_vec())));
        match stream.next().await {
            Some(Err(FeedError::Network(_))) => {}
            other => panic!("expected a network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let api = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 8\r\nConnection: close\r\n\r\nnot json",
        )
        .await;
        let range = TimeRange::hours(1).unwrap();
        let err = api
            .fetch_series(SeriesEndpoint::SystemHistory, &range)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)), "got {:?}", err);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }
}
