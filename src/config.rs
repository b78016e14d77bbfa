//! Layered configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, and `GATEWATCH_*` environment variables. The binary applies
//! command-line flags on top.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use gatewatch_client::SeriesEndpoint;
use gatewatch_types::{FeedConfig, LogPriority, LogQuery, TimeRange, DEFAULT_LOG_LINES};

use crate::tail::DEFAULT_LOG_BUFFER_BYTES;

/// Default file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "gatewatch";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewatchConfig {
    /// Base URL of the router API.
    pub endpoint: String,
    pub token: Option<String>,
    pub request_timeout_ms: u64,
    /// Initial range for every series feed, e.g. `1h`.
    pub default_range: String,
    pub refresh_interval_ms: u64,
    /// Bound on each log display buffer.
    pub log_buffer_bytes: usize,
    pub probe_interval_ms: u64,
    /// Series endpoints to chart, by name.
    pub feeds: Vec<String>,
    pub logs: LogsConfig,
}

impl Default for GatewatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            token: None,
            request_timeout_ms: 10_000,
            default_range: "1h".to_string(),
            refresh_interval_ms: 5_000,
            log_buffer_bytes: DEFAULT_LOG_BUFFER_BYTES,
            probe_interval_ms: 10_000,
            feeds: SeriesEndpoint::all()
                .iter()
                .map(|e| e.name().to_string())
                .collect(),
            logs: LogsConfig::default(),
        }
    }
}

/// The log view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub enabled: bool,
    pub service: Option<String>,
    pub lines: u32,
    /// Syslog priority name or number.
    pub priority: Option<String>,
    /// Start in follow mode.
    pub follow: bool,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service: None,
            lines: DEFAULT_LOG_LINES,
            priority: None,
            follow: false,
        }
    }
}

impl GatewatchConfig {
    /// Load configuration.
    ///
    /// With a path, the file must exist. Without one, `gatewatch.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("GATEWATCH")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("feeds"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn range(&self) -> Result<TimeRange> {
        self.default_range
            .parse()
            .with_context(|| format!("Invalid default_range '{}'", self.default_range))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Polling configuration shared by every feed at startup.
    pub fn feed_config(&self) -> Result<FeedConfig> {
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be greater than zero");
        }
        Ok(FeedConfig::poll(self.range()?, self.refresh_interval())
            .with_request_timeout(self.request_timeout()))
    }

    /// Resolve `feeds` to endpoints, rejecting unknown names.
    pub fn series_endpoints(&self) -> Result<Vec<SeriesEndpoint>> {
        self.feeds
            .iter()
            .map(|name| {
                SeriesEndpoint::from_name(name.trim())
                    .with_context(|| format!("Unknown feed '{}'", name))
            })
            .collect()
    }

    pub fn log_query(&self) -> Result<LogQuery> {
        let mut query = LogQuery::new().lines(self.logs.lines);
        if let Some(service) = &self.logs.service {
            query = query.service(service.clone());
        }
        if let Some(priority) = &self.logs.priority {
            let priority: LogPriority = priority.parse().map_err(anyhow::Error::msg)?;
            query = query.priority(priority);
        }
        Ok(query)
    }
}
