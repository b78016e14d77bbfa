use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use gatewatch::events::HELP;
use gatewatch::health::spawn_probe;
use gatewatch::source::{HttpLogSource, HttpSeriesSource};
use gatewatch::{
    parse_command, Command, Dashboard, FeedId, FeedKind, FeedMode, FeedState, GatewatchConfig,
    HealthTracker, RouterApi, Sample,
};

/// Feed id of the log view.
const LOG_FEED: &str = "logs";

#[derive(Parser, Debug)]
#[command(name = "gatewatch")]
#[command(about = "Headless telemetry and log tail client for a router dashboard API")]
struct Args {
    /// Path to a TOML config file (defaults to ./gatewatch.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Router API base URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Bearer token for the router API
    #[arg(long, env = "GATEWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Initial time range for series feeds (e.g. "30m", "1h", "7d")
    #[arg(short, long)]
    range: Option<String>,

    /// Refresh interval in milliseconds
    #[arg(long)]
    refresh_ms: Option<u64>,

    /// Series feeds to poll (comma-separated: current,system,disk-io,temperatures)
    #[arg(long, value_delimiter = ',')]
    feeds: Option<Vec<String>>,

    /// Only show logs from this service
    #[arg(long)]
    service: Option<String>,

    /// Number of log lines to request
    #[arg(long)]
    lines: Option<u32>,

    /// Minimum log priority (name or 0-7)
    #[arg(long)]
    priority: Option<String>,

    /// Start the log view in follow mode
    #[arg(long)]
    follow: bool,

    /// Disable the log view
    #[arg(long, conflicts_with = "follow")]
    no_logs: bool,

    /// Seconds between printed summaries
    #[arg(long, default_value = "10")]
    summary_secs: u64,
}

impl Args {
    /// Command-line flags win over file and environment values.
    fn apply(&self, config: &mut GatewatchConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(range) = &self.range {
            config.default_range = range.clone();
        }
        if let Some(refresh_ms) = self.refresh_ms {
            config.refresh_interval_ms = refresh_ms;
        }
        if let Some(feeds) = &self.feeds {
            config.feeds = feeds.clone();
        }
        if let Some(service) = &self.service {
            config.logs.service = Some(service.clone());
        }
        if let Some(lines) = self.lines {
            config.logs.lines = lines;
        }
        if let Some(priority) = &self.priority {
            config.logs.priority = Some(priority.clone());
        }
        if self.follow {
            config.logs.follow = true;
        }
        if self.no_logs {
            config.logs.enabled = false;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gatewatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = GatewatchConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, Duration::from_secs(args.summary_secs.max(1))))
}

async fn run(config: GatewatchConfig, summary_every: Duration) -> Result<()> {
    let mut builder = RouterApi::builder().endpoint(config.endpoint.clone());
    if let Some(token) = &config.token {
        builder = builder.token(token.clone());
    }
    let api = Arc::new(builder.build().context("Failed to create API client")?);

    let feed_config = config.feed_config()?;
    let query = config.log_query()?;
    let endpoints = config.series_endpoints()?;

    let (health_tx, health) = HealthTracker::create();
    let probe = spawn_probe(api.clone(), health_tx, config.probe_interval());

    let log_source = Arc::new(HttpLogSource::new(api.clone(), query.clone()));
    let mut dashboard = Dashboard::new(log_source.clone(), health, config.log_buffer_bytes);

    for endpoint in endpoints {
        let source = Arc::new(HttpSeriesSource::new(api.clone(), endpoint));
        dashboard.add_series_feed(FeedId::from(endpoint.name()), source, feed_config.clone())?;
    }
    if config.logs.enabled {
        let mode = if config.logs.follow {
            FeedMode::Stream
        } else {
            FeedMode::Poll
        };
        dashboard.add_log_feed(
            FeedId::from(LOG_FEED),
            log_source,
            query,
            feed_config.clone().with_mode(mode),
        )?;
    }

    tracing::info!(endpoint = %config.endpoint, feeds = ?dashboard.feeds(), "gatewatch started");
    println!("Watching {}. Type 'help' for commands.", config.endpoint);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut summary = tokio::time::interval(summary_every);
    summary.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    summary.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            _ = summary.tick() => print_summary(&dashboard),
            line = stdin.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    stdin_open = false;
                    continue;
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => println!("{}", HELP),
                    Ok(Some(Command::Status)) => print_summary(&dashboard),
                    Ok(Some(Command::Control(event))) => {
                        if let Err(e) = dashboard.apply(event) {
                            eprintln!("error: {}", e);
                        }
                    }
                    Err(e) => eprintln!("error: {}", e),
                }
            }
        }
    }

    dashboard.shutdown().await;
    probe.stop().await;
    Ok(())
}

fn print_summary(dashboard: &Dashboard) {
    println!("connection: {}", dashboard.connection());
    for feed in dashboard.feeds() {
        let status = dashboard.status().get(&feed);
        let state = status.as_ref().map(|s| s.state).unwrap_or(FeedState::Pending);
        let Some(config) = dashboard.config(&feed) else {
            continue;
        };

        match dashboard.kind(&feed) {
            Some(FeedKind::Series) => {
                let window = dashboard.window().lock();
                let keys = window.keys(&feed);
                println!(
                    "[{:>4}] {:<14} {} every {}ms, {} samples in {} series",
                    state.symbol(),
                    feed,
                    config.range,
                    config.refresh_interval.as_millis(),
                    window.sample_count(&feed),
                    keys.len()
                );
                for key in keys {
                    if let Some(latest) = window.latest(&feed, key.as_str()) {
                        println!("         {:<20} {}", key, format_sample(latest));
                    }
                }
            }
            Some(FeedKind::Log) => {
                let log = dashboard.log(&feed);
                println!(
                    "[{:>4}] {:<14} follow {}, {} chunks, {} bytes",
                    state.symbol(),
                    feed,
                    if dashboard.is_following(&feed) { "on" } else { "off" },
                    log.len(),
                    log.bytes()
                );
                if let Some(last) = log.text().lines().last() {
                    println!("         {}", last);
                }
            }
            None => {}
        }

        if let Some(error) = status.and_then(|s| s.last_error) {
            if state != FeedState::Live {
                println!("         last error: {}", error);
            }
        }
    }
}

fn format_sample(sample: &Sample) -> String {
    sample
        .values()
        .iter()
        .map(|(field, value)| format!("{}={:.2}", field, value))
        .collect::<Vec<_>>()
        .join(" ")
}
