//! Control events and the textual command grammar.
//!
//! ```text
//! range   <feed> <range>      e.g. range system 30m
//! refresh <feed> <millis>     e.g. refresh system 5000
//! follow  <feed> on|off
//! reload  <feed>
//! stop    <feed>
//! status
//! help
//! quit
//! ```

use anyhow::{anyhow, bail, Result};

use gatewatch_types::FeedId;

/// A user change to one feed's controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Range text as typed; validated when applied.
    SetRange { feed: FeedId, range: String },
    SetRefresh { feed: FeedId, interval_ms: u64 },
    SetFollow { feed: FeedId, on: bool },
    /// Manual refresh.
    Reload(FeedId),
    Stop(FeedId),
}

impl ControlEvent {
    pub fn feed(&self) -> &FeedId {
        match self {
            ControlEvent::SetRange { feed, .. }
            | ControlEvent::SetRefresh { feed, .. }
            | ControlEvent::SetFollow { feed, .. }
            | ControlEvent::Reload(feed)
            | ControlEvent::Stop(feed) => feed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Control(ControlEvent),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  range <feed> <N>m|h|d     change the time range
  refresh <feed> <millis>   change the refresh cadence
  follow <feed> on|off      toggle live log tail
  reload <feed>             refresh now
  stop <feed>               stop a feed
  status                    show feed status
  quit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("status", []) => Command::Status,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        ("range", [feed, range]) => Command::Control(ControlEvent::SetRange {
            feed: FeedId::from(*feed),
            range: range.to_string(),
        }),
        ("refresh", [feed, millis]) => {
            let interval_ms = millis
                .parse()
                .map_err(|_| anyhow!("refresh interval must be a number of milliseconds, got '{}'", millis))?;
            Command::Control(ControlEvent::SetRefresh {
                feed: FeedId::from(*feed),
                interval_ms,
            })
        }
        ("follow", [feed, toggle]) => {
            let on = match *toggle {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                other => bail!("follow expects on|off, got '{}'", other),
            };
            Command::Control(ControlEvent::SetFollow {
                feed: FeedId::from(*feed),
                on,
            })
        }
        ("reload", [feed]) => Command::Control(ControlEvent::Reload(FeedId::from(*feed))),
        ("stop", [feed]) => Command::Control(ControlEvent::Stop(FeedId::from(*feed))),
        (
            "status" | "help" | "?" | "quit" | "exit" | "q" | "range" | "refresh" | "follow"
            | "reload" | "stop",
            _,
        ) => bail!("wrong number of arguments for '{}'", verb),
        _ => bail!("unknown command '{}'", verb),
    };
    Ok(Some(command))
}
