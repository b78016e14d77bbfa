//! Log tail query parameters.

use std::fmt;
use std::str::FromStr;

/// Default number of lines requested from the journal.
pub const DEFAULT_LOG_LINES: u32 = 100;

/// Syslog priority filter, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LogPriority {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogPriority {
    /// Numeric syslog level (0 = emerg, 7 = debug).
    pub const fn level(&self) -> u8 {
        *self as u8
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LogPriority::Emerg => "emerg",
            LogPriority::Alert => "alert",
            LogPriority::Crit => "crit",
            LogPriority::Err => "err",
            LogPriority::Warning => "warning",
            LogPriority::Notice => "notice",
            LogPriority::Info => "info",
            LogPriority::Debug => "debug",
        }
    }
}

impl fmt::Display for LogPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let p = match s {
            "0" | "emerg" => LogPriority::Emerg,
            "1" | "alert" => LogPriority::Alert,
            "2" | "crit" => LogPriority::Crit,
            "3" | "err" | "error" => LogPriority::Err,
            "4" | "warning" | "warn" => LogPriority::Warning,
            "5" | "notice" => LogPriority::Notice,
            "6" | "info" => LogPriority::Info,
            "7" | "debug" => LogPriority::Debug,
            other => return Err(format!("unknown log priority '{}'", other)),
        };
        Ok(p)
    }
}

/// Parameters of a log request: which service, how much history, and which
/// priorities.
///
/// # Example
///
/// ```rust
/// use gatewatch_types::{LogPriority, LogQuery};
///
/// let query = LogQuery::new()
///     .service("dnsmasq")
///     .lines(500)
///     .priority(LogPriority::Warning);
///
/// let pairs = query.query_pairs(true);
/// assert!(pairs.contains(&("follow", "true".to_string())));
/// assert!(pairs.contains(&("lines", "500".to_string())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogQuery {
    /// Unit selector; `None` tails all services.
    pub service: Option<String>,
    pub lines: u32,
    pub priority: Option<LogPriority>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            service: None,
            lines: DEFAULT_LOG_LINES,
            priority: None,
        }
    }
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn lines(mut self, lines: u32) -> Self {
        self.lines = lines;
        self
    }

    pub fn priority(mut self, priority: LogPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Query string pairs for the logs endpoint.
    pub fn query_pairs(&self, follow: bool) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(service) = &self.service {
            pairs.push(("service", service.clone()));
        }
        pairs.push(("lines", self.lines.to_string()));
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.level().to_string()));
        }
        pairs.push(("follow", follow.to_string()));
        pairs
    }
}
