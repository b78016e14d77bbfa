//! Time range strings such as `30m`, `6h` or `7d`.
//!
//! A range doubles as the query parameter sent to history endpoints and as
//! the horizon of the rolling window that backs a chart.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

/// Unit suffix of a [`TimeRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RangeUnit {
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
}

impl RangeUnit {
    /// Seconds in one unit.
    pub const fn seconds(&self) -> u64 {
        match self {
            RangeUnit::Minutes => 60,
            RangeUnit::Hours => 60 * 60,
            RangeUnit::Days => 24 * 60 * 60,
        }
    }

    /// The single-character suffix used on the wire.
    pub const fn suffix(&self) -> char {
        match self {
            RangeUnit::Minutes => 'm',
            RangeUnit::Hours => 'h',
            RangeUnit::Days => 'd',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(RangeUnit::Minutes),
            'h' => Some(RangeUnit::Hours),
            'd' => Some(RangeUnit::Days),
            _ => None,
        }
    }
}

/// A validated time range.
///
/// Only strings matching `^(\d+)([mhd])$` with a non-zero amount parse.
/// There is no fallback: a malformed range is an error, never a default.
///
/// # Example
///
/// ```rust
/// use gatewatch_types::{RangeUnit, TimeRange};
///
/// let r: TimeRange = "6h".parse().unwrap();
/// assert_eq!(r.amount(), 6);
/// assert_eq!(r.unit(), RangeUnit::Hours);
/// assert_eq!(r.to_string(), "6h");
///
/// assert!("45x".parse::<TimeRange>().is_err());
/// assert!("".parse::<TimeRange>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    amount: u32,
    unit: RangeUnit,
}

impl TimeRange {
    /// Create a range, rejecting a zero amount.
    pub fn new(amount: u32, unit: RangeUnit) -> Result<Self, RangeError> {
        if amount == 0 {
            return Err(RangeError::Zero);
        }
        Ok(Self { amount, unit })
    }

    /// Shorthand for a range in minutes.
    pub fn minutes(amount: u32) -> Result<Self, RangeError> {
        Self::new(amount, RangeUnit::Minutes)
    }

    /// Shorthand for a range in hours.
    pub fn hours(amount: u32) -> Result<Self, RangeError> {
        Self::new(amount, RangeUnit::Hours)
    }

    pub const fn amount(&self) -> u32 {
        self.amount
    }

    pub const fn unit(&self) -> RangeUnit {
        self.unit
    }

    /// The horizon covered by this range.
    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.amount as u64 * self.unit.seconds())
    }

    /// The horizon in milliseconds, as used for sample timestamps.
    pub const fn as_millis(&self) -> i64 {
        self.amount as i64 * self.unit.seconds() as i64 * 1000
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for TimeRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RangeError::Empty);
        }

        let mut chars = s.chars();
        let last = chars.next_back().ok_or(RangeError::Empty)?;
        let digits = chars.as_str();

        let unit = RangeUnit::from_suffix(last).ok_or_else(|| RangeError::Malformed(s.into()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RangeError::Malformed(s.into()));
        }

        let amount: u32 = digits
            .parse()
            .map_err(|_| RangeError::Malformed(s.into()))?;
        Self::new(amount, unit)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TimeRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TimeRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a range string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// Missing or empty range.
    Empty,
    /// Zero-length range.
    Zero,
    /// Does not match `<integer><m|h|d>`.
    Malformed(String),
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Empty => write!(f, "time range is empty"),
            RangeError::Zero => write!(f, "time range must be greater than zero"),
            RangeError::Malformed(s) => {
                write!(f, "invalid time range '{}': expected <integer><m|h|d>", s)
            }
        }
    }
}

impl std::error::Error for RangeError {}
