//! Samples, series keys and poll payloads.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of one instance within a multi-instance feed.
///
/// Single-instance feeds use [`SeriesKey::SYSTEM`]; disk feeds key by device
/// name, temperature feeds by sensor name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Key used by feeds that only ever report one series.
    pub const SYSTEM: &'static str = "system";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SeriesKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for SeriesKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A timestamped record of named scalar readings.
///
/// Equality and hashing compare floating point fields by bit pattern, so two
/// samples decoded from byte-identical responses are always equal.
///
/// # Example
///
/// ```rust
/// use gatewatch_types::Sample;
///
/// let s = Sample::at(1_000)
///     .with("read_mbps", 12.5)
///     .with("write_mbps", 3.0);
///
/// assert_eq!(s.timestamp_ms(), 1_000);
/// assert_eq!(s.get("read_mbps"), Some(12.5));
/// assert_eq!(s.get("missing"), None);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Source time in unix milliseconds.
    timestamp_ms: i64,
    /// Readings keyed by field name.
    values: BTreeMap<String, f64>,
}

impl Sample {
    /// Create an empty sample at the given unix millisecond timestamp.
    pub fn at(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            values: BTreeMap::new(),
        }
    }

    /// Add a reading.
    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Add a reading if present.
    pub fn with_opt(self, field: impl Into<String>, value: Option<f64>) -> Self {
        match value {
            Some(v) => self.with(field, v),
            None => self,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Field names in this sample.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp_ms == other.timestamp_ms
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.to_bits() == vb.to_bits())
    }
}

impl Eq for Sample {}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.timestamp_ms.hash(state);
        self.values.len().hash(state);
        for (field, value) in &self.values {
            field.hash(state);
            value.to_bits().hash(state);
        }
    }
}

/// A sample tagged with the series it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyedSample {
    pub key: SeriesKey,
    pub sample: Sample,
}

/// The decoded body of one poll of a numeric feed.
///
/// Order is preserved as received; consumers must not assume it is sorted
/// by time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedPayload {
    samples: Vec<KeyedSample>,
}

impl FeedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing payloads.
    pub fn builder() -> FeedPayloadBuilder {
        FeedPayloadBuilder::default()
    }

    pub fn push(&mut self, key: impl Into<SeriesKey>, sample: Sample) {
        self.samples.push(KeyedSample {
            key: key.into(),
            sample,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyedSample> {
        self.samples.iter()
    }

    /// Distinct series keys, in first-seen order.
    pub fn keys(&self) -> Vec<&SeriesKey> {
        let mut seen: Vec<&SeriesKey> = Vec::new();
        for s in &self.samples {
            if !seen.contains(&&s.key) {
                seen.push(&s.key);
            }
        }
        seen
    }
}

impl IntoIterator for FeedPayload {
    type Item = KeyedSample;
    type IntoIter = std::vec::IntoIter<KeyedSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl FromIterator<KeyedSample> for FeedPayload {
    fn from_iter<T: IntoIterator<Item = KeyedSample>>(iter: T) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Builder for [`FeedPayload`].
#[derive(Debug, Default)]
pub struct FeedPayloadBuilder {
    payload: FeedPayload,
}

impl FeedPayloadBuilder {
    /// Append a sample for a series.
    pub fn sample(mut self, key: impl Into<SeriesKey>, sample: Sample) -> Self {
        self.payload.push(key, sample);
        self
    }

    pub fn build(self) -> FeedPayload {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut h = DefaultHasher::new();
        value.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equal_samples_hash_equal() {
        let a = Sample::at(10).with("cpu_percent", 20.0).with("load_avg_1m", 0.5);
        let b = Sample::at(10).with("load_avg_1m", 0.5).with("cpu_percent", 20.0);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_value_change_changes_identity() {
        let a = Sample::at(10).with("cpu_percent", 20.0);
        let b = Sample::at(10).with("cpu_percent", 20.5);
        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_nan_is_equal_to_itself() {
        let a = Sample::at(1).with("temperature_c", f64::NAN);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_with_opt_skips_missing() {
        let s = Sample::at(1).with_opt("a", Some(1.0)).with_opt("b", None);
        assert_eq!(s.fields().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_payload_keys_first_seen_order() {
        let payload = FeedPayload::builder()
            .sample("sdb", Sample::at(2))
            .sample("sda", Sample::at(1))
            .sample("sdb", Sample::at(3))
            .build();

        let keys: Vec<&str> = payload.keys().into_iter().map(SeriesKey::as_str).collect();
        assert_eq!(keys, vec!["sdb", "sda"]);
        assert_eq!(payload.len(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_payload() {
        let payload = FeedPayload::builder()
            .sample("system", Sample::at(5).with("cpu_percent", 1.0))
            .build();
        let json = serde_json::to_string(&payload).unwrap();
        let back: FeedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
