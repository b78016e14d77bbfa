//! Structural digests of poll payloads.

use std::hash::{Hash, Hasher};

use seahash::SeaHasher;

/// A 64-bit structural digest of a payload.
///
/// Two payloads with equal structure (same keys, timestamps and bit-identical
/// readings, in the same order) always produce the same fingerprint. Used to
/// skip ingesting a poll result that is identical to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = SeaHasher::new();
        value.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewatch_types::{FeedPayload, Sample};

    fn payload(cpu: f64) -> FeedPayload {
        FeedPayload::builder()
            .sample("system", Sample::at(0).with("cpu_percent", cpu))
            .build()
    }

    #[test]
    fn test_identical_payloads_match() {
        assert_eq!(Fingerprint::of(&payload(20.0)), Fingerprint::of(&payload(20.0)));
    }

    #[test]
    fn test_changed_reading_differs() {
        assert_ne!(Fingerprint::of(&payload(20.0)), Fingerprint::of(&payload(21.0)));
    }

    #[test]
    fn test_text_bodies() {
        assert_eq!(Fingerprint::of("a\nb\n"), Fingerprint::of("a\nb\n"));
        assert_ne!(Fingerprint::of("a\nb\n"), Fingerprint::of("a\nb\nc\n"));
    }
}
