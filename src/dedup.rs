//! In-memory event deduplication.
//!
//! A fingerprint, once seen, suppresses reprocessing of identical events
//! for the lifetime of the process. The set is unbounded on purpose:
//! sessions are short-lived and fingerprints are 64-byte strings, so
//! eviction machinery would buy nothing and cost the invariant that a
//! seen event stays seen.

use std::collections::HashSet;

/// The set of event fingerprints already processed this session.
#[derive(Debug, Default)]
pub struct FingerprintSet {
    seen: HashSet<String>,
}

impl FingerprintSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fingerprint. Returns `true` on first sighting, `false` for
    /// a duplicate.
    pub fn check_and_record(&mut self, fingerprint: &str) -> bool {
        if self.seen.contains(fingerprint) {
            return false;
        }
        self.seen.insert(fingerprint.to_string());
        true
    }

    /// Whether a fingerprint has been recorded.
    #[must_use]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Number of distinct fingerprints recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_records() {
        let mut set = FingerprintSet::new();
        assert!(set.check_and_record("abc"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("abc"));
    }

    #[test]
    fn duplicate_is_suppressed() {
        let mut set = FingerprintSet::new();
        assert!(set.check_and_record("abc"));
        assert!(!set.check_and_record("abc"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_fingerprints_accumulate() {
        let mut set = FingerprintSet::new();
        for i in 0..100 {
            assert!(set.check_and_record(&format!("fp-{i}")));
        }
        assert_eq!(set.len(), 100);
        // No eviction: everything stays seen.
        for i in 0..100 {
            assert!(!set.check_and_record(&format!("fp-{i}")));
        }
        assert_eq!(set.len(), 100);
    }
}
