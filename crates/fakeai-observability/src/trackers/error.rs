//! Error-kind classification counts per endpoint, plus abuse-pattern hits
//! (rate-limit vs. validation vs. overload).

use dashmap::DashMap;

#[derive(Default)]
pub struct ErrorTracker {
    by_endpoint_kind: DashMap<(String, String), u64>,
    pattern_hits: DashMap<String, u64>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, endpoint: &str, kind: &str) {
        *self.by_endpoint_kind.entry((endpoint.to_string(), kind.to_string())).or_insert(0) += 1;
    }

    pub fn record_pattern(&self, pattern: &str) {
        *self.pattern_hits.entry(pattern.to_string()).or_insert(0) += 1;
    }

    pub fn count_for(&self, endpoint: &str, kind: &str) -> u64 {
        self.by_endpoint_kind.get(&(endpoint.to_string(), kind.to_string())).map(|v| *v).unwrap_or(0)
    }

    pub fn pattern_count(&self, pattern: &str) -> u64 {
        self.pattern_hits.get(pattern).map(|v| *v).unwrap_or(0)
    }

    /// All `(endpoint, kind, count)` rows recorded so far.
    pub fn breakdown(&self) -> Vec<(String, String, u64)> {
        self.by_endpoint_kind.iter().map(|entry| (entry.key().0.clone(), entry.key().1.clone(), *entry.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_per_endpoint_and_kind() {
        let tracker = ErrorTracker::new();
        tracker.record_error("/v1/chat/completions", "rate_limit");
        tracker.record_error("/v1/chat/completions", "rate_limit");
        tracker.record_error("/v1/chat/completions", "validation");

        assert_eq!(tracker.count_for("/v1/chat/completions", "rate_limit"), 2);
        assert_eq!(tracker.count_for("/v1/chat/completions", "validation"), 1);
    }

    #[test]
    fn tracks_abuse_pattern_hits() {
        let tracker = ErrorTracker::new();
        tracker.record_pattern("rapid_retry");
        tracker.record_pattern("rapid_retry");
        assert_eq!(tracker.pattern_count("rapid_retry"), 2);
    }
}
