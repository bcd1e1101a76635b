//! Token-bucket rate limiting per API key across RPM/TPM/RPD axes, plus an
//! abuse-pattern detector riding on the same per-key admission stream.
//!
//! On a request: (1) lock the key's bucket; (2) refill counters based on
//! elapsed wall time; (3) if any counter is insufficient, release the lock
//! and reject with `retry-after` seconds equal to the smallest time to next
//! refill; (4) else decrement and release. TPM accounting uses estimated
//! input tokens at admit time plus a fixed completion reservation; actual
//! completion tokens are not re-charged.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fakeai_core::error::Error;
use fakeai_core::types::{RateLimitTier, TierLimits};

/// Fixed completion-token reservation charged against TPM at admit time.
const COMPLETION_TOKEN_RESERVATION: u64 = 256;

/// Sliding window over which burst RPS is measured.
const BURST_WINDOW_SECS: u64 = 5;
/// A key bursting at more than this multiple of its steady-state RPM,
/// sustained across the whole window, trips the burst heuristic.
const BURST_RPS_MULTIPLIER: f64 = 3.0;
/// Consecutive rate-limit rejections (no successful admit in between) before
/// a key is flagged for sustained abuse.
const SUSTAINED_VIOLATION_THRESHOLD: u32 = 5;
/// Distinct endpoints hit by one key before its traffic looks like scripted
/// probing rather than a normal client integration.
const ENDPOINT_DIVERSITY_THRESHOLD: usize = 4;

/// Rolling per-key activity used only for abuse-pattern detection; kept
/// separate from `Bucket` since it tracks shape of traffic, not quota.
struct KeyActivity {
    recent_requests: VecDeque<Instant>,
    consecutive_violations: u32,
    endpoints: HashSet<String>,
}

impl KeyActivity {
    fn new() -> Self {
        Self { recent_requests: VecDeque::new(), consecutive_violations: 0, endpoints: HashSet::new() }
    }
}

struct Bucket {
    rpm_remaining: f64,
    tpm_remaining: f64,
    rpd_remaining: f64,
    last_refill: Instant,
    limits: TierLimits,
}

impl Bucket {
    fn new(tier: RateLimitTier) -> Self {
        let limits = tier.limits();
        Self {
            rpm_remaining: limits.rpm as f64,
            tpm_remaining: limits.tpm as f64,
            rpd_remaining: limits.rpd as f64,
            last_refill: Instant::now(),
            limits,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        self.last_refill = now;

        let minute_fraction = elapsed.as_secs_f64() / 60.0;
        let day_fraction = elapsed.as_secs_f64() / 86_400.0;

        self.rpm_remaining = (self.rpm_remaining + self.limits.rpm as f64 * minute_fraction).min(self.limits.rpm as f64);
        self.tpm_remaining = (self.tpm_remaining + self.limits.tpm as f64 * minute_fraction).min(self.limits.tpm as f64);
        self.rpd_remaining = (self.rpd_remaining + self.limits.rpd as f64 * day_fraction).min(self.limits.rpd as f64);
    }

    /// Seconds until each counter independently reaches `needed`, taking the max
    /// across axes that are currently insufficient.
    fn seconds_to_next_refill(&self, estimated_tokens: u64) -> u64 {
        let mut wait_secs: f64 = 0.0;

        if self.rpm_remaining < 1.0 {
            let deficit = 1.0 - self.rpm_remaining;
            wait_secs = wait_secs.max(deficit / (self.limits.rpm as f64) * 60.0);
        }
        let tpm_needed = estimated_tokens as f64 + COMPLETION_TOKEN_RESERVATION as f64;
        if self.tpm_remaining < tpm_needed {
            let deficit = tpm_needed - self.tpm_remaining;
            wait_secs = wait_secs.max(deficit / (self.limits.tpm as f64) * 60.0);
        }
        if self.rpd_remaining < 1.0 {
            let deficit = 1.0 - self.rpd_remaining;
            wait_secs = wait_secs.max(deficit / (self.limits.rpd as f64) * 86_400.0);
        }

        wait_secs.ceil() as u64
    }
}

pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    activity: DashMap<String, Mutex<KeyActivity>>,
    default_tier: RateLimitTier,
    enabled: bool,
}

/// Post-admit remaining counts, used to populate `x-ratelimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct AdmitOutcome {
    pub limit_requests: u64,
    pub remaining_requests: u64,
    pub reset_requests_secs: u64,
    pub limit_tokens: u64,
    pub remaining_tokens: u64,
    pub reset_tokens_secs: u64,
}

impl RateLimiter {
    pub fn new(default_tier: RateLimitTier, enabled: bool) -> Self {
        Self { buckets: DashMap::new(), activity: DashMap::new(), default_tier, enabled }
    }

    /// Admits a request for `api_key`, reserving `estimated_input_tokens` plus
    /// the fixed completion reservation against the TPM axis.
    pub fn admit(&self, api_key: &str, estimated_input_tokens: u32) -> Result<AdmitOutcome, Error> {
        if !self.enabled {
            return Ok(AdmitOutcome {
                limit_requests: u64::MAX,
                remaining_requests: u64::MAX,
                reset_requests_secs: 0,
                limit_tokens: u64::MAX,
                remaining_tokens: u64::MAX,
                reset_tokens_secs: 0,
            });
        }

        let entry = self.buckets.entry(api_key.to_string()).or_insert_with(|| Mutex::new(Bucket::new(self.default_tier)));
        let mut bucket = entry.lock().expect("rate limiter bucket mutex poisoned");
        bucket.refill(Instant::now());

        let tpm_needed = estimated_input_tokens as f64 + COMPLETION_TOKEN_RESERVATION as f64;
        let insufficient = bucket.rpm_remaining < 1.0 || bucket.tpm_remaining < tpm_needed || bucket.rpd_remaining < 1.0;

        if insufficient {
            let retry_after_secs = bucket.seconds_to_next_refill(estimated_input_tokens as u64);
            return Err(Error::RateLimitExceeded { retry_after_secs });
        }

        bucket.rpm_remaining -= 1.0;
        bucket.tpm_remaining -= tpm_needed;
        bucket.rpd_remaining -= 1.0;

        Ok(AdmitOutcome {
            limit_requests: bucket.limits.rpm,
            remaining_requests: bucket.rpm_remaining.floor() as u64,
            reset_requests_secs: 60,
            limit_tokens: bucket.limits.tpm,
            remaining_tokens: bucket.tpm_remaining.floor() as u64,
            reset_tokens_secs: 60,
        })
    }

    /// Releases a reservation on cancellation without re-crediting consumed
    /// quota — rpm/rpd/tpm already decremented stay decremented.
    pub fn release_on_cancel(&self, _api_key: &str) {
        // Intentionally a no-op: admitted tokens are not re-credited.
    }

    /// Feeds one request observation into the abuse-pattern detector and
    /// returns the pattern tag if this call trips a heuristic. Callers admit
    /// first, then report the outcome here regardless of whether admission
    /// succeeded, since sustained violations are themselves part of the
    /// signal.
    pub fn observe_abuse(&self, api_key: &str, endpoint: &str, violated: bool) -> Option<&'static str> {
        if !self.enabled {
            return None;
        }

        let rpm_limit = self
            .buckets
            .get(api_key)
            .map(|entry| entry.lock().expect("rate limiter bucket mutex poisoned").limits.rpm)
            .unwrap_or_else(|| self.default_tier.limits().rpm);

        let entry = self.activity.entry(api_key.to_string()).or_insert_with(|| Mutex::new(KeyActivity::new()));
        let mut activity = entry.lock().expect("abuse activity mutex poisoned");

        let now = Instant::now();
        activity.recent_requests.push_back(now);
        while let Some(&front) = activity.recent_requests.front() {
            if now.duration_since(front) > Duration::from_secs(BURST_WINDOW_SECS) {
                activity.recent_requests.pop_front();
            } else {
                break;
            }
        }
        activity.endpoints.insert(endpoint.to_string());

        if violated {
            activity.consecutive_violations += 1;
        } else {
            activity.consecutive_violations = 0;
        }

        if activity.consecutive_violations == SUSTAINED_VIOLATION_THRESHOLD {
            return Some("sustained_violation");
        }

        let window_rps = activity.recent_requests.len() as f64 / BURST_WINDOW_SECS as f64;
        let burst_threshold = BURST_RPS_MULTIPLIER * (rpm_limit as f64 / 60.0);
        if activity.recent_requests.len() >= (BURST_WINDOW_SECS * 2) as usize && window_rps > burst_threshold {
            return Some("burst");
        }

        if activity.endpoints.len() == ENDPOINT_DIVERSITY_THRESHOLD {
            return Some("endpoint_diversity");
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_within_tier_limits() {
        let limiter = RateLimiter::new(RateLimitTier::Tier1, true);
        let outcome = limiter.admit("sk-a", 100).unwrap();
        assert_eq!(outcome.remaining_requests, 9);
    }

    #[test]
    fn rejects_once_rpm_exhausted() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        for _ in 0..3 {
            limiter.admit("sk-a", 10).unwrap();
        }
        let result = limiter.admit("sk-a", 10);
        assert!(matches!(result, Err(Error::RateLimitExceeded { .. })));
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(RateLimitTier::Free, false);
        for _ in 0..100 {
            assert!(limiter.admit("sk-a", 1_000_000).is_ok());
        }
    }

    #[test]
    fn distinct_keys_have_independent_buckets() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        for _ in 0..3 {
            limiter.admit("sk-a", 10).unwrap();
        }
        assert!(limiter.admit("sk-b", 10).is_ok());
    }

    #[test]
    fn sustained_violations_trip_after_threshold() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        let mut detected = None;
        for _ in 0..SUSTAINED_VIOLATION_THRESHOLD {
            detected = limiter.observe_abuse("sk-a", "/v1/chat/completions", true);
        }
        assert_eq!(detected, Some("sustained_violation"));
    }

    #[test]
    fn a_single_violation_does_not_trip_sustained() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        assert_eq!(limiter.observe_abuse("sk-a", "/v1/chat/completions", true), None);
    }

    #[test]
    fn alternating_success_resets_the_violation_streak() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        for _ in 0..(SUSTAINED_VIOLATION_THRESHOLD - 1) {
            limiter.observe_abuse("sk-a", "/v1/chat/completions", true);
        }
        assert_eq!(limiter.observe_abuse("sk-a", "/v1/chat/completions", false), None);
        for _ in 0..(SUSTAINED_VIOLATION_THRESHOLD - 1) {
            assert_eq!(limiter.observe_abuse("sk-a", "/v1/chat/completions", false), None);
        }
    }

    #[test]
    fn endpoint_diversity_trips_once_enough_distinct_endpoints_seen() {
        let limiter = RateLimiter::new(RateLimitTier::Tier5, true);
        let endpoints = ["/v1/chat/completions", "/v1/completions", "/v1/embeddings", "/v1/moderations"];
        let mut detected = None;
        for endpoint in endpoints {
            detected = limiter.observe_abuse("sk-a", endpoint, false);
        }
        assert_eq!(detected, Some("endpoint_diversity"));
    }

    #[test]
    fn disabled_limiter_never_flags_abuse() {
        let limiter = RateLimiter::new(RateLimitTier::Free, false);
        for _ in 0..(SUSTAINED_VIOLATION_THRESHOLD * 2) {
            assert_eq!(limiter.observe_abuse("sk-a", "/v1/chat/completions", true), None);
        }
    }

    #[test]
    fn burst_trips_when_rps_far_exceeds_tier_limit() {
        let limiter = RateLimiter::new(RateLimitTier::Free, true);
        let mut detected = None;
        for _ in 0..((BURST_WINDOW_SECS * 2) + 1) {
            detected = limiter.observe_abuse("sk-a", "/v1/chat/completions", false);
        }
        assert_eq!(detected, Some("burst"));
    }
}
