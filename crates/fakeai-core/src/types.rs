//! Shared data-model types: request/stream records, rate-limit tiers,
//! workers and KV-cache blocks. These are plain accounting structs; the
//! crates that own their lifecycle (`fakeai-routing`, `fakeai-ingress`)
//! mutate them, `fakeai-observability` trackers read copies.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic, process-unique request id generator.
///
/// Ids are opaque and not cryptographically unguessable — the spec's
/// non-goals explicitly exclude id/key cryptographic strength.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn generate_request_id() -> String {
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req_{seq:016x}")
}

pub fn generate_stream_id() -> String {
    format!("strm_{}", uuid::Uuid::new_v4().simple())
}

/// Terminal status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Success,
    Error,
    Cancelled,
}

/// A single in-flight or completed request's accounting record.
///
/// Created on arrival, mutated only by the owning request task, and
/// demoted to a bounded history deque on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub endpoint: String,
    pub model: String,
    pub created_at_unix: i64,
    pub streaming: bool,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: u32,
    pub api_key: String,
    pub worker_id: Option<u32>,
    pub start_time_ms: i64,
    pub first_token_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub status: Option<TerminalStatus>,
    pub error_kind: Option<String>,
}

impl RequestRecord {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>, streaming: bool) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: generate_request_id(),
            endpoint: endpoint.into(),
            model: model.into(),
            created_at_unix: now.timestamp(),
            streaming,
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            api_key: api_key.into(),
            worker_id: None,
            start_time_ms: now.timestamp_millis(),
            first_token_time_ms: None,
            end_time_ms: None,
            status: None,
            error_kind: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time_ms.map(|end| end - self.start_time_ms)
    }
}

/// One token emitted into a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamToken {
    pub sequence: u32,
    pub text: String,
    pub timestamp_ms: i64,
    pub chunk_size_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Active,
    Completed,
    Failed,
    Cancelled,
}

/// A streaming chat completion's accounting record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub request_id: String,
    pub tokens: Vec<StreamToken>,
    pub finish_reason: Option<String>,
    pub state: StreamState,
    pub error_kind: Option<String>,
}

impl StreamRecord {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            id: generate_stream_id(),
            request_id: request_id.into(),
            tokens: Vec::new(),
            finish_reason: None,
            state: StreamState::Active,
            error_kind: None,
        }
    }
}

/// Fixed rate-limit tier ceilings, as literal constants from the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitTier {
    Free,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Tier5,
}

/// `(requests_per_minute, tokens_per_minute, requests_per_day)`.
pub struct TierLimits {
    pub rpm: u64,
    pub tpm: u64,
    pub rpd: u64,
}

impl RateLimitTier {
    pub const fn limits(self) -> TierLimits {
        match self {
            RateLimitTier::Free => TierLimits { rpm: 3, tpm: 40_000, rpd: 200 },
            RateLimitTier::Tier1 => TierLimits { rpm: 10, tpm: 200_000, rpd: 1_000 },
            RateLimitTier::Tier2 => TierLimits { rpm: 50, tpm: 500_000, rpd: 5_000 },
            RateLimitTier::Tier3 => TierLimits { rpm: 200, tpm: 1_000_000, rpd: 10_000 },
            RateLimitTier::Tier4 => TierLimits { rpm: 500, tpm: 2_000_000, rpd: 50_000 },
            RateLimitTier::Tier5 => TierLimits { rpm: 10_000, tpm: 10_000_000, rpd: 100_000 },
        }
    }
}

/// A fixed-count worker partition. Pure accounting — not an OS thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: u32,
    pub queue_depth: u32,
    pub tokens_in_flight: u32,
    pub running_avg_latency_ms: f64,
}

impl Worker {
    pub fn new(id: u32) -> Self {
        Self { id, queue_depth: 0, tokens_in_flight: 0, running_avg_latency_ms: 0.0 }
    }
}

/// Hash of a fixed-size token-id block, used as a radix-tree node key.
pub type BlockKey = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_monotonic() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }

    #[test]
    fn duration_is_none_until_completed() {
        let record = RequestRecord::new("/v1/chat/completions", "gpt-4", "sk-test", false);
        assert!(record.duration_ms().is_none());
    }

    #[test]
    fn tier_limits_match_spec_literals() {
        let free = RateLimitTier::Free.limits();
        assert_eq!((free.rpm, free.tpm, free.rpd), (3, 40_000, 200));
        let tier5 = RateLimitTier::Tier5.limits();
        assert_eq!((tier5.rpm, tier5.tpm, tier5.rpd), (10_000, 10_000_000, 100_000));
    }
}
