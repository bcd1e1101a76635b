//! Event types flowing through the event bus.
//!
//! An [`Event`] is an immutable record of something that happened to a
//! request or stream. It carries a fixed [`EventKind`] tag (used by
//! subscribers to filter), identity, a timestamp, and a kind-specific
//! [`EventPayload`]. See the data model's event bus description for the
//! eight event categories this enumerates.

use serde::Serialize;

/// The 48 event kinds, grouped into the eight categories from the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // --- request lifecycle ---
    RequestStarted,
    RequestQueued,
    RequestAdmitted,
    RequestCompleted,
    RequestFailed,
    RequestCancelled,

    // --- tokens ---
    TokenGenerated,
    TokenBatchGenerated,
    PromptTokenized,
    CompletionTokenCounted,
    ReasoningTokenGenerated,
    ToolCallTokenGenerated,

    // --- streams ---
    StreamStarted,
    StreamFirstToken,
    StreamTokenGenerated,
    StreamCompleted,
    StreamFailed,
    StreamCancelled,
    StreamKeepAlive,

    // --- latency phases ---
    PrefillStarted,
    PrefillCompleted,
    DecodeStarted,
    DecodeCompleted,
    TtftRecorded,
    ItlRecorded,

    // --- cache ---
    CacheLookup,
    CacheHit,
    CacheMiss,
    CacheInsert,
    CacheEvicted,
    CacheSpeedupApplied,

    // --- model / resource ---
    ModelRegistered,
    ModelRequested,
    WorkerAssigned,
    WorkerQueueDepthChanged,
    WorkerLatencyUpdated,
    ResourceUtilizationSampled,

    // --- error / recovery ---
    ErrorOccurred,
    ValidationFailed,
    AuthFailed,
    RateLimitRejected,
    PatternDetected,
    InternalErrorRaised,

    // --- usage / billing ---
    UsageRecorded,
    CostAccrued,
    BudgetThresholdCrossed,
    TierAssigned,
    DiscountApplied,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::RequestStarted,
        EventKind::RequestQueued,
        EventKind::RequestAdmitted,
        EventKind::RequestCompleted,
        EventKind::RequestFailed,
        EventKind::RequestCancelled,
        EventKind::TokenGenerated,
        EventKind::TokenBatchGenerated,
        EventKind::PromptTokenized,
        EventKind::CompletionTokenCounted,
        EventKind::ReasoningTokenGenerated,
        EventKind::ToolCallTokenGenerated,
        EventKind::StreamStarted,
        EventKind::StreamFirstToken,
        EventKind::StreamTokenGenerated,
        EventKind::StreamCompleted,
        EventKind::StreamFailed,
        EventKind::StreamCancelled,
        EventKind::StreamKeepAlive,
        EventKind::PrefillStarted,
        EventKind::PrefillCompleted,
        EventKind::DecodeStarted,
        EventKind::DecodeCompleted,
        EventKind::TtftRecorded,
        EventKind::ItlRecorded,
        EventKind::CacheLookup,
        EventKind::CacheHit,
        EventKind::CacheMiss,
        EventKind::CacheInsert,
        EventKind::CacheEvicted,
        EventKind::CacheSpeedupApplied,
        EventKind::ModelRegistered,
        EventKind::ModelRequested,
        EventKind::WorkerAssigned,
        EventKind::WorkerQueueDepthChanged,
        EventKind::WorkerLatencyUpdated,
        EventKind::ResourceUtilizationSampled,
        EventKind::ErrorOccurred,
        EventKind::ValidationFailed,
        EventKind::AuthFailed,
        EventKind::RateLimitRejected,
        EventKind::PatternDetected,
        EventKind::InternalErrorRaised,
        EventKind::UsageRecorded,
        EventKind::CostAccrued,
        EventKind::BudgetThresholdCrossed,
        EventKind::TierAssigned,
        EventKind::DiscountApplied,
    ];
}

/// Kind-specific event payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "payload_type", rename_all = "snake_case")]
pub enum EventPayload {
    Request {
        endpoint: String,
        model: String,
        api_key: String,
        streaming: bool,
    },
    RequestTerminal {
        endpoint: String,
        model: String,
        duration_ms: u64,
        input_tokens: u32,
        output_tokens: u32,
        cached_tokens: u32,
        error_kind: Option<String>,
    },
    Token {
        sequence: u32,
        text: String,
        is_reasoning: bool,
    },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        cached_tokens: u32,
    },
    Latency {
        phase: String,
        duration_ms: u64,
    },
    Cache {
        matched_tokens: u32,
        total_input_tokens: u32,
        worker_id: u32,
    },
    Worker {
        worker_id: u32,
        queue_depth: u32,
        tokens_in_flight: u32,
    },
    Model {
        model: String,
        family: String,
    },
    Error {
        endpoint: String,
        kind: String,
        message: String,
    },
    Cost {
        api_key: String,
        model: String,
        cost_usd: f64,
    },
    Pattern {
        api_key: String,
        pattern: String,
    },
    Empty,
}

/// An immutable published event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub request_id: String,
    pub stream_id: Option<String>,
    pub timestamp_ms: i64,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(
        kind: EventKind,
        request_id: impl Into<String>,
        stream_id: Option<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
            stream_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_unique_and_count_is_48() {
        let mut seen = std::collections::HashSet::new();
        for kind in EventKind::ALL {
            assert!(seen.insert(*kind), "duplicate event kind {kind:?}");
        }
        assert_eq!(EventKind::ALL.len(), 48);
    }

    #[test]
    fn event_carries_identity_and_timestamp() {
        let event = Event::new(
            EventKind::RequestStarted,
            "req_1",
            None,
            EventPayload::Empty,
        );
        assert_eq!(event.request_id, "req_1");
        assert!(event.timestamp_ms > 0);
    }
}
