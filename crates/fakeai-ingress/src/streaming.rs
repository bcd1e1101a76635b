//! The streaming engine: drives a chat completion through
//! `New -> Prefill -> FirstToken -> Decoding -> Finalizing -> {Done|Failed|Cancelled}`,
//! emitting SSE frames wire-compatible with OpenAI and lifecycle events onto
//! the bus at each transition.
//!
//! The token stream itself is a [`futures::stream::unfold`] state machine;
//! cancellation (client disconnect, or the harness dropping the response
//! body) is detected the ordinary async-Rust way — the stream is simply
//! never polled again, and the guard embedded in its state runs its `Drop`
//! to record the cancellation and release the rate-limit reservation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use fakeai_core::events::{Event, EventKind, EventPayload};
use fakeai_core::types::{generate_stream_id, Worker};
use fakeai_generation::LatencyShaper;
use fakeai_observability::bus::EventBusHandle;
use fakeai_observability::trackers::{CostTracker, StreamingTracker};
use futures::stream;
use futures::StreamExt;

use crate::wire::{ChatCompletionChunk, Delta, StreamChoice};

/// Everything needed to drive one streaming chat completion.
pub struct StreamJob {
    pub request_id: String,
    pub model: String,
    pub api_key: String,
    pub endpoint: &'static str,
    /// Reasoning tokens, streamed as `reasoning_content` delta chunks after
    /// the opening role chunk and before the content deltas. Empty for
    /// models without reasoning capability.
    pub reasoning_tokens: Vec<String>,
    pub tokens: Vec<String>,
    pub matched_tokens: u32,
    pub total_input_tokens: u32,
    pub worker_id: u32,
    pub prompt_tokens: u32,
    pub cached_tokens: u32,
    pub shaper: LatencyShaper,
    pub bus: EventBusHandle,
    pub streaming_tracker: Arc<StreamingTracker>,
    pub cost_tracker: Arc<CostTracker>,
    pub workers: Arc<RwLock<Vec<Worker>>>,
    /// SSE keep-alive ping interval, from `FAKEAI_STREAM_KEEPALIVE_INTERVAL_SECONDS`.
    pub keepalive_ms: u64,
    /// Overall wall-clock budget for the stream, from `FAKEAI_STREAM_TIMEOUT_SECONDS`.
    pub timeout_ms: u64,
    /// Checked between tokens; once set, the stream finishes at the next
    /// boundary instead of emitting further content.
    pub draining: Arc<AtomicBool>,
}

fn release_worker_slot(workers: &RwLock<Vec<Worker>>, worker_id: u32) {
    let mut workers = workers.write().expect("workers lock poisoned");
    if let Some(worker) = workers.iter_mut().find(|w| w.id == worker_id) {
        worker.queue_depth = worker.queue_depth.saturating_sub(1);
    }
}

/// Releases the stream's accounting exactly once, whether the stream runs
/// to completion or is dropped mid-flight (client disconnect / cancellation).
struct StreamGuard {
    job: Option<StreamJob>,
    stream_id: String,
    start_ms: i64,
    first_token_ms: Option<i64>,
    emitted: u32,
    finished: bool,
}

impl StreamGuard {
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let Some(job) = self.job.take() else { return };
        let now = chrono::Utc::now().timestamp_millis();
        let duration_ms = (now - self.start_ms).max(0) as u64;

        job.bus.publish(Event::new(
            EventKind::StreamCompleted,
            job.request_id.clone(),
            Some(self.stream_id.clone()),
            EventPayload::Empty,
        ));
        job.bus.publish(Event::new(
            EventKind::RequestCompleted,
            job.request_id.clone(),
            Some(self.stream_id.clone()),
            EventPayload::RequestTerminal {
                endpoint: job.endpoint.to_string(),
                model: job.model.clone(),
                duration_ms,
                input_tokens: job.prompt_tokens,
                output_tokens: self.emitted,
                cached_tokens: job.cached_tokens,
                error_kind: None,
            },
        ));

        if let Some(first_token_ms) = self.first_token_ms {
            job.streaming_tracker.record_completed_stream(self.start_ms, first_token_ms, now, self.emitted);
        }
        job.cost_tracker.record_usage(&job.api_key, &job.model, job.prompt_tokens, self.emitted, job.cached_tokens);
        release_worker_slot(&job.workers, job.worker_id);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let Some(job) = self.job.take() else { return };
        job.bus.publish(Event::new(
            EventKind::StreamCancelled,
            job.request_id.clone(),
            Some(self.stream_id.clone()),
            EventPayload::Empty,
        ));
        let now = chrono::Utc::now().timestamp_millis();
        job.bus.publish(Event::new(
            EventKind::RequestCancelled,
            job.request_id.clone(),
            Some(self.stream_id.clone()),
            EventPayload::RequestTerminal {
                endpoint: job.endpoint.to_string(),
                model: job.model.clone(),
                duration_ms: (now - self.start_ms).max(0) as u64,
                input_tokens: job.prompt_tokens,
                output_tokens: self.emitted,
                cached_tokens: job.cached_tokens,
                error_kind: Some("cancelled".to_string()),
            },
        ));
        release_worker_slot(&job.workers, job.worker_id);
    }
}

enum Phase {
    Prefill,
    /// Opening `delta:{role:"assistant"}` chunk with empty content, sent once
    /// prefill completes and before any reasoning/content deltas.
    Role,
    Reasoning(u32),
    Emit(u32),
    Finish,
    Exhausted,
}

struct UnfoldState {
    guard: StreamGuard,
    phase: Phase,
    deadline_ms: i64,
}

/// Builds the SSE response for a streaming chat completion.
pub fn sse_response(job: StreamJob) -> Response {
    let stream_id = generate_stream_id();
    job.bus.publish(Event::new(EventKind::StreamStarted, job.request_id.clone(), Some(stream_id.clone()), EventPayload::Empty));

    let start_ms = chrono::Utc::now().timestamp_millis();
    let deadline_ms = start_ms + job.timeout_ms as i64;
    let keepalive_ms = job.keepalive_ms;
    let guard = StreamGuard { job: Some(job), stream_id, start_ms, first_token_ms: None, emitted: 0, finished: false };
    let state = UnfoldState { guard, phase: Phase::Prefill, deadline_ms };

    let chunk_stream = stream::unfold(state, |mut state| async move {
        loop {
            match state.phase {
                Phase::Prefill => {
                    let Some(job) = state.guard.job.as_ref() else { return None };
                    let stream_id = state.guard.stream_id.clone();
                    let request_id = job.request_id.clone();

                    if job.tokens.is_empty() && job.reasoning_tokens.is_empty() {
                        state.phase = Phase::Finish;
                        continue;
                    }

                    job.bus.publish(Event::new(EventKind::PrefillStarted, request_id.clone(), Some(stream_id.clone()), EventPayload::Empty));
                    let ttft_ms = job.shaper.sample_ttft(state.guard.job.as_ref().unwrap().matched_tokens, state.guard.job.as_ref().unwrap().total_input_tokens);
                    tokio::time::sleep(Duration::from_secs_f64((ttft_ms / 1000.0).max(0.0))).await;
                    let job = state.guard.job.as_ref().unwrap();
                    job.bus.publish(Event::new(
                        EventKind::PrefillCompleted,
                        request_id.clone(),
                        Some(stream_id.clone()),
                        EventPayload::Latency { phase: "prefill".to_string(), duration_ms: ttft_ms as u64 },
                    ));

                    state.guard.first_token_ms = Some(chrono::Utc::now().timestamp_millis());
                    state.phase = Phase::Role;
                    continue;
                }
                Phase::Role => {
                    let Some(job) = state.guard.job.as_ref() else { return None };
                    job.bus.publish(Event::new(EventKind::StreamFirstToken, job.request_id.clone(), Some(state.guard.stream_id.clone()), EventPayload::Empty));

                    let chunk = ChatCompletionChunk {
                        id: format!("chatcmpl-{}", state.guard.stream_id),
                        object: "chat.completion.chunk",
                        created: chrono::Utc::now().timestamp(),
                        model: job.model.clone(),
                        choices: vec![StreamChoice {
                            index: 0,
                            delta: Delta { role: Some("assistant"), content: None, reasoning_content: None },
                            finish_reason: None,
                        }],
                    };
                    state.phase = Phase::Reasoning(0);
                    let json = serde_json::to_string(&chunk).unwrap_or_default();
                    return Some((SseEvent::default().data(json), state));
                }
                Phase::Reasoning(index) => {
                    let Some(job) = state.guard.job.as_ref() else { return None };
                    if index as usize >= job.reasoning_tokens.len() {
                        state.phase = Phase::Emit(0);
                        continue;
                    }
                    if job.draining.load(Ordering::Relaxed) || chrono::Utc::now().timestamp_millis() >= state.deadline_ms {
                        state.phase = Phase::Finish;
                        continue;
                    }
                    if index > 0 {
                        let itl_ms = job.shaper.sample_itl();
                        tokio::time::sleep(Duration::from_secs_f64((itl_ms / 1000.0).max(0.0))).await;
                        let job = state.guard.job.as_ref().unwrap();
                        job.bus.publish(Event::new(
                            EventKind::DecodeCompleted,
                            job.request_id.clone(),
                            Some(state.guard.stream_id.clone()),
                            EventPayload::Latency { phase: "decode".to_string(), duration_ms: itl_ms as u64 },
                        ));
                    }

                    let job = state.guard.job.as_ref().unwrap();
                    let text = job.reasoning_tokens[index as usize].clone();
                    job.bus.publish(Event::new(
                        EventKind::StreamTokenGenerated,
                        job.request_id.clone(),
                        Some(state.guard.stream_id.clone()),
                        EventPayload::Token { sequence: index, text: text.clone(), is_reasoning: true },
                    ));

                    let chunk = ChatCompletionChunk {
                        id: format!("chatcmpl-{}", state.guard.stream_id),
                        object: "chat.completion.chunk",
                        created: chrono::Utc::now().timestamp(),
                        model: job.model.clone(),
                        choices: vec![StreamChoice {
                            index: 0,
                            delta: Delta { role: None, content: None, reasoning_content: Some(text) },
                            finish_reason: None,
                        }],
                    };
                    state.phase = Phase::Reasoning(index + 1);
                    let json = serde_json::to_string(&chunk).unwrap_or_default();
                    return Some((SseEvent::default().data(json), state));
                }
                Phase::Emit(index) => {
                    let Some(job) = state.guard.job.as_ref() else { return None };
                    if index as usize >= job.tokens.len() {
                        state.phase = Phase::Finish;
                        continue;
                    }
                    if job.draining.load(Ordering::Relaxed) || chrono::Utc::now().timestamp_millis() >= state.deadline_ms {
                        state.phase = Phase::Finish;
                        continue;
                    }
                    if index > 0 {
                        let itl_ms = job.shaper.sample_itl();
                        tokio::time::sleep(Duration::from_secs_f64((itl_ms / 1000.0).max(0.0))).await;
                        let job = state.guard.job.as_ref().unwrap();
                        job.bus.publish(Event::new(
                            EventKind::DecodeCompleted,
                            job.request_id.clone(),
                            Some(state.guard.stream_id.clone()),
                            EventPayload::Latency { phase: "decode".to_string(), duration_ms: itl_ms as u64 },
                        ));
                    }

                    let job = state.guard.job.as_ref().unwrap();
                    let text = job.tokens[index as usize].clone();
                    job.bus.publish(Event::new(
                        EventKind::StreamTokenGenerated,
                        job.request_id.clone(),
                        Some(state.guard.stream_id.clone()),
                        EventPayload::Token { sequence: index, text: text.clone(), is_reasoning: false },
                    ));

                    let chunk = ChatCompletionChunk {
                        id: format!("chatcmpl-{}", state.guard.stream_id),
                        object: "chat.completion.chunk",
                        created: chrono::Utc::now().timestamp(),
                        model: job.model.clone(),
                        choices: vec![StreamChoice { index: 0, delta: Delta { role: None, content: Some(text), reasoning_content: None }, finish_reason: None }],
                    };
                    state.guard.emitted += 1;
                    state.phase = Phase::Emit(index + 1);
                    let json = serde_json::to_string(&chunk).unwrap_or_default();
                    return Some((SseEvent::default().data(json), state));
                }
                Phase::Finish => {
                    let Some(job) = state.guard.job.as_ref() else { return None };
                    let finish_reason = if job.tokens.is_empty() || (state.guard.emitted as usize) < job.tokens.len() { "length" } else { "stop" };
                    let chunk = ChatCompletionChunk {
                        id: format!("chatcmpl-{}", state.guard.stream_id),
                        object: "chat.completion.chunk",
                        created: chrono::Utc::now().timestamp(),
                        model: job.model.clone(),
                        choices: vec![StreamChoice { index: 0, delta: Delta::default(), finish_reason: Some(finish_reason) }],
                    };
                    state.guard.finish();
                    state.phase = Phase::Exhausted;
                    let json = serde_json::to_string(&chunk).unwrap_or_default();
                    return Some((SseEvent::default().data(json), state));
                }
                Phase::Exhausted => return None,
            }
        }
    });

    let done_stream = chunk_stream.map(Ok::<_, std::convert::Infallible>).chain(stream::once(async { Ok(SseEvent::default().data("[DONE]")) }));

    Sse::new(done_stream).keep_alive(KeepAlive::default().interval(Duration::from_millis(keepalive_ms.max(1)))).into_response()
}

/// Exposed for reuse by callers that want the raw frame stream (tests).
pub fn content_from_chunk_json(json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    value.get("choices")?.get(0)?.get("delta")?.get("content")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_content_from_chunk_json() {
        let json = r#"{"id":"x","object":"chat.completion.chunk","created":0,"model":"m","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#;
        assert_eq!(content_from_chunk_json(json), Some("hi".to_string()));
    }
}
