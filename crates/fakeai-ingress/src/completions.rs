//! `/v1/completions`: the legacy single-prompt text completion endpoint.
//!
//! Shares its preparation path with chat completions (auth, context
//! validation, admission, KV-cache routing, token generation) but has no
//! `tool_calls`/`reasoning_content` concept and a flatter wire shape.

use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fakeai_core::error::Error;
use fakeai_core::events::{Event, EventKind, EventPayload};
use fakeai_core::types::RequestRecord;
use fakeai_generation::{generate_tokens, seed_from_request_id, validate_context_window, LatencyShaper};
use fakeai_routing::KVCacheRouter;
use futures::stream;
use futures::StreamExt;

use crate::chat::{extract_api_key, publish_failure, publish_pattern_detected};
use crate::headers::apply as apply_rate_limit_headers;
use crate::state::IngressState;
use crate::wire::{CompletionChoice, CompletionRequest, CompletionResponse, PromptTokensDetails, Usage};

const ENDPOINT: &str = "/v1/completions";

pub async fn completions(State(state): State<IngressState>, headers: HeaderMap, Json(req): Json<CompletionRequest>) -> Result<Response, Error> {
    let api_key = extract_api_key(&headers);
    state.auth.authenticate(api_key.as_deref()).map_err(|err| publish_failure(&state, ENDPOINT, "auth", err, api_key.as_deref()))?;
    let api_key = api_key.unwrap_or_default();

    let descriptor = state.models.get_or_register(&req.model);
    let input_token_ids = KVCacheRouter::tokenize(&req.prompt);
    let prompt_tokens = input_token_ids.len() as u32;
    let max_tokens = req.max_tokens.unwrap_or(16);

    validate_context_window(descriptor.context_window, prompt_tokens, max_tokens)
        .map_err(|err| publish_failure(&state, ENDPOINT, "context-overflow", err, Some(&api_key)))?;

    let admit_result = state.rate_limiter.admit(&api_key, prompt_tokens);
    if let Some(pattern) = state.rate_limiter.observe_abuse(&api_key, ENDPOINT, admit_result.is_err()) {
        publish_pattern_detected(&state, &api_key, pattern);
    }
    let admit = admit_result.map_err(|err| publish_failure(&state, ENDPOINT, "rate-limit", err, Some(&api_key)))?;

    let record = RequestRecord::new(ENDPOINT, &req.model, &api_key, req.stream);
    state.bus.publish(Event::new(
        EventKind::RequestStarted,
        record.id.clone(),
        None,
        EventPayload::Request { endpoint: ENDPOINT.to_string(), model: req.model.clone(), api_key: api_key.clone(), streaming: req.stream },
    ));

    let workers = state.worker_loads();
    let route = state.kv_cache.route(&input_token_ids, &workers);
    state.bump_worker_queue(route.worker_id, 1);

    let seed = seed_from_request_id(&record.id);
    let completion_tokens_vec = generate_tokens(seed, max_tokens);
    let cached_tokens = route.matched_tokens.min(prompt_tokens);
    let shaper = LatencyShaper::new(state.latency);

    let mut response = if req.stream {
        sse_completion(state.clone(), record.clone(), req.model.clone(), completion_tokens_vec, route.matched_tokens, prompt_tokens, cached_tokens, shaper, route.worker_id)
    } else {
        let ttft_ms = shaper.sample_ttft(route.matched_tokens, prompt_tokens);
        tokio::time::sleep(Duration::from_secs_f64((ttft_ms / 1000.0).max(0.0))).await;
        for _ in 1..completion_tokens_vec.len() {
            tokio::time::sleep(Duration::from_secs_f64((shaper.sample_itl() / 1000.0).max(0.0))).await;
        }

        let finish_reason = if completion_tokens_vec.is_empty() { "length" } else { "stop" };
        let completion_tokens = completion_tokens_vec.len() as u32;
        let body = CompletionResponse {
            id: format!("cmpl-{}", record.id),
            object: "text_completion",
            created: record.created_at_unix,
            model: req.model.clone(),
            choices: vec![CompletionChoice { index: 0, text: completion_tokens_vec.join(" "), finish_reason: Some(finish_reason) }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                prompt_tokens_details: PromptTokensDetails { cached_tokens },
            },
        };

        let duration_ms = (chrono::Utc::now().timestamp_millis() - record.start_time_ms).max(0) as u64;
        state.bus.publish(Event::new(
            EventKind::RequestCompleted,
            record.id.clone(),
            None,
            EventPayload::RequestTerminal {
                endpoint: ENDPOINT.to_string(),
                model: req.model.clone(),
                duration_ms,
                input_tokens: prompt_tokens,
                output_tokens: completion_tokens,
                cached_tokens,
                error_kind: None,
            },
        ));
        state.cost_tracker.record_usage(&api_key, &req.model, prompt_tokens, completion_tokens, cached_tokens);
        state.bump_worker_queue(route.worker_id, -1);

        Json(body).into_response()
    };

    apply_rate_limit_headers(&mut response, admit);
    Ok(response)
}

/// Builds a minimal SSE stream of `text_completion` chunks. Unlike chat
/// completions this has no tool-call/reasoning branch and no client-visible
/// cancellation accounting beyond releasing the worker slot, so a plain
/// `stream::unfold` without a drop guard is enough here.
#[allow(clippy::too_many_arguments)]
fn sse_completion(
    state: IngressState,
    record: RequestRecord,
    model: String,
    tokens: Vec<String>,
    matched_tokens: u32,
    prompt_tokens: u32,
    cached_tokens: u32,
    shaper: LatencyShaper,
    worker_id: u32,
) -> Response {
    struct StreamState {
        state: IngressState,
        record: RequestRecord,
        model: String,
        tokens: Vec<String>,
        matched_tokens: u32,
        prompt_tokens: u32,
        cached_tokens: u32,
        shaper: LatencyShaper,
        worker_id: u32,
        index: u32,
        done: bool,
    }

    let keepalive_ms_snapshot = state.stream_keepalive_ms;
    let initial = StreamState {
        state,
        record,
        model,
        tokens,
        matched_tokens,
        prompt_tokens,
        cached_tokens,
        shaper,
        worker_id,
        index: 0,
        done: false,
    };

    let chunk_stream = stream::unfold(initial, |mut s| async move {
        if s.done {
            return None;
        }
        if s.index as usize >= s.tokens.len() || s.state.is_draining() {
            let finish_reason = if s.tokens.is_empty() || (s.index as usize) < s.tokens.len() { "length" } else { "stop" };
            let chunk = CompletionResponse {
                id: format!("cmpl-{}", s.record.id),
                object: "text_completion",
                created: s.record.created_at_unix,
                model: s.model.clone(),
                choices: vec![CompletionChoice { index: 0, text: String::new(), finish_reason: Some(finish_reason) }],
                usage: Usage {
                    prompt_tokens: s.prompt_tokens,
                    completion_tokens: s.index,
                    total_tokens: s.prompt_tokens + s.index,
                    prompt_tokens_details: PromptTokensDetails { cached_tokens: s.cached_tokens },
                },
            };
            s.state.bus.publish(Event::new(
                EventKind::RequestCompleted,
                s.record.id.clone(),
                None,
                EventPayload::RequestTerminal {
                    endpoint: ENDPOINT.to_string(),
                    model: s.model.clone(),
                    duration_ms: (chrono::Utc::now().timestamp_millis() - s.record.start_time_ms).max(0) as u64,
                    input_tokens: s.prompt_tokens,
                    output_tokens: s.index,
                    cached_tokens: s.cached_tokens,
                    error_kind: None,
                },
            ));
            s.state.bump_worker_queue(s.worker_id, -1);
            s.done = true;
            let json = serde_json::to_string(&chunk).unwrap_or_default();
            return Some((SseEvent::default().data(json), s));
        }

        let delay_ms = if s.index == 0 { s.shaper.sample_ttft(s.matched_tokens, s.prompt_tokens) } else { s.shaper.sample_itl() };
        tokio::time::sleep(Duration::from_secs_f64((delay_ms / 1000.0).max(0.0))).await;

        let text = s.tokens[s.index as usize].clone();
        let chunk = CompletionResponse {
            id: format!("cmpl-{}", s.record.id),
            object: "text_completion",
            created: s.record.created_at_unix,
            model: s.model.clone(),
            choices: vec![CompletionChoice { index: 0, text, finish_reason: None }],
            usage: Usage { prompt_tokens: s.prompt_tokens, completion_tokens: s.index + 1, total_tokens: s.prompt_tokens + s.index + 1, prompt_tokens_details: PromptTokensDetails { cached_tokens: s.cached_tokens } },
        };
        s.index += 1;
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        Some((SseEvent::default().data(json), s))
    });

    let done_stream = chunk_stream.map(Ok::<_, std::convert::Infallible>).chain(stream::once(async { Ok(SseEvent::default().data("[DONE]")) }));
    Sse::new(done_stream).keep_alive(KeepAlive::default().interval(Duration::from_millis(keepalive_ms_snapshot.max(1)))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_constant_matches_wire_path() {
        assert_eq!(ENDPOINT, "/v1/completions");
    }
}
