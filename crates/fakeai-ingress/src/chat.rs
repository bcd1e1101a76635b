//! `/v1/chat/completions`: the chat completion core. Shares one preparation
//! path (auth, rate-limit admission, context validation, KV-cache routing,
//! deterministic token generation) between the streaming and non-streaming
//! response shapes, matching the spec's "identical state transitions,
//! different accumulation" framing.

use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fakeai_core::error::Error;
use fakeai_core::events::{Event, EventKind, EventPayload};
use fakeai_core::types::RequestRecord;
use fakeai_generation::{generate_tokens, reasoning_token_count, seed_from_request_id, validate_context_window, LatencyShaper};
use fakeai_routing::KVCacheRouter;

use crate::headers::apply as apply_rate_limit_headers;
use crate::schema_gen::synthesize;
use crate::state::IngressState;
use crate::streaming::{sse_response, StreamJob};
use crate::wire::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, FunctionCallOut, PromptTokensDetails, ResponseMessage, ToolCallOut, Usage,
};

const ENDPOINT: &str = "/v1/chat/completions";

pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

pub async fn chat_completions(State(state): State<IngressState>, headers: HeaderMap, Json(req): Json<ChatCompletionRequest>) -> Result<Response, Error> {
    let api_key = extract_api_key(&headers);
    state.auth.authenticate(api_key.as_deref()).map_err(|err| publish_failure(&state, ENDPOINT, "auth", err, api_key.as_deref()))?;
    let api_key = api_key.unwrap_or_default();

    let descriptor = state.models.get_or_register(&req.model);
    let prompt_text = req.prompt_text();
    let input_token_ids = KVCacheRouter::tokenize(&prompt_text);
    let prompt_tokens = input_token_ids.len() as u32;
    let max_tokens = req.requested_max_tokens();

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
    state.bus.publish(Event::new(
        EventKind::CacheLookup,
        record.id.clone(),
        None,
        EventPayload::Cache { matched_tokens: route.matched_tokens, total_input_tokens: prompt_tokens, worker_id: route.worker_id },
    ));
    state.bump_worker_queue(route.worker_id, 1);

    let seed = seed_from_request_id(&record.id);
    let completion_tokens_vec = generate_tokens(seed, max_tokens);
    let cached_tokens = route.matched_tokens.min(prompt_tokens);

    // Tool-call fabrication only applies to non-streaming responses: the
    // spec's SSE chunk format carries plain content deltas, not tool-call
    // deltas, so a streaming request with tools just gets generated text.
    let tool_call = if req.stream { None } else { select_tool_call(seed, req.tools.as_deref()) };
    let shaper = LatencyShaper::new(state.latency);

    let mut response = if req.stream {
        // Reasoning-capable models stream an `r = clamp(m*0.3, 20, 500)`-token
        // reasoning_content sequence as leading chunks, same token budget as
        // the non-streaming path below.
        let reasoning_tokens_vec = if descriptor.capabilities.reasoning {
            let reasoning_tokens = reasoning_token_count(completion_tokens_vec.len() as u32);
            generate_tokens(seed.wrapping_add(1), reasoning_tokens)
        } else {
            Vec::new()
        };

        let job = StreamJob {
            request_id: record.id.clone(),
            model: req.model.clone(),
            api_key: api_key.clone(),
            endpoint: ENDPOINT,
            reasoning_tokens: reasoning_tokens_vec,
            tokens: completion_tokens_vec,
            matched_tokens: route.matched_tokens,
            total_input_tokens: prompt_tokens,
            worker_id: route.worker_id,
            prompt_tokens,
            cached_tokens,
            shaper,
            bus: state.bus.clone(),
            streaming_tracker: state.streaming_tracker.clone(),
            cost_tracker: state.cost_tracker.clone(),
            workers: state.workers.clone(),
            keepalive_ms: state.stream_keepalive_ms,
            timeout_ms: state.stream_timeout_ms,
            draining: state.draining.clone(),
        };
        sse_response(job)
    } else {
        let ttft_ms = shaper.sample_ttft(route.matched_tokens, prompt_tokens);
        tokio::time::sleep(Duration::from_secs_f64((ttft_ms / 1000.0).max(0.0))).await;
        for _ in 1..completion_tokens_vec.len() {
            tokio::time::sleep(Duration::from_secs_f64((shaper.sample_itl() / 1000.0).max(0.0))).await;
        }

        let (message, finish_reason) = if let Some((tool_name, arguments)) = tool_call {
            (
                ResponseMessage {
                    role: "assistant",
                    content: None,
                    reasoning_content: None,
                    tool_calls: Some(vec![ToolCallOut {
                        id: format!("call_{}", &record.id),
                        kind: "function",
                        function: FunctionCallOut { name: tool_name, arguments },
                    }]),
                },
                "tool_calls",
            )
        } else {
            let content = completion_tokens_vec.join(" ");
            let reasoning_content = if descriptor.capabilities.reasoning {
                let reasoning_tokens = reasoning_token_count(completion_tokens_vec.len() as u32);
                Some(generate_tokens(seed.wrapping_add(1), reasoning_tokens).join(" "))
            } else {
                None
            };
            let finish = if completion_tokens_vec.is_empty() { "length" } else { "stop" };
            (ResponseMessage { role: "assistant", content: Some(content), reasoning_content, tool_calls: None }, finish)
        };

        let completion_tokens = completion_tokens_vec.len() as u32;
        let body = ChatCompletionResponse {
            id: format!("chatcmpl-{}", record.id),
            object: "chat.completion",
            created: record.created_at_unix,
            model: req.model.clone(),
            choices: vec![Choice { index: 0, message, finish_reason }],
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

/// Picks a tool deterministically from `seed`: roughly one in three requests
/// with tools supplied triggers a tool call, mirroring real models that
/// sometimes answer directly instead.
fn select_tool_call(seed: u64, tools: Option<&[crate::wire::Tool]>) -> Option<(String, String)> {
    let tools = tools?;
    if tools.is_empty() || seed % 3 != 0 {
        return None;
    }
    let tool = &tools[(seed as usize / 3) % tools.len()];
    let schema = tool.function.parameters.clone().unwrap_or_else(|| serde_json::json!({"type": "object"}));
    let arguments = serde_json::to_string(&synthesize(&schema)).unwrap_or_else(|_| "{}".to_string());
    Some((tool.function.name.clone(), arguments))
}

pub(crate) fn publish_failure(state: &IngressState, endpoint: &str, kind: &str, err: Error, api_key: Option<&str>) -> Error {
    state.bus.publish(Event::new(
        match kind {
            "auth" => EventKind::AuthFailed,
            "rate-limit" => EventKind::RateLimitRejected,
            _ => EventKind::ValidationFailed,
        },
        api_key.unwrap_or("unknown").to_string(),
        None,
        EventPayload::Error { endpoint: endpoint.to_string(), kind: kind.to_string(), message: err.to_string() },
    ));
    state.error_tracker.record_error(endpoint, kind);
    err
}

/// Publishes `error.pattern_detected` for an abuse heuristic tripped by
/// [`fakeai_routing::RateLimiter::observe_abuse`].
pub(crate) fn publish_pattern_detected(state: &IngressState, api_key: &str, pattern: &str) {
    state.bus.publish(Event::new(
        EventKind::PatternDetected,
        api_key.to_string(),
        None,
        EventPayload::Pattern { api_key: api_key.to_string(), pattern: pattern.to_string() },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Tool, ToolFunction};

    #[test]
    fn tool_call_selection_is_deterministic_for_a_seed() {
        let tools = vec![Tool { kind: "function".to_string(), function: ToolFunction { name: "lookup".to_string(), description: None, parameters: None } }];
        let first = select_tool_call(3, Some(&tools));
        let second = select_tool_call(3, Some(&tools));
        assert_eq!(first, second);
    }

    #[test]
    fn no_tools_never_triggers_a_call() {
        assert_eq!(select_tool_call(3, None), None);
    }
}
