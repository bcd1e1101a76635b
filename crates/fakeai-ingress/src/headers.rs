//! Injects the `x-ratelimit-*` response headers OpenAI clients read for
//! their own backoff scheduling.

use axum::http::HeaderValue;
use axum::response::Response;
use fakeai_routing::AdmitOutcome;

pub fn apply(response: &mut Response, outcome: AdmitOutcome) {
    let headers = response.headers_mut();
    let set = |headers: &mut axum::http::HeaderMap, name: &'static str, value: u64| {
        if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, v);
        }
    };
    set(headers, "x-ratelimit-limit-requests", outcome.limit_requests);
    set(headers, "x-ratelimit-remaining-requests", outcome.remaining_requests);
    set(headers, "x-ratelimit-reset-requests", outcome.reset_requests_secs);
    set(headers, "x-ratelimit-limit-tokens", outcome.limit_tokens);
    set(headers, "x-ratelimit-remaining-tokens", outcome.remaining_tokens);
    set(headers, "x-ratelimit-reset-tokens", outcome.reset_tokens_secs);
}
