//! Integration tests driving the assembled axum `Router` in-process,
//! exercising the full auth -> rate-limit -> context-validation -> KV-cache
//! -> generation pipeline per request.

use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fakeai_core::model::ModelRegistry;
use fakeai_core::types::{RateLimitTier, Worker};
use fakeai_generation::LatencyConfig;
use fakeai_ingress::{build_router, IngressState};
use fakeai_observability::bus::EventBus;
use fakeai_observability::trackers::{CostTracker, DynamoTracker, ErrorTracker, KVCacheMetrics, ModelTracker, RequestTracker, StreamingTracker};
use fakeai_routing::{AuthConfig, KVCacheRouter, RateLimiter};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_state() -> IngressState {
    let bus = EventBus::new(1024);
    IngressState {
        models: Arc::new(ModelRegistry::new()),
        auth: Arc::new(AuthConfig::new(Vec::<String>::new(), false)),
        rate_limiter: Arc::new(RateLimiter::new(RateLimitTier::Tier5, true)),
        kv_cache: Arc::new(KVCacheRouter::new(16, 0.8)),
        latency: LatencyConfig { ttft_ms: 1.0, ttft_variance_pct: 0.0, itl_ms: 1.0, itl_variance_pct: 0.0 },
        bus: bus.handle(),
        workers: Arc::new(RwLock::new((0..4).map(Worker::new).collect())),
        request_tracker: Arc::new(RequestTracker::new()),
        streaming_tracker: Arc::new(StreamingTracker::new()),
        dynamo_tracker: Arc::new(DynamoTracker::new()),
        cost_tracker: Arc::new(CostTracker::new()),
        model_tracker: Arc::new(ModelTracker::new()),
        error_tracker: Arc::new(ErrorTracker::new()),
        kv_cache_metrics: Arc::new(KVCacheMetrics::new()),
        stream_keepalive_ms: 15_000,
        stream_timeout_ms: 300_000,
        stream_token_timeout_ms: 30_000,
        draining: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn non_streaming_chat_completion_returns_requested_token_count() {
    let router = build_router(test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "openai/gpt-oss-120b", "messages": [{"role": "user", "content": "Hello"}], "max_tokens": 10})
                .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["usage"]["completion_tokens"], 10);
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn streaming_chat_completion_is_server_sent_events() {
    let router = build_router(test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "openai/gpt-oss-120b", "messages": [{"role": "user", "content": "Hello"}], "stream": true, "max_tokens": 3})
                .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("[DONE]"));
    assert!(text.contains("\"finish_reason\":\"stop\""));
}

#[tokio::test]
async fn streaming_reasoning_model_emits_role_then_reasoning_then_content() {
    let router = build_router(test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "openai/gpt-oss-120b", "messages": [{"role": "user", "content": "Hello"}], "stream": true, "max_tokens": 3})
                .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let role_pos = text.find("\"role\":\"assistant\"").expect("opening role chunk missing");
    let reasoning_pos = text.find("\"reasoning_content\":").expect("reasoning_content delta missing");
    let content_pos = text.find("\"content\":\"").expect("content delta missing");
    assert!(role_pos < reasoning_pos, "role chunk must precede reasoning deltas");
    assert!(reasoning_pos < content_pos, "reasoning deltas must precede content deltas");
}

#[tokio::test]
async fn sustained_rate_limit_violations_emit_pattern_detected() {
    let error_tracker = Arc::new(ErrorTracker::new());
    let mut bus = EventBus::new(1024);
    bus.subscribe(Arc::new(fakeai_observability::subscribers::ErrorTrackerSubscriber(error_tracker.clone())));
    let bus_handle = bus.handle();
    let dispatcher = tokio::spawn(bus.run());

    let state = IngressState {
        rate_limiter: Arc::new(RateLimiter::new(RateLimitTier::Free, true)),
        error_tracker: error_tracker.clone(),
        bus: bus_handle.clone(),
        ..test_state()
    };
    let router = build_router(state);

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .header("authorization", "Bearer sk-abuser")
            .body(Body::from(json!({"model": "gpt-4", "messages": [{"role": "user", "content": "Hi"}], "max_tokens": 1}).to_string()))
            .unwrap()
    };

    // Free tier allows 3 rpm; exhaust it, then keep hammering past the
    // sustained-violation threshold so the detector trips.
    for _ in 0..8 {
        let _ = router.clone().oneshot(make_request()).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    drop(bus_handle);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), dispatcher).await;

    assert!(error_tracker.pattern_count("sustained_violation") >= 1);
}

#[tokio::test]
async fn context_overflow_returns_400_with_code() {
    let router = build_router(test_state());
    let long_prompt: String = std::iter::repeat_n("word ", 9_000).collect();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "gpt-4", "messages": [{"role": "user", "content": long_prompt}], "max_tokens": 200000})
                .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "context_length_exceeded");
    assert!(body["error"]["message"].as_str().unwrap().contains("8192"));
}

#[tokio::test]
async fn auth_failure_returns_401() {
    let state = IngressState { auth: Arc::new(AuthConfig::new(vec!["sk-good".to_string()], true)), ..test_state() };
    let router = build_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", "Bearer sk-bad")
        .body(Body::from(json!({"model": "gpt-4", "messages": [{"role": "user", "content": "Hi"}]}).to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn embeddings_are_deterministic_for_identical_input() {
    let router = build_router(test_state());
    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/v1/embeddings")
            .header("content-type", "application/json")
            .body(Body::from(json!({"model": "text-embedding-3-small", "input": "hello world"}).to_string()))
            .unwrap()
    };

    let first = body_json(router.clone().oneshot(make_request()).await.unwrap()).await;
    let second = body_json(router.oneshot(make_request()).await.unwrap()).await;
    assert_eq!(first["data"][0]["embedding"], second["data"][0]["embedding"]);
}

#[tokio::test]
async fn models_endpoint_lists_registered_descriptors() {
    let router = build_router(test_state());
    let request = Request::builder().method("GET").uri("/v1/models").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"].as_array().unwrap().iter().any(|m| m["id"] == "gpt-4"));
}

#[tokio::test]
async fn moderations_endpoint_never_flags_content() {
    let router = build_router(test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/moderations")
        .header("content-type", "application/json")
        .body(Body::from(json!({"input": "anything"}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["results"][0]["flagged"], false);
}
