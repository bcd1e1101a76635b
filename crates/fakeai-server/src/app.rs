//! Aggregator & Endpoints: `/health` plus the metrics surface
//! (`/metrics`, `/metrics/prometheus`, `/dynamo/metrics/json`,
//! `/kv-cache/metrics`, `/dcgm/metrics`, `/metrics/stream`), as named in
//! the component table. Grounded on `lunaroute-observability::health_router`
//! for the health/readiness shape and `lunaroute-server::app` for how the
//! teacher bundles shared state behind a single struct.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fakeai_ingress::IngressState;
use fakeai_observability::Metrics;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct AppState {
    pub ingress: IngressState,
    pub metrics: Arc<Metrics>,
    /// Flipped by the shutdown handler; consulted by the streaming engine
    /// and by `/health` readiness so load balancers stop sending new
    /// traffic while in-flight streams finish their current chunk.
    pub draining: Arc<AtomicBool>,
    pub metrics_stream_interval_ms: u64,
}

impl AppState {
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }
}

pub fn aggregator_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_json))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .route("/dynamo/metrics/json", get(dynamo_metrics_json))
        .route("/kv-cache/metrics", get(kv_cache_metrics))
        .route("/dcgm/metrics", get(dcgm_metrics))
        .route("/metrics/stream", get(metrics_stream))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "ready": !state.is_draining(),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

fn tracker_dump(state: &AppState) -> Value {
    let ingress = &state.ingress;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let requests: Vec<Value> = ingress
        .request_tracker
        .all_endpoints()
        .into_iter()
        .filter_map(|endpoint| {
            let stats = ingress.request_tracker.stats(&endpoint, now_ms)?;
            Some(json!({
                "endpoint": stats.endpoint,
                "rps": stats.rps,
                "response_rate": stats.response_rate,
                "error_rate": stats.error_rate,
                "p50_ms": stats.p50_ms,
                "p90_ms": stats.p90_ms,
                "p99_ms": stats.p99_ms,
            }))
        })
        .collect();

    let models: Vec<Value> = ingress
        .model_tracker
        .all_models()
        .into_iter()
        .filter_map(|model| {
            let stats = ingress.model_tracker.stats(&model)?;
            Some(json!({
                "model": model,
                "request_count": stats.request_count,
                "mean_latency_ms": stats.mean_latency_ms,
                "prompt_tokens": stats.prompt_tokens,
                "completion_tokens": stats.completion_tokens,
            }))
        })
        .collect();

    let errors: Vec<Value> = ingress
        .error_tracker
        .breakdown()
        .into_iter()
        .map(|(endpoint, kind, count)| json!({"endpoint": endpoint, "kind": kind, "count": count}))
        .collect();

    let streaming = ingress.streaming_tracker.stats();

    json!({
        "requests": requests,
        "models": models,
        "errors": errors,
        "streaming": {
            "completed_streams": streaming.completed_streams,
            "avg_ttft_ms": streaming.avg_ttft_ms,
            "avg_tokens_per_second": streaming.avg_tokens_per_second,
        },
        "events_dropped": ingress.bus.dropped_count(),
    })
}

async fn metrics_json(State(state): State<AppState>) -> Json<Value> {
    Json(tracker_dump(&state))
}

async fn metrics_prometheus(State(state): State<AppState>) -> Response {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = state.metrics.registry().gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(%err, "failed to encode prometheus metrics");
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type())], buffer).into_response()
}

async fn dynamo_metrics_json(State(state): State<AppState>) -> Json<Value> {
    let stats = state.ingress.dynamo_tracker.stats();
    let worker_routes = state.ingress.kv_cache_metrics.per_worker_route_counts();
    Json(json!({
        "sample_count": stats.sample_count,
        "latency_breakdown_ms": {
            "queue": stats.avg_queue_ms,
            "prefill": stats.avg_prefill_ms,
            "decode": stats.avg_decode_ms,
            "total": stats.avg_total_ms,
        },
        "avg_queue_depth": stats.avg_queue_depth,
        "avg_batch_size": stats.avg_batch_size,
        "worker_routing_counts": worker_routes.into_iter().map(|(id, count)| json!({"worker_id": id, "routed_requests": count})).collect::<Vec<_>>(),
    }))
}

async fn kv_cache_metrics(State(state): State<AppState>) -> Json<Value> {
    let stats = state.ingress.kv_cache_metrics.stats("/v1/chat/completions").unwrap_or_default();
    let per_worker = state.ingress.kv_cache_metrics.per_worker_route_counts();
    Json(json!({
        "cache_hit_rate": stats.cache_hit_rate,
        "total_cache_hits": stats.total_cache_hits,
        "avg_matched_tokens": stats.avg_matched_tokens,
        "ttft_speedup_ms": stats.ttft_speedup_ms,
        "per_worker_routing": per_worker.into_iter().map(|(id, count)| json!({"worker_id": id, "routed_requests": count})).collect::<Vec<_>>(),
    }))
}

/// Deterministic, fabricated GPU telemetry in Prometheus text exposition
/// format — there is no real GPU behind FakeAI, so values are derived from
/// each worker's current queue depth rather than sampled hardware.
async fn dcgm_metrics(State(state): State<AppState>) -> Response {
    let workers = state.ingress.worker_loads();
    let mut body = String::new();
    body.push_str("# HELP fakeai_dcgm_gpu_utilization Simulated GPU utilization percent\n");
    body.push_str("# TYPE fakeai_dcgm_gpu_utilization gauge\n");
    for w in &workers {
        let utilization = (w.queue_depth as f64 * 12.5).min(100.0);
        body.push_str(&format!("fakeai_dcgm_gpu_utilization{{worker_id=\"{}\"}} {}\n", w.worker_id, utilization));
    }
    body.push_str("# HELP fakeai_dcgm_gpu_temperature_celsius Simulated GPU temperature\n");
    body.push_str("# TYPE fakeai_dcgm_gpu_temperature_celsius gauge\n");
    for w in &workers {
        let temperature = 40.0 + (w.queue_depth as f64 * 2.0).min(45.0);
        body.push_str(&format!("fakeai_dcgm_gpu_temperature_celsius{{worker_id=\"{}\"}} {}\n", w.worker_id, temperature));
    }
    body.push_str("# HELP fakeai_dcgm_power_watts Simulated GPU power draw\n");
    body.push_str("# TYPE fakeai_dcgm_power_watts gauge\n");
    for w in &workers {
        let watts = 80.0 + (w.queue_depth as f64 * 15.0).min(220.0);
        body.push_str(&format!("fakeai_dcgm_power_watts{{worker_id=\"{}\"}} {}\n", w.worker_id, watts));
    }
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}

async fn metrics_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| metrics_stream_loop(socket, state))
}

async fn metrics_stream_loop(mut socket: WebSocket, state: AppState) {
    let mut subscribed: Option<HashSet<String>> = None;
    let mut tick = tokio::time::interval(Duration::from_millis(state.metrics_stream_interval_ms.max(50)));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let dump = tracker_dump(&state);
                let filtered = match &subscribed {
                    Some(keys) => Value::Object(dump.as_object().cloned().unwrap_or_default().into_iter().filter(|(k, _)| keys.contains(k)).collect()),
                    None => dump,
                };
                if socket.send(Message::Text(filtered.to_string().into())).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(command) = serde_json::from_str::<Value>(&text)
                            && command.get("action").and_then(Value::as_str) == Some("subscribe")
                            && let Some(metrics) = command.get("metrics").and_then(Value::as_array)
                        {
                            subscribed = Some(metrics.iter().filter_map(Value::as_str).map(str::to_string).collect());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}
