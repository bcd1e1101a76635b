//! Shared state handed to every route handler.
//!
//! Bundles the registries and engines built by the lower crates behind
//! `Arc` so cloning `IngressState` for each request is cheap. `fakeai-server`
//! constructs one of these at startup and passes it as axum `State`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fakeai_core::model::ModelRegistry;
use fakeai_core::types::Worker;
use fakeai_generation::LatencyConfig;
use fakeai_observability::bus::EventBusHandle;
use fakeai_observability::trackers::{CostTracker, DynamoTracker, ErrorTracker, KVCacheMetrics, ModelTracker, RequestTracker, StreamingTracker};
use fakeai_routing::{AuthConfig, KVCacheRouter, RateLimiter};
use std::sync::RwLock;

/// Everything a request handler needs to fabricate a response.
#[derive(Clone)]
pub struct IngressState {
    pub models: Arc<ModelRegistry>,
    pub auth: Arc<AuthConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub kv_cache: Arc<KVCacheRouter>,
    pub latency: LatencyConfig,
    pub bus: EventBusHandle,
    pub workers: Arc<RwLock<Vec<Worker>>>,

    pub request_tracker: Arc<RequestTracker>,
    pub streaming_tracker: Arc<StreamingTracker>,
    pub dynamo_tracker: Arc<DynamoTracker>,
    pub cost_tracker: Arc<CostTracker>,
    pub model_tracker: Arc<ModelTracker>,
    pub error_tracker: Arc<ErrorTracker>,
    pub kv_cache_metrics: Arc<KVCacheMetrics>,

    /// Keep-alive interval for SSE streams, in milliseconds.
    pub stream_keepalive_ms: u64,
    /// Wall-clock ceiling for an entire stream before it is force-cancelled.
    pub stream_timeout_ms: u64,
    /// Wall-clock ceiling between two consecutive tokens before the stream
    /// is cancelled with a `timeout` error kind.
    pub stream_token_timeout_ms: u64,

    /// Flipped by the server's shutdown handler. Consulted by the streaming
    /// engine so in-flight SSE streams wind down at the next token boundary
    /// instead of being killed mid-chunk when the listener stops accepting
    /// new connections.
    pub draining: Arc<AtomicBool>,
}

impl IngressState {
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Picks the least-loaded worker for routing/affinity purposes. FakeAI
    /// workers are pure accounting partitions, not real processes.
    pub fn worker_loads(&self) -> Vec<fakeai_routing::WorkerLoad> {
        let workers = self.workers.read().expect("workers lock poisoned");
        workers.iter().map(|w| fakeai_routing::WorkerLoad { worker_id: w.id, queue_depth: w.queue_depth }).collect()
    }

    pub fn bump_worker_queue(&self, worker_id: u32, delta: i32) {
        let mut workers = self.workers.write().expect("workers lock poisoned");
        if let Some(worker) = workers.iter_mut().find(|w| w.id == worker_id) {
            worker.queue_depth = worker.queue_depth.saturating_add_signed(delta);
        }
    }
}
