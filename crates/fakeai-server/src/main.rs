//! FakeAI server binary.
//!
//! Wires the lower crates (`fakeai-core`, `fakeai-observability`,
//! `fakeai-routing`, `fakeai-generation`, `fakeai-ingress`) into a running
//! HTTP server: OpenAI-compatible routes plus the aggregator/health surface,
//! config loaded from flags/file/env, and graceful shutdown.

mod app;
mod config;

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use clap::{Parser, Subcommand};
use config::ServerConfig;
use fakeai_core::model::ModelRegistry;
use fakeai_core::types::Worker;
use fakeai_generation::LatencyConfig;
use fakeai_ingress::IngressState;
use fakeai_observability::bus::EventBus;
use fakeai_observability::subscribers::{
    CostTrackerSubscriber, DynamoTrackerSubscriber, ErrorTrackerSubscriber, KVCacheSubscriber, ModelTrackerSubscriber, RequestTrackerSubscriber,
    StreamingTrackerSubscriber,
};
use fakeai_observability::trackers::{CostTracker, DynamoTracker, ErrorTracker, KVCacheMetrics, ModelTracker, RequestTracker, StreamingTracker};
use fakeai_observability::Metrics;
use fakeai_routing::{AuthConfig, KVCacheRouter, RateLimiter};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use app::AppState;

#[derive(Parser)]
#[command(name = "fakeai-server")]
#[command(about = "FakeAI: an OpenAI-wire-compatible fake inference server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, env = "FAKEAI_CONFIG", global = true)]
    config_file: Option<String>,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true)]
    ttft: Option<f64>,
    #[arg(long, global = true)]
    itl: Option<f64>,
    #[arg(long = "api-key", global = true)]
    api_keys: Vec<String>,
    #[arg(long, global = true)]
    enable_security: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (default if no subcommand is given).
    Server,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Server) | None => {}
    }

    let mut config = match &cli.config_file {
        Some(path) => match ServerConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config file {path}: {err}");
                std::process::exit(2);
            }
        },
        None => ServerConfig::default(),
    };
    config.merge_env();

    // CLI flags take precedence over config file and environment.
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ttft) = cli.ttft {
        config.ttft_ms = ttft;
    }
    if let Some(itl) = cli.itl {
        config.itl_ms = itl;
    }
    if !cli.api_keys.is_empty() {
        config.api_keys = cli.api_keys;
    }
    if cli.enable_security {
        config.require_api_key = true;
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{log_level}")));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting fakeai-server");

    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(err) => {
            eprintln!("failed to initialize prometheus registry: {err}");
            std::process::exit(2);
        }
    };

    let mut bus = EventBus::new(fakeai_observability::bus::DEFAULT_QUEUE_CAPACITY);
    let bus_handle = bus.handle();

    let request_tracker = Arc::new(RequestTracker::new());
    let streaming_tracker = Arc::new(StreamingTracker::new());
    let dynamo_tracker = Arc::new(DynamoTracker::new());
    let cost_tracker = Arc::new(CostTracker::new());
    let model_tracker = Arc::new(ModelTracker::new());
    let error_tracker = Arc::new(ErrorTracker::new());
    let kv_cache_metrics = Arc::new(KVCacheMetrics::new());

    bus.subscribe(Arc::new(RequestTrackerSubscriber(request_tracker.clone())));
    bus.subscribe(Arc::new(ErrorTrackerSubscriber(error_tracker.clone())));
    bus.subscribe(Arc::new(KVCacheSubscriber(kv_cache_metrics.clone())));
    bus.subscribe(Arc::new(DynamoTrackerSubscriber(dynamo_tracker.clone())));
    bus.subscribe(Arc::new(StreamingTrackerSubscriber(streaming_tracker.clone())));
    bus.subscribe(Arc::new(ModelTrackerSubscriber(model_tracker.clone())));
    bus.subscribe(Arc::new(CostTrackerSubscriber(cost_tracker.clone())));
    tokio::spawn(bus.run());

    let workers: Vec<Worker> = (0..config.kv_cache_num_workers).map(Worker::new).collect();
    info!(count = workers.len(), "initialized worker accounting partitions");

    let draining = Arc::new(AtomicBool::new(false));

    let ingress_state = IngressState {
        models: Arc::new(ModelRegistry::new()),
        auth: Arc::new(AuthConfig::new(config.api_keys.clone(), config.require_api_key)),
        rate_limiter: Arc::new(RateLimiter::new(config.parsed_rate_limit_tier(), config.rate_limit_enabled)),
        kv_cache: Arc::new(KVCacheRouter::new(config.kv_cache_block_size, config.kv_overlap_weight)),
        latency: LatencyConfig {
            ttft_ms: config.ttft_ms,
            ttft_variance_pct: config.ttft_variance_pct,
            itl_ms: config.itl_ms,
            itl_variance_pct: config.itl_variance_pct,
        },
        bus: bus_handle,
        workers: Arc::new(RwLock::new(workers)),
        request_tracker,
        streaming_tracker,
        dynamo_tracker,
        cost_tracker,
        model_tracker,
        error_tracker,
        kv_cache_metrics,
        stream_keepalive_ms: config.stream_keepalive_interval_seconds * 1000,
        stream_timeout_ms: config.stream_timeout_seconds * 1000,
        stream_token_timeout_ms: config.stream_token_timeout_seconds * 1000,
        draining: draining.clone(),
    };

    let app_state = AppState { ingress: ingress_state.clone(), metrics, draining: draining.clone(), metrics_stream_interval_ms: config.metrics_stream_interval_ms };

    let api_router = fakeai_ingress::build_router(ingress_state);
    let aggregator_router = app::aggregator_router(app_state);

    let app = api_router
        .merge(aggregator_router)
        .layer(axum::extract::DefaultBodyLimit::max(config.max_request_size))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fakeai-server listening");
    info!("  OpenAI-compatible API: http://{addr}/v1/chat/completions");
    info!("  Health check:          http://{addr}/health");
    info!("  Prometheus metrics:    http://{addr}/metrics/prometheus");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(draining)).await?;

    info!("fakeai-server stopped");
    Ok(())
}

/// Waits for SIGINT or SIGTERM, flips the draining flag first so the
/// streaming engine and `/health` readiness observe it before the listener
/// task actually exits.
async fn shutdown_signal(draining: Arc<AtomicBool>) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    draining.store(true, std::sync::atomic::Ordering::Relaxed);
    warn!("shutdown signal received, draining in-flight streams");
}
