//! FakeAI CLI
//!
//! Queries a running `fakeai-server` instance and prints human-readable
//! summaries of its metrics surface.

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "fakeai-cli")]
#[command(about = "Query a running FakeAI server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET /metrics and print a table of per-endpoint/model stats.
    Metrics {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
    /// GET /health and print readiness.
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
    /// GET /kv-cache/metrics and print hit rate and per-worker routing counts.
    CacheStats {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let result = match cli.command {
        Commands::Metrics { url } => run_metrics(&client, &url).await,
        Commands::Status { url } => run_status(&client, &url).await,
        Commands::CacheStats { url } => run_cache_stats(&client, &url).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> anyhow::Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

async fn run_status(client: &reqwest::Client, base: &str) -> anyhow::Result<()> {
    let body = fetch_json(client, &format!("{base}/health")).await?;
    let status = body.get("status").and_then(Value::as_str).unwrap_or("unknown");
    let ready = body.get("ready").and_then(Value::as_bool).unwrap_or(false);
    println!("status: {status}");
    println!("ready:  {ready}");
    Ok(())
}

async fn run_metrics(client: &reqwest::Client, base: &str) -> anyhow::Result<()> {
    let body = fetch_json(client, &format!("{base}/metrics")).await?;

    println!("{:<28} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10}", "endpoint", "rps", "resp/s", "err/s", "p50 ms", "p90 ms", "p99 ms");
    if let Some(requests) = body.get("requests").and_then(Value::as_array) {
        for row in requests {
            println!(
                "{:<28} {:>8.2} {:>8.2} {:>8.2} {:>10.1} {:>10.1} {:>10.1}",
                row.get("endpoint").and_then(Value::as_str).unwrap_or("?"),
                row.get("rps").and_then(Value::as_f64).unwrap_or(0.0),
                row.get("response_rate").and_then(Value::as_f64).unwrap_or(0.0),
                row.get("error_rate").and_then(Value::as_f64).unwrap_or(0.0),
                row.get("p50_ms").and_then(Value::as_f64).unwrap_or(0.0),
                row.get("p90_ms").and_then(Value::as_f64).unwrap_or(0.0),
                row.get("p99_ms").and_then(Value::as_f64).unwrap_or(0.0),
            );
        }
    }

    println!();
    println!("{:<28} {:>10} {:>12}", "model", "requests", "mean ms");
    if let Some(models) = body.get("models").and_then(Value::as_array) {
        for row in models {
            println!(
                "{:<28} {:>10} {:>12.1}",
                row.get("model").and_then(Value::as_str).unwrap_or("?"),
                row.get("request_count").and_then(Value::as_u64).unwrap_or(0),
                row.get("mean_latency_ms").and_then(Value::as_f64).unwrap_or(0.0),
            );
        }
    }

    if let Some(dropped) = body.get("events_dropped").and_then(Value::as_u64)
        && dropped > 0
    {
        println!("\nevent bus drops: {dropped}");
    }

    Ok(())
}

async fn run_cache_stats(client: &reqwest::Client, base: &str) -> anyhow::Result<()> {
    let body = fetch_json(client, &format!("{base}/kv-cache/metrics")).await?;

    println!("cache hit rate:     {:.2}%", body.get("cache_hit_rate").and_then(Value::as_f64).unwrap_or(0.0) * 100.0);
    println!("total cache hits:   {}", body.get("total_cache_hits").and_then(Value::as_u64).unwrap_or(0));
    println!("avg matched tokens: {:.1}", body.get("avg_matched_tokens").and_then(Value::as_f64).unwrap_or(0.0));
    println!("ttft speedup (ms):  {:.1}", body.get("ttft_speedup_ms").and_then(Value::as_f64).unwrap_or(0.0));

    println!("\n{:<10} {:>16}", "worker", "routed requests");
    if let Some(rows) = body.get("per_worker_routing").and_then(Value::as_array) {
        for row in rows {
            println!(
                "{:<10} {:>16}",
                row.get("worker_id").and_then(Value::as_u64).unwrap_or(0),
                row.get("routed_requests").and_then(Value::as_u64).unwrap_or(0),
            );
        }
    }

    Ok(())
}
