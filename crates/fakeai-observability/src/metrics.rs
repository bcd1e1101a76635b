//! Prometheus metrics export.
//!
//! Mirrors the trackers' data through the `prometheus` crate so existing
//! Prometheus/Grafana tooling built against a real inference stack works
//! unmodified against FakeAI.

use std::sync::Arc;

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    pub requests_total: CounterVec,
    pub requests_errors_total: CounterVec,
    pub request_duration_seconds: HistogramVec,

    pub tokens_prompt_total: CounterVec,
    pub tokens_completion_total: CounterVec,
    pub tokens_cached_total: CounterVec,

    pub stream_ttft_seconds: HistogramVec,
    pub stream_tokens_per_second: GaugeVec,

    pub cache_hit_rate: GaugeVec,
    pub cache_hits_total: CounterVec,

    pub cost_usd_total: CounterVec,

    pub rate_limit_rejections_total: CounterVec,

    pub worker_queue_depth: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("fakeai_requests_total", "Total number of requests received"),
            &["endpoint", "model"],
        )?;

        let requests_errors_total = CounterVec::new(
            Opts::new("fakeai_requests_errors_total", "Total number of failed requests"),
            &["endpoint", "error_kind"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("fakeai_request_duration_seconds", "Request duration in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint", "model"],
        )?;

        let tokens_prompt_total = CounterVec::new(
            Opts::new("fakeai_tokens_prompt_total", "Total prompt tokens processed"),
            &["model"],
        )?;
        let tokens_completion_total = CounterVec::new(
            Opts::new("fakeai_tokens_completion_total", "Total completion tokens generated"),
            &["model"],
        )?;
        let tokens_cached_total = CounterVec::new(
            Opts::new("fakeai_tokens_cached_total", "Total tokens served from KV cache"),
            &["model"],
        )?;

        let stream_ttft_seconds = HistogramVec::new(
            HistogramOpts::new("fakeai_stream_ttft_seconds", "Time to first token in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["model"],
        )?;

        let stream_tokens_per_second = GaugeVec::new(
            Opts::new("fakeai_stream_tokens_per_second", "Most recent decode throughput per model"),
            &["model"],
        )?;

        let cache_hit_rate = GaugeVec::new(
            Opts::new("fakeai_cache_hit_rate", "KV-cache hit rate per endpoint"),
            &["endpoint"],
        )?;
        let cache_hits_total = CounterVec::new(
            Opts::new("fakeai_cache_hits_total", "Total KV-cache lookups that matched at least one block"),
            &["endpoint"],
        )?;

        let cost_usd_total = CounterVec::new(
            Opts::new("fakeai_cost_usd_total", "Total accrued synthetic cost in USD"),
            &["api_key", "model"],
        )?;

        let rate_limit_rejections_total = CounterVec::new(
            Opts::new("fakeai_rate_limit_rejections_total", "Total rate-limit rejections"),
            &["api_key", "axis"],
        )?;

        let worker_queue_depth = GaugeVec::new(
            Opts::new("fakeai_worker_queue_depth", "Current queue depth per worker"),
            &["worker_id"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_errors_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(tokens_prompt_total.clone()))?;
        registry.register(Box::new(tokens_completion_total.clone()))?;
        registry.register(Box::new(tokens_cached_total.clone()))?;
        registry.register(Box::new(stream_ttft_seconds.clone()))?;
        registry.register(Box::new(stream_tokens_per_second.clone()))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;
        registry.register(Box::new(rate_limit_rejections_total.clone()))?;
        registry.register(Box::new(worker_queue_depth.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            requests_errors_total,
            request_duration_seconds,
            tokens_prompt_total,
            tokens_completion_total,
            tokens_cached_total,
            stream_ttft_seconds,
            stream_tokens_per_second,
            cache_hit_rate,
            cache_hits_total,
            cost_usd_total,
            rate_limit_rejections_total,
            worker_queue_depth,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_request(&self, endpoint: &str, model: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[endpoint, model]).inc();
        self.request_duration_seconds.with_label_values(&[endpoint, model]).observe(duration_secs);
    }

    pub fn record_error(&self, endpoint: &str, error_kind: &str) {
        self.requests_errors_total.with_label_values(&[endpoint, error_kind]).inc();
    }

    pub fn record_tokens(&self, model: &str, prompt_tokens: u32, completion_tokens: u32, cached_tokens: u32) {
        self.tokens_prompt_total.with_label_values(&[model]).inc_by(prompt_tokens as f64);
        self.tokens_completion_total.with_label_values(&[model]).inc_by(completion_tokens as f64);
        self.tokens_cached_total.with_label_values(&[model]).inc_by(cached_tokens as f64);
    }

    pub fn record_ttft(&self, model: &str, ttft_secs: f64) {
        self.stream_ttft_seconds.with_label_values(&[model]).observe(ttft_secs);
    }

    pub fn set_tokens_per_second(&self, model: &str, tps: f64) {
        self.stream_tokens_per_second.with_label_values(&[model]).set(tps);
    }

    pub fn record_cache_lookup(&self, endpoint: &str, hit: bool, hit_rate: f64) {
        if hit {
            self.cache_hits_total.with_label_values(&[endpoint]).inc();
        }
        self.cache_hit_rate.with_label_values(&[endpoint]).set(hit_rate);
    }

    pub fn record_cost(&self, api_key: &str, model: &str, cost_usd: f64) {
        self.cost_usd_total.with_label_values(&[api_key, model]).inc_by(cost_usd);
    }

    pub fn record_rate_limit_rejection(&self, api_key: &str, axis: &str) {
        self.rate_limit_rejections_total.with_label_values(&[api_key, axis]).inc();
    }

    pub fn set_worker_queue_depth(&self, worker_id: u32, depth: u32) {
        self.worker_queue_depth.with_label_values(&[&worker_id.to_string()]).set(depth as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct prometheus registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_request_counters_and_histogram() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/v1/chat/completions", "gpt-4", 0.25);

        let gathered = metrics.registry().gather();
        let total = gathered.iter().find(|m| m.get_name() == "fakeai_requests_total").unwrap();
        assert_eq!(total.get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn records_cache_hit_rate_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup("/v1/chat/completions", true, 0.75);

        let gathered = metrics.registry().gather();
        let gauge = gathered.iter().find(|m| m.get_name() == "fakeai_cache_hit_rate").unwrap();
        assert_eq!(gauge.get_metric()[0].get_gauge().get_value(), 0.75);
    }
}
