//! Per-endpoint cache hit rate, average matched tokens, and TTFT speedup
//! attributable to cache hits.

use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct EndpointCacheStats {
    lookups: u64,
    hits: u64,
    total_matched_tokens: u64,
    total_input_tokens: u64,
    ttft_without_cache_ms_sum: f64,
    ttft_with_cache_ms_sum: f64,
    ttft_sample_count: u64,
}

#[derive(Default)]
pub struct KVCacheMetrics {
    endpoints: DashMap<String, EndpointCacheStats>,
    per_worker_routes: DashMap<u32, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct KVCacheStats {
    pub cache_hit_rate: f64,
    pub total_cache_hits: u64,
    pub avg_matched_tokens: f64,
    pub ttft_speedup_ms: f64,
}

impl KVCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self, endpoint: &str, matched_tokens: u32, total_input_tokens: u32, worker_id: u32) {
        let mut stats = self.endpoints.entry(endpoint.to_string()).or_default();
        stats.lookups += 1;
        if matched_tokens > 0 {
            stats.hits += 1;
        }
        stats.total_matched_tokens += matched_tokens as u64;
        stats.total_input_tokens += total_input_tokens as u64;
        *self.per_worker_routes.entry(worker_id).or_insert(0) += 1;
    }

    pub fn record_ttft_sample(&self, endpoint: &str, ttft_ms: f64, was_cache_hit: bool) {
        let mut stats = self.endpoints.entry(endpoint.to_string()).or_default();
        stats.ttft_sample_count += 1;
        if was_cache_hit {
            stats.ttft_with_cache_ms_sum += ttft_ms;
        } else {
            stats.ttft_without_cache_ms_sum += ttft_ms;
        }
    }

    pub fn stats(&self, endpoint: &str) -> Option<KVCacheStats> {
        let stats = self.endpoints.get(endpoint)?;
        if stats.lookups == 0 {
            return Some(KVCacheStats::default());
        }
        let avg_matched_tokens =
            stats.total_matched_tokens as f64 / stats.lookups as f64;
        let cache_hit_rate = stats.hits as f64 / stats.lookups as f64;
        let ttft_speedup_ms =
            (stats.ttft_without_cache_ms_sum - stats.ttft_with_cache_ms_sum).max(0.0);

        Some(KVCacheStats { cache_hit_rate, total_cache_hits: stats.hits, avg_matched_tokens, ttft_speedup_ms })
    }

    pub fn per_worker_route_counts(&self) -> Vec<(u32, u64)> {
        self.per_worker_routes.iter().map(|entry| (*entry.key(), *entry.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_reflects_lookups_with_matches() {
        let metrics = KVCacheMetrics::new();
        metrics.record_lookup("/v1/chat/completions", 0, 100, 0);
        metrics.record_lookup("/v1/chat/completions", 64, 100, 1);

        let stats = metrics.stats("/v1/chat/completions").unwrap();
        assert_eq!(stats.total_cache_hits, 1);
        assert_eq!(stats.cache_hit_rate, 0.5);
    }

    #[test]
    fn per_worker_routing_counts_are_tracked() {
        let metrics = KVCacheMetrics::new();
        metrics.record_lookup("/v1/chat/completions", 0, 100, 2);
        metrics.record_lookup("/v1/chat/completions", 0, 100, 2);
        let counts = metrics.per_worker_route_counts();
        assert!(counts.contains(&(2, 2)));
    }
}
