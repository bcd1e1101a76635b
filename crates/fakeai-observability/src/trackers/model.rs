//! Per-model request count, mean latency, and token totals.

use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct ModelAccumulator {
    request_count: u64,
    total_latency_ms: f64,
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Default)]
pub struct ModelTracker {
    models: DashMap<String, ModelAccumulator>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelStats {
    pub request_count: u64,
    pub mean_latency_ms: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ModelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, latency_ms: f64, prompt_tokens: u32, completion_tokens: u32) {
        let mut accumulator = self.models.entry(model.to_string()).or_default();
        accumulator.request_count += 1;
        accumulator.total_latency_ms += latency_ms;
        accumulator.prompt_tokens += prompt_tokens as u64;
        accumulator.completion_tokens += completion_tokens as u64;
    }

    pub fn stats(&self, model: &str) -> Option<ModelStats> {
        let accumulator = self.models.get(model)?;
        Some(ModelStats {
            request_count: accumulator.request_count,
            mean_latency_ms: accumulator.total_latency_ms / accumulator.request_count as f64,
            prompt_tokens: accumulator.prompt_tokens,
            completion_tokens: accumulator.completion_tokens,
        })
    }

    pub fn all_models(&self) -> Vec<String> {
        self.models.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_mean_latency_across_requests() {
        let tracker = ModelTracker::new();
        tracker.record("gpt-4", 100.0, 10, 5);
        tracker.record("gpt-4", 200.0, 20, 10);

        let stats = tracker.stats("gpt-4").unwrap();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.mean_latency_ms, 150.0);
        assert_eq!(stats.prompt_tokens, 30);
    }
}
