//! Per-stream lifecycle aggregation: time-to-first-token and tokens/second
//! across completed streams.
//!
//! `TTFT_ms = (first_token_time - start_time) * 1000`
//! `TPS = tokens / (end_time - first_token_time)`

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct StreamSample {
    ttft_ms: f64,
    tokens_per_second: f64,
}

#[derive(Default)]
pub struct StreamingTracker {
    samples: Mutex<Vec<StreamSample>>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamingStats {
    pub completed_streams: usize,
    pub avg_ttft_ms: f64,
    pub avg_tokens_per_second: f64,
}

impl StreamingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed stream given its start/first-token/end timestamps (ms)
    /// and the number of content tokens delivered.
    pub fn record_completed_stream(&self, start_ms: i64, first_token_ms: i64, end_ms: i64, token_count: u32) {
        let ttft_ms = (first_token_ms - start_ms).max(0) as f64;
        let decode_seconds = ((end_ms - first_token_ms).max(1) as f64) / 1000.0;
        let tokens_per_second = token_count as f64 / decode_seconds;

        let mut samples = self.samples.lock().expect("streaming tracker mutex poisoned");
        samples.push(StreamSample { ttft_ms, tokens_per_second });
        const MAX_RETAINED: usize = 10_000;
        if samples.len() > MAX_RETAINED {
            samples.remove(0);
        }
    }

    pub fn stats(&self) -> StreamingStats {
        let samples = self.samples.lock().expect("streaming tracker mutex poisoned");
        if samples.is_empty() {
            return StreamingStats::default();
        }
        let count = samples.len();
        let sum_ttft: f64 = samples.iter().map(|s| s.ttft_ms).sum();
        let sum_tps: f64 = samples.iter().map(|s| s.tokens_per_second).sum();
        StreamingStats {
            completed_streams: count,
            avg_ttft_ms: sum_ttft / count as f64,
            avg_tokens_per_second: sum_tps / count as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_ttft_and_throughput_across_streams() {
        let tracker = StreamingTracker::new();
        tracker.record_completed_stream(0, 20, 1020, 100);
        tracker.record_completed_stream(0, 40, 1040, 100);

        let stats = tracker.stats();
        assert_eq!(stats.completed_streams, 2);
        assert_eq!(stats.avg_ttft_ms, 30.0);
    }

    #[test]
    fn empty_tracker_has_zeroed_stats() {
        let tracker = StreamingTracker::new();
        let stats = tracker.stats();
        assert_eq!(stats.completed_streams, 0);
    }
}
