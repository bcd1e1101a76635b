//! Per-request latency breakdown `(queue, prefill, decode, total)`, the last
//! 100 request lifecycles, queue-depth/batch-size samples, and 1-minute
//! historical buckets. Named after the Dynamo-style inference metrics this
//! mirrors.

use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_RECENT_LIFECYCLES: usize = 100;
const BUCKET_WIDTH_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
pub struct LatencyBreakdown {
    pub queue_ms: f64,
    pub prefill_ms: f64,
    pub decode_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    timestamp_ms: i64,
    breakdown: LatencyBreakdown,
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    bucket_start_ms: i64,
    queue_depth_samples: Vec<u32>,
    batch_size_samples: Vec<u32>,
}

#[derive(Default)]
pub struct DynamoTracker {
    recent: Mutex<VecDeque<Lifecycle>>,
    buckets: Mutex<VecDeque<Bucket>>,
}

#[derive(Debug, Clone, Default)]
pub struct DynamoStats {
    pub sample_count: usize,
    pub avg_queue_ms: f64,
    pub avg_prefill_ms: f64,
    pub avg_decode_ms: f64,
    pub avg_total_ms: f64,
    pub avg_queue_depth: f64,
    pub avg_batch_size: f64,
}

impl DynamoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lifecycle(&self, timestamp_ms: i64, breakdown: LatencyBreakdown) {
        let mut recent = self.recent.lock().expect("dynamo tracker mutex poisoned");
        recent.push_back(Lifecycle { timestamp_ms, breakdown });
        if recent.len() > MAX_RECENT_LIFECYCLES {
            recent.pop_front();
        }
    }

    pub fn record_sample(&self, timestamp_ms: i64, queue_depth: u32, batch_size: u32) {
        let mut buckets = self.buckets.lock().expect("dynamo tracker mutex poisoned");
        let bucket_start_ms = (timestamp_ms / BUCKET_WIDTH_MS) * BUCKET_WIDTH_MS;
        if buckets.back().map(|b| b.bucket_start_ms) != Some(bucket_start_ms) {
            buckets.push_back(Bucket { bucket_start_ms, ..Default::default() });
        }
        let bucket = buckets.back_mut().expect("bucket just pushed");
        bucket.queue_depth_samples.push(queue_depth);
        bucket.batch_size_samples.push(batch_size);

        const MAX_BUCKETS: usize = 1_440; // 24h of 1-minute buckets
        if buckets.len() > MAX_BUCKETS {
            buckets.pop_front();
        }
    }

    pub fn stats(&self) -> DynamoStats {
        let recent = self.recent.lock().expect("dynamo tracker mutex poisoned");
        let buckets = self.buckets.lock().expect("dynamo tracker mutex poisoned");

        if recent.is_empty() {
            return DynamoStats::default();
        }

        let count = recent.len();
        let sum = |f: fn(&LatencyBreakdown) -> f64| -> f64 {
            recent.iter().map(|l| f(&l.breakdown)).sum::<f64>() / count as f64
        };

        let (queue_depths, batch_sizes): (Vec<u32>, Vec<u32>) = buckets
            .iter()
            .flat_map(|b| b.queue_depth_samples.iter().copied().zip(b.batch_size_samples.iter().copied()))
            .unzip();

        let avg_queue_depth = if queue_depths.is_empty() {
            0.0
        } else {
            queue_depths.iter().sum::<u32>() as f64 / queue_depths.len() as f64
        };
        let avg_batch_size = if batch_sizes.is_empty() {
            0.0
        } else {
            batch_sizes.iter().sum::<u32>() as f64 / batch_sizes.len() as f64
        };

        DynamoStats {
            sample_count: count,
            avg_queue_ms: sum(|b| b.queue_ms),
            avg_prefill_ms: sum(|b| b.prefill_ms),
            avg_decode_ms: sum(|b| b.decode_ms),
            avg_total_ms: sum(|b| b.total_ms),
            avg_queue_depth,
            avg_batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_at_most_100_lifecycles() {
        let tracker = DynamoTracker::new();
        for i in 0..150 {
            tracker.record_lifecycle(
                i,
                LatencyBreakdown { queue_ms: 1.0, prefill_ms: 2.0, decode_ms: 3.0, total_ms: 6.0 },
            );
        }
        assert_eq!(tracker.stats().sample_count, MAX_RECENT_LIFECYCLES);
    }

    #[test]
    fn averages_latency_breakdown() {
        let tracker = DynamoTracker::new();
        tracker.record_lifecycle(0, LatencyBreakdown { queue_ms: 10.0, prefill_ms: 20.0, decode_ms: 30.0, total_ms: 60.0 });
        tracker.record_lifecycle(1, LatencyBreakdown { queue_ms: 20.0, prefill_ms: 40.0, decode_ms: 60.0, total_ms: 120.0 });

        let stats = tracker.stats();
        assert_eq!(stats.avg_queue_ms, 15.0);
        assert_eq!(stats.avg_total_ms, 90.0);
    }
}
