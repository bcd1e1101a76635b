//! Latency shaping: samples TTFT/ITL delays around configured means, with
//! a KV-cache-driven speedup applied to TTFT.

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    pub ttft_ms: f64,
    pub ttft_variance_pct: f64,
    pub itl_ms: f64,
    pub itl_variance_pct: f64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self { ttft_ms: 20.0, ttft_variance_pct: 20.0, itl_ms: 5.0, itl_variance_pct: 20.0 }
    }
}

/// Fraction of the configured TTFT below which the cache speedup may never
/// push the effective delay.
const CACHE_SPEEDUP_FLOOR_PCT: f64 = 0.10;
const CACHE_SPEEDUP_WEIGHT: f64 = 0.8;

pub struct LatencyShaper {
    config: LatencyConfig,
}

impl LatencyShaper {
    pub fn new(config: LatencyConfig) -> Self {
        Self { config }
    }

    /// `mean * (1 + uniform(-variance_pct, +variance_pct) / 100)`, clamped non-negative.
    pub fn sample(mean_ms: f64, variance_pct: f64) -> f64 {
        let mut rng = rand::rng();
        let noise_pct: f64 = rng.random_range(-variance_pct..=variance_pct);
        (mean_ms * (1.0 + noise_pct / 100.0)).max(0.0)
    }

    /// TTFT delay in milliseconds, reduced when the KV-cache matched
    /// `matched_tokens` of `total_tokens` input tokens.
    pub fn sample_ttft(&self, matched_tokens: u32, total_tokens: u32) -> f64 {
        let base = Self::sample(self.config.ttft_ms, self.config.ttft_variance_pct);
        if total_tokens == 0 || matched_tokens == 0 {
            return base;
        }
        let overlap = (matched_tokens as f64 / total_tokens as f64).min(1.0);
        let factor = (1.0 - overlap * CACHE_SPEEDUP_WEIGHT).max(CACHE_SPEEDUP_FLOOR_PCT);
        base * factor
    }

    pub fn sample_itl(&self) -> f64 {
        Self::sample(self.config.itl_ms, self.config.itl_variance_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stays_within_variance_band() {
        for _ in 0..100 {
            let value = LatencyShaper::sample(100.0, 20.0);
            assert!((80.0..=120.0).contains(&value));
        }
    }

    #[test]
    fn cache_speedup_reduces_ttft_but_not_below_floor() {
        let shaper = LatencyShaper::new(LatencyConfig { ttft_ms: 100.0, ttft_variance_pct: 0.0, ..Default::default() });
        let full_match = shaper.sample_ttft(100, 100);
        assert!(full_match >= 100.0 * CACHE_SPEEDUP_FLOOR_PCT - 1e-9);
        assert!(full_match < 100.0);
    }

    #[test]
    fn no_match_leaves_ttft_unreduced() {
        let shaper = LatencyShaper::new(LatencyConfig { ttft_ms: 100.0, ttft_variance_pct: 0.0, ..Default::default() });
        assert_eq!(shaper.sample_ttft(0, 100), 100.0);
    }
}
