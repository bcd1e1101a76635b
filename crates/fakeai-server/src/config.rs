//! Server configuration: defaults, an optional YAML/TOML config file, and
//! `FAKEAI_*` environment variable overlays, as in
//! `lunaroute-server::config::ServerConfig`.
//!
//! Precedence (highest first): CLI flags > config file > environment
//! variables > built-in defaults.

use std::path::Path;

use fakeai_core::types::RateLimitTier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ttft_ms")]
    pub ttft_ms: f64,
    #[serde(default = "default_itl_ms")]
    pub itl_ms: f64,
    #[serde(default = "default_ttft_variance_pct")]
    pub ttft_variance_pct: f64,
    #[serde(default = "default_itl_variance_pct")]
    pub itl_variance_pct: f64,

    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_false")]
    pub require_api_key: bool,

    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,
    #[serde(default = "default_rate_limit_tier")]
    pub rate_limit_tier: String,

    #[serde(default = "default_true")]
    pub kv_cache_enabled: bool,
    #[serde(default = "default_kv_cache_block_size")]
    pub kv_cache_block_size: usize,
    #[serde(default = "default_kv_cache_num_workers")]
    pub kv_cache_num_workers: u32,
    #[serde(default = "default_kv_overlap_weight")]
    pub kv_overlap_weight: f64,

    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_seconds: u64,
    #[serde(default = "default_stream_keepalive_secs")]
    pub stream_keepalive_interval_seconds: u64,
    #[serde(default = "default_stream_token_timeout_secs")]
    pub stream_token_timeout_seconds: u64,

    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_metrics_stream_interval_ms")]
    pub metrics_stream_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ttft_ms: default_ttft_ms(),
            itl_ms: default_itl_ms(),
            ttft_variance_pct: default_ttft_variance_pct(),
            itl_variance_pct: default_itl_variance_pct(),
            api_keys: Vec::new(),
            require_api_key: default_false(),
            rate_limit_enabled: default_true(),
            rate_limit_tier: default_rate_limit_tier(),
            kv_cache_enabled: default_true(),
            kv_cache_block_size: default_kv_cache_block_size(),
            kv_cache_num_workers: default_kv_cache_num_workers(),
            kv_overlap_weight: default_kv_overlap_weight(),
            stream_timeout_seconds: default_stream_timeout_secs(),
            stream_keepalive_interval_seconds: default_stream_keepalive_secs(),
            stream_token_timeout_seconds: default_stream_token_timeout_secs(),
            max_request_size: default_max_request_size(),
            log_level: default_log_level(),
            metrics_stream_interval_ms: default_metrics_stream_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        Ok(config)
    }

    /// Overlays `FAKEAI_*` environment variables, per spec §6.
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("FAKEAI_HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_PORT").and_then(|v| v.parse::<u16>().map_err(|_| std::env::VarError::NotPresent)) {
            self.port = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_TTFT_MS").ok().and_then(|v| v.parse::<f64>().ok()) {
            self.ttft_ms = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_ITL_MS").ok().and_then(|v| v.parse::<f64>().ok()) {
            self.itl_ms = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_TTFT_VARIANCE_PERCENT").ok().and_then(|v| v.parse::<f64>().ok()) {
            self.ttft_variance_pct = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_ITL_VARIANCE_PERCENT").ok().and_then(|v| v.parse::<f64>().ok()) {
            self.itl_variance_pct = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_API_KEYS") {
            self.api_keys = val.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
        if let Ok(val) = std::env::var("FAKEAI_REQUIRE_API_KEY").ok().and_then(|v| v.parse::<bool>().ok()) {
            self.require_api_key = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_RATE_LIMIT_ENABLED").ok().and_then(|v| v.parse::<bool>().ok()) {
            self.rate_limit_enabled = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_RATE_LIMIT_TIER") {
            self.rate_limit_tier = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_KV_CACHE_ENABLED").ok().and_then(|v| v.parse::<bool>().ok()) {
            self.kv_cache_enabled = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_KV_CACHE_BLOCK_SIZE").ok().and_then(|v| v.parse::<usize>().ok()) {
            self.kv_cache_block_size = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_KV_CACHE_NUM_WORKERS").ok().and_then(|v| v.parse::<u32>().ok()) {
            self.kv_cache_num_workers = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_KV_OVERLAP_WEIGHT").ok().and_then(|v| v.parse::<f64>().ok()) {
            self.kv_overlap_weight = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_STREAM_TIMEOUT_SECONDS").ok().and_then(|v| v.parse::<u64>().ok()) {
            self.stream_timeout_seconds = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_STREAM_KEEPALIVE_INTERVAL_SECONDS").ok().and_then(|v| v.parse::<u64>().ok()) {
            self.stream_keepalive_interval_seconds = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_MAX_REQUEST_SIZE").ok().and_then(|v| v.parse::<usize>().ok()) {
            self.max_request_size = val;
        }
        if let Ok(val) = std::env::var("FAKEAI_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    pub fn parsed_rate_limit_tier(&self) -> RateLimitTier {
        match self.rate_limit_tier.to_lowercase().as_str() {
            "free" => RateLimitTier::Free,
            "tier-1" | "tier1" => RateLimitTier::Tier1,
            "tier-2" | "tier2" => RateLimitTier::Tier2,
            "tier-3" | "tier3" => RateLimitTier::Tier3,
            "tier-4" | "tier4" => RateLimitTier::Tier4,
            _ => RateLimitTier::Tier5,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_ttft_ms() -> f64 {
    20.0
}
fn default_itl_ms() -> f64 {
    5.0
}
fn default_ttft_variance_pct() -> f64 {
    10.0
}
fn default_itl_variance_pct() -> f64 {
    10.0
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_rate_limit_tier() -> String {
    "tier-5".to_string()
}
fn default_kv_cache_block_size() -> usize {
    16
}
fn default_kv_cache_num_workers() -> u32 {
    4
}
fn default_kv_overlap_weight() -> f64 {
    0.8
}
fn default_stream_timeout_secs() -> u64 {
    300
}
fn default_stream_keepalive_secs() -> u64 {
    15
}
fn default_stream_token_timeout_secs() -> u64 {
    30
}
fn default_max_request_size() -> usize {
    100 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_stream_interval_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.kv_cache_block_size, 16);
        assert_eq!(config.kv_cache_num_workers, 4);
        assert_eq!(config.stream_timeout_seconds, 300);
        assert_eq!(config.stream_keepalive_interval_seconds, 15);
        assert_eq!(config.max_request_size, 100 * 1024 * 1024);
    }

    #[test]
    fn env_overlay_overrides_defaults() {
        // SAFETY: test runs single-threaded per `cargo test` default for
        // this crate's unit tests; no other test touches this var.
        unsafe {
            std::env::set_var("FAKEAI_PORT", "9001");
        }
        let mut config = ServerConfig::default();
        config.merge_env();
        assert_eq!(config.port, 9001);
        unsafe {
            std::env::remove_var("FAKEAI_PORT");
        }
    }

    #[test]
    fn unknown_rate_limit_tier_falls_back_to_tier5() {
        let config = ServerConfig { rate_limit_tier: "bogus".to_string(), ..ServerConfig::default() };
        assert_eq!(config.parsed_rate_limit_tier().limits().rpm, RateLimitTier::Tier5.limits().rpm);
    }

    #[test]
    fn from_file_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "host: 0.0.0.0\nport: 9000\n").unwrap();
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
    }
}
