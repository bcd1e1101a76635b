//! FakeAI Routing
//!
//! Admission control and cache-aware worker routing:
//! - [`auth`]: API-key allowlist authentication
//! - [`rate_limit`]: per-key RPM/TPM/RPD token-bucket admission
//! - [`kv_cache`]: radix-tree prefix cache and worker-affinity routing

pub mod auth;
pub mod kv_cache;
pub mod rate_limit;

pub use auth::AuthConfig;
pub use kv_cache::{KVCacheRouter, RouteOutcome, WorkerLoad};
pub use rate_limit::{AdmitOutcome, RateLimiter};
