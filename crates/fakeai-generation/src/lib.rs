//! FakeAI Generation
//!
//! Fabricates the "work" a real inference engine would do:
//! - [`latency`]: TTFT/ITL sampling and cache-driven speedup
//! - [`tokens`]: deterministic seeded filler-token emission
//! - [`context`]: context-window admission check

pub mod context;
pub mod latency;
pub mod tokens;

pub use context::validate_context_window;
pub use latency::{LatencyConfig, LatencyShaper};
pub use tokens::{generate_tokens, reasoning_token_count, seed_from_request_id};
