//! FakeAI Ingress
//!
//! The OpenAI-wire-compatible HTTP surface: request preparation shared by
//! every endpoint (auth, rate-limit admission, context validation, KV-cache
//! routing), the streaming engine, and the per-endpoint handlers.

pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod headers;
pub mod models;
pub mod moderations;
pub mod router;
pub mod schema_gen;
pub mod state;
pub mod streaming;
pub mod wire;

pub use router::build_router;
pub use state::IngressState;
