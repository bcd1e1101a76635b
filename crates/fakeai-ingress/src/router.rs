//! Wires every OpenAI-compatible route onto an axum `Router` bound to
//! [`IngressState`]. `fakeai-server` mounts this under the process's
//! aggregator/health routes and serves it.

use axum::routing::post;
use axum::Router;

use crate::chat::chat_completions;
use crate::completions::completions;
use crate::embeddings::embeddings;
use crate::models::list_models;
use crate::moderations::moderations;
use crate::state::IngressState;

pub fn build_router(state: IngressState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/completions", post(completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/models", axum::routing::get(list_models))
        .route("/v1/moderations", post(moderations))
        .with_state(state)
}
