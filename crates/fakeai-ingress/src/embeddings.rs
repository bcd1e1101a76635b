//! `/v1/embeddings`: deterministic pseudo-random vectors keyed by input hash.
//!
//! No model ever runs; the vector for a given input string is reproducible
//! across calls (same hash, same seed) but otherwise has no semantic
//! relationship to its text, matching the spec's non-goal of real inference.

use std::hash::{Hash, Hasher};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fakeai_core::error::Error;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::chat::{extract_api_key, publish_pattern_detected};
use crate::state::IngressState;
use crate::wire::{EmbeddingObject, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};

const ENDPOINT: &str = "/v1/embeddings";
const DEFAULT_DIMENSIONS: usize = 1536;

fn seed_from_input(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn embed_one(text: &str, dimensions: usize) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed_from_input(text));
    (0..dimensions).map(|_| rng.random_range(-1.0f32..1.0f32)).collect()
}

pub async fn embeddings(State(state): State<IngressState>, headers: HeaderMap, Json(req): Json<EmbeddingRequest>) -> Result<Response, Error> {
    let api_key = extract_api_key(&headers);
    state.auth.authenticate(api_key.as_deref())?;
    let api_key = api_key.unwrap_or_default();

    let inputs = req.input.into_vec();
    let dimensions = req.dimensions.unwrap_or(DEFAULT_DIMENSIONS);

    let prompt_tokens: u32 = inputs.iter().map(|text| fakeai_routing::KVCacheRouter::tokenize(text).len() as u32).sum();
    let admit_result = state.rate_limiter.admit(&api_key, prompt_tokens);
    if let Some(pattern) = state.rate_limiter.observe_abuse(&api_key, ENDPOINT, admit_result.is_err()) {
        publish_pattern_detected(&state, &api_key, pattern);
    }
    admit_result?;

    let data = inputs
        .iter()
        .enumerate()
        .map(|(index, text)| EmbeddingObject { object: "embedding", embedding: embed_one(text, dimensions), index })
        .collect();

    let body = EmbeddingResponse {
        object: "list",
        data,
        model: req.model.clone(),
        usage: EmbeddingUsage { prompt_tokens, total_tokens: prompt_tokens },
    };
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_produces_identical_vector() {
        let a = embed_one("hello world", 8);
        let b = embed_one("hello world", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_usually_differs() {
        let a = embed_one("hello world", 8);
        let b = embed_one("goodbye world", 8);
        assert_ne!(a, b);
    }
}
