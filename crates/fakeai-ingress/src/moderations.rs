//! `/v1/moderations`: stub classifications. Nothing is ever flagged — the
//! spec scopes real content classification out (§1, "content fabrication");
//! this only needs to satisfy the wire shape clients expect.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fakeai_core::types::generate_request_id;

use crate::state::IngressState;
use crate::wire::{ModerationCategories, ModerationCategoryScores, ModerationRequest, ModerationResponse, ModerationResult};

pub async fn moderations(State(_state): State<IngressState>, Json(req): Json<ModerationRequest>) -> Response {
    let results = req
        .input
        .into_vec()
        .into_iter()
        .map(|_| ModerationResult {
            flagged: false,
            categories: ModerationCategories::default(),
            category_scores: ModerationCategoryScores::default(),
        })
        .collect();

    let body = ModerationResponse { id: format!("modr-{}", generate_request_id()), model: "text-moderation-stub", results };
    Json(body).into_response()
}
