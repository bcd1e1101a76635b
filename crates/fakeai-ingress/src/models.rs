//! `/v1/models`: lists every descriptor currently in the registry, including
//! ids that were only auto-registered on first use by another endpoint.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::IngressState;
use crate::wire::{ModelListResponse, ModelObject};

pub async fn list_models(State(state): State<IngressState>) -> Response {
    let data = state
        .models
        .list()
        .into_iter()
        .map(|descriptor| ModelObject { id: descriptor.id, object: "model", created: 0, owned_by: "fakeai" })
        .collect();
    Json(ModelListResponse { object: "list", data }).into_response()
}
