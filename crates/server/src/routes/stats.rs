//! Operational view of the connected subscribers.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /__stats`
pub async fn handle_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscribers = state.dispatcher.subscribers();
    Json(json!({
        "nrOfSubscribers": subscribers.len(),
        "subscribers": subscribers,
    }))
}
