//! HTTP endpoint implementations.
//!
//! - `push`: the long-lived SSE subscription stream
//! - `history`: read-only snapshot of recent notifications
//! - `stats`: currently connected subscribers
//! - `health`: composite health, readiness and standard plumbing

pub mod health;
pub mod history;
pub mod push;
pub mod stats;

use axum::extract::Query;
use axum::http::HeaderMap;

use crate::error::ServerError;

pub(crate) const API_KEY_HEADER: &str = "X-Api-Key";
pub(crate) const API_KEY_QUERY_PARAM: &str = "apiKey";
pub(crate) const CLIENT_ADDR_HEADER: &str = "X-Forwarded-For";

/// 404 fallback for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// The API key arrives either as a header or as a query parameter.
pub(crate) fn api_key(headers: &HeaderMap, params: &Query<Vec<(String, String)>>) -> String {
    if let Some(value) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        if !value.is_empty() {
            return value.to_string();
        }
    }
    params
        .iter()
        .find(|(name, _)| name == API_KEY_QUERY_PARAM)
        .map(|(_, value)| value.clone())
        .unwrap_or_default()
}
