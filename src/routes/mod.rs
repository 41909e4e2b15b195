//! Router assembly for the `compliance serve` gateway.
//!
//! SYSTEM CONTEXT
//! ==============
//! The gateway stands between operators' tools and the compliance backend.
//! AI analysis routes are answered here (backend first, local heuristics as
//! fallback); every other `/api/*` request is forwarded verbatim with the
//! `/api` prefix stripped, since backend routes are unprefixed.

pub mod ai;
pub mod proxy;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Largest request body accepted, sized for evidence uploads.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ai/analyze-text", post(ai::analyze_text))
        .route("/api/ai/analyze-image", post(ai::analyze_image))
        .route("/api/{*path}", any(proxy::forward))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `{"detail": ...}` error body, the shape the backend uses.
pub(crate) fn detail_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": detail.into() }))).into_response()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
