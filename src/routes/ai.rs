//! AI analysis routes.
//!
//! DESIGN
//! ======
//! Both handlers ask the backend first and only fall back to the local
//! filename heuristics when it is unreachable, answers with an error, or
//! answers with nothing usable. The response always says which path was
//! taken via `source`, so callers can weigh the suggestions accordingly.
//!
//! The backend replies either with `{"suggestions": [...]}` or with
//! `{"response": "<model output>"}`; model output is parsed as JSON when
//! possible and mined for control mentions otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::api::error::extract_detail;
use crate::api::types::{
    AnalyzeImageRequest, AnalyzeResponse, AnalyzeTextRequest, ControlCandidate, ControlSuggestion, SuggestionSource,
};
use crate::routes::detail_response;
use crate::services::suggest;
use crate::state::AppState;

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// `POST /api/ai/analyze-text`
pub async fn analyze_text(State(state): State<AppState>, Json(req): Json<AnalyzeTextRequest>) -> Response {
    if req.prompt.trim().is_empty() {
        return detail_response(StatusCode::BAD_REQUEST, "prompt is required");
    }
    let body = json!({
        "prompt": req.prompt,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "temperature": req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    });
    let answer = ask_backend(&state, "ai/analyze-text", &body).await;
    Json(resolve(answer, req.filename.as_deref(), &req.controls)).into_response()
}

/// `POST /api/ai/analyze-image`
pub async fn analyze_image(State(state): State<AppState>, Json(req): Json<AnalyzeImageRequest>) -> Response {
    if req.image.trim().is_empty() {
        return detail_response(StatusCode::BAD_REQUEST, "image is required");
    }
    let body = match serde_json::to_value(&req) {
        Ok(body) => body,
        Err(e) => return detail_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let answer = ask_backend(&state, "ai/analyze-image", &body).await;
    Json(resolve(answer, Some(&req.filename), &req.controls)).into_response()
}

/// POST `body` to the backend; `Ok` carries the raw 2xx body.
async fn ask_backend(state: &AppState, path: &str, body: &Value) -> Result<String, String> {
    let url = state.backend(path);
    let response = state
        .http
        .post(&url)
        .timeout(state.ai_timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("backend unreachable: {e}"))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| format!("backend response interrupted: {e}"))?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(format!("backend answered {}: {}", status.as_u16(), extract_detail(&text)))
    }
}

/// Suggestions from a backend answer, plus the raw model output if any.
fn suggestions_from_answer(body: &str, controls: &[ControlCandidate]) -> (Vec<ControlSuggestion>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (suggest::extract_suggestions_from_text(body, controls), Some(body.to_string()));
    };
    if value.get("suggestions").is_some_and(Value::is_array) {
        return (suggest::parse_ai_suggestions(body).unwrap_or_default(), None);
    }
    match value.get("response").and_then(Value::as_str) {
        Some(output) => {
            let suggestions = suggest::parse_ai_suggestions(output)
                .unwrap_or_else(|_| suggest::extract_suggestions_from_text(output, controls));
            (suggestions, Some(output.to_string()))
        }
        None => (Vec::new(), Some(body.to_string())),
    }
}

fn resolve(answer: Result<String, String>, filename: Option<&str>, controls: &[ControlCandidate]) -> AnalyzeResponse {
    let raw_response = match answer {
        Ok(body) => {
            let (suggestions, raw_response) = suggestions_from_answer(&body, controls);
            if !suggestions.is_empty() {
                info!(count = suggestions.len(), "AI suggestions from backend");
                return AnalyzeResponse { suggestions, source: SuggestionSource::Ai, raw_response };
            }
            warn!("backend answer held no usable suggestions, using fallback");
            raw_response
        }
        Err(reason) => {
            warn!(%reason, "AI analysis unavailable, using fallback");
            None
        }
    };
    let suggestions = filename
        .map(|f| suggest::suggest_from_filename(f, controls))
        .unwrap_or_default();
    AnalyzeResponse { suggestions, source: SuggestionSource::Fallback, raw_response }
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
