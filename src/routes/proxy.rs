//! Pass-through of `/api/*` traffic to the backend.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::routes::detail_response;
use crate::state::AppState;

const REQUEST_HEADERS: [HeaderName; 3] = [CONTENT_TYPE, ACCEPT, AUTHORIZATION];
const RESPONSE_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, CONTENT_DISPOSITION];

/// Backend path for a gateway URI: `/api/scans/1?x=y` -> `scans/1?x=y`.
#[must_use]
pub fn backend_path(uri: &Uri) -> String {
    let path = uri.path();
    let stripped = path.strip_prefix("/api").unwrap_or(path).trim_start_matches('/');
    match uri.query() {
        Some(query) => format!("{stripped}?{query}"),
        None => stripped.to_string(),
    }
}

/// `ANY /api/{*path}`: forward method, query, selected headers and body.
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = state.backend(&backend_path(&uri));
    debug!(%method, %url, bytes = body.len(), "forwarding");

    let mut request = state.http.request(method, &url);
    for name in &REQUEST_HEADERS {
        if let Some(value) = headers.get(name) {
            request = request.header(name.clone(), value.clone());
        }
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = match request.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(%url, error = %e, "backend unreachable");
            return detail_response(StatusCode::BAD_GATEWAY, format!("Backend unavailable: {e}"));
        }
    };

    let status = upstream.status();
    let mut out_headers = HeaderMap::new();
    for name in &RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(name) {
            out_headers.insert(name.clone(), value.clone());
        }
    }
    match upstream.bytes().await {
        Ok(bytes) => (status, out_headers, bytes).into_response(),
        Err(e) => {
            warn!(%url, error = %e, "backend response interrupted");
            detail_response(StatusCode::BAD_GATEWAY, format!("Backend response interrupted: {e}"))
        }
    }
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod tests;
