//! API errors and response-detail extraction.

use serde_json::Value;

/// Errors produced by backend API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its client-side deadline.
    #[error("request timed out")]
    Timeout,

    /// The backend returned a non-success HTTP status.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The response body could not be deserialized.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed or a request could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ApiError {
    /// Transient failures worth retrying: transport errors and 5xx responses.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Status { status: 500..=599, .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Client(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// FastAPI answers `{"detail": "..."}` for handled errors and
/// `{"detail": [{...}]}` for validation errors; anything else is returned
/// as raw text.
#[must_use]
pub fn extract_detail(body: &str) -> String {
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => trimmed.to_string(),
        },
        _ => trimmed.to_string(),
    }
}
