//! Shared gateway state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds one pooled `reqwest::Client` for every forwarded request and the
//! backend base URL. The client has a connect timeout only: uploads through
//! the proxy may run for minutes and the caller owns that deadline. AI
//! analysis calls carry their own per-request timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, normalize_base_url};

/// Shared application state. Clone is required by Axum; inner fields are
/// cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    /// Backend base URL without trailing slash, e.g. `http://api:8000`.
    pub backend_url: Arc<str>,
    pub ai_timeout: Duration,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .build()?;
        Ok(Self::with_client(http, &config.internal_api_url, config.ai_proxy_timeout()))
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, backend_url: &str, ai_timeout: Duration) -> Self {
        Self { http, backend_url: Arc::from(normalize_base_url(backend_url)), ai_timeout }
    }

    /// Absolute backend URL for a path without the `/api` prefix.
    #[must_use]
    pub fn backend(&self, path: &str) -> String {
        format!("{}/{}", self.backend_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// State pointing at `backend_url` with a short AI timeout.
    #[must_use]
    pub fn test_app_state(backend_url: &str) -> AppState {
        AppState::with_client(reqwest::Client::new(), backend_url, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_joins_paths_without_double_slashes() {
        let state = test_helpers::test_app_state("http://api:8000/");
        assert_eq!(state.backend("frameworks"), "http://api:8000/frameworks");
        assert_eq!(state.backend("/scans/1"), "http://api:8000/scans/1");
    }
}
