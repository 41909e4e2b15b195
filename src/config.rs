//! Runtime configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a default so the binary runs against a local backend with
//! no setup. `main` loads `.env` (if present) before anything reads the
//! environment; CLI flags override the values built here.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PUBLIC_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_INTERNAL_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STORE_DIR: &str = ".compliance";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AI_PROXY_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL the CLI client calls; request paths carry the `/api` prefix.
    pub public_api_url: String,
    /// Backend base URL the gateway forwards `/api/*` traffic to.
    pub internal_api_url: String,
    pub port: u16,
    pub store_dir: PathBuf,
    pub timeouts: HttpTimeouts,
    pub ai_proxy_timeout_secs: u64,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `NEXT_PUBLIC_API_URL`: default `http://localhost:3000`
    /// - `INTERNAL_API_URL`: default `http://localhost:8000`
    /// - `PORT`: default 3000
    /// - `COMPLIANCE_STORE_DIR`: default `.compliance`
    /// - `COMPLIANCE_REQUEST_TIMEOUT_SECS`: default 60
    /// - `COMPLIANCE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `COMPLIANCE_AI_PROXY_TIMEOUT_SECS`: default 120
    #[must_use]
    pub fn from_env() -> Self {
        let public_api_url = env_url("NEXT_PUBLIC_API_URL", DEFAULT_PUBLIC_API_URL);
        let internal_api_url = env_url("INTERNAL_API_URL", DEFAULT_INTERNAL_API_URL);
        let store_dir = std::env::var("COMPLIANCE_STORE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORE_DIR), PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: env_parse("COMPLIANCE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("COMPLIANCE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Self {
            public_api_url,
            internal_api_url,
            port: env_parse("PORT", DEFAULT_PORT),
            store_dir,
            timeouts,
            ai_proxy_timeout_secs: env_parse("COMPLIANCE_AI_PROXY_TIMEOUT_SECS", DEFAULT_AI_PROXY_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn ai_proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_proxy_timeout_secs)
    }
}

/// Strip trailing slashes so paths can be appended with `format!`.
#[must_use]
pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_url(key: &str, default: &str) -> String {
    let raw = std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    normalize_base_url(&raw)
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
