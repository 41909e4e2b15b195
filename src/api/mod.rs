//! Backend API client.
//!
//! DESIGN
//! ======
//! `ApiClient` knows every backend route the console uses. JSON calls go
//! through `retry::with_backoff` (network and 5xx errors, 3 retries) on a
//! client with the configured request timeout. Uploads are sent once on a
//! second client with only a connect timeout: they are not idempotent and the
//! upload pipeline's `UploadTiming` is the single owner of their deadline.
//!
//! The pipelines in `crate::services` depend on the `ComplianceBackend` trait
//! rather than on `ApiClient`, so tests can substitute a scripted backend.

pub mod error;
pub mod retry;
pub mod types;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{HttpTimeouts, normalize_base_url};
pub use error::ApiError;
use error::extract_detail;
use retry::{RetryPolicy, with_backoff};
use types::{
    AiSettings, AiStatus, AnalyzeResponse, AnalyzeTextRequest, ConnectionTest, Control,
    ControlList, Document, DocumentList, EvidenceLink, EvidenceList, Framework, FrameworkList, LinkEvidenceRequest,
    LinkEvidenceResponse, MessageResponse, Scan, ScanList, ScanSummary, StartedScan, UploadedDocument,
};


// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// The slice of the backend API the upload, scan and report pipelines use.
#[async_trait::async_trait]
pub trait ComplianceBackend: Send + Sync {
    /// `POST /api/documents/upload`
    async fn upload_document(&self, filename: &str, bytes: Vec<u8>, mime_type: &str)
    -> Result<UploadedDocument, ApiError>;

    /// `GET /api/documents/{id}/ai-status`
    async fn ai_status(&self, document_id: &str) -> Result<AiStatus, ApiError>;

    /// `POST /api/controls/{id}/scan`
    async fn start_scan(&self, control_id: &str) -> Result<StartedScan, ApiError>;

    /// `GET /api/scans/{id}`
    async fn scan(&self, scan_id: &str) -> Result<Scan, ApiError>;

    /// `GET /api/frameworks/{id}/controls`
    async fn controls(&self, framework_id: &str) -> Result<Vec<Control>, ApiError>;

    /// `GET /api/controls/{id}/scans`, newest first.
    async fn control_scans(&self, control_id: &str) -> Result<Vec<ScanSummary>, ApiError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// No total timeout; callers bound uploads themselves.
    upload_http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Build a client for `base_url` (the gateway or any host serving `/api/*`).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        let upload_http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self { http, upload_http, base_url: normalize_base_url(base_url), retry: RetryPolicy::default() })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        debug!(%method, path, "api request");
        let mut request = self.http.request(method, self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(json) = body {
            request = request.json(json);
        }
        let response = request.send().await?;
        read_body(response).await
    }

    async fn send_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        with_backoff(self.retry, path, || self.send_once(method.clone(), path, query, body)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let text = self.send_with_retry(Method::GET, path, &[], None).await?;
        decode(&text)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Client(e.to_string()))?;
        let text = self.send_with_retry(Method::POST, path, &[], Some(&body)).await?;
        decode(&text)
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_with_retry(Method::DELETE, path, &[], None)
            .await
            .map(|_| ())
    }

    /// `GET /healthz` on the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unreachable or not 2xx.
    pub async fn ping(&self) -> Result<(), ApiError> {
        self.send_once(Method::GET, "/healthz", &[], None)
            .await
            .map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Frameworks & controls
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn frameworks(&self) -> Result<Vec<Framework>, ApiError> {
        let list: FrameworkList = self.get_json("/api/frameworks").await?;
        Ok(list.frameworks)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn list_controls(&self, framework_id: &str) -> Result<Vec<Control>, ApiError> {
        let list: ControlList = self
            .get_json(&format!("/api/frameworks/{framework_id}/controls"))
            .await?;
        Ok(list.controls)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn control(&self, control_id: &str) -> Result<Control, ApiError> {
        self.get_json(&format!("/api/controls/{control_id}")).await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn control_evidence(&self, control_id: &str) -> Result<Vec<EvidenceLink>, ApiError> {
        let list: EvidenceList = self
            .get_json(&format!("/api/controls/{control_id}/evidence"))
            .await?;
        Ok(list.evidence)
    }

    /// `POST /api/controls/{id}/evidence`: link a document from the control side.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn add_control_evidence(
        &self,
        control_id: &str,
        document_id: &str,
        requirement_id: Option<&str>,
        note: Option<&str>,
    ) -> Result<LinkEvidenceResponse, ApiError> {
        let body = serde_json::json!({
            "document_id": document_id,
            "requirement_id": requirement_id,
            "note": note,
        });
        self.post_json(&format!("/api/controls/{control_id}/evidence"), &body)
            .await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn control_documents(&self, control_id: &str) -> Result<Vec<Document>, ApiError> {
        let list: DocumentList = self
            .get_json(&format!("/api/controls/{control_id}/documents"))
            .await?;
        Ok(list.documents)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn list_control_scans(&self, control_id: &str) -> Result<Vec<ScanSummary>, ApiError> {
        let list: ScanList = self
            .get_json(&format!("/api/controls/{control_id}/scans"))
            .await?;
        Ok(list.scans)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn create_scan(&self, control_id: &str) -> Result<StartedScan, ApiError> {
        self.post_json(&format!("/api/controls/{control_id}/scan"), &serde_json::json!({ "control_id": control_id }))
            .await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn get_scan(&self, scan_id: &str) -> Result<Scan, ApiError> {
        self.get_json(&format!("/api/scans/{scan_id}")).await
    }

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn documents(&self) -> Result<Vec<Document>, ApiError> {
        let list: DocumentList = self.get_json("/api/documents").await?;
        Ok(list.documents)
    }

    /// Multipart upload under the `file` field. Sent exactly once, with no
    /// total deadline; wrap the future in `tokio::time::timeout` to bound it.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>, mime_type: &str) -> Result<UploadedDocument, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| ApiError::Client(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .upload_http
            .post(self.url("/api/documents/upload"))
            .multipart(form)
            .send()
            .await?;
        let text = read_body(response).await?;
        decode(&text)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`]; a deleted document surfaces as status 404.
    pub async fn document_ai_status(&self, document_id: &str) -> Result<AiStatus, ApiError> {
        // Polled every few seconds: a failed poll is simply retried by the next tick.
        let text = self
            .send_once(Method::GET, &format!("/api/documents/{document_id}/ai-status"), &[], None)
            .await?;
        decode(&text)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport or status failure.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/documents/{document_id}")).await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn link_evidence(
        &self,
        document_id: &str,
        request: &LinkEvidenceRequest,
    ) -> Result<LinkEvidenceResponse, ApiError> {
        self.post_json(&format!("/api/documents/{document_id}/link-evidence"), request)
            .await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport or status failure.
    pub async fn delete_document_control_link(&self, link_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/document-control-links/{link_id}"))
            .await
    }

    // -------------------------------------------------------------------------
    // AI analysis & settings
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn analyze_text(&self, request: &AnalyzeTextRequest) -> Result<AnalyzeResponse, ApiError> {
        self.post_json("/api/ai/analyze-text", request).await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn ai_settings(&self) -> Result<AiSettings, ApiError> {
        self.get_json("/api/settings/ai").await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn save_ai_settings(&self, settings: &AiSettings) -> Result<MessageResponse, ApiError> {
        self.post_json("/api/settings/ai", settings).await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn test_ai_settings(&self, settings: &AiSettings) -> Result<ConnectionTest, ApiError> {
        self.post_json("/api/settings/ai/test", settings).await
    }

    /// Model listing shapes differ per provider, so they stay untyped.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn ollama_models(&self, endpoint: Option<&str>) -> Result<Value, ApiError> {
        let query: Vec<(&str, &str)> = endpoint.map(|e| vec![("endpoint", e)]).unwrap_or_default();
        let text = self
            .send_with_retry(Method::GET, "/api/settings/ollama/models", &query, None)
            .await?;
        decode(&text)
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or decode failure.
    pub async fn openai_models(&self) -> Result<Value, ApiError> {
        self.get_json("/api/settings/openai/models").await
    }
}

#[async_trait::async_trait]
impl ComplianceBackend for ApiClient {
    async fn upload_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadedDocument, ApiError> {
        self.upload(filename, bytes, mime_type).await
    }

    async fn ai_status(&self, document_id: &str) -> Result<AiStatus, ApiError> {
        self.document_ai_status(document_id).await
    }

    async fn start_scan(&self, control_id: &str) -> Result<StartedScan, ApiError> {
        self.create_scan(control_id).await
    }

    async fn scan(&self, scan_id: &str) -> Result<Scan, ApiError> {
        self.get_scan(scan_id).await
    }

    async fn controls(&self, framework_id: &str) -> Result<Vec<Control>, ApiError> {
        self.list_controls(framework_id).await
    }

    async fn control_scans(&self, control_id: &str) -> Result<Vec<ScanSummary>, ApiError> {
        self.list_control_scans(control_id).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status { status: status.as_u16(), detail: extract_detail(&text) });
    }
    Ok(text)
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
