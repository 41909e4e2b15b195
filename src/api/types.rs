//! Backend DTOs, validated at the API boundary.
//!
//! Fields the backend may omit carry `#[serde(default)]`; unknown fields are
//! ignored so schema additions on the backend never break the client.
//! Timestamps stay as the backend's ISO strings (they are naive, without
//! offset) and are parsed only for display in `crate::format`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// FRAMEWORKS & CONTROLS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub req_code: String,
    pub text: String,
    #[serde(default)]
    pub maturity_level: Option<u8>,
    #[serde(default)]
    pub guidance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    #[serde(default)]
    pub framework_id: Option<String>,
    #[serde(default)]
    pub framework_name: Option<String>,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub requirements_count: Option<u32>,
    #[serde(default)]
    pub linked_documents_count: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Short requirement reference embedded in evidence, results and gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRef {
    pub id: String,
    pub req_code: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub maturity_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRef {
    pub id: String,
    pub code: String,
    pub title: String,
}

// =============================================================================
// DOCUMENTS & EVIDENCE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Where a document-to-control suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    /// Produced by the backend AI.
    Ai,
    /// Produced by the local filename/text heuristics.
    Fallback,
    /// Entered by an operator.
    Manual,
}

impl SuggestionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Fallback => "fallback",
            Self::Manual => "manual",
        }
    }
}

/// A proposed document-to-control mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSuggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_id: Option<String>,
    pub control_code: String,
    pub control_title: String,
    #[serde(default = "unknown_framework")]
    pub framework_name: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn unknown_framework() -> String {
    "Unknown".to_string()
}

/// `POST /api/documents/upload` response: the stored document plus any
/// suggestions the backend AI produced during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedDocument {
    #[serde(flatten)]
    pub document: Document,
    #[serde(default)]
    pub suggested_controls: Vec<ControlSuggestion>,
}

/// A control the backend AI linked to a document after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiLinkedControl {
    /// Identifier of the document-control link (deletable).
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub control_id: Option<String>,
    pub control_code: String,
    #[serde(default)]
    pub control_title: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// `GET /api/documents/{id}/ai-status` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiStatus {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub ai_processed: bool,
    #[serde(default)]
    pub linked_controls: Vec<AiLinkedControl>,
    #[serde(default)]
    pub ai_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub id: String,
    pub document: Document,
    #[serde(default)]
    pub requirement: Option<RequirementRef>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub is_ai_linked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEvidenceRequest {
    pub control_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEvidenceResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub link_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// SCANS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ScanStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Partial,
    Fail,
    NotFound,
    #[serde(other)]
    Unknown,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Partial => "PARTIAL",
            Self::Fail => "FAIL",
            Self::NotFound => "NOT_FOUND",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub page_num: Option<u32>,
    #[serde(default)]
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub requirement: RequirementRef,
    pub outcome: Outcome,
    #[serde(default)]
    pub confidence: f64,
    /// Stored by the backend as JSON; usually a string, sometimes an object.
    #[serde(default)]
    pub rationale: Value,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl ScanResult {
    #[must_use]
    pub fn rationale_text(&self) -> String {
        match &self.rationale {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default = "unknown_priority")]
    pub priority: Priority,
}

fn unknown_priority() -> Priority {
    Priority::Unknown
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub requirement: RequirementRef,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
}

/// `GET /api/scans/{id}` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    #[serde(default)]
    pub control: Option<ControlRef>,
    pub status: ScanStatus,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
    #[serde(default)]
    pub progress_percentage: Option<u32>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub results: Vec<ScanResult>,
    #[serde(default)]
    pub gaps: Vec<Gap>,
}

/// Entry of `GET /api/controls/{id}/scans`, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// `POST /api/controls/{id}/scan` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedScan {
    pub scan_id: String,
    #[serde(default = "pending_status")]
    pub status: ScanStatus,
    #[serde(default)]
    pub message: Option<String>,
}

fn pending_status() -> ScanStatus {
    ScanStatus::Pending
}

// =============================================================================
// AI SETTINGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for AiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown AI provider '{other}' (expected 'openai' or 'ollama')")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    pub provider: AiProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub status: String,
    #[serde(default)]
    pub test_response: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

// =============================================================================
// AI ANALYSIS (gateway route handlers)
// =============================================================================

/// A control offered to the AI (or the local heuristics) as a mapping target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCandidate {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unknown_framework")]
    pub framework: String,
}

impl From<&Control> for ControlCandidate {
    fn from(control: &Control) -> Self {
        Self {
            code: control.code.clone(),
            title: control.title.clone(),
            description: control.description.clone().unwrap_or_default(),
            framework: control.framework_name.clone().unwrap_or_else(unknown_framework),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeTextRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeImageRequest {
    /// Base64-encoded image bytes.
    pub image: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub suggestions: Vec<ControlSuggestion>,
    pub source: SuggestionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

// =============================================================================
// LIST ENVELOPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct FrameworkList {
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ControlList {
    #[serde(default)]
    pub controls: Vec<Control>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentList {
    #[serde(default)]
    pub documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvidenceList {
    #[serde(default)]
    pub evidence: Vec<EvidenceLink>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScanList {
    #[serde(default)]
    pub scans: Vec<ScanSummary>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
