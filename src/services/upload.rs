//! Upload pipeline: sequential evidence uploads followed by AI-link polling.
//!
//! DESIGN
//! ======
//! Files go up strictly one at a time with a fixed pause between them so a
//! batch never floods the backend's OCR and AI workers. Each upload runs
//! under its own deadline; `tokio::time::timeout` drops the request future
//! when it passes, which aborts the transfer. A failed file is reported and
//! the queue moves on.
//!
//! Once the queue drains, AI-status polling runs file by file: one poll in
//! flight at a time, fixed interval, bounded by a per-file deadline. A 404
//! means the document was deleted meanwhile and ends that file's polling.
//!
//! Suggestions returned with the upload are cached as `ai` mappings; when
//! there are none, filename heuristics against the local templates fill in
//! `fallback` mappings. Controls the AI links later are cached as `ai`.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::types::{AiLinkedControl, ControlSuggestion, Document, SuggestionSource};
use crate::api::{ApiError, ComplianceBackend};
use crate::services::mappings::{self, DocumentControlMapping};
use crate::services::{suggest, templates};
use crate::store::KvStore;

pub const DEFAULT_INTER_UPLOAD_DELAY_SECS: u64 = 2;
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_AI_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_AI_POLL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTiming {
    /// Pause between two uploads; none after the last file.
    pub inter_upload_delay: Duration,
    pub upload_timeout: Duration,
    pub ai_poll_interval: Duration,
    /// Per-file bound on AI-status polling.
    pub ai_poll_timeout: Duration,
}

impl Default for UploadTiming {
    fn default() -> Self {
        Self {
            inter_upload_delay: Duration::from_secs(DEFAULT_INTER_UPLOAD_DELAY_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ai_poll_interval: Duration::from_secs(DEFAULT_AI_POLL_INTERVAL_SECS),
            ai_poll_timeout: Duration::from_secs(DEFAULT_AI_POLL_TIMEOUT_SECS),
        }
    }
}

// =============================================================================
// INPUTS & OUTCOMES
// =============================================================================

/// One queued file. `contents` holds the read error when the file could not
/// be loaded; such files are reported as generic failures.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub filename: String,
    pub mime_type: String,
    pub contents: Result<Vec<u8>, String>,
}

impl UploadInput {
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_for_filename(&filename).to_string();
        Self { filename, mime_type, contents: Ok(bytes) }
    }

    pub async fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mime_type = mime_for_filename(&filename).to_string();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| format!("could not read {}: {e}", path.display()));
        Self { filename, mime_type, contents }
    }
}

/// MIME type by extension, limited to what the backend ingests.
#[must_use]
pub fn mime_for_filename(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailureKind {
    Timeout,
    ConnectionLost,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub kind: UploadFailureKind,
    pub message: String,
}

impl UploadFailure {
    fn timed_out(after: Duration) -> Self {
        let secs = after.as_secs();
        let message = if secs >= 60 && secs % 60 == 0 {
            let minutes = secs / 60;
            format!("Upload timed out after {minutes} minute{}", if minutes == 1 { "" } else { "s" })
        } else {
            format!("Upload timed out after {secs} seconds")
        };
        Self { kind: UploadFailureKind::Timeout, message }
    }

    fn classify(error: &ApiError, timeout: Duration) -> Self {
        match error {
            ApiError::Timeout => Self::timed_out(timeout),
            ApiError::Network(_) => Self {
                kind: UploadFailureKind::ConnectionLost,
                message: "Connection lost during upload".to_string(),
            },
            other => Self { kind: UploadFailureKind::Generic, message: format!("Upload failed: {other}") },
        }
    }
}

/// How AI-status polling for one document ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AiLinkOutcome {
    Processed { linked: Vec<AiLinkedControl>, error: Option<String> },
    /// The document disappeared (404) while polling.
    Deleted,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub document: Document,
    pub suggestions: Vec<ControlSuggestion>,
    pub suggestion_source: SuggestionSource,
    /// `None` until polling has run for this file.
    pub ai_link: Option<AiLinkOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Uploaded(UploadedFile),
    Failed(UploadFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub files: Vec<FileReport>,
}

impl UploadSummary {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Uploaded(_)))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }
}

/// Progress notifications for interactive callers.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Uploading { index: usize, total: usize, filename: String },
    Uploaded { filename: String, document_id: String, suggestions: usize },
    Failed { filename: String, failure: UploadFailure },
    PollingAi { filename: String },
    AiResolved { filename: String, outcome: AiLinkOutcome },
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Upload `inputs` in order, then poll AI linking for each uploaded file.
pub async fn upload_all(
    backend: &dyn ComplianceBackend,
    store: &dyn KvStore,
    inputs: Vec<UploadInput>,
    timing: UploadTiming,
    on_event: &mut (dyn FnMut(UploadEvent) + Send),
) -> UploadSummary {
    let total = inputs.len();
    let mut summary = UploadSummary::default();

    for (index, input) in inputs.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(timing.inter_upload_delay).await;
        }
        on_event(UploadEvent::Uploading { index: index + 1, total, filename: input.filename.clone() });
        let filename = input.filename.clone();
        let outcome = upload_one(backend, store, input, timing.upload_timeout).await;
        match &outcome {
            FileOutcome::Uploaded(file) => on_event(UploadEvent::Uploaded {
                filename: filename.clone(),
                document_id: file.document.id.clone(),
                suggestions: file.suggestions.len(),
            }),
            FileOutcome::Failed(failure) => {
                warn!(%filename, kind = ?failure.kind, message = %failure.message, "upload failed");
                on_event(UploadEvent::Failed { filename: filename.clone(), failure: failure.clone() });
            }
        }
        summary.files.push(FileReport { filename, outcome });
    }

    for report in &mut summary.files {
        let FileOutcome::Uploaded(file) = &mut report.outcome else {
            continue;
        };
        on_event(UploadEvent::PollingAi { filename: report.filename.clone() });
        let outcome = poll_ai_link(backend, &file.document.id, timing).await;
        if let AiLinkOutcome::Processed { linked, .. } = &outcome {
            let cached: Vec<DocumentControlMapping> = linked
                .iter()
                .map(|l| DocumentControlMapping::from_ai_link(&file.document.id, &report.filename, l))
                .collect();
            if let Err(e) = mappings::record(store, &cached) {
                warn!(error = %e, document_id = %file.document.id, "failed to cache AI links");
            }
        }
        on_event(UploadEvent::AiResolved { filename: report.filename.clone(), outcome: outcome.clone() });
        file.ai_link = Some(outcome);
    }

    info!(uploaded = summary.succeeded(), failed = summary.failed(), "upload batch finished");
    summary
}

async fn upload_one(
    backend: &dyn ComplianceBackend,
    store: &dyn KvStore,
    input: UploadInput,
    upload_timeout: Duration,
) -> FileOutcome {
    let bytes = match input.contents {
        Ok(bytes) => bytes,
        Err(message) => return FileOutcome::Failed(UploadFailure { kind: UploadFailureKind::Generic, message }),
    };

    let request = backend.upload_document(&input.filename, bytes, &input.mime_type);
    let uploaded = match tokio::time::timeout(upload_timeout, request).await {
        Err(_) => return FileOutcome::Failed(UploadFailure::timed_out(upload_timeout)),
        Ok(Err(e)) => return FileOutcome::Failed(UploadFailure::classify(&e, upload_timeout)),
        Ok(Ok(uploaded)) => uploaded,
    };
    info!(filename = %input.filename, document_id = %uploaded.document.id, "document uploaded");

    let (suggestions, source) = if uploaded.suggested_controls.is_empty() {
        let local = templates::list(store).unwrap_or_else(|e| {
            warn!(error = %e, "could not load templates for fallback suggestions");
            Vec::new()
        });
        (suggest::generate_fallback_suggestions(&input.filename, &local), SuggestionSource::Fallback)
    } else {
        (uploaded.suggested_controls, SuggestionSource::Ai)
    };

    let cached: Vec<DocumentControlMapping> = suggestions
        .iter()
        .map(|s| DocumentControlMapping::from_suggestion(&uploaded.document.id, &input.filename, s, source))
        .collect();
    if let Err(e) = mappings::record(store, &cached) {
        warn!(error = %e, document_id = %uploaded.document.id, "failed to cache suggestions");
    }

    FileOutcome::Uploaded(UploadedFile {
        document: uploaded.document,
        suggestions,
        suggestion_source: source,
        ai_link: None,
    })
}

/// Poll AI status for one document until processed, deleted or timed out.
pub async fn poll_ai_link(backend: &dyn ComplianceBackend, document_id: &str, timing: UploadTiming) -> AiLinkOutcome {
    let poll = async {
        loop {
            match backend.ai_status(document_id).await {
                Ok(status) if status.ai_processed => {
                    return AiLinkOutcome::Processed { linked: status.linked_controls, error: status.ai_error };
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => return AiLinkOutcome::Deleted,
                Err(e) => warn!(%document_id, error = %e, "ai-status poll failed"),
            }
            tokio::time::sleep(timing.ai_poll_interval).await;
        }
    };
    tokio::time::timeout(timing.ai_poll_timeout, poll)
        .await
        .unwrap_or(AiLinkOutcome::TimedOut)
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
