//! Scripted `ComplianceBackend` for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::types::{
    AiStatus, Control, ControlRef, Document, Scan, ScanStatus, ScanSummary, StartedScan, UploadedDocument,
};
use crate::api::{ApiError, ComplianceBackend};

/// Produces the response for the n-th call (0-based) with a given key.
type Script<T> = Box<dyn Fn(&str, usize) -> Result<T, ApiError> + Send + Sync>;

#[derive(Debug, Default, Clone)]
pub(crate) struct Calls {
    pub uploads: Vec<(String, Instant)>,
    pub ai_polls: Vec<(String, Instant)>,
    pub scan_polls: Vec<(String, Instant)>,
    pub started: Vec<String>,
}

pub(crate) struct FakeBackend {
    upload_delay: Duration,
    upload: Option<Script<UploadedDocument>>,
    ai_status: Option<Script<AiStatus>>,
    start_scan: Option<Script<StartedScan>>,
    scan: Option<Script<Scan>>,
    controls: Vec<Control>,
    control_scans: HashMap<String, Vec<ScanSummary>>,
    counts: Mutex<HashMap<String, usize>>,
    calls: Mutex<Calls>,
}

fn unscripted(what: &str) -> ApiError {
    ApiError::Client(format!("{what} not scripted"))
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            upload_delay: Duration::ZERO,
            upload: None,
            ai_status: None,
            start_scan: None,
            scan: None,
            controls: Vec::new(),
            control_scans: HashMap::new(),
            counts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn on_upload(
        mut self,
        f: impl Fn(&str, usize) -> Result<UploadedDocument, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.upload = Some(Box::new(f));
        self
    }

    pub fn on_ai_status(
        mut self,
        f: impl Fn(&str, usize) -> Result<AiStatus, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.ai_status = Some(Box::new(f));
        self
    }

    pub fn on_start_scan(
        mut self,
        f: impl Fn(&str, usize) -> Result<StartedScan, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.start_scan = Some(Box::new(f));
        self
    }

    pub fn on_scan(mut self, f: impl Fn(&str, usize) -> Result<Scan, ApiError> + Send + Sync + 'static) -> Self {
        self.scan = Some(Box::new(f));
        self
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_control_scans(mut self, control_id: &str, scans: Vec<ScanSummary>) -> Self {
        self.control_scans.insert(control_id.to_string(), scans);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    /// Calls so far for `kind`/`key`, then bumps the counter.
    fn next(&self, kind: &str, key: &str) -> usize {
        let mut counts = self.counts.lock().unwrap();
        let n = counts.entry(format!("{kind}:{key}")).or_insert(0);
        let current = *n;
        *n += 1;
        current
    }
}

#[async_trait::async_trait]
impl ComplianceBackend for FakeBackend {
    async fn upload_document(
        &self,
        filename: &str,
        _bytes: Vec<u8>,
        _mime_type: &str,
    ) -> Result<UploadedDocument, ApiError> {
        self.calls.lock().unwrap().uploads.push((filename.to_string(), Instant::now()));
        let n = self.next("upload", filename);
        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }
        self.upload.as_ref().map_or_else(|| Err(unscripted("upload")), |f| f(filename, n))
    }

    async fn ai_status(&self, document_id: &str) -> Result<AiStatus, ApiError> {
        self.calls.lock().unwrap().ai_polls.push((document_id.to_string(), Instant::now()));
        let n = self.next("ai", document_id);
        self.ai_status.as_ref().map_or_else(|| Err(unscripted("ai_status")), |f| f(document_id, n))
    }

    async fn start_scan(&self, control_id: &str) -> Result<StartedScan, ApiError> {
        self.calls.lock().unwrap().started.push(control_id.to_string());
        let n = self.next("start", control_id);
        self.start_scan.as_ref().map_or_else(|| Err(unscripted("start_scan")), |f| f(control_id, n))
    }

    async fn scan(&self, scan_id: &str) -> Result<Scan, ApiError> {
        self.calls.lock().unwrap().scan_polls.push((scan_id.to_string(), Instant::now()));
        let n = self.next("scan", scan_id);
        self.scan.as_ref().map_or_else(|| Err(unscripted("scan")), |f| f(scan_id, n))
    }

    async fn controls(&self, _framework_id: &str) -> Result<Vec<Control>, ApiError> {
        Ok(self.controls.clone())
    }

    async fn control_scans(&self, control_id: &str) -> Result<Vec<ScanSummary>, ApiError> {
        Ok(self.control_scans.get(control_id).cloned().unwrap_or_default())
    }
}

pub(crate) fn uploaded(id: &str, filename: &str) -> UploadedDocument {
    UploadedDocument {
        document: Document {
            id: id.into(),
            filename: filename.into(),
            mime_type: Some("application/pdf".into()),
            file_size: Some(1024),
            sha256: None,
            created_at: Some("2025-03-01T10:00:00".into()),
            download_url: None,
        },
        suggested_controls: Vec::new(),
    }
}

pub(crate) fn scan(id: &str, status: ScanStatus, progress: Option<u32>, step: Option<&str>) -> Scan {
    Scan {
        id: id.into(),
        control: Some(ControlRef { id: "c7".into(), code: "EE-7".into(), title: "Multi-Factor Authentication".into() }),
        status,
        model: Some("gpt-4o-mini".into()),
        prompt_version: Some("v1".into()),
        progress_percentage: progress,
        current_step: step.map(str::to_string),
        created_at: Some("2025-03-01T10:00:00".into()),
        updated_at: Some("2025-03-01T10:05:00".into()),
        results: Vec::new(),
        gaps: Vec::new(),
    }
}

pub(crate) fn not_found() -> ApiError {
    ApiError::Status { status: 404, detail: "Not found".into() }
}
