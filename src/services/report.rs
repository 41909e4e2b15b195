//! Framework compliance report and its CSV export.
//!
//! One row per control, summarizing the control's most recent completed
//! scan, followed by a gap-detail section when any gaps were found.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::types::{Control, Outcome, Scan, ScanStatus};
use crate::api::{ApiError, ComplianceBackend};
use crate::format;

pub const SUMMARY_HEADER: [&str; 5] = ["Control", "Status", "Requirements Scanned", "Gaps Found", "Last Scan"];
pub const GAP_HEADER: [&str; 4] = ["Control", "Requirement", "Gap Summary", "Recommended Actions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    NotScanned,
}

impl ComplianceStatus {
    /// Derive the status from a completed scan's outcomes.
    #[must_use]
    pub fn from_scan(scan: Option<&Scan>) -> Self {
        let Some(scan) = scan else {
            return Self::NotScanned;
        };
        let outcomes: Vec<Outcome> = scan.results.iter().map(|r| r.outcome).collect();
        if !outcomes.is_empty() && outcomes.iter().all(|o| *o == Outcome::Pass) {
            Self::Compliant
        } else if outcomes.iter().any(|o| matches!(o, Outcome::Pass | Outcome::Partial)) {
            Self::PartiallyCompliant
        } else {
            Self::NonCompliant
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::PartiallyCompliant => "Partially Compliant",
            Self::NonCompliant => "Non-Compliant",
            Self::NotScanned => "Not Scanned",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlReport {
    pub control: Control,
    /// Most recent completed scan, if any.
    pub scan: Option<Scan>,
}

impl ControlReport {
    #[must_use]
    pub fn status(&self) -> ComplianceStatus {
        ComplianceStatus::from_scan(self.scan.as_ref())
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {}", self.control.code, self.control.title)
    }

    fn last_scan(&self) -> String {
        self.scan
            .as_ref()
            .and_then(|s| s.updated_at.as_deref().or(s.created_at.as_deref()))
            .map(format::timestamp)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceReport {
    pub framework_id: String,
    pub generated_at: DateTime<Utc>,
    pub controls: Vec<ControlReport>,
}

/// Load every control of a framework with its latest completed scan.
///
/// A control whose scan history cannot be fetched is reported as not
/// scanned rather than failing the whole report.
///
/// # Errors
///
/// Returns an error if the framework's controls cannot be listed.
pub async fn build_report(backend: &dyn ComplianceBackend, framework_id: &str) -> Result<ComplianceReport, ApiError> {
    let controls = backend.controls(framework_id).await?;
    let mut rows = Vec::with_capacity(controls.len());
    for control in controls {
        let scan = match latest_completed_scan(backend, &control.id).await {
            Ok(scan) => scan,
            Err(e) => {
                warn!(control = %control.code, error = %e, "scan history unavailable");
                None
            }
        };
        rows.push(ControlReport { control, scan });
    }
    Ok(ComplianceReport { framework_id: framework_id.to_string(), generated_at: Utc::now(), controls: rows })
}

async fn latest_completed_scan(backend: &dyn ComplianceBackend, control_id: &str) -> Result<Option<Scan>, ApiError> {
    let history = backend.control_scans(control_id).await?;
    let Some(summary) = history.iter().find(|s| s.status == ScanStatus::Completed) else {
        return Ok(None);
    };
    backend.scan(&summary.id).await.map(Some)
}

// =============================================================================
// CSV
// =============================================================================

/// Quote a field when it contains a comma, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut row = fields
        .iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

#[must_use]
pub fn to_csv(report: &ComplianceReport) -> String {
    let mut out = csv_row(&SUMMARY_HEADER);
    for row in &report.controls {
        let (results, gaps) = row
            .scan
            .as_ref()
            .map_or((0, 0), |s| (s.results.len(), s.gaps.len()));
        out.push_str(&csv_row(&[
            row.label(),
            row.status().label().to_string(),
            results.to_string(),
            gaps.to_string(),
            row.last_scan(),
        ]));
    }

    let gap_rows: Vec<String> = report
        .controls
        .iter()
        .filter_map(|row| row.scan.as_ref().map(|scan| (row, scan)))
        .flat_map(|(row, scan)| {
            scan.gaps.iter().map(move |gap| {
                let actions = gap
                    .recommended_actions
                    .iter()
                    .map(|a| format!("[{}] {}", a.priority.as_str(), a.title))
                    .collect::<Vec<_>>()
                    .join("; ");
                csv_row(&[row.label(), gap.requirement.req_code.clone(), gap.summary.clone(), actions])
            })
        })
        .collect();

    if !gap_rows.is_empty() {
        out.push('\n');
        out.push_str(&csv_row(&GAP_HEADER));
        for row in gap_rows {
            out.push_str(&row);
        }
    }
    out
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
