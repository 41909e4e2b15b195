//! Display helpers shared by CLI output and reports.

use chrono::{DateTime, NaiveDateTime};

use crate::api::types::{Outcome, ScanStatus};

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Human-readable byte count: `512 B`, `1.5 KB`, `12.0 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `0.87` -> `87%`. Out-of-range values are clamped.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn confidence(value: f64) -> String {
    let pct = (value.clamp(0.0, 1.0) * 100.0).round() as u32;
    format!("{pct}%")
}

/// Render a backend timestamp as `YYYY-MM-DD HH:MM`.
///
/// The backend emits naive ISO timestamps (optionally with fractional
/// seconds); RFC 3339 with an offset is accepted too. Unparseable input is
/// returned unchanged.
#[must_use]
pub fn timestamp(raw: &str) -> String {
    const OUT: &str = "%Y-%m-%d %H:%M";
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(OUT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.format(OUT).to_string();
        }
    }
    raw.to_string()
}

#[must_use]
pub fn optional_timestamp(raw: Option<&str>) -> String {
    raw.map(timestamp).unwrap_or_default()
}

#[must_use]
pub fn scan_status_label(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Pending => "Pending",
        ScanStatus::Running => "Running",
        ScanStatus::Processing => "Processing",
        ScanStatus::Completed => "Completed",
        ScanStatus::Failed => "Failed",
        ScanStatus::Unknown => "Unknown",
    }
}

#[must_use]
pub fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "Pass",
        Outcome::Partial => "Partial",
        Outcome::Fail => "Fail",
        Outcome::NotFound => "Not Found",
        Outcome::Unknown => "Unknown",
    }
}

/// Fixed-width text progress bar, e.g. `[#####-----] 50%`.
#[must_use]
pub fn progress_bar(percent: u32, width: usize) -> String {
    let percent = percent.min(100);
    let filled = (percent as usize * width) / 100;
    format!("[{}{}] {percent}%", "#".repeat(filled), "-".repeat(width - filled))
}

#[cfg(test)]
#[path = "format_test.rs"]
mod tests;
