//! Compliance scans: trigger, poll to completion, and watch running scans.
//!
//! DESIGN
//! ======
//! The backend runs a scan as a background job. `run_scan` starts it and
//! polls `GET /api/scans/{id}` at a fixed interval for a bounded number of
//! attempts. A failed fetch is logged and still counts as an attempt, so
//! the bound holds no matter how flaky the network is.
//!
//! Started scans are recorded under the `running_scans` store key until
//! they reach a terminal state. `ScanWatcher` sweeps that list on its own
//! interval so scans started from another invocation (or abandoned by a
//! timed-out poll) still get reported and cleaned up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::types::{Scan, ScanStatus, StartedScan};
use crate::api::{ApiError, ComplianceBackend};
use crate::store::{KvStore, RUNNING_SCANS_KEY, StoreError, read_list, write_list};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 600;
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("could not start scan: {0}")]
    Start(#[source] ApiError),
    #[error("scan {scan_id} failed: {reason}")]
    Failed { scan_id: String, reason: String },
    #[error("scan {0} no longer exists")]
    NotFound(String),
    #[error("scan {scan_id} did not finish after {attempts} status checks")]
    TimedOut { scan_id: String, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ScanPolling {
    fn default() -> Self {
        Self { interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS), max_attempts: DEFAULT_MAX_POLL_ATTEMPTS }
    }
}

/// A scan this machine started and has not yet seen finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningScan {
    pub scan_id: String,
    pub control_id: String,
    #[serde(default)]
    pub control_code: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub attempt: u32,
    pub status: ScanStatus,
    pub percent: Option<u32>,
    pub step: Option<String>,
}

// =============================================================================
// RUNNING-SCAN TRACKING
// =============================================================================

/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn running(store: &dyn KvStore) -> Result<Vec<RunningScan>, StoreError> {
    read_list(store, RUNNING_SCANS_KEY)
}

/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn track(store: &dyn KvStore, scan: RunningScan) -> Result<(), StoreError> {
    let mut all = running(store)?;
    all.retain(|s| s.scan_id != scan.scan_id);
    all.push(scan);
    write_list(store, RUNNING_SCANS_KEY, &all)
}

/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn untrack(store: &dyn KvStore, scan_id: &str) -> Result<(), StoreError> {
    let mut all = running(store)?;
    let before = all.len();
    all.retain(|s| s.scan_id != scan_id);
    if all.len() == before {
        return Ok(());
    }
    write_list(store, RUNNING_SCANS_KEY, &all)
}

// =============================================================================
// TRIGGER & POLL
// =============================================================================

/// Start a scan for `control_id` and record it as running.
///
/// # Errors
///
/// Returns [`ScanError::Start`] when the backend refuses, or a store error.
pub async fn start_scan(
    backend: &dyn ComplianceBackend,
    store: &dyn KvStore,
    control_id: &str,
    control_code: &str,
) -> Result<StartedScan, ScanError> {
    let started = backend.start_scan(control_id).await.map_err(ScanError::Start)?;
    info!(scan_id = %started.scan_id, %control_id, "scan started");
    track(
        store,
        RunningScan {
            scan_id: started.scan_id.clone(),
            control_id: control_id.to_string(),
            control_code: control_code.to_string(),
            started_at: Utc::now(),
        },
    )?;
    Ok(started)
}

/// Poll `scan_id` until it completes, fails, disappears, or the attempt
/// budget runs out.
///
/// # Errors
///
/// Returns [`ScanError::Failed`], [`ScanError::NotFound`] or
/// [`ScanError::TimedOut`]; a timed-out scan stays tracked as running.
pub async fn poll_scan(
    backend: &dyn ComplianceBackend,
    store: &dyn KvStore,
    scan_id: &str,
    polling: ScanPolling,
    on_progress: &mut (dyn FnMut(&ScanProgress) + Send),
) -> Result<Scan, ScanError> {
    for attempt in 1..=polling.max_attempts {
        match backend.scan(scan_id).await {
            Ok(scan) => {
                on_progress(&ScanProgress {
                    attempt,
                    status: scan.status,
                    percent: scan.progress_percentage,
                    step: scan.current_step.clone(),
                });
                match scan.status {
                    ScanStatus::Completed => {
                        untrack(store, scan_id)?;
                        info!(%scan_id, results = scan.results.len(), gaps = scan.gaps.len(), "scan completed");
                        return Ok(scan);
                    }
                    ScanStatus::Failed => {
                        untrack(store, scan_id)?;
                        let reason = scan
                            .current_step
                            .filter(|s| !s.trim().is_empty())
                            .unwrap_or_else(|| "Scan failed".to_string());
                        return Err(ScanError::Failed { scan_id: scan_id.to_string(), reason });
                    }
                    _ => {}
                }
            }
            Err(e) if e.is_not_found() => {
                untrack(store, scan_id)?;
                return Err(ScanError::NotFound(scan_id.to_string()));
            }
            Err(e) => warn!(%scan_id, attempt, error = %e, "scan status fetch failed"),
        }
        if attempt < polling.max_attempts {
            tokio::time::sleep(polling.interval).await;
        }
    }
    warn!(%scan_id, attempts = polling.max_attempts, "scan polling gave up");
    Err(ScanError::TimedOut { scan_id: scan_id.to_string(), attempts: polling.max_attempts })
}

/// Start a scan and poll it to a terminal state.
///
/// # Errors
///
/// See [`start_scan`] and [`poll_scan`].
pub async fn run_scan(
    backend: &dyn ComplianceBackend,
    store: &dyn KvStore,
    control_id: &str,
    control_code: &str,
    polling: ScanPolling,
    on_progress: &mut (dyn FnMut(&ScanProgress) + Send),
) -> Result<Scan, ScanError> {
    let started = start_scan(backend, store, control_id, control_code).await?;
    poll_scan(backend, store, &started.scan_id, polling, on_progress).await
}

// =============================================================================
// WATCHER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchUpdate {
    Progress { scan: RunningScan, status: ScanStatus, percent: Option<u32>, step: Option<String> },
    Finished { scan: RunningScan, status: ScanStatus },
    /// The backend no longer knows the scan (404); it was dropped from tracking.
    Missing { scan: RunningScan },
    /// The fetch failed; the scan stays tracked for the next sweep.
    Unreachable { scan: RunningScan, message: String },
}

pub struct ScanWatcher<'a> {
    backend: &'a dyn ComplianceBackend,
    store: &'a dyn KvStore,
    interval: Duration,
}

impl<'a> ScanWatcher<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn ComplianceBackend, store: &'a dyn KvStore) -> Self {
        Self { backend, store, interval: Duration::from_secs(DEFAULT_WATCH_INTERVAL_SECS) }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch every tracked scan once and prune the finished ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the running-scan list cannot be read or written.
    pub async fn sweep_once(&self) -> Result<Vec<WatchUpdate>, StoreError> {
        let tracked = running(self.store)?;
        let mut updates = Vec::with_capacity(tracked.len());
        for scan in tracked {
            let update = match self.backend.scan(&scan.scan_id).await {
                Ok(fetched) if fetched.status.is_terminal() => {
                    untrack(self.store, &scan.scan_id)?;
                    WatchUpdate::Finished { scan, status: fetched.status }
                }
                Ok(fetched) => WatchUpdate::Progress {
                    scan,
                    status: fetched.status,
                    percent: fetched.progress_percentage,
                    step: fetched.current_step,
                },
                Err(e) if e.is_not_found() => {
                    untrack(self.store, &scan.scan_id)?;
                    WatchUpdate::Missing { scan }
                }
                Err(e) => {
                    warn!(scan_id = %scan.scan_id, error = %e, "watcher fetch failed");
                    WatchUpdate::Unreachable { scan, message: e.to_string() }
                }
            };
            updates.push(update);
        }
        Ok(updates)
    }

    /// Sweep until no tracked scans remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the running-scan list cannot be read or written.
    pub async fn run(&self, on_update: &mut (dyn FnMut(&WatchUpdate) + Send)) -> Result<(), StoreError> {
        loop {
            if running(self.store)?.is_empty() {
                return Ok(());
            }
            for update in self.sweep_once().await? {
                on_update(&update);
            }
            if running(self.store)?.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod tests;
