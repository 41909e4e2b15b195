//! Frameworks, controls, scans and reports.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use super::{CliContext, CliError, print_json, print_table};
use crate::api::types::Scan;
use crate::format;
use crate::services::report;
use crate::services::scan::{self, ScanPolling, ScanProgress, ScanWatcher, WatchUpdate};

const PROGRESS_WIDTH: usize = 30;

#[derive(Args, Debug)]
pub(crate) struct ScanArgs {
    control_id: String,

    /// Return once the scan is started; `scans watch` reports the result.
    #[arg(long, default_value_t = false)]
    no_wait: bool,

    #[arg(long, default_value_t = scan::DEFAULT_POLL_INTERVAL_SECS)]
    poll_secs: u64,

    #[arg(long, default_value_t = scan::DEFAULT_MAX_POLL_ATTEMPTS)]
    max_attempts: u32,
}

#[derive(Args, Debug)]
pub(crate) struct ScansCommand {
    #[command(subcommand)]
    command: ScansSubcommand,
}

#[derive(Subcommand, Debug)]
enum ScansSubcommand {
    /// Scan history for a control, newest first.
    List { control_id: String },
    /// Results and gaps of one scan.
    Show { scan_id: String },
    /// Scans started here that have not been seen finishing.
    Running,
    /// Poll running scans until all of them finish.
    Watch {
        #[arg(long, default_value_t = scan::DEFAULT_WATCH_INTERVAL_SECS)]
        interval_secs: u64,
    },
}

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    framework_id: String,

    /// Write the CSV here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

// =============================================================================
// CATALOG
// =============================================================================

pub(crate) async fn frameworks(ctx: &CliContext) -> Result<(), CliError> {
    let frameworks = ctx.client()?.frameworks().await?;
    if ctx.json {
        return print_json(&frameworks);
    }
    let rows: Vec<Vec<String>> = frameworks
        .iter()
        .map(|f| vec![f.id.clone(), f.name.clone(), f.version.clone().unwrap_or_default()])
        .collect();
    print_table(&["ID", "NAME", "VERSION"], &rows);
    Ok(())
}

pub(crate) async fn controls(ctx: &CliContext, framework_id: &str) -> Result<(), CliError> {
    let controls = ctx.client()?.list_controls(framework_id).await?;
    if ctx.json {
        return print_json(&controls);
    }
    let rows: Vec<Vec<String>> = controls
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.code.clone(),
                c.title.clone(),
                c.requirements_count.map_or_else(|| c.requirements.len().to_string(), |n| n.to_string()),
                c.linked_documents_count.unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "CODE", "TITLE", "REQS", "DOCS"], &rows);
    Ok(())
}

pub(crate) async fn control(ctx: &CliContext, control_id: &str) -> Result<(), CliError> {
    let client = ctx.client()?;
    let control = client.control(control_id).await?;
    let evidence = client.control_evidence(control_id).await?;
    let scans = client.list_control_scans(control_id).await?;

    if ctx.json {
        return print_json(&serde_json::json!({
            "control": control,
            "evidence": evidence,
            "scans": scans,
        }));
    }

    println!("{} - {}", control.code, control.title);
    if let Some(description) = control.description.as_deref().filter(|d| !d.is_empty()) {
        println!("{description}");
    }
    println!();
    println!("Requirements");
    let rows: Vec<Vec<String>> = control
        .requirements
        .iter()
        .map(|r| {
            vec![
                r.req_code.clone(),
                r.maturity_level.map(|m| format!("ML{m}")).unwrap_or_default(),
                r.text.clone(),
            ]
        })
        .collect();
    print_table(&["CODE", "LEVEL", "TEXT"], &rows);

    println!();
    println!("Evidence");
    let rows: Vec<Vec<String>> = evidence
        .iter()
        .map(|e| {
            vec![
                e.document.filename.clone(),
                e.requirement.as_ref().map(|r| r.req_code.clone()).unwrap_or_default(),
                if e.is_ai_linked { "ai".to_string() } else { "manual".to_string() },
                e.confidence.map(format::confidence).unwrap_or_default(),
                format::optional_timestamp(e.created_at.as_deref()),
            ]
        })
        .collect();
    print_table(&["DOCUMENT", "REQUIREMENT", "LINK", "CONFIDENCE", "ADDED"], &rows);

    println!();
    println!("Recent scans");
    let rows: Vec<Vec<String>> = scans
        .iter()
        .take(5)
        .map(|s| {
            vec![
                s.id.clone(),
                format::scan_status_label(s.status).to_string(),
                format::optional_timestamp(s.created_at.as_deref()),
            ]
        })
        .collect();
    print_table(&["SCAN", "STATUS", "STARTED"], &rows);
    Ok(())
}

// =============================================================================
// SCANS
// =============================================================================

pub(crate) async fn scan_control(ctx: &CliContext, args: ScanArgs) -> Result<(), CliError> {
    let client = ctx.client()?;
    let store = ctx.store();
    let control = client.control(&args.control_id).await?;

    if args.no_wait {
        let started = scan::start_scan(&client, &store, &control.id, &control.code).await?;
        if ctx.json {
            return print_json(&started);
        }
        println!("started scan {} for {}", started.scan_id, control.code);
        return Ok(());
    }

    let polling = ScanPolling { interval: Duration::from_secs(args.poll_secs), max_attempts: args.max_attempts };
    let interactive = !ctx.json;
    let result = scan::run_scan(&client, &store, &control.id, &control.code, polling, &mut |p: &ScanProgress| {
        if interactive {
            print_progress(p);
        }
    })
    .await;
    if interactive {
        eprintln!();
    }
    let scan = result?;

    if ctx.json {
        return print_json(&scan);
    }
    print_scan(&scan);
    Ok(())
}

fn print_progress(progress: &ScanProgress) {
    let bar = format::progress_bar(progress.percent.unwrap_or_default(), PROGRESS_WIDTH);
    let step = progress.step.as_deref().unwrap_or_else(|| format::scan_status_label(progress.status));
    let mut stderr = std::io::stderr();
    // Overwrite the line; a failed write only loses the progress display.
    let _ = write!(stderr, "\r\x1b[2K{bar} {step}");
    let _ = stderr.flush();
}

pub(crate) async fn run_scans(ctx: &CliContext, cmd: ScansCommand) -> Result<(), CliError> {
    match cmd.command {
        ScansSubcommand::List { control_id } => {
            let scans = ctx.client()?.list_control_scans(&control_id).await?;
            if ctx.json {
                return print_json(&scans);
            }
            let rows: Vec<Vec<String>> = scans
                .iter()
                .map(|s| {
                    vec![
                        s.id.clone(),
                        format::scan_status_label(s.status).to_string(),
                        s.model.clone().unwrap_or_default(),
                        format::optional_timestamp(s.created_at.as_deref()),
                        format::optional_timestamp(s.updated_at.as_deref()),
                    ]
                })
                .collect();
            print_table(&["SCAN", "STATUS", "MODEL", "STARTED", "UPDATED"], &rows);
            Ok(())
        }
        ScansSubcommand::Show { scan_id } => {
            let scan = ctx.client()?.get_scan(&scan_id).await?;
            if ctx.json {
                return print_json(&scan);
            }
            print_scan(&scan);
            Ok(())
        }
        ScansSubcommand::Running => {
            let running = scan::running(&ctx.store())?;
            if ctx.json {
                return print_json(&running);
            }
            let rows: Vec<Vec<String>> = running
                .iter()
                .map(|s| {
                    vec![
                        s.scan_id.clone(),
                        s.control_code.clone(),
                        s.started_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            print_table(&["SCAN", "CONTROL", "STARTED"], &rows);
            Ok(())
        }
        ScansSubcommand::Watch { interval_secs } => {
            let client = ctx.client()?;
            let store = ctx.store();
            let json = ctx.json;
            ScanWatcher::new(&client, &store)
                .with_interval(Duration::from_secs(interval_secs))
                .run(&mut |update: &WatchUpdate| print_watch_update(update, json))
                .await?;
            Ok(())
        }
    }
}

fn print_watch_update(update: &WatchUpdate, json: bool) {
    if json {
        let line = match update {
            WatchUpdate::Progress { scan, status, percent, step } => serde_json::json!({
                "scan_id": scan.scan_id, "event": "progress", "status": status, "percent": percent, "step": step,
            }),
            WatchUpdate::Finished { scan, status } => {
                serde_json::json!({ "scan_id": scan.scan_id, "event": "finished", "status": status })
            }
            WatchUpdate::Missing { scan } => serde_json::json!({ "scan_id": scan.scan_id, "event": "missing" }),
            WatchUpdate::Unreachable { scan, message } => {
                serde_json::json!({ "scan_id": scan.scan_id, "event": "unreachable", "error": message })
            }
        };
        println!("{line}");
        return;
    }
    match update {
        WatchUpdate::Progress { scan, status, percent, step } => println!(
            "{} {}: {} {}",
            scan.control_code,
            scan.scan_id,
            format::progress_bar(percent.unwrap_or_default(), PROGRESS_WIDTH),
            step.as_deref().unwrap_or_else(|| format::scan_status_label(*status)),
        ),
        WatchUpdate::Finished { scan, status } => {
            println!("{} {}: {}", scan.control_code, scan.scan_id, format::scan_status_label(*status));
        }
        WatchUpdate::Missing { scan } => println!("{} {}: no longer exists", scan.control_code, scan.scan_id),
        WatchUpdate::Unreachable { scan, message } => {
            println!("{} {}: status unavailable ({message})", scan.control_code, scan.scan_id);
        }
    }
}

fn print_scan(scan: &Scan) {
    let control = scan
        .control
        .as_ref()
        .map(|c| format!("{} - {}", c.code, c.title))
        .unwrap_or_default();
    println!("Scan {} {}", scan.id, control);
    println!(
        "Status: {}  Model: {}  Updated: {}",
        format::scan_status_label(scan.status),
        scan.model.as_deref().unwrap_or("-"),
        format::optional_timestamp(scan.updated_at.as_deref()),
    );

    println!();
    println!("Results");
    let rows: Vec<Vec<String>> = scan
        .results
        .iter()
        .map(|r| {
            vec![
                r.requirement.req_code.clone(),
                format::outcome_label(r.outcome).to_string(),
                format::confidence(r.confidence),
                r.citations.len().to_string(),
                r.rationale_text(),
            ]
        })
        .collect();
    print_table(&["REQUIREMENT", "OUTCOME", "CONFIDENCE", "CITATIONS", "RATIONALE"], &rows);

    if scan.gaps.is_empty() {
        return;
    }
    println!();
    println!("Gaps");
    for gap in &scan.gaps {
        println!("{}: {}", gap.requirement.req_code, gap.summary);
        for action in &gap.recommended_actions {
            println!("  [{}] {}", action.priority.as_str(), action.title);
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

pub(crate) async fn export_report(ctx: &CliContext, args: ReportArgs) -> Result<(), CliError> {
    let client = ctx.client()?;
    let report = report::build_report(&client, &args.framework_id).await?;
    let csv = report::to_csv(&report);

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, csv)
                .await
                .map_err(|source| CliError::Io { path: path.clone(), source })?;
            eprintln!("wrote {} controls to {}", report.controls.len(), path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}
