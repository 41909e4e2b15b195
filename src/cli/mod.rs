//! Command-line interface.
//!
//! DESIGN
//! ======
//! One subcommand per console screen: frameworks and controls, uploads,
//! documents, scans, templates, mappings, reports, AI settings, plus
//! `serve` for the gateway. Human-readable output goes to stdout (or JSON
//! with `--json`); logs go to stderr so output stays pipeable.

mod controls;
mod documents;
mod settings;
mod templates;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::config::AppConfig;
use crate::services::scan::ScanError;
use crate::services::templates::TemplateError;
use crate::state::AppState;
use crate::store::{FileStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value '{0}': expected key=value")]
    InvalidValue(String),
    #[error("{0}")]
    Usage(String),
    #[error("gateway failed: {0}")]
    Serve(String),
    #[error("{failed} of {total} uploads failed")]
    UploadsFailed { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(name = "compliance", version, about = "Compliance evidence console and API gateway")]
pub struct Cli {
    /// Base URL serving `/api/*` (the gateway).
    #[arg(long, global = true, env = "NEXT_PUBLIC_API_URL")]
    api_url: Option<String>,

    /// Directory holding templates, mappings and running scans.
    #[arg(long, global = true, env = "COMPLIANCE_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway in front of the backend.
    Serve(ServeArgs),
    /// Check that the gateway answers.
    Ping,
    /// List compliance frameworks.
    Frameworks,
    /// List a framework's controls.
    Controls { framework_id: String },
    /// Show a control with requirements, evidence and recent scans.
    Control { control_id: String },
    /// Upload evidence documents one at a time.
    Upload(documents::UploadArgs),
    /// Attach an uploaded document as evidence for a control.
    Evidence(documents::EvidenceArgs),
    /// Ask the AI which controls a text document supports.
    Analyze(documents::AnalyzeArgs),
    /// Uploaded documents.
    Documents(documents::DocumentsCommand),
    /// AI document-control links.
    Links(documents::LinksCommand),
    /// Start a compliance scan for a control and wait for the result.
    Scan(controls::ScanArgs),
    /// Scan history and running scans.
    Scans(controls::ScansCommand),
    /// Evidence-collection templates (stored locally).
    Templates(templates::TemplatesCommand),
    /// Cached document-control mappings (stored locally).
    Mappings(documents::MappingsCommand),
    /// Export a framework compliance report as CSV.
    Report(controls::ReportArgs),
    /// Backend AI provider settings.
    Settings(settings::SettingsCommand),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Backend base URL that `/api/*` is forwarded to.
    #[arg(long, env = "INTERNAL_API_URL")]
    backend_url: Option<String>,
}

pub(crate) struct CliContext {
    pub config: AppConfig,
    pub json: bool,
}

impl CliContext {
    pub fn client(&self) -> Result<ApiClient, ApiError> {
        ApiClient::new(&self.config.public_api_url, self.config.timeouts)
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(&self.config.store_dir)
    }
}

/// Execute a parsed command line.
///
/// # Errors
///
/// Returns the first error the command hits; the caller prints it and exits non-zero.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::from_env();
    if let Some(url) = cli.api_url {
        config.public_api_url = crate::config::normalize_base_url(&url);
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    let ctx = CliContext { config, json: cli.json };

    match cli.command {
        Command::Serve(args) => run_serve(ctx.config, args).await,
        Command::Ping => run_ping(&ctx).await,
        Command::Frameworks => controls::frameworks(&ctx).await,
        Command::Controls { framework_id } => controls::controls(&ctx, &framework_id).await,
        Command::Control { control_id } => controls::control(&ctx, &control_id).await,
        Command::Upload(args) => documents::upload_files(&ctx, args).await,
        Command::Evidence(args) => documents::add_evidence(&ctx, args).await,
        Command::Analyze(args) => documents::analyze(&ctx, args).await,
        Command::Documents(cmd) => documents::run_documents(&ctx, cmd).await,
        Command::Links(cmd) => documents::run_links(&ctx, cmd).await,
        Command::Scan(args) => controls::scan_control(&ctx, args).await,
        Command::Scans(cmd) => controls::run_scans(&ctx, cmd).await,
        Command::Templates(cmd) => templates::run(&ctx, cmd),
        Command::Mappings(cmd) => documents::run_mappings(&ctx, cmd),
        Command::Report(args) => controls::export_report(&ctx, args).await,
        Command::Settings(cmd) => settings::run(&ctx, cmd).await,
    }
}

async fn run_serve(mut config: AppConfig, args: ServeArgs) -> Result<(), CliError> {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.backend_url {
        config.internal_api_url = crate::config::normalize_base_url(&url);
    }
    let state = AppState::new(&config).map_err(|e| CliError::Serve(e.to_string()))?;
    let app = crate::routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .map_err(|e| CliError::Serve(format!("failed to bind port {}: {e}", config.port)))?;

    info!(port = config.port, backend = %config.internal_api_url, "compliance gateway listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| CliError::Serve(e.to_string()))
}

async fn run_ping(ctx: &CliContext) -> Result<(), CliError> {
    ctx.client()?.ping().await?;
    println!("ok");
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned table with a header row; column widths fit the widest cell.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        println!("(none)");
    } else {
        print!("{}", render_table(headers, rows));
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
