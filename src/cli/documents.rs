//! Evidence uploads, documents, AI links and the local mapping cache.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::{Value, json};

use super::{CliContext, CliError, print_json, print_table};
use crate::api::types::{
    AnalyzeTextRequest, ControlCandidate, ControlSuggestion, Document, LinkEvidenceRequest, SuggestionSource,
};
use crate::format;
use crate::services::mappings::{self, DocumentControlMapping};
use crate::services::{suggest, templates};
use crate::services::upload::{
    self, AiLinkOutcome, FileOutcome, UploadEvent, UploadInput, UploadSummary, UploadTiming,
};

#[derive(Args, Debug)]
pub(crate) struct UploadArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Pause between consecutive uploads.
    #[arg(long, default_value_t = upload::DEFAULT_INTER_UPLOAD_DELAY_SECS)]
    delay_secs: u64,

    /// Per-file upload deadline.
    #[arg(long, default_value_t = upload::DEFAULT_UPLOAD_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[arg(long, default_value_t = upload::DEFAULT_AI_POLL_INTERVAL_SECS)]
    ai_poll_secs: u64,

    /// Give up waiting for AI linking of a file after this long.
    #[arg(long, default_value_t = upload::DEFAULT_AI_POLL_TIMEOUT_SECS)]
    ai_timeout_secs: u64,
}

impl UploadArgs {
    fn timing(&self) -> UploadTiming {
        UploadTiming {
            inter_upload_delay: Duration::from_secs(self.delay_secs),
            upload_timeout: Duration::from_secs(self.timeout_secs),
            ai_poll_interval: Duration::from_secs(self.ai_poll_secs),
            ai_poll_timeout: Duration::from_secs(self.ai_timeout_secs),
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct AnalyzeArgs {
    /// Plain-text document to analyze.
    file: PathBuf,

    /// Offer this framework's controls instead of the local templates.
    #[arg(long)]
    framework_id: Option<String>,

    /// Cache the suggestions as mappings for this uploaded document.
    #[arg(long)]
    document_id: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct EvidenceArgs {
    control_id: String,

    #[arg(long)]
    document_id: String,

    #[arg(long)]
    requirement_id: Option<String>,

    #[arg(long)]
    note: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DocumentsCommand {
    #[command(subcommand)]
    command: DocumentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum DocumentsSubcommand {
    List {
        /// Only documents linked to this control.
        #[arg(long)]
        control_id: Option<String>,
    },
    /// Delete a document and its cached mappings.
    Delete { document_id: String },
    /// Link a document to a control as evidence.
    Link {
        document_id: String,
        #[arg(long)]
        control_id: String,
        #[arg(long)]
        requirement_id: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Args, Debug)]
pub(crate) struct LinksCommand {
    #[command(subcommand)]
    command: LinksSubcommand,
}

#[derive(Subcommand, Debug)]
enum LinksSubcommand {
    /// Remove an AI-created document-control link.
    Delete { link_id: String },
}

#[derive(Args, Debug)]
pub(crate) struct MappingsCommand {
    #[command(subcommand)]
    command: MappingsSubcommand,
}

#[derive(Subcommand, Debug)]
enum MappingsSubcommand {
    List {
        #[arg(long)]
        document: Option<String>,
    },
    Clear,
}

// =============================================================================
// UPLOAD
// =============================================================================

pub(crate) async fn upload_files(ctx: &CliContext, args: UploadArgs) -> Result<(), CliError> {
    let timing = args.timing();
    let client = ctx.client()?;
    let store = ctx.store();

    let mut inputs = Vec::with_capacity(args.files.len());
    for path in &args.files {
        inputs.push(UploadInput::from_path(path).await);
    }

    let json = ctx.json;
    let summary = upload::upload_all(&client, &store, inputs, timing, &mut |event: UploadEvent| {
        if !json {
            println!("{}", upload_event_line(&event));
        }
    })
    .await;

    if json {
        print_json(&summary_json(&summary))?;
    } else {
        println!("{} uploaded, {} failed", summary.succeeded(), summary.failed());
    }

    let failed = summary.failed();
    if failed > 0 {
        return Err(CliError::UploadsFailed { failed, total: summary.files.len() });
    }
    Ok(())
}

/// Progress line for an upload event. `Uploading` indices are 1-based.
pub(crate) fn upload_event_line(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Uploading { index, total, filename } => format!("[{index}/{total}] uploading {filename}"),
        UploadEvent::Uploaded { filename, document_id, suggestions } => {
            format!("  {filename}: stored as {document_id} ({suggestions} suggested controls)")
        }
        UploadEvent::Failed { filename, failure } => format!("  {filename}: {}", failure.message),
        UploadEvent::PollingAi { filename } => format!("waiting for AI linking of {filename}"),
        UploadEvent::AiResolved { filename, outcome } => match outcome {
            AiLinkOutcome::Processed { linked, error: Some(error) } => {
                format!("  {filename}: AI processing failed ({error}); {} linked", linked.len())
            }
            AiLinkOutcome::Processed { linked, error: None } if linked.is_empty() => {
                format!("  {filename}: no controls linked")
            }
            AiLinkOutcome::Processed { linked, error: None } => {
                let codes: Vec<&str> = linked.iter().map(|l| l.control_code.as_str()).collect();
                format!("  {filename}: linked to {}", codes.join(", "))
            }
            AiLinkOutcome::Deleted => format!("  {filename}: document was deleted"),
            AiLinkOutcome::TimedOut => format!("  {filename}: AI linking still pending"),
        },
    }
}

fn suggestion_json(s: &ControlSuggestion) -> Value {
    json!({
        "control_code": s.control_code,
        "control_title": s.control_title,
        "confidence": s.confidence,
        "reasoning": s.reasoning,
    })
}

fn summary_json(summary: &UploadSummary) -> Value {
    let files: Vec<Value> = summary
        .files
        .iter()
        .map(|file| match &file.outcome {
            FileOutcome::Uploaded(up) => {
                let ai = match &up.ai_link {
                    Some(AiLinkOutcome::Processed { linked, error }) => json!({
                        "status": "processed",
                        "linked_controls": linked,
                        "error": error,
                    }),
                    Some(AiLinkOutcome::Deleted) => json!({ "status": "deleted" }),
                    Some(AiLinkOutcome::TimedOut) => json!({ "status": "timed_out" }),
                    None => Value::Null,
                };
                json!({
                    "filename": file.filename,
                    "status": "uploaded",
                    "document": up.document,
                    "suggestion_source": up.suggestion_source,
                    "suggestions": up.suggestions.iter().map(suggestion_json).collect::<Vec<_>>(),
                    "ai": ai,
                })
            }
            FileOutcome::Failed(failure) => json!({
                "filename": file.filename,
                "status": "failed",
                "error": failure.message,
            }),
        })
        .collect();
    json!({ "uploaded": summary.succeeded(), "failed": summary.failed(), "files": files })
}

// =============================================================================
// DOCUMENTS & LINKS
// =============================================================================

pub(crate) async fn run_documents(ctx: &CliContext, cmd: DocumentsCommand) -> Result<(), CliError> {
    let client = ctx.client()?;
    match cmd.command {
        DocumentsSubcommand::List { control_id } => {
            let documents = match control_id {
                Some(id) => client.control_documents(&id).await?,
                None => client.documents().await?,
            };
            let cached = mappings::list(&ctx.store())?;
            if ctx.json {
                return print_json(&annotate_documents(&documents, &cached));
            }
            let rows: Vec<Vec<String>> = documents
                .iter()
                .map(|d| {
                    let controls: Vec<&str> = cached
                        .iter()
                        .filter(|m| m.document_id == d.id)
                        .map(|m| m.control_code.as_str())
                        .collect();
                    vec![
                        d.id.clone(),
                        d.filename.clone(),
                        d.file_size.map(format::file_size).unwrap_or_default(),
                        format::optional_timestamp(d.created_at.as_deref()),
                        controls.join(", "),
                    ]
                })
                .collect();
            print_table(&["ID", "FILENAME", "SIZE", "UPLOADED", "CONTROLS"], &rows);
        }
        DocumentsSubcommand::Delete { document_id } => {
            client.delete_document(&document_id).await?;
            let removed = mappings::remove_for_document(&ctx.store(), &document_id)?;
            if ctx.json {
                return print_json(&deleted_document_json(&document_id, removed));
            }
            println!("deleted {document_id} ({removed} cached mappings removed)");
        }
        DocumentsSubcommand::Link { document_id, control_id, requirement_id, note } => {
            let control = client.control(&control_id).await?;
            let request = LinkEvidenceRequest { control_id: control.id.clone(), requirement_id, note };
            let response = client.link_evidence(&document_id, &request).await?;

            let filename = client
                .documents()
                .await?
                .into_iter()
                .find(|d| d.id == document_id)
                .map(|d| d.filename)
                .unwrap_or_default();
            mappings::record(
                &ctx.store(),
                &[DocumentControlMapping {
                    document_id: document_id.clone(),
                    filename,
                    control_code: control.code.clone(),
                    control_title: control.title.clone(),
                    confidence: 1.0,
                    reasoning: request.note.clone().unwrap_or_default(),
                    source: SuggestionSource::Manual,
                    recorded_at: Utc::now(),
                }],
            )?;

            if ctx.json {
                return print_json(&response);
            }
            println!(
                "{}",
                response.message.unwrap_or_else(|| format!("linked {document_id} to {}", control.code))
            );
        }
    }
    Ok(())
}

pub(crate) fn deleted_document_json(document_id: &str, mappings_removed: usize) -> Value {
    json!({ "deleted": document_id, "mappings_removed": mappings_removed })
}

pub(crate) fn deleted_link_json(link_id: &str) -> Value {
    json!({ "deleted": link_id })
}

pub(crate) async fn add_evidence(ctx: &CliContext, args: EvidenceArgs) -> Result<(), CliError> {
    let response = ctx
        .client()?
        .add_control_evidence(&args.control_id, &args.document_id, args.requirement_id.as_deref(), args.note.as_deref())
        .await?;
    if ctx.json {
        return print_json(&response);
    }
    println!(
        "{}",
        response
            .message
            .unwrap_or_else(|| format!("added {} as evidence for {}", args.document_id, args.control_id))
    );
    Ok(())
}

/// Each document as JSON with a `mappings` array of its cached mappings.
pub(crate) fn annotate_documents(documents: &[Document], cached: &[DocumentControlMapping]) -> Vec<Value> {
    documents
        .iter()
        .map(|d| {
            let mut entry = serde_json::to_value(d).unwrap_or_else(|_| json!({ "id": d.id }));
            let own: Vec<&DocumentControlMapping> = cached.iter().filter(|m| m.document_id == d.id).collect();
            if let Value::Object(fields) = &mut entry {
                fields.insert("mappings".to_string(), json!(own));
            }
            entry
        })
        .collect()
}

pub(crate) async fn run_links(ctx: &CliContext, cmd: LinksCommand) -> Result<(), CliError> {
    match cmd.command {
        LinksSubcommand::Delete { link_id } => {
            ctx.client()?.delete_document_control_link(&link_id).await?;
            if ctx.json {
                return print_json(&deleted_link_json(&link_id));
            }
            println!("deleted link {link_id}");
        }
    }
    Ok(())
}

// =============================================================================
// ANALYSIS
// =============================================================================

pub(crate) async fn analyze(ctx: &CliContext, args: AnalyzeArgs) -> Result<(), CliError> {
    let client = ctx.client()?;
    let store = ctx.store();
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|source| CliError::Io { path: args.file.clone(), source })?;
    let filename = args
        .file
        .file_name()
        .map_or_else(|| args.file.display().to_string(), |n| n.to_string_lossy().into_owned());

    let candidates: Vec<ControlCandidate> = match &args.framework_id {
        Some(framework_id) => client
            .list_controls(framework_id)
            .await?
            .iter()
            .map(ControlCandidate::from)
            .collect(),
        None => templates::list(&store)?
            .iter()
            .map(suggest::candidate_from_template)
            .collect(),
    };
    if candidates.is_empty() {
        return Err(CliError::Usage(
            "no candidate controls: pass --framework-id or import templates first".to_string(),
        ));
    }

    let request = AnalyzeTextRequest {
        prompt: suggest::analysis_prompt(&filename, &text, &candidates),
        max_tokens: None,
        temperature: None,
        filename: Some(filename.clone()),
        controls: candidates,
    };
    let analysis = client.analyze_text(&request).await?;

    if let Some(document_id) = &args.document_id {
        let cached: Vec<DocumentControlMapping> = analysis
            .suggestions
            .iter()
            .map(|s| DocumentControlMapping::from_suggestion(document_id, &filename, s, analysis.source))
            .collect();
        mappings::record(&store, &cached)?;
    }

    if ctx.json {
        return print_json(&analysis);
    }
    println!("source: {}", analysis.source.as_str());
    let rows: Vec<Vec<String>> = analysis
        .suggestions
        .iter()
        .map(|s| {
            vec![
                s.control_code.clone(),
                s.control_title.clone(),
                format::confidence(s.confidence),
                s.reasoning.clone(),
            ]
        })
        .collect();
    print_table(&["CONTROL", "TITLE", "CONFIDENCE", "REASONING"], &rows);
    Ok(())
}

// =============================================================================
// MAPPINGS
// =============================================================================

pub(crate) fn run_mappings(ctx: &CliContext, cmd: MappingsCommand) -> Result<(), CliError> {
    let store = ctx.store();
    match cmd.command {
        MappingsSubcommand::List { document } => {
            let list = match document {
                Some(id) => mappings::for_document(&store, &id)?,
                None => mappings::list(&store)?,
            };
            if ctx.json {
                return print_json(&list);
            }
            let rows: Vec<Vec<String>> = list
                .iter()
                .map(|m| {
                    vec![
                        m.filename.clone(),
                        m.control_code.clone(),
                        m.control_title.clone(),
                        format::confidence(m.confidence),
                        m.source.as_str().to_string(),
                    ]
                })
                .collect();
            print_table(&["DOCUMENT", "CONTROL", "TITLE", "CONFIDENCE", "SOURCE"], &rows);
        }
        MappingsSubcommand::Clear => {
            mappings::clear(&store)?;
            println!("mapping cache cleared");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "documents_test.rs"]
mod tests;
