//! Evidence-collection templates kept in the local store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use super::{CliContext, CliError, print_json, print_table};
use crate::services::templates::{self, Template, TemplateDraft, TemplateError};

#[derive(Args, Debug)]
pub(crate) struct TemplatesCommand {
    #[command(subcommand)]
    command: TemplatesSubcommand,
}

#[derive(Subcommand, Debug)]
enum TemplatesSubcommand {
    List,
    /// Built-in Essential Eight templates available for import.
    Catalog,
    Show { template_id: String },
    /// Create a template from a JSON draft file.
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace a template's content with a JSON draft file.
    Update {
        template_id: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Import catalog templates by control code (e.g. EE-7).
    Import {
        #[arg(required_unless_present = "all")]
        codes: Vec<String>,
        /// Import every catalog template not already present.
        #[arg(long, conflicts_with = "codes")]
        all: bool,
    },
    Delete { template_id: String },
    /// Fill in a template's company fields.
    Submit {
        template_id: String,
        /// Field value as `field_id=value`; repeat per field.
        #[arg(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },
    Submissions { template_id: String },
}

pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(CliError::InvalidValue(raw.to_string()).to_string()),
    }
}

pub(crate) fn run(ctx: &CliContext, cmd: TemplatesCommand) -> Result<(), CliError> {
    let store = ctx.store();
    match cmd.command {
        TemplatesSubcommand::List => {
            let list = templates::list(&store)?;
            if ctx.json {
                return print_json(&list);
            }
            let rows: Vec<Vec<String>> = list
                .iter()
                .map(|t| {
                    vec![
                        t.id.clone(),
                        t.control_code.clone(),
                        t.name.clone(),
                        t.company_fields.len().to_string(),
                        t.evidence_requirements.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "CONTROL", "NAME", "FIELDS", "EVIDENCE"], &rows);
        }
        TemplatesSubcommand::Catalog => {
            let catalog = templates::catalog();
            if ctx.json {
                return print_json(&catalog);
            }
            let rows: Vec<Vec<String>> = catalog
                .iter()
                .map(|d| vec![d.control_code.clone(), d.name.clone(), d.evidence_requirements.len().to_string()])
                .collect();
            print_table(&["CONTROL", "NAME", "EVIDENCE"], &rows);
        }
        TemplatesSubcommand::Show { template_id } => {
            let template = templates::get(&store, &template_id)?;
            if ctx.json {
                return print_json(&template);
            }
            print_template(&template);
        }
        TemplatesSubcommand::Create { file } => {
            let draft = read_draft(&file)?;
            let template = templates::create(&store, draft)?;
            report_saved(ctx, &template, "created")?;
        }
        TemplatesSubcommand::Update { template_id, file } => {
            let draft = read_draft(&file)?;
            let template = templates::update(&store, &template_id, draft)?;
            report_saved(ctx, &template, "updated")?;
        }
        TemplatesSubcommand::Import { codes, all } => {
            let codes = if all {
                templates::catalog().into_iter().map(|d| d.control_code).collect()
            } else {
                codes
            };
            let mut imported = Vec::new();
            for code in codes {
                match templates::import_from_catalog(&store, &code) {
                    Ok(template) => imported.push(template),
                    Err(TemplateError::AlreadyImported(code)) if all => {
                        eprintln!("skipping {code}: already imported");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if ctx.json {
                return print_json(&imported);
            }
            for t in &imported {
                println!("imported {} ({})", t.control_code, t.id);
            }
        }
        TemplatesSubcommand::Delete { template_id } => {
            templates::delete(&store, &template_id)?;
            println!("deleted template {template_id}");
        }
        TemplatesSubcommand::Submit { template_id, values } => {
            let values: BTreeMap<String, String> = values.into_iter().collect();
            let submission = templates::submit(&store, &template_id, values)?;
            if ctx.json {
                return print_json(&submission);
            }
            println!("recorded submission {}", submission.id);
        }
        TemplatesSubcommand::Submissions { template_id } => {
            let template = templates::get(&store, &template_id)?;
            let list = templates::submissions(&store, &template.id)?;
            if ctx.json {
                return print_json(&list);
            }
            for submission in &list {
                println!("{}  {}", submission.id, submission.submitted_at.format("%Y-%m-%d %H:%M"));
                for field in &template.company_fields {
                    if let Some(value) = submission.values.get(&field.id) {
                        println!("  {}: {value}", field.label);
                    }
                }
            }
            if list.is_empty() {
                println!("(none)");
            }
        }
    }
    Ok(())
}

fn read_draft(path: &Path) -> Result<TemplateDraft, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Io { path: path.to_path_buf(), source })?;
    Ok(serde_json::from_str(&raw)?)
}

fn report_saved(ctx: &CliContext, template: &Template, verb: &str) -> Result<(), CliError> {
    if ctx.json {
        return print_json(template);
    }
    println!("{verb} template {} for {}", template.id, template.control_code);
    Ok(())
}

fn print_template(template: &Template) {
    println!("{} [{}]", template.name, template.id);
    println!("Control: {} {}", template.control_code, template.control_title);
    if !template.description.is_empty() {
        println!("{}", template.description);
    }
    println!();
    println!("Company fields");
    let rows: Vec<Vec<String>> = template
        .company_fields
        .iter()
        .map(|f| {
            vec![
                f.id.clone(),
                f.label.clone(),
                format!("{:?}", f.kind).to_lowercase(),
                if f.required { "yes".to_string() } else { String::new() },
                f.options.join("/"),
            ]
        })
        .collect();
    print_table(&["ID", "LABEL", "TYPE", "REQUIRED", "OPTIONS"], &rows);

    println!();
    println!("Evidence requirements");
    let rows: Vec<Vec<String>> = template
        .evidence_requirements
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.maturity_level.map(|m| format!("ML{m}")).unwrap_or_default(),
                e.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "LEVEL", "TITLE"], &rows);
}
