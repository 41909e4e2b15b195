//! Template service: evidence-collection templates kept in the local store.
//!
//! DESIGN
//! ======
//! A template ties one control to the company details an assessor must fill
//! in and the evidence they must collect. Templates are client-only: they
//! live under `compliance_templates`, submissions under
//! `template_submissions`. The Essential Eight catalog is compiled in and
//! copied into the store on import.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::store::{KvStore, StoreError, SUBMISSIONS_KEY, TEMPLATES_KEY, read_list, write_list};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("invalid template: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("invalid submission: {}", .0.join("; "))]
    InvalidSubmission(Vec<String>),
    #[error("no catalog template for control {0}")]
    UnknownCatalogCode(String),
    #[error("a template for control {0} already exists")]
    AlreadyImported(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Date,
    Email,
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default = "default_field_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn default_field_kind() -> FieldKind {
    FieldKind::Text
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRequirement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_level: Option<u8>,
}

/// Template fields supplied by the operator; ids and timestamps are assigned on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub control_id: Option<String>,
    pub control_code: String,
    #[serde(default)]
    pub control_title: String,
    #[serde(default)]
    pub company_fields: Vec<CompanyField>,
    #[serde(default)]
    pub evidence_requirements: Vec<EvidenceRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub control_id: Option<String>,
    pub control_code: String,
    #[serde(default)]
    pub control_title: String,
    #[serde(default)]
    pub company_fields: Vec<CompanyField>,
    #[serde(default)]
    pub evidence_requirements: Vec<EvidenceRequirement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSubmission {
    pub id: String,
    pub template_id: String,
    pub values: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Required-field checks. Returns every problem, not just the first.
#[must_use]
pub fn validate_draft(draft: &TemplateDraft) -> Vec<String> {
    let mut problems = Vec::new();
    if draft.name.trim().is_empty() {
        problems.push("name is required".to_string());
    }
    if draft.control_code.trim().is_empty() {
        problems.push("control_code is required".to_string());
    }
    for (i, field) in draft.company_fields.iter().enumerate() {
        if field.label.trim().is_empty() {
            problems.push(format!("company field #{} needs a label", i + 1));
        }
        if field.kind == FieldKind::Select && field.options.is_empty() {
            problems.push(format!("company field '{}' is a select without options", field.label));
        }
    }
    for (i, req) in draft.evidence_requirements.iter().enumerate() {
        if req.title.trim().is_empty() {
            problems.push(format!("evidence requirement #{} needs a title", i + 1));
        }
    }
    problems
}

fn validate_submission(template: &Template, values: &BTreeMap<String, String>) -> Vec<String> {
    let mut problems = Vec::new();
    for field in &template.company_fields {
        let filled = values.get(&field.id).is_some_and(|v| !v.trim().is_empty());
        if field.required && !filled {
            problems.push(format!("'{}' is required", field.label));
        }
        if field.kind == FieldKind::Select && filled {
            if let Some(value) = values.get(&field.id) {
                if !field.options.iter().any(|o| o == value) {
                    problems.push(format!("'{}' must be one of: {}", field.label, field.options.join(", ")));
                }
            }
        }
    }
    for key in values.keys() {
        if !template.company_fields.iter().any(|f| &f.id == key) {
            problems.push(format!("unknown field '{key}'"));
        }
    }
    problems
}

// =============================================================================
// CRUD
// =============================================================================

/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn list(store: &dyn KvStore) -> Result<Vec<Template>, TemplateError> {
    Ok(read_list(store, TEMPLATES_KEY)?)
}

/// # Errors
///
/// Returns [`TemplateError::NotFound`] for an unknown id.
pub fn get(store: &dyn KvStore, id: &str) -> Result<Template, TemplateError> {
    list(store)?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| TemplateError::NotFound(id.to_string()))
}

/// # Errors
///
/// Returns [`TemplateError::Invalid`] when required fields are missing.
pub fn create(store: &dyn KvStore, draft: TemplateDraft) -> Result<Template, TemplateError> {
    let problems = validate_draft(&draft);
    if !problems.is_empty() {
        return Err(TemplateError::Invalid(problems));
    }
    let now = Utc::now();
    let template = Template {
        id: Uuid::new_v4().to_string(),
        name: draft.name.trim().to_string(),
        description: draft.description,
        control_id: draft.control_id,
        control_code: draft.control_code.trim().to_string(),
        control_title: draft.control_title,
        company_fields: draft.company_fields,
        evidence_requirements: draft.evidence_requirements,
        created_at: now,
        updated_at: now,
    };

    let mut templates = list(store)?;
    templates.push(template.clone());
    write_list(store, TEMPLATES_KEY, &templates)?;
    info!(template_id = %template.id, control = %template.control_code, "template created");
    Ok(template)
}

/// # Errors
///
/// Returns [`TemplateError::NotFound`] or [`TemplateError::Invalid`].
pub fn update(store: &dyn KvStore, id: &str, draft: TemplateDraft) -> Result<Template, TemplateError> {
    let problems = validate_draft(&draft);
    if !problems.is_empty() {
        return Err(TemplateError::Invalid(problems));
    }
    let mut templates = list(store)?;
    let Some(existing) = templates.iter_mut().find(|t| t.id == id) else {
        return Err(TemplateError::NotFound(id.to_string()));
    };
    existing.name = draft.name.trim().to_string();
    existing.description = draft.description;
    existing.control_id = draft.control_id;
    existing.control_code = draft.control_code.trim().to_string();
    existing.control_title = draft.control_title;
    existing.company_fields = draft.company_fields;
    existing.evidence_requirements = draft.evidence_requirements;
    existing.updated_at = Utc::now();
    let updated = existing.clone();

    write_list(store, TEMPLATES_KEY, &templates)?;
    Ok(updated)
}

/// Delete a template and its submissions.
///
/// # Errors
///
/// Returns [`TemplateError::NotFound`] for an unknown id.
pub fn delete(store: &dyn KvStore, id: &str) -> Result<(), TemplateError> {
    let mut templates = list(store)?;
    let before = templates.len();
    templates.retain(|t| t.id != id);
    if templates.len() == before {
        return Err(TemplateError::NotFound(id.to_string()));
    }
    write_list(store, TEMPLATES_KEY, &templates)?;

    let mut submissions: Vec<TemplateSubmission> = read_list(store, SUBMISSIONS_KEY)?;
    submissions.retain(|s| s.template_id != id);
    write_list(store, SUBMISSIONS_KEY, &submissions)?;
    info!(template_id = %id, "template deleted");
    Ok(())
}

/// Copy the catalog template for `control_code` into the store.
///
/// # Errors
///
/// Returns [`TemplateError::UnknownCatalogCode`] when the catalog has no such
/// control, [`TemplateError::AlreadyImported`] when a stored template already
/// targets it.
pub fn import_from_catalog(store: &dyn KvStore, control_code: &str) -> Result<Template, TemplateError> {
    let wanted = control_code.trim();
    let draft = catalog()
        .into_iter()
        .find(|d| d.control_code.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| TemplateError::UnknownCatalogCode(wanted.to_string()))?;
    if list(store)?
        .iter()
        .any(|t| t.control_code.eq_ignore_ascii_case(&draft.control_code))
    {
        return Err(TemplateError::AlreadyImported(draft.control_code));
    }
    create(store, draft)
}

/// Record a filled-in template.
///
/// # Errors
///
/// Returns [`TemplateError::NotFound`] or [`TemplateError::InvalidSubmission`].
pub fn submit(
    store: &dyn KvStore,
    template_id: &str,
    values: BTreeMap<String, String>,
) -> Result<TemplateSubmission, TemplateError> {
    let template = get(store, template_id)?;
    let problems = validate_submission(&template, &values);
    if !problems.is_empty() {
        return Err(TemplateError::InvalidSubmission(problems));
    }
    let submission = TemplateSubmission {
        id: Uuid::new_v4().to_string(),
        template_id: template.id,
        values,
        submitted_at: Utc::now(),
    };
    let mut submissions: Vec<TemplateSubmission> = read_list(store, SUBMISSIONS_KEY)?;
    submissions.push(submission.clone());
    write_list(store, SUBMISSIONS_KEY, &submissions)?;
    Ok(submission)
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn submissions(store: &dyn KvStore, template_id: &str) -> Result<Vec<TemplateSubmission>, TemplateError> {
    let all: Vec<TemplateSubmission> = read_list(store, SUBMISSIONS_KEY)?;
    Ok(all
        .into_iter()
        .filter(|s| s.template_id == template_id)
        .collect())
}

// =============================================================================
// ESSENTIAL EIGHT CATALOG
// =============================================================================

fn field(id: &str, label: &str, kind: FieldKind, required: bool) -> CompanyField {
    CompanyField { id: id.into(), label: label.into(), kind, required, placeholder: None, options: Vec::new() }
}

fn evidence(id: &str, title: &str, description: &str, maturity_level: u8) -> EvidenceRequirement {
    EvidenceRequirement {
        id: id.into(),
        title: title.into(),
        description: description.into(),
        required: true,
        maturity_level: Some(maturity_level),
    }
}

fn common_fields() -> Vec<CompanyField> {
    let mut maturity = field("target_maturity", "Target maturity level", FieldKind::Select, true);
    maturity.options = vec!["1".into(), "2".into(), "3".into()];
    vec![
        field("company_name", "Company name", FieldKind::Text, true),
        field("contact_email", "Compliance contact email", FieldKind::Email, true),
        field("assessment_date", "Assessment date", FieldKind::Date, false),
        maturity,
    ]
}

fn catalog_entry(
    code: &str,
    title: &str,
    description: &str,
    extra_fields: Vec<CompanyField>,
    evidence_requirements: Vec<EvidenceRequirement>,
) -> TemplateDraft {
    let mut company_fields = common_fields();
    company_fields.extend(extra_fields);
    TemplateDraft {
        name: format!("{title} Evidence Pack"),
        description: description.into(),
        control_id: None,
        control_code: code.into(),
        control_title: title.into(),
        company_fields,
        evidence_requirements,
    }
}

/// The built-in Essential Eight templates, EE-1 through EE-8.
#[must_use]
pub fn catalog() -> Vec<TemplateDraft> {
    vec![
        catalog_entry(
            "EE-1",
            "Application Control",
            "Allowlisting of approved executables, scripts and installers on workstations and servers.",
            vec![field("allowlist_tool", "Application control product", FieldKind::Text, true)],
            vec![
                evidence("ee1-policy", "Application control policy", "Approved policy defining allowlisting scope.", 1),
                evidence("ee1-config", "Allowlist rule export", "Export of enforced application control rules.", 1),
                evidence("ee1-logs", "Blocked execution logs", "Centrally collected logs of blocked executions.", 2),
            ],
        ),
        catalog_entry(
            "EE-2",
            "Patch Applications",
            "Timely patching of internet-facing services, office productivity suites, browsers and PDF viewers.",
            vec![field("patch_tool", "Patch management tool", FieldKind::Text, false)],
            vec![
                evidence("ee2-scan", "Vulnerability scan report", "Recent authenticated vulnerability scan.", 1),
                evidence("ee2-sla", "Patch timeframe procedure", "Documented patching timeframes per severity.", 1),
            ],
        ),
        catalog_entry(
            "EE-3",
            "Configure Microsoft Office Macro Settings",
            "Macros blocked unless from trusted locations or digitally signed by trusted publishers.",
            Vec::new(),
            vec![
                evidence("ee3-gpo", "Macro group policy export", "Group policy or Intune profile blocking macros.", 1),
                evidence("ee3-exceptions", "Macro exception register", "Approved business exceptions for macros.", 2),
            ],
        ),
        catalog_entry(
            "EE-4",
            "User Application Hardening",
            "Browsers and office software hardened: no Java, no web ads, no Flash, restricted OLE.",
            Vec::new(),
            vec![
                evidence("ee4-browser", "Browser hardening configuration", "Managed browser policy export.", 1),
                evidence("ee4-powershell", "PowerShell constrained language evidence", "Logging and CLM settings.", 2),
            ],
        ),
        catalog_entry(
            "EE-5",
            "Restrict Administrative Privileges",
            "Privileged access is validated, limited to duties, and reviewed; admin accounts cannot browse or email.",
            vec![field("pam_tool", "Privileged access management tool", FieldKind::Text, false)],
            vec![
                evidence("ee5-review", "Privileged account review", "Latest review of privileged accounts.", 1),
                evidence("ee5-separation", "Admin account separation", "Proof admins use separate accounts.", 1),
            ],
        ),
        catalog_entry(
            "EE-6",
            "Patch Operating Systems",
            "Operating systems patched within defined timeframes; unsupported versions replaced.",
            Vec::new(),
            vec![
                evidence("ee6-compliance", "OS patch compliance report", "Fleet patch level by device.", 1),
                evidence("ee6-eol", "Unsupported OS register", "Inventory of end-of-life systems and plans.", 1),
            ],
        ),
        catalog_entry(
            "EE-7",
            "Multi-Factor Authentication",
            "MFA enforced for remote access, privileged users and important data repositories.",
            vec![field("idp", "Identity provider", FieldKind::Text, true)],
            vec![
                evidence("ee7-policy", "MFA policy", "Policy requiring MFA for users and administrators.", 1),
                evidence("ee7-config", "Conditional access configuration", "Identity provider MFA enforcement.", 1),
                evidence("ee7-phishing", "Phishing-resistant MFA evidence", "FIDO2 or smart card rollout.", 3),
            ],
        ),
        catalog_entry(
            "EE-8",
            "Regular Backups",
            "Backups of important data, software and settings performed, retained and restore-tested.",
            vec![field("backup_tool", "Backup solution", FieldKind::Text, false)],
            vec![
                evidence("ee8-schedule", "Backup schedule", "Documented backup frequency and retention.", 1),
                evidence("ee8-restore", "Restore test record", "Most recent successful restore test.", 1),
                evidence("ee8-immutability", "Backup access restrictions", "Proof backups cannot be altered.", 2),
            ],
        ),
    ]
}

#[cfg(test)]
#[path = "templates_test.rs"]
mod tests;
