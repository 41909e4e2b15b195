//! Control-suggestion heuristics used when the backend AI is silent.
//!
//! DESIGN
//! ======
//! Three kinds of entry point, all pure:
//! - `generate_fallback_suggestions` maps an uploaded filename onto locally
//!   stored templates (upload pipeline, fixed 0.9 confidence).
//! - `suggest_from_filename` maps a filename onto caller-supplied control
//!   candidates (gateway mock fallback).
//! - `extract_suggestions_from_text` / `parse_ai_suggestions` turn an AI
//!   answer into typed suggestions, free text and JSON respectively.
//!
//! `analysis_prompt` builds the request those parsers expect an answer to.

use serde_json::Value;

use crate::api::types::{ControlCandidate, ControlSuggestion};
use crate::services::templates::Template;

pub const FALLBACK_CONFIDENCE: f64 = 0.9;
pub const MAX_FALLBACK_SUGGESTIONS: usize = 3;
pub const MAX_TEXT_SUGGESTIONS: usize = 2;
pub const MAX_AI_SUGGESTIONS: usize = 3;
/// Free-text extraction only considers this many candidates.
const TEXT_SCAN_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SuggestionParseError {
    #[error("AI response contains no JSON object")]
    NoJsonObject,
    #[error("AI response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("AI response has no 'suggestions' array")]
    MissingSuggestions,
}

// =============================================================================
// FILENAME RULES
// =============================================================================

struct KeywordRule {
    topic: &'static str,
    /// Substrings looked for in the lowercased filename.
    keywords: &'static [&'static str],
    /// Substrings looked for in the template's title, description and
    /// evidence requirement titles.
    targets: &'static [&'static str],
}

/// Evaluated in order; earlier rules win the limited suggestion slots.
const RULES: &[KeywordRule] = &[
    KeywordRule {
        topic: "authentication",
        keywords: &[
            "mfa",
            "multi-factor",
            "multifactor",
            "2fa",
            "authentication",
            "auth",
            "login",
            "access",
            "identity",
        ],
        targets: &["multi-factor", "authentication", "privilege", "admin"],
    },
    KeywordRule {
        topic: "application control",
        keywords: &["allowlist", "whitelist", "applocker", "application_control", "application-control", "app_control"],
        targets: &["application control"],
    },
    KeywordRule {
        topic: "patching",
        keywords: &["patch", "vulnerab", "update"],
        targets: &["patch"],
    },
    KeywordRule {
        topic: "macro",
        keywords: &["macro", "office"],
        targets: &["macro"],
    },
    KeywordRule {
        topic: "hardening",
        keywords: &["harden", "browser"],
        targets: &["hardening"],
    },
    KeywordRule {
        topic: "privileged access",
        keywords: &["admin", "privilege", "pam"],
        targets: &["privilege", "admin"],
    },
    KeywordRule {
        topic: "backup",
        keywords: &["backup", "restore", "recovery"],
        targets: &["backup"],
    },
    KeywordRule {
        topic: "policy",
        keywords: &["policy", "procedure", "governance"],
        targets: &["policy"],
    },
];

fn template_haystack(template: &Template) -> String {
    let mut text = format!("{} {}", template.control_title, template.description);
    for req in &template.evidence_requirements {
        text.push(' ');
        text.push_str(&req.title);
    }
    text.to_lowercase()
}

fn framework_for_code(code: &str) -> String {
    if code.to_ascii_uppercase().starts_with("EE-") {
        "Essential Eight".to_string()
    } else {
        "Unknown".to_string()
    }
}

/// A stored template as a mapping target for the AI prompt.
#[must_use]
pub fn candidate_from_template(template: &Template) -> ControlCandidate {
    ControlCandidate {
        code: template.control_code.clone(),
        title: template.control_title.clone(),
        description: template.description.clone(),
        framework: framework_for_code(&template.control_code),
    }
}

/// Propose controls for `filename` from the locally stored templates.
///
/// Every suggestion carries [`FALLBACK_CONFIDENCE`]. Results are unique by
/// control code and capped at [`MAX_FALLBACK_SUGGESTIONS`].
#[must_use]
pub fn generate_fallback_suggestions(filename: &str, templates: &[Template]) -> Vec<ControlSuggestion> {
    let name = filename.to_lowercase();
    let haystacks: Vec<String> = templates.iter().map(template_haystack).collect();
    let mut out: Vec<ControlSuggestion> = Vec::new();

    for rule in RULES {
        if !rule.keywords.iter().any(|k| name.contains(k)) {
            continue;
        }
        for (template, haystack) in templates.iter().zip(&haystacks) {
            if out.len() >= MAX_FALLBACK_SUGGESTIONS {
                return out;
            }
            let hit = rule.targets.iter().any(|t| haystack.contains(t));
            let seen = out
                .iter()
                .any(|s| s.control_code.eq_ignore_ascii_case(&template.control_code));
            if hit && !seen {
                out.push(ControlSuggestion {
                    control_id: template.control_id.clone(),
                    control_code: template.control_code.clone(),
                    control_title: template.control_title.clone(),
                    framework_name: framework_for_code(&template.control_code),
                    confidence: FALLBACK_CONFIDENCE,
                    reasoning: format!("Filename suggests {}-related evidence", rule.topic),
                });
            }
        }
    }
    out
}

/// Filename categories for the gateway mock fallback, with the words that
/// identify a matching control.
const CANDIDATE_CATEGORIES: &[(&str, &[&str])] = &[
    ("authentication", &["mfa", "multi-factor", "2fa", "authentication", "auth"]),
    ("access", &["access", "identity", "user", "login"]),
    ("policy", &["policy", "procedure", "governance"]),
    ("security", &["security", "incident", "response", "error"]),
    ("configuration", &["config", "configuration", "setting"]),
    ("audit", &["log", "audit", "monitoring", "compliance"]),
];

/// Propose up to two of `candidates` for `filename` when AI analysis failed.
///
/// A candidate matches a category when its title or description mentions the
/// category name or one of its first two keywords. Authentication matches on
/// an "mfa" filename score 0.6, everything else 0.5.
#[must_use]
pub fn suggest_from_filename(filename: &str, candidates: &[ControlCandidate]) -> Vec<ControlSuggestion> {
    let name = filename.to_lowercase();
    let mut out = Vec::new();

    for (category, keywords) in CANDIDATE_CATEGORIES {
        if !keywords.iter().any(|k| name.contains(k)) {
            continue;
        }
        for candidate in candidates {
            let text = format!("{} {}", candidate.title, candidate.description).to_lowercase();
            let hit = text.contains(category) || keywords.iter().take(2).any(|k| text.contains(k));
            if !hit {
                continue;
            }
            let confidence = if *category == "authentication" && name.contains("mfa") { 0.6 } else { 0.5 };
            out.push(ControlSuggestion {
                control_id: None,
                control_code: candidate.code.clone(),
                control_title: candidate.title.clone(),
                framework_name: candidate.framework.clone(),
                confidence,
                reasoning: format!("Filename suggests {category}-related content"),
            });
            if out.len() >= MAX_TEXT_SUGGESTIONS {
                return out;
            }
        }
    }
    out
}

// =============================================================================
// AI ANSWERS
// =============================================================================

/// Suggest controls an AI mentioned in a free-text (non-JSON) answer.
#[must_use]
pub fn extract_suggestions_from_text(text: &str, candidates: &[ControlCandidate]) -> Vec<ControlSuggestion> {
    let lower = text.to_lowercase();
    let endorsed = lower.contains("relevant") || lower.contains("applicable");
    let negated = lower.contains("not");
    let mut out = Vec::new();

    for candidate in candidates.iter().take(TEXT_SCAN_LIMIT) {
        let code = candidate.code.to_lowercase();
        let title = candidate.title.to_lowercase();
        let code_hit = !code.is_empty() && lower.contains(&code);
        let title_hit = title
            .split_whitespace()
            .any(|word| word.chars().count() > 3 && lower.contains(word));
        if !code_hit && !title_hit {
            continue;
        }

        let mut confidence: f64 = if code_hit { 0.8 } else { 0.6 };
        if endorsed {
            confidence += 0.1;
        }
        if negated && code_hit {
            confidence = (confidence - 0.3).max(0.3);
        }
        out.push(ControlSuggestion {
            control_id: None,
            control_code: candidate.code.clone(),
            control_title: candidate.title.clone(),
            framework_name: candidate.framework.clone(),
            confidence: confidence.min(0.9),
            reasoning: "AI mentioned this control in analysis text".to_string(),
        });
        if out.len() >= MAX_TEXT_SUGGESTIONS {
            break;
        }
    }
    out
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().map_or(0.0, |p| p / 100.0),
                None => s.parse::<f64>().unwrap_or(0.0),
            }
        }
        _ => 0.0,
    };
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

fn non_blank_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Validate an AI JSON answer of the form `{"suggestions": [...]}`.
///
/// Entries without `control_code` or `control_title` are dropped; at most
/// [`MAX_AI_SUGGESTIONS`] are kept.
///
/// # Errors
///
/// Returns an error when no JSON object can be found or it has no
/// `suggestions` array.
pub fn parse_ai_suggestions(text: &str) -> Result<Vec<ControlSuggestion>, SuggestionParseError> {
    let body = strip_code_fences(text);
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(SuggestionParseError::NoJsonObject);
    };
    if end < start {
        return Err(SuggestionParseError::NoJsonObject);
    }
    let value: Value =
        serde_json::from_str(&body[start..=end]).map_err(|e| SuggestionParseError::InvalidJson(e.to_string()))?;
    let entries = value
        .get("suggestions")
        .and_then(Value::as_array)
        .ok_or(SuggestionParseError::MissingSuggestions)?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let code = non_blank_str(entry, "control_code")?;
            let title = non_blank_str(entry, "control_title")?;
            Some(ControlSuggestion {
                control_id: non_blank_str(entry, "control_id").map(str::to_string),
                control_code: code.to_string(),
                control_title: title.to_string(),
                framework_name: non_blank_str(entry, "framework_name").unwrap_or("Unknown").to_string(),
                confidence: parse_confidence(entry.get("confidence")),
                reasoning: non_blank_str(entry, "reasoning").unwrap_or("AI analysis").to_string(),
            })
        })
        .take(MAX_AI_SUGGESTIONS)
        .collect())
}

/// Characters of document text sent to the model.
pub const PROMPT_EXCERPT_CHARS: usize = 4000;

/// Prompt asking the model to map a document onto `candidates`, answering in
/// the JSON shape [`parse_ai_suggestions`] accepts.
#[must_use]
pub fn analysis_prompt(filename: &str, text: &str, candidates: &[ControlCandidate]) -> String {
    let excerpt: String = text.chars().take(PROMPT_EXCERPT_CHARS).collect();
    let controls = candidates
        .iter()
        .map(|c| format!("- {} ({}): {}", c.code, c.framework, c.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a compliance analyst. Decide which controls the document \"{filename}\" provides evidence for.\n\n\
         Controls:\n{controls}\n\n\
         Document excerpt:\n{excerpt}\n\n\
         Answer with JSON only: {{\"suggestions\": [{{\"control_code\": \"...\", \"control_title\": \"...\", \
         \"framework_name\": \"...\", \"confidence\": 0.0, \"reasoning\": \"...\"}}]}} \
         listing at most {MAX_AI_SUGGESTIONS} controls, most relevant first."
    )
}

#[cfg(test)]
#[path = "suggest_test.rs"]
mod tests;
