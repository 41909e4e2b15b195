//! Document-to-control mapping cache.
//!
//! Remembers which controls were suggested or linked for each uploaded
//! document so `documents list` can show them without asking the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{AiLinkedControl, ControlSuggestion, SuggestionSource};
use crate::store::{KvStore, MAPPINGS_KEY, StoreError, read_list, write_list};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentControlMapping {
    pub document_id: String,
    pub filename: String,
    pub control_code: String,
    #[serde(default)]
    pub control_title: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    pub source: SuggestionSource,
    pub recorded_at: DateTime<Utc>,
}

impl DocumentControlMapping {
    #[must_use]
    pub fn from_suggestion(
        document_id: &str,
        filename: &str,
        suggestion: &ControlSuggestion,
        source: SuggestionSource,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            control_code: suggestion.control_code.clone(),
            control_title: suggestion.control_title.clone(),
            confidence: suggestion.confidence,
            reasoning: suggestion.reasoning.clone(),
            source,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn from_ai_link(document_id: &str, filename: &str, link: &AiLinkedControl) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            control_code: link.control_code.clone(),
            control_title: link.control_title.clone(),
            confidence: link.confidence,
            reasoning: link.reasoning.clone().unwrap_or_default(),
            source: SuggestionSource::Ai,
            recorded_at: Utc::now(),
        }
    }

    fn same_pair(&self, other: &Self) -> bool {
        self.document_id == other.document_id && self.control_code.eq_ignore_ascii_case(&other.control_code)
    }
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn list(store: &dyn KvStore) -> Result<Vec<DocumentControlMapping>, StoreError> {
    read_list(store, MAPPINGS_KEY)
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn for_document(store: &dyn KvStore, document_id: &str) -> Result<Vec<DocumentControlMapping>, StoreError> {
    Ok(list(store)?
        .into_iter()
        .filter(|m| m.document_id == document_id)
        .collect())
}

/// Insert mappings, replacing any existing entry for the same
/// document and control code.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn record(store: &dyn KvStore, new: &[DocumentControlMapping]) -> Result<(), StoreError> {
    if new.is_empty() {
        return Ok(());
    }
    let mut all = list(store)?;
    for mapping in new {
        all.retain(|m| !m.same_pair(mapping));
        all.push(mapping.clone());
    }
    write_list(store, MAPPINGS_KEY, &all)
}

/// Drop every cached mapping of a document; returns how many were removed.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn remove_for_document(store: &dyn KvStore, document_id: &str) -> Result<usize, StoreError> {
    let mut all = list(store)?;
    let before = all.len();
    all.retain(|m| m.document_id != document_id);
    let removed = before - all.len();
    if removed > 0 {
        write_list(store, MAPPINGS_KEY, &all)?;
    }
    Ok(removed)
}

/// # Errors
///
/// Returns an error if the store cannot be written.
pub fn clear(store: &dyn KvStore) -> Result<(), StoreError> {
    store.remove(MAPPINGS_KEY)
}

#[cfg(test)]
#[path = "mappings_test.rs"]
mod tests;
