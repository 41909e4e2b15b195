use super::*;
use crate::api::types::AiStatus;
use crate::services::testing::{FakeBackend, uploaded};
use crate::store::MemoryStore;

fn suggestion(code: &str) -> ControlSuggestion {
    ControlSuggestion {
        control_id: None,
        control_code: code.into(),
        control_title: format!("{code} title"),
        framework_name: "Essential Eight".into(),
        confidence: 0.8,
        reasoning: "filename".into(),
    }
}

// =============================================================================
// upload progress
// =============================================================================

#[tokio::test(start_paused = true)]
async fn upload_progress_lines_count_from_one() {
    let backend = FakeBackend::new()
        .on_upload(|name, _| Ok(uploaded(&format!("doc-{name}"), name)))
        .on_ai_status(|_, _| {
            Ok(AiStatus { document_id: None, ai_processed: true, linked_controls: Vec::new(), ai_error: None })
        });
    let store = MemoryStore::new();
    let inputs = ["a.pdf", "b.pdf"]
        .iter()
        .map(|n| UploadInput::from_bytes(*n, b"%PDF-1.4".to_vec()))
        .collect();

    let mut lines = Vec::new();
    upload::upload_all(&backend, &store, inputs, UploadTiming::default(), &mut |e: UploadEvent| {
        if matches!(e, UploadEvent::Uploading { .. }) {
            lines.push(upload_event_line(&e));
        }
    })
    .await;

    assert_eq!(lines, vec!["[1/2] uploading a.pdf", "[2/2] uploading b.pdf"]);
}

#[test]
fn polling_line_names_the_file() {
    let event = UploadEvent::PollingAi { filename: "policy.pdf".into() };
    assert_eq!(upload_event_line(&event), "waiting for AI linking of policy.pdf");
}

// =============================================================================
// documents list --json
// =============================================================================

#[test]
fn json_listing_carries_cached_mappings_per_document() {
    let documents = vec![uploaded("d-1", "backup-policy.pdf").document, uploaded("d-2", "notes.txt").document];
    let cached = vec![
        DocumentControlMapping::from_suggestion("d-1", "backup-policy.pdf", &suggestion("EE-7"), SuggestionSource::Ai),
        DocumentControlMapping::from_suggestion("d-9", "other.pdf", &suggestion("EE-1"), SuggestionSource::Fallback),
    ];

    let entries = annotate_documents(&documents, &cached);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["filename"], "backup-policy.pdf");
    let first = entries[0]["mappings"].as_array().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["control_code"], "EE-7");
    assert_eq!(first[0]["source"], "ai");
    assert_eq!(entries[1]["id"], "d-2");
    assert!(entries[1]["mappings"].as_array().unwrap().is_empty());
}

#[test]
fn json_listing_without_cache_still_has_empty_mappings() {
    let documents = vec![uploaded("d-1", "a.pdf").document];
    let entries = annotate_documents(&documents, &[]);
    assert_eq!(entries[0]["mappings"], json!([]));
}

// =============================================================================
// delete output
// =============================================================================

#[test]
fn document_delete_json_reports_removed_mappings() {
    assert_eq!(deleted_document_json("d-1", 3), json!({ "deleted": "d-1", "mappings_removed": 3 }));
}

#[test]
fn link_delete_json_names_the_link() {
    assert_eq!(deleted_link_json("link-4"), json!({ "deleted": "link-4" }));
}
