use tokio::time::Instant;

use super::*;
use crate::api::types::AiStatus;
use crate::services::testing::{FakeBackend, not_found, uploaded};
use crate::store::MemoryStore;

fn doc_id(filename: &str) -> String {
    format!("doc-{filename}")
}

fn processed(linked: Vec<AiLinkedControl>) -> AiStatus {
    AiStatus { document_id: None, ai_processed: true, linked_controls: linked, ai_error: None }
}

fn pending() -> AiStatus {
    AiStatus::default()
}

fn inputs(names: &[&str]) -> Vec<UploadInput> {
    names
        .iter()
        .map(|n| UploadInput::from_bytes(*n, b"%PDF-1.4".to_vec()))
        .collect()
}

async fn run(backend: &FakeBackend, store: &MemoryStore, names: &[&str]) -> (UploadSummary, Vec<UploadEvent>) {
    let mut events = Vec::new();
    let summary =
        upload_all(backend, store, inputs(names), UploadTiming::default(), &mut |e: UploadEvent| events.push(e))
            .await;
    (summary, events)
}

#[tokio::test(start_paused = true)]
async fn uploads_are_sequential_with_delay_between() {
    let backend = FakeBackend::new()
        .on_upload(|name, _| Ok(uploaded(&doc_id(name), name)))
        .on_ai_status(|_, _| Ok(processed(Vec::new())));
    let store = MemoryStore::new();
    let start = Instant::now();

    let (summary, _) = run(&backend, &store, &["a.pdf", "b.pdf", "c.pdf"]).await;

    assert_eq!(summary.succeeded(), 3);
    let calls = backend.calls();
    let names: Vec<&str> = calls.uploads.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["a.pdf", "b.pdf", "c.pdf"]);
    for pair in calls.uploads.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(2));
    }
    // No pause after the last upload: polling starts right away.
    let last_upload = calls.uploads[2].1;
    assert_eq!(calls.ai_polls[0].1, last_upload);
    assert_eq!(last_upload - start, Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn slow_upload_times_out_and_queue_continues() {
    let backend = FakeBackend::new()
        .with_upload_delay(Duration::from_secs(400))
        .on_upload(|name, _| Ok(uploaded(&doc_id(name), name)));
    let store = MemoryStore::new();

    let (summary, events) = run(&backend, &store, &["huge.pdf", "also-huge.pdf"]).await;

    assert_eq!(backend.calls().uploads.len(), 2);
    assert_eq!(summary.failed(), 2);
    let FileOutcome::Failed(failure) = &summary.files[0].outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, UploadFailureKind::Timeout);
    assert_eq!(failure.message, "Upload timed out after 5 minutes");
    assert!(backend.calls().ai_polls.is_empty());
    assert!(events.iter().any(|e| matches!(e, UploadEvent::Failed { filename, .. } if filename == "also-huge.pdf")));
}

#[tokio::test(start_paused = true)]
async fn failures_are_classified_per_file() {
    let backend = FakeBackend::new()
        .on_upload(|name, _| match name {
            "dropped.pdf" => Err(ApiError::Network("connection reset".into())),
            "rejected.exe" => Err(ApiError::Status { status: 400, detail: "File type not allowed".into() }),
            _ => Ok(uploaded(&doc_id(name), name)),
        })
        .on_ai_status(|_, _| Ok(processed(Vec::new())));
    let store = MemoryStore::new();
    let mut queue = inputs(&["dropped.pdf", "rejected.exe", "fine.pdf"]);
    queue.push(UploadInput {
        filename: "missing.pdf".into(),
        mime_type: "application/pdf".into(),
        contents: Err("could not read missing.pdf: No such file".into()),
    });

    let summary = upload_all(&backend, &store, queue, UploadTiming::default(), &mut |_: UploadEvent| {}).await;

    let kinds: Vec<Option<UploadFailureKind>> = summary
        .files
        .iter()
        .map(|f| match &f.outcome {
            FileOutcome::Failed(failure) => Some(failure.kind),
            FileOutcome::Uploaded(_) => None,
        })
        .collect();
    assert_eq!(
        kinds,
        [
            Some(UploadFailureKind::ConnectionLost),
            Some(UploadFailureKind::Generic),
            None,
            Some(UploadFailureKind::Generic),
        ]
    );
    let FileOutcome::Failed(rejected) = &summary.files[1].outcome else {
        panic!("expected failure");
    };
    assert!(rejected.message.contains("File type not allowed"));
    // The unreadable file never reaches the backend.
    assert_eq!(backend.calls().uploads.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn ai_polling_is_sequential_and_stops_on_processed_or_deleted() {
    let backend = FakeBackend::new()
        .on_upload(|name, _| Ok(uploaded(&doc_id(name), name)))
        .on_ai_status(|id, n| match id {
            "doc-first.pdf" if n < 2 => Ok(pending()),
            "doc-first.pdf" => Ok(processed(vec![AiLinkedControl {
                id: Some("link-1".into()),
                control_id: Some("c7".into()),
                control_code: "EE-7".into(),
                control_title: "Multi-Factor Authentication".into(),
                confidence: 0.82,
                reasoning: Some("MFA policy".into()),
            }])),
            _ => Err(not_found()),
        });
    let store = MemoryStore::new();

    let (summary, _) = run(&backend, &store, &["first.pdf", "second.pdf"]).await;

    let polls = backend.calls().ai_polls;
    let order: Vec<&str> = polls.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, ["doc-first.pdf", "doc-first.pdf", "doc-first.pdf", "doc-second.pdf"]);
    assert_eq!(polls[1].1 - polls[0].1, Duration::from_secs(3));
    assert_eq!(polls[3].1, polls[2].1);

    let FileOutcome::Uploaded(first) = &summary.files[0].outcome else {
        panic!("expected upload");
    };
    assert!(matches!(&first.ai_link, Some(AiLinkOutcome::Processed { linked, .. }) if linked.len() == 1));
    let FileOutcome::Uploaded(second) = &summary.files[1].outcome else {
        panic!("expected upload");
    };
    assert_eq!(second.ai_link, Some(AiLinkOutcome::Deleted));

    let cached = mappings::for_document(&store, "doc-first.pdf").unwrap();
    assert!(cached.iter().any(|m| m.control_code == "EE-7" && m.source == SuggestionSource::Ai));
}

#[tokio::test(start_paused = true)]
async fn ai_polling_gives_up_after_deadline_despite_errors() {
    let backend = FakeBackend::new().on_ai_status(|_, n| {
        if n % 2 == 0 { Ok(pending()) } else { Err(ApiError::Status { status: 503, detail: "busy".into() }) }
    });
    let start = Instant::now();

    let outcome = poll_ai_link(&backend, "doc-1", UploadTiming::default()).await;

    assert_eq!(outcome, AiLinkOutcome::TimedOut);
    assert_eq!(start.elapsed(), Duration::from_secs(300));
    let polls = backend.calls().ai_polls.len();
    assert!((100..=101).contains(&polls), "unexpected poll count {polls}");
}

#[tokio::test(start_paused = true)]
async fn fallback_suggestions_are_cached_when_backend_has_none() {
    let store = MemoryStore::new();
    templates::import_from_catalog(&store, "EE-7").unwrap();
    templates::import_from_catalog(&store, "EE-8").unwrap();
    let backend = FakeBackend::new()
        .on_upload(|name, _| Ok(uploaded(&doc_id(name), name)))
        .on_ai_status(|_, _| Ok(processed(Vec::new())));

    let (summary, _) = run(&backend, &store, &["mfa_policy.pdf"]).await;

    let FileOutcome::Uploaded(file) = &summary.files[0].outcome else {
        panic!("expected upload");
    };
    assert_eq!(file.suggestion_source, SuggestionSource::Fallback);
    assert_eq!(file.suggestions[0].control_code, "EE-7");
    assert!((file.suggestions[0].confidence - 0.9).abs() < 1e-9);

    let cached = mappings::for_document(&store, "doc-mfa_policy.pdf").unwrap();
    assert_eq!(cached.len(), file.suggestions.len());
    assert!(cached.iter().all(|m| m.source == SuggestionSource::Fallback));
}

#[tokio::test(start_paused = true)]
async fn backend_suggestions_are_cached_as_ai() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new()
        .on_upload(|name, _| {
            let mut doc = uploaded(&doc_id(name), name);
            doc.suggested_controls = vec![ControlSuggestion {
                control_id: Some("c8".into()),
                control_code: "EE-8".into(),
                control_title: "Regular Backups".into(),
                framework_name: "Essential Eight".into(),
                confidence: 0.77,
                reasoning: "backup runbook".into(),
            }];
            Ok(doc)
        })
        .on_ai_status(|_, _| Ok(processed(Vec::new())));

    let (summary, _) = run(&backend, &store, &["runbook.pdf"]).await;

    let FileOutcome::Uploaded(file) = &summary.files[0].outcome else {
        panic!("expected upload");
    };
    assert_eq!(file.suggestion_source, SuggestionSource::Ai);
    let cached = mappings::list(&store).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].source, SuggestionSource::Ai);
}

#[test]
fn mime_types_follow_extension() {
    assert_eq!(mime_for_filename("Policy.PDF"), "application/pdf");
    assert_eq!(mime_for_filename("shot.jpeg"), "image/jpeg");
    assert_eq!(mime_for_filename("noext"), "application/octet-stream");
}

#[tokio::test]
async fn unreadable_file_fails_without_reaching_backend() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.pdf");
    let input = UploadInput::from_path(&missing).await;
    assert_eq!(input.filename, "gone.pdf");
    assert!(input.contents.as_ref().is_err_and(|m| m.contains("could not read")));

    let backend = FakeBackend::new();
    let store = MemoryStore::new();
    let summary = upload_all(&backend, &store, vec![input], UploadTiming::default(), &mut |_: UploadEvent| {}).await;

    let FileOutcome::Failed(failure) = &summary.files[0].outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, UploadFailureKind::Generic);
    assert!(backend.calls().uploads.is_empty());
}
