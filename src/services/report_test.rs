use super::*;
use crate::api::types::{Gap, Priority, RecommendedAction, RequirementRef, ScanResult, ScanSummary};
use crate::services::testing::{FakeBackend, scan};

fn control(id: &str, code: &str, title: &str) -> Control {
    Control {
        id: id.into(),
        framework_id: Some("ee".into()),
        framework_name: Some("Essential Eight".into()),
        code: code.into(),
        title: title.into(),
        description: None,
        requirements: Vec::new(),
        requirements_count: None,
        linked_documents_count: None,
        created_at: None,
    }
}

fn requirement(code: &str) -> RequirementRef {
    RequirementRef { id: format!("r-{code}"), req_code: code.into(), text: String::new(), maturity_level: Some(1) }
}

fn result(code: &str, outcome: Outcome) -> ScanResult {
    ScanResult {
        requirement: requirement(code),
        outcome,
        confidence: 0.8,
        rationale: serde_json::Value::Null,
        citations: Vec::new(),
    }
}

fn summary(id: &str, status: ScanStatus) -> ScanSummary {
    ScanSummary { id: id.into(), status, model: None, prompt_version: None, created_at: None, updated_at: None }
}

fn backend() -> FakeBackend {
    FakeBackend::new()
        .with_controls(vec![
            control("c7", "EE-7", "Multi-Factor Authentication"),
            control("c8", "EE-8", "Regular Backups"),
            control("c1", "EE-1", "Application Control, \"Allowlisting\""),
        ])
        .with_control_scans("c7", vec![summary("s-new", ScanStatus::Failed), summary("s-old", ScanStatus::Completed)])
        .with_control_scans("c1", vec![summary("s-app", ScanStatus::Completed)])
        .on_scan(|id, _| {
            let mut s = scan(id, ScanStatus::Completed, Some(100), None);
            match id {
                "s-old" => {
                    s.results = vec![result("EE-7.1", Outcome::Pass), result("EE-7.2", Outcome::Partial)];
                    s.gaps = vec![Gap {
                        requirement: requirement("EE-7.2"),
                        summary: "MFA not enforced for VPN, only for email".into(),
                        recommended_actions: vec![
                            RecommendedAction {
                                title: "Enable VPN MFA".into(),
                                detail: String::new(),
                                priority: Priority::High,
                            },
                            RecommendedAction {
                                title: "Document exceptions".into(),
                                detail: String::new(),
                                priority: Priority::Low,
                            },
                        ],
                    }];
                }
                "s-app" => s.results = vec![result("EE-1.1", Outcome::Pass)],
                _ => return Err(ApiError::Status { status: 404, detail: "Scan not found".into() }),
            }
            Ok(s)
        })
}

#[tokio::test]
async fn report_uses_latest_completed_scan_per_control() {
    let backend = backend();
    let report = build_report(&backend, "ee").await.unwrap();

    assert_eq!(report.controls.len(), 3);
    assert_eq!(report.controls[0].scan.as_ref().map(|s| s.id.as_str()), Some("s-old"));
    assert_eq!(report.controls[0].status(), ComplianceStatus::PartiallyCompliant);
    assert_eq!(report.controls[1].status(), ComplianceStatus::NotScanned);
    assert_eq!(report.controls[2].status(), ComplianceStatus::Compliant);
    // The failed scan is skipped, never fetched.
    assert!(!backend.calls().scan_polls.iter().any(|(id, _)| id == "s-new"));
}

#[tokio::test]
async fn csv_has_summary_rows_then_gap_section() {
    let report = build_report(&backend(), "ee").await.unwrap();
    let csv = to_csv(&report);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "Control,Status,Requirements Scanned,Gaps Found,Last Scan");
    assert_eq!(lines[1], "EE-7 - Multi-Factor Authentication,Partially Compliant,2,1,2025-03-01 10:05");
    assert_eq!(lines[2], "EE-8 - Regular Backups,Not Scanned,0,0,");
    assert_eq!(lines[3], "\"EE-1 - Application Control, \"\"Allowlisting\"\"\",Compliant,1,0,2025-03-01 10:05");
    assert_eq!(lines[4], "");
    assert_eq!(lines[5], "Control,Requirement,Gap Summary,Recommended Actions");
    assert_eq!(
        lines[6],
        concat!(
            "EE-7 - Multi-Factor Authentication,EE-7.2,",
            "\"MFA not enforced for VPN, only for email\",",
            "[HIGH] Enable VPN MFA; [LOW] Document exceptions"
        )
    );
    assert_eq!(lines.len(), 7);
}

#[test]
fn csv_without_gaps_has_no_gap_section() {
    let report = ComplianceReport {
        framework_id: "ee".into(),
        generated_at: Utc::now(),
        controls: vec![ControlReport { control: control("c8", "EE-8", "Regular Backups"), scan: None }],
    };
    assert_eq!(
        to_csv(&report),
        "Control,Status,Requirements Scanned,Gaps Found,Last Scan\nEE-8 - Regular Backups,Not Scanned,0,0,\n"
    );
}

#[test]
fn status_rules() {
    let mut s = scan("s", ScanStatus::Completed, None, None);
    assert_eq!(ComplianceStatus::from_scan(Some(&s)), ComplianceStatus::NonCompliant);
    s.results = vec![result("a", Outcome::Fail), result("b", Outcome::NotFound)];
    assert_eq!(ComplianceStatus::from_scan(Some(&s)), ComplianceStatus::NonCompliant);
    s.results.push(result("c", Outcome::Partial));
    assert_eq!(ComplianceStatus::from_scan(Some(&s)), ComplianceStatus::PartiallyCompliant);
    assert_eq!(ComplianceStatus::from_scan(None).label(), "Not Scanned");
}
