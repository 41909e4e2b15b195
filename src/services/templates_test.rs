use super::*;
use crate::store::MemoryStore;

fn draft(name: &str, code: &str) -> TemplateDraft {
    TemplateDraft {
        name: name.into(),
        description: String::new(),
        control_id: None,
        control_code: code.into(),
        control_title: "Multi-Factor Authentication".into(),
        company_fields: vec![field("company_name", "Company name", FieldKind::Text, true)],
        evidence_requirements: vec![evidence("e1", "MFA policy", "", 1)],
    }
}

#[test]
fn catalog_has_all_eight_controls_and_validates() {
    let catalog = catalog();
    let codes: Vec<&str> = catalog.iter().map(|d| d.control_code.as_str()).collect();
    assert_eq!(codes, ["EE-1", "EE-2", "EE-3", "EE-4", "EE-5", "EE-6", "EE-7", "EE-8"]);
    for entry in &catalog {
        assert!(validate_draft(entry).is_empty(), "{} should validate", entry.control_code);
    }
}

#[test]
fn create_assigns_id_and_persists() {
    let store = MemoryStore::new();
    let created = create(&store, draft("  MFA pack ", "EE-7")).unwrap();
    assert_eq!(created.name, "MFA pack");
    assert!(!created.id.is_empty());

    let listed = list(&store).unwrap();
    assert_eq!(listed, vec![created.clone()]);
    assert_eq!(get(&store, &created.id).unwrap(), created);
}

#[test]
fn create_reports_every_missing_field() {
    let store = MemoryStore::new();
    let mut bad = draft("", " ");
    bad.company_fields.push(field("x", "", FieldKind::Text, false));
    bad.company_fields
        .push(field("tier", "Tier", FieldKind::Select, false));

    let err = create(&store, bad).unwrap_err();
    let TemplateError::Invalid(problems) = err else {
        panic!("expected validation error");
    };
    assert_eq!(problems.len(), 4);
    assert!(list(&store).unwrap().is_empty());
}

#[test]
fn update_replaces_fields_and_bumps_timestamp() {
    let store = MemoryStore::new();
    let created = create(&store, draft("MFA pack", "EE-7")).unwrap();
    let updated = update(&store, &created.id, draft("MFA pack v2", "EE-7")).unwrap();
    assert_eq!(updated.name, "MFA pack v2");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
    assert!(matches!(update(&store, "missing", draft("x", "EE-1")), Err(TemplateError::NotFound(_))));
}

#[test]
fn delete_removes_template_and_its_submissions() {
    let store = MemoryStore::new();
    let keep = create(&store, draft("Keep", "EE-8")).unwrap();
    let drop = create(&store, draft("Drop", "EE-7")).unwrap();
    let values = BTreeMap::from([("company_name".to_string(), "Acme".to_string())]);
    submit(&store, &keep.id, values.clone()).unwrap();
    submit(&store, &drop.id, values).unwrap();

    delete(&store, &drop.id).unwrap();

    assert_eq!(list(&store).unwrap(), vec![keep.clone()]);
    assert_eq!(submissions(&store, &keep.id).unwrap().len(), 1);
    assert!(submissions(&store, &drop.id).unwrap().is_empty());
    assert!(matches!(delete(&store, &drop.id), Err(TemplateError::NotFound(_))));
}

#[test]
fn import_from_catalog_is_case_insensitive_and_single_shot() {
    let store = MemoryStore::new();
    let imported = import_from_catalog(&store, "ee-8").unwrap();
    assert_eq!(imported.control_code, "EE-8");
    assert_eq!(imported.control_title, "Regular Backups");

    assert!(matches!(import_from_catalog(&store, "EE-8"), Err(TemplateError::AlreadyImported(_))));
    assert!(matches!(import_from_catalog(&store, "EE-9"), Err(TemplateError::UnknownCatalogCode(_))));
}

#[test]
fn submit_enforces_required_select_and_unknown_fields() {
    let store = MemoryStore::new();
    let template = import_from_catalog(&store, "EE-7").unwrap();

    let missing = submit(&store, &template.id, BTreeMap::new()).unwrap_err();
    let TemplateError::InvalidSubmission(problems) = missing else {
        panic!("expected submission error");
    };
    assert!(problems.iter().any(|p| p.contains("Company name")));
    assert!(problems.iter().any(|p| p.contains("Identity provider")));

    let mut values = BTreeMap::from([
        ("company_name".to_string(), "Acme".to_string()),
        ("contact_email".to_string(), "grc@acme.test".to_string()),
        ("target_maturity".to_string(), "4".to_string()),
        ("idp".to_string(), "Entra ID".to_string()),
        ("shoe_size".to_string(), "9".to_string()),
    ]);
    let err = submit(&store, &template.id, values.clone()).unwrap_err();
    let TemplateError::InvalidSubmission(problems) = err else {
        panic!("expected submission error");
    };
    assert_eq!(problems.len(), 2);

    values.insert("target_maturity".into(), "2".into());
    values.remove("shoe_size");
    let saved = submit(&store, &template.id, values).unwrap();
    assert_eq!(submissions(&store, &template.id).unwrap(), vec![saved]);
}
