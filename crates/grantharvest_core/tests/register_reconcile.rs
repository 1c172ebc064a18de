use grantharvest_core::{
    open_db_in_memory, GrantRecord, Identifiers, JsonRef, RecordRepository,
    RecordValidationError, RegisterOutcome, RegisterService, RepoError, SqliteRecordRepository,
};

fn grant(code: &str, title: &str, remote_modified: Option<&str>) -> GrantRecord {
    let mut identifiers = Identifiers::new();
    identifiers.insert(
        "eurepo".to_string(),
        Some(format!("info:eu-repo/grantAgreement/NSF//{code}/")),
    );
    identifiers.insert("purl".to_string(), None);
    GrantRecord {
        schema: "http://inveniosoftware.org/schemas/grants/grant-v1.0.0.json".to_string(),
        internal_id: GrantRecord::make_internal_id("10.13039/100000001", code),
        identifiers,
        code: code.to_string(),
        title: title.to_string(),
        acronym: None,
        startdate: None,
        enddate: None,
        url: None,
        program: None,
        funder: JsonRef::new("http://dx.doi.org/10.13039/100000001"),
        remote_modified: remote_modified.map(str::to_string),
    }
}

#[test]
fn grants_without_change_marker_compare_by_content() {
    let conn = open_db_in_memory().unwrap();
    let service = RegisterService::new(&conn);

    let created = service.register_grant(&grant("42", "Study", None)).unwrap();
    let repeated = service.register_grant(&grant("42", "Study", None)).unwrap();
    assert_eq!(
        repeated,
        RegisterOutcome::Unchanged {
            id: created.record_id().to_string()
        }
    );

    let retitled = service
        .register_grant(&grant("42", "Renamed study", None))
        .unwrap();
    assert_eq!(
        retitled,
        RegisterOutcome::Updated {
            id: created.record_id().to_string(),
            version_id: 2
        }
    );

    let repo = SqliteRecordRepository::new(&conn);
    let stored = repo
        .get_harvested::<GrantRecord>("10.13039/100000001::42")
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Renamed study");
}

#[test]
fn updates_keep_the_pids_minted_at_creation() {
    let conn = open_db_in_memory().unwrap();
    let service = RegisterService::new(&conn);

    let created = service
        .register_grant(&grant("7", "Study", Some("2016-01-01")))
        .unwrap();
    let mut changed = grant("7", "Study", Some("2016-02-01"));
    changed.identifiers.insert(
        "eurepo".to_string(),
        Some("info:eu-repo/grantAgreement/NSF/DMS/7/".to_string()),
    );
    let updated = service.register_grant(&changed).unwrap();
    assert!(matches!(updated, RegisterOutcome::Updated { .. }));

    let repo = SqliteRecordRepository::new(&conn);
    let pids = repo.list_pids_for_record(created.record_id()).unwrap();
    let values: Vec<(&str, &str)> = pids
        .iter()
        .map(|pid| (pid.pid_type.as_str(), pid.pid_value.as_str()))
        .collect();
    assert_eq!(
        values,
        vec![
            ("eurepo", "info:eu-repo/grantAgreement/NSF//7/"),
            ("grant", "10.13039/100000001::7"),
        ]
    );
    assert!(pids.iter().all(|pid| pid.status == "R"));
}

#[test]
fn invalid_records_never_reach_the_store() {
    let conn = open_db_in_memory().unwrap();
    let service = RegisterService::new(&conn);

    let mut mismatched = grant("1", "Study", None);
    mismatched.internal_id = "10.13039/100000001::2".to_string();
    let err = service.register_grant(&mismatched).unwrap_err();
    match err {
        RepoError::Validation(RecordValidationError::InternalIdMismatch { expected, .. }) => {
            assert_eq!(expected, "10.13039/100000001::1");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        SqliteRecordRepository::new(&conn).count_records().unwrap(),
        0
    );
}
