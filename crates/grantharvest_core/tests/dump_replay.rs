mod support;

use grantharvest_core::{
    harvest_grants, open_db_in_memory, DumpError, DumpReport, GrantDumper, GrantItem,
    GrantNormalizer, GrantOutput, GrantRecord, GrantSource, HarvestConfig, LoaderError,
    OaiPmhGrantSource, RecordRepository, RegisterService, SqliteGrantSource,
    SqliteRecordRepository,
};
use rusqlite::Connection;
use support::{FakeFeed, OAI_ENDPOINT};

fn remote_source(config: &HarvestConfig) -> OaiPmhGrantSource<'_> {
    OaiPmhGrantSource::new(
        Box::new(FakeFeed::projects()),
        OAI_ENDPOINT,
        "projects",
        GrantNormalizer::new(config),
    )
}

fn row_formats(path: &std::path::Path) -> Vec<String> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT format FROM grants ORDER BY rowid ASC;")
        .unwrap();
    let formats = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    formats
}

#[test]
fn json_dump_replays_the_same_canonical_grants() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");
    let config = HarvestConfig::default();
    let remote = remote_source(&config);

    let report = GrantDumper::new(&path, &remote).dump(true, 3).unwrap();
    assert_eq!(
        report,
        DumpReport {
            rows: 4,
            commits: 2
        }
    );
    assert_eq!(row_formats(&path), vec!["json"; 4]);

    let expected: Vec<GrantRecord> = remote
        .iter_grants(GrantOutput::Canonical)
        .unwrap()
        .map(|item| item.unwrap().into_canonical().unwrap())
        .collect();
    let local = SqliteGrantSource::new(&path, GrantNormalizer::new(&config));
    let replayed: Vec<GrantRecord> = local
        .iter_grants(GrantOutput::Canonical)
        .unwrap()
        .map(|item| item.unwrap().into_canonical().unwrap())
        .collect();
    assert_eq!(replayed, expected);

    let items: Vec<_> = local.iter_grants(GrantOutput::RawXml).unwrap().collect();
    assert_eq!(items.len(), 4);
    assert!(items
        .iter()
        .all(|item| matches!(item, Err(LoaderError::FormatMismatch { .. }))));
}

#[test]
fn xml_dump_keeps_raw_records_and_commits_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");
    let config = HarvestConfig::default();
    let remote = remote_source(&config);

    let report = GrantDumper::new(&path, &remote).dump(false, 2).unwrap();
    assert_eq!(
        report,
        DumpReport {
            rows: 5,
            commits: 3
        }
    );
    assert_eq!(row_formats(&path), vec!["xml"; 5]);

    let local = SqliteGrantSource::new(&path, GrantNormalizer::new(&config));
    let raw: Vec<GrantItem> = local
        .iter_grants(GrantOutput::RawXml)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let remote_raw: Vec<GrantItem> = remote
        .iter_grants(GrantOutput::RawXml)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(raw, remote_raw);

    let canonical: Vec<_> = local.iter_grants(GrantOutput::Canonical).unwrap().collect();
    assert_eq!(canonical.len(), 5);
    assert_eq!(canonical.iter().filter(|item| item.is_ok()).count(), 4);
    assert!(matches!(
        &canonical[2],
        Err(LoaderError::FunderNotFound { .. })
    ));
}

#[test]
fn dump_appends_to_an_existing_grant_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");
    let config = HarvestConfig::default();
    let remote = remote_source(&config);
    let dumper = GrantDumper::new(&path, &remote);

    dumper.dump(true, 10).unwrap();
    let second = dumper.dump(true, 0).unwrap();
    assert_eq!(
        second,
        DumpReport {
            rows: 4,
            commits: 4
        }
    );
    assert_eq!(row_formats(&path).len(), 8);
}

#[test]
fn dump_refuses_a_foreign_grants_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE grants (id INTEGER PRIMARY KEY, payload BLOB);")
        .unwrap();
    let config = HarvestConfig::default();
    let remote = remote_source(&config);

    let err = GrantDumper::new(&path, &remote).dump(true, 10).unwrap_err();
    match err {
        DumpError::DestinationConflict {
            path: conflict_path,
            columns,
        } => {
            assert_eq!(conflict_path, path);
            assert_eq!(columns, vec!["id".to_string(), "payload".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn replayed_store_registers_like_the_live_feed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");
    let config = HarvestConfig::default();
    let remote = remote_source(&config);
    GrantDumper::new(&path, &remote).dump(true, 2).unwrap();

    let conn = open_db_in_memory().unwrap();
    let register = RegisterService::new(&conn);
    let live = harvest_grants(&remote, &register).unwrap();
    assert_eq!(live.created, 4);

    let local = SqliteGrantSource::new(&path, GrantNormalizer::new(&config));
    let replay = harvest_grants(&local, &register).unwrap();
    assert_eq!(replay.unchanged, 4);
    assert_eq!(replay.skipped, 0);
    assert_eq!(
        SqliteRecordRepository::new(&conn).count_records().unwrap(),
        4
    );
}
