mod support;

use flate2::write::GzEncoder;
use flate2::Compression;
use grantharvest_core::{
    funder_minter, harvest_funders, open_db_in_memory, CountryCodeResolver, FunderDocument,
    FunderNormalizer, FunderRecord, HarvestConfig, HarvestError, HarvestReport, LoaderError,
    RecordRepository, RegisterService, RepoError, SqliteRecordRepository,
};
use std::io::Write;
use support::{fixture, fixture_path, FakeFeed};

fn fundref_document() -> FunderDocument {
    FunderDocument::open_local(&fixture_path("fundref_test.rdf")).unwrap()
}

#[test]
fn harvests_registry_and_links_parents_transitively() {
    let conn = open_db_in_memory().unwrap();
    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);
    let document = fundref_document();

    let report =
        harvest_funders(normalizer.iter_funders(&document), &RegisterService::new(&conn)).unwrap();
    assert_eq!(
        report,
        HarvestReport {
            seen: 5,
            created: 5,
            ..HarvestReport::default()
        }
    );

    let repo = SqliteRecordRepository::new(&conn);
    assert_eq!(repo.count_records().unwrap(), 5);
    assert_eq!(repo.count_pids(Some("frdoi")).unwrap(), 5);

    let grandchild = repo
        .get_harvested::<FunderRecord>("10.13039/004")
        .unwrap()
        .unwrap();
    assert_eq!(grandchild.country, "CH");
    assert_eq!(grandchild.subtype.as_deref(), Some("foundation"));
    assert!(grandchild.acronyms.is_empty());

    let child = repo
        .resolve_funder_ref(&grandchild.parent.unwrap().uri)
        .unwrap()
        .unwrap();
    assert_eq!(child.doi, "10.13039/002");
    assert_eq!(child.acronyms, vec!["CRO".to_string()]);

    let root = repo
        .resolve_funder_ref(&child.parent.unwrap().uri)
        .unwrap()
        .unwrap();
    assert_eq!(root.doi, "10.13039/001");
    assert_eq!(root.name, "Root Funding Agency");
    assert_eq!(root.acronyms, vec!["RFA".to_string()]);
    assert_eq!(root.country, "US");
    assert!(root.parent.is_none());

    let sibling = repo
        .get_harvested::<FunderRecord>("10.13039/003")
        .unwrap()
        .unwrap();
    assert_eq!(sibling.country, "US");
    assert_eq!(sibling.subtype, None);
    assert_eq!(
        sibling.parent.map(|parent| parent.uri).as_deref(),
        Some("http://dx.doi.org/10.13039/001")
    );
}

#[test]
fn known_funders_carry_their_openaire_code() {
    let conn = open_db_in_memory().unwrap();
    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);
    let document = fundref_document();
    harvest_funders(normalizer.iter_funders(&document), &RegisterService::new(&conn)).unwrap();

    let repo = SqliteRecordRepository::new(&conn);
    let arc = repo
        .get_harvested::<FunderRecord>("10.13039/501100000923")
        .unwrap()
        .unwrap();
    assert_eq!(
        arc.identifiers.get("oaf").cloned().flatten().as_deref(),
        Some("arc_________::ARC")
    );
    assert_eq!(arc.country, "AU");

    let by_code = repo.get_by_pid("oaf", "arc_________::ARC").unwrap().unwrap();
    assert_eq!(by_code.json["doi"], "10.13039/501100000923");

    let unknown = repo
        .get_harvested::<FunderRecord>("10.13039/001")
        .unwrap()
        .unwrap();
    assert_eq!(unknown.identifiers.get("oaf"), Some(&None));
}

#[test]
fn reharvest_is_a_no_op_and_changes_replace_records() {
    let conn = open_db_in_memory().unwrap();
    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);
    let register = RegisterService::new(&conn);
    let repo = SqliteRecordRepository::new(&conn);

    let document = fundref_document();
    harvest_funders(normalizer.iter_funders(&document), &register).unwrap();
    let second = harvest_funders(normalizer.iter_funders(&document), &register).unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.unchanged, 5);
    assert_eq!(repo.count_records().unwrap(), 5);
    assert_eq!(repo.count_pids(Some("frdoi")).unwrap(), 5);

    let changed = fixture("fundref_test.rdf")
        .replacen("2015-05-05T00:00:00.000000", "2016-06-06T00:00:00.000000", 1)
        .replace("Grandchild Foundation", "Renamed Foundation");
    let document = FunderDocument::from_xml_str(&changed, "changed").unwrap();
    let third = harvest_funders(normalizer.iter_funders(&document), &register).unwrap();
    assert_eq!(third.updated, 1);
    assert_eq!(third.unchanged, 4);

    let stored = repo.get_by_pid("frdoi", "10.13039/004").unwrap().unwrap();
    assert_eq!(stored.version_id, 2);
    assert_eq!(stored.json["name"], "Renamed Foundation");
    assert_eq!(stored.json["remote_modified"], "2016-06-06T00:00:00.000000");
    assert_eq!(repo.count_records().unwrap(), 5);
}

#[test]
fn unknown_country_stops_the_funder_load() {
    let conn = open_db_in_memory().unwrap();
    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);
    let xml = fixture("fundref_test.rdf")
        .replace("sws.geonames.org/2658434/", "sws.geonames.org/1/");
    let document = FunderDocument::from_xml_str(&xml, "broken").unwrap();

    let err = harvest_funders(normalizer.iter_funders(&document), &RegisterService::new(&conn))
        .unwrap_err();
    match err {
        HarvestError::Loader(LoaderError::Country { funder_doi, source }) => {
            assert_eq!(funder_doi, "10.13039/004");
            assert_eq!(source.geo_id, "1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        SqliteRecordRepository::new(&conn).count_records().unwrap(),
        0
    );
}

#[test]
fn country_table_file_overrides_builtin_codes() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("countries.txt");
    std::fs::write(
        &table_path,
        "2658434,LI\n2077456,AU\n6252001,US\n8502121,US\n",
    )
    .unwrap();
    let config = HarvestConfig {
        country_code_source: Some(table_path),
        ..HarvestConfig::default()
    };
    let countries = CountryCodeResolver::from_config(&config).unwrap();
    assert_eq!(countries.len(), 4);

    let normalizer = FunderNormalizer::new(&config, &countries);
    let document = fundref_document();
    let funders = normalizer
        .iter_funders(&document)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let grandchild = funders
        .iter()
        .find(|funder| funder.doi == "10.13039/004")
        .unwrap();
    assert_eq!(grandchild.country, "LI");
}

#[test]
fn registry_is_read_from_gzip_and_remote_sources() {
    let dir = tempfile::tempdir().unwrap();
    let gz_path = dir.path().join("fundref.rdf.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(fixture("fundref_test.rdf").as_bytes())
        .unwrap();
    std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();

    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);

    let local = FunderDocument::open_local(&gz_path).unwrap();
    assert_eq!(normalizer.iter_funders(&local).count(), 5);

    let feed = FakeFeed::new().with_page("fundref_registry", fixture("fundref_test.rdf"));
    let requests = feed.requests();
    let remote = FunderDocument::fetch_remote(&feed, &config.fundref_endpoint).unwrap();
    assert_eq!(remote.origin(), config.fundref_endpoint);
    assert_eq!(normalizer.iter_funders(&remote).count(), 5);
    assert_eq!(requests.borrow().len(), 1);
}

#[test]
fn second_record_for_same_doi_is_rejected_by_pid_store() {
    let conn = open_db_in_memory().unwrap();
    let config = HarvestConfig::default();
    let countries = CountryCodeResolver::builtin();
    let normalizer = FunderNormalizer::new(&config, &countries);
    let document = fundref_document();
    harvest_funders(normalizer.iter_funders(&document), &RegisterService::new(&conn)).unwrap();

    let repo = SqliteRecordRepository::new(&conn);
    let existing = repo.get_by_pid("frdoi", "10.13039/002").unwrap().unwrap();
    repo.create_record("racing-copy", &existing.json).unwrap();

    let err = funder_minter(&repo, "racing-copy", &existing.json).unwrap_err();
    match err {
        RepoError::DuplicatePid {
            pid_type,
            pid_value,
        } => {
            assert_eq!(pid_type, "frdoi");
            assert_eq!(pid_value, "10.13039/002");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(repo.count_pids(Some("frdoi")).unwrap(), 5);
    assert_eq!(
        repo.get_by_pid("frdoi", "10.13039/002").unwrap().unwrap().id,
        existing.id
    );
}
