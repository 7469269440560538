//! Full ingestion runs against the SQLite store and registry.

use std::io::Write;

use chrono::NaiveDate;
use rust_xlsxwriter::Workbook;
use tempfile::NamedTempFile;

use roster_ingest::validate::XLSX_MEDIA_TYPE;
use roster_ingest::{
    EnrollmentStore, IngestConfig, IngestionOrchestrator, NullObserver, SourceFormat, UploadedFile,
};
use roster_io::{csv, SqliteSiteRegistry, SqliteStore};

const HEADERS: &[&str] = &[
    "PROGRAMA",
    "INSTITUCION",
    "SEDE",
    "DOCUMENTO",
    "NOMBRE1",
    "APELLIDO1",
    "FECHA_NACIMIENTO",
    "GRADO",
    "JORNADA",
];

const SITES_CSV: &str = "\
full_name;generic_name;municipality;industrialized;code
INSTITUCION EDUCATIVA SAN JOSE SEDE A;SAN JOSE A;YUMBO;1;176892000101
INSTITUCION EDUCATIVA LA BUITRERA;SEDE LA CUMBRE;YUMBO;0;176892000202
COLEGIO ACADEMICO DE BUGA;;BUGA;0;176111000001
";

fn roster(sites_and_docs: &[(&str, String)]) -> UploadedFile {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, h) in HEADERS.iter().enumerate() {
        sheet.write_string(0, c as u16, *h).unwrap();
    }
    for (r, (site, doc)) in sites_and_docs.iter().enumerate() {
        let row = ["PAE", "IE SAN JOSE", site, doc, "ANA", "PEREZ", "2015-06-15", "3", "UNICA"];
        for (c, value) in row.iter().enumerate() {
            sheet.write_string(r as u32 + 1, c as u16, *value).unwrap();
        }
    }
    UploadedFile::new("roster.xlsx", XLSX_MEDIA_TYPE, workbook.save_to_buffer().unwrap())
}

/// Registry database seeded from the CSV file, as `roster sites import` does.
fn registry_db() -> NamedTempFile {
    let mut csv_file = NamedTempFile::with_suffix(".csv").unwrap();
    csv_file.write_all(SITES_CSV.as_bytes()).unwrap();
    let sites = csv::import_sites(csv_file.path()).unwrap();

    let db = NamedTempFile::with_suffix(".db").unwrap();
    let mut store = SqliteStore::open(db.path()).unwrap();
    assert_eq!(store.load_sites(&sites).unwrap(), 3);
    db
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

#[test]
fn resolved_rows_land_in_sqlite_with_canonical_names() {
    let reg_db = registry_db();
    let registry = SqliteSiteRegistry::open(reg_db.path()).unwrap();
    let config = IngestConfig::default();
    let mut store = SqliteStore::in_memory().unwrap();

    let file = roster(&[
        ("I.E. San Jose Sede A", "1001".into()),
        ("Sede La Cumbre", "1002".into()),
        ("Sede Inexistente del Norte", "1003".into()),
    ]);
    let result = IngestionOrchestrator::new(&config, &registry)
        .with_store(&mut store)
        .with_observer(&NullObserver)
        .with_today(today())
        .run(&file, SourceFormat::New, "F1", true);

    assert!(result.success, "{}", result.message);
    assert_eq!(result.persisted_count, 2);
    assert_eq!(result.unmatched_sites, vec!["Sede Inexistente del Norte".to_string()]);

    let records = store.records(Some("F1")).unwrap();
    let mut sites: Vec<&str> = records.iter().map(|r| r.site.as_str()).collect();
    sites.sort();
    assert_eq!(
        sites,
        vec!["INSTITUCION EDUCATIVA LA BUITRERA", "INSTITUCION EDUCATIVA SAN JOSE SEDE A"]
    );
    let san_jose = records.iter().find(|r| r.document_number == "1001").unwrap();
    assert_eq!(san_jose.site_code.as_deref(), Some("176892000101"));
    assert_eq!(san_jose.industrialized, Some(true));
    assert_eq!(san_jose.age, 10);
    assert!(san_jose.complement_am && san_jose.lunch);
}

#[test]
fn rerun_against_file_store_inserts_nothing() {
    let reg_db = registry_db();
    let registry = SqliteSiteRegistry::open(reg_db.path()).unwrap();
    let config = IngestConfig::default();
    let db = NamedTempFile::with_suffix(".db").unwrap();
    let docs: Vec<(&str, String)> = (0..40)
        .map(|i| ("I.E. San Jose Sede A", format!("{}", 7000 + i)))
        .collect();

    for expected in [40, 0] {
        let mut store = SqliteStore::open(db.path()).unwrap();
        let result = IngestionOrchestrator::new(&config, &registry)
            .with_store(&mut store)
            .with_observer(&NullObserver)
            .run(&roster(&docs), SourceFormat::New, "F1", true);
        assert_eq!(result.persisted_count, expected);
    }

    let store = SqliteStore::open(db.path()).unwrap();
    assert_eq!(store.count().unwrap(), 40);
}

#[test]
fn database_failure_in_second_chunk_keeps_the_first() {
    let reg_db = registry_db();
    let registry = SqliteSiteRegistry::open(reg_db.path()).unwrap();
    let mut config = IngestConfig::default();
    config.chunk_size = 10;
    let mut store = SqliteStore::in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_doc BEFORE INSERT ON enrollments
             WHEN NEW.document_number = '9015'
             BEGIN SELECT RAISE(ABORT, 'rejected by trigger'); END;",
        )
        .unwrap();

    let docs: Vec<(&str, String)> = (0..25)
        .map(|i| ("I.E. San Jose Sede A", format!("{}", 9000 + i)))
        .collect();
    let result = IngestionOrchestrator::new(&config, &registry)
        .with_store(&mut store)
        .with_observer(&NullObserver)
        .run(&roster(&docs), SourceFormat::New, "F1", true);

    assert!(result.success);
    let outcome = result.persistence.as_ref().unwrap();
    assert_eq!(outcome.chunks_committed, 2);
    assert_eq!(outcome.chunk_failures.len(), 1);
    assert_eq!(outcome.chunk_failures[0].index, 2);
    assert!(outcome.chunk_failures[0].message.contains("rejected by trigger"));
    assert_eq!(result.persisted_count, 15);
    assert_eq!(store.count().unwrap(), 15);
}
