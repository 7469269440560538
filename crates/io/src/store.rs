// Enrollment store and site registry on SQLite

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, Row};

use roster_ingest::model::{CanonicalSite, EducationLevel, EnrollmentRecord};
use roster_ingest::normalize::code_key;
use roster_ingest::persist::{EnrollmentStore, StoreError};
use roster_ingest::{IngestError, SiteRegistry};

use crate::SCHEMA_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS enrollments (
    id TEXT PRIMARY KEY,
    year INTEGER NOT NULL,
    etc_code TEXT NOT NULL,
    municipality TEXT,
    institution TEXT NOT NULL,
    site TEXT NOT NULL,
    site_code TEXT,
    industrialized INTEGER,             -- NULL = unknown
    document_type TEXT,
    document_number TEXT NOT NULL,
    first_name TEXT NOT NULL,
    second_name TEXT,
    first_surname TEXT NOT NULL,
    second_surname TEXT,
    birth_date TEXT,
    age INTEGER NOT NULL DEFAULT 0,
    ethnicity TEXT,
    gender TEXT,
    grade_group TEXT NOT NULL,
    education_level TEXT NOT NULL,
    complement_am INTEGER NOT NULL DEFAULT 0,
    complement_pm INTEGER NOT NULL DEFAULT 0,
    lunch INTEGER NOT NULL DEFAULT 0,
    reinforcement INTEGER NOT NULL DEFAULT 0,
    focalization TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (document_number, year, focalization)
);

CREATE INDEX IF NOT EXISTS idx_enrollments_site
    ON enrollments (site, focalization);

CREATE TABLE IF NOT EXISTS sites (
    code TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    generic_name TEXT,
    municipality TEXT NOT NULL,
    industrialized INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const INSERT_ENROLLMENT: &str = r#"
INSERT OR IGNORE INTO enrollments (
    id, year, etc_code, municipality, institution, site, site_code, industrialized,
    document_type, document_number, first_name, second_name, first_surname, second_surname,
    birth_date, age, ethnicity, gender, grade_group, education_level,
    complement_am, complement_pm, lunch, reinforcement, focalization
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
)
"#;

const SELECT_ENROLLMENT: &str = "SELECT id, year, etc_code, municipality, institution, site, \
    site_code, industrialized, document_type, document_number, first_name, second_name, \
    first_surname, second_surname, birth_date, age, ethnicity, gender, grade_group, \
    education_level, complement_am, complement_pm, lunch, reinforcement, focalization \
    FROM enrollments";

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Enrollment records in a SQLite file.
///
/// Conflicts on the id or on (document, year, focalization) are ignored, so
/// re-running the same upload writes nothing new.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| e.to_string())?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, String> {
        conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    /// Raw connection, for seeding the `sites` table and for tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Stored records, optionally limited to one focalization, ordered by id.
    pub fn records(&self, focalization: Option<&str>) -> Result<Vec<EnrollmentRecord>, String> {
        let query = match focalization {
            Some(_) => format!("{SELECT_ENROLLMENT} WHERE focalization = ?1 ORDER BY id"),
            None => format!("{SELECT_ENROLLMENT} ORDER BY id"),
        };
        let mut stmt = self.conn.prepare(&query).map_err(|e| e.to_string())?;
        let rows = match focalization {
            Some(f) => stmt.query_map(params![f], read_record),
            None => stmt.query_map([], read_record),
        }
        .map_err(|e| e.to_string())?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record.map_err(|e| e.to_string())?);
        }
        Ok(records)
    }

    /// Records of one site and focalization, as the attendance export reads
    /// them.
    pub fn records_for_site(
        &self,
        site: &str,
        focalization: &str,
    ) -> Result<Vec<EnrollmentRecord>, String> {
        let query = format!(
            "{SELECT_ENROLLMENT} WHERE site = ?1 AND focalization = ?2 \
             ORDER BY first_surname, first_name"
        );
        let mut stmt = self.conn.prepare(&query).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![site, focalization], read_record)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    /// Add canonical sites to the registry table. Existing codes are replaced.
    pub fn load_sites(&mut self, sites: &[CanonicalSite]) -> Result<usize, String> {
        let tx = self.conn.transaction().map_err(|e| e.to_string())?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO sites
                     (code, full_name, generic_name, municipality, industrialized)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| e.to_string())?;
            for site in sites {
                stmt.execute(params![
                    site.code,
                    site.full_name,
                    site.generic_name,
                    site.municipality,
                    site.industrialized,
                ])
                .map_err(|e| e.to_string())?;
            }
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(sites.len())
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<EnrollmentRecord> {
    let level: String = row.get(19)?;
    Ok(EnrollmentRecord {
        id: row.get(0)?,
        year: row.get(1)?,
        etc_code: row.get(2)?,
        municipality: row.get(3)?,
        institution: row.get(4)?,
        site: row.get(5)?,
        site_code: row.get(6)?,
        industrialized: row.get(7)?,
        document_type: row.get(8)?,
        document_number: row.get(9)?,
        first_name: row.get(10)?,
        second_name: row.get(11)?,
        first_surname: row.get(12)?,
        second_surname: row.get(13)?,
        birth_date: row.get(14)?,
        age: row.get(15)?,
        ethnicity: row.get(16)?,
        gender: row.get(17)?,
        grade_group: row.get(18)?,
        // Unknown labels read back as the default bucket
        education_level: level.parse().unwrap_or(EducationLevel::PrimariaInicial),
        complement_am: row.get(20)?,
        complement_pm: row.get(21)?,
        lunch: row.get(22)?,
        reinforcement: row.get(23)?,
        focalization: row.get(24)?,
    })
}

impl EnrollmentStore for SqliteStore {
    fn insert_chunk(&mut self, records: &[EnrollmentRecord]) -> Result<usize, StoreError> {
        // One transaction per chunk; dropping `tx` on error rolls it back
        let tx = self.conn.transaction().map_err(backend)?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_ENROLLMENT).map_err(backend)?;
            for r in records {
                inserted += stmt
                    .execute(params![
                        r.id,
                        r.year,
                        r.etc_code,
                        r.municipality,
                        r.institution,
                        r.site,
                        r.site_code,
                        r.industrialized,
                        r.document_type,
                        r.document_number,
                        r.first_name,
                        r.second_name,
                        r.first_surname,
                        r.second_surname,
                        r.birth_date,
                        r.age,
                        r.ethnicity,
                        r.gender,
                        r.grade_group,
                        r.education_level.label(),
                        r.complement_am,
                        r.complement_pm,
                        r.lunch,
                        r.reinforcement,
                        r.focalization,
                    ])
                    .map_err(backend)?;
            }
        }
        tx.commit().map_err(backend)?;
        log::debug!("chunk of {} records: {} inserted", records.len(), inserted);
        Ok(inserted)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM enrollments", [], |row| row.get(0))
            .map_err(backend)?;
        Ok(n as usize)
    }
}

/// Read-only view of the `sites` table.
pub struct SqliteSiteRegistry {
    conn: Connection,
}

impl SqliteSiteRegistry {
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| format!("cannot open site registry {}: {}", path.display(), e))?;
        Ok(Self { conn })
    }

    fn all_sites(&self) -> rusqlite::Result<Vec<CanonicalSite>> {
        let mut stmt = self.conn.prepare(
            "SELECT full_name, generic_name, municipality, industrialized, code
             FROM sites ORDER BY code",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CanonicalSite {
                full_name: row.get(0)?,
                generic_name: row.get(1)?,
                municipality: row.get(2)?,
                industrialized: row.get(3)?,
                code: row.get(4)?,
            })
        })?;
        rows.collect()
    }
}

impl SiteRegistry for SqliteSiteRegistry {
    fn sites_for_municipality(
        &self,
        municipality: &str,
    ) -> Result<Vec<CanonicalSite>, IngestError> {
        // Municipality names are compared folded, which SQL collation can't do
        let key = code_key(municipality);
        let sites = self
            .all_sites()
            .map_err(|e| IngestError::Registry(e.to_string()))?;
        Ok(sites
            .into_iter()
            .filter(|s| code_key(&s.municipality) == key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(id: &str, doc: &str, focalization: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            id: id.into(),
            year: 2026,
            etc_code: "76".into(),
            municipality: Some("YUMBO".into()),
            institution: "IE SAN JOSE".into(),
            site: "INSTITUCION EDUCATIVA SAN JOSE SEDE A".into(),
            site_code: Some("176892000101".into()),
            industrialized: Some(false),
            document_type: None,
            document_number: doc.into(),
            first_name: "ANA".into(),
            second_name: None,
            first_surname: "PEREZ".into(),
            second_surname: None,
            birth_date: Some("2015-06-15".into()),
            age: 10,
            ethnicity: None,
            gender: Some("FEMENINO".into()),
            grade_group: "5-01".into(),
            education_level: EducationLevel::PrimariaFinal,
            complement_am: true,
            complement_pm: false,
            lunch: true,
            reinforcement: false,
            focalization: focalization.into(),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let mut store = SqliteStore::in_memory().unwrap();
        let inserted = store
            .insert_chunk(&[record("A1", "100", "F1"), record("A2", "200", "F1")])
            .unwrap();
        assert_eq!(inserted, 2);

        let records = store.records(Some("F1")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record("A1", "100", "F1"));
        assert!(store.records(Some("F9")).unwrap().is_empty());
    }

    #[test]
    fn conflicts_are_ignored_not_errors() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_chunk(&[record("A1", "100", "F1")]).unwrap();

        // Same id, then same natural key under a new id, then a new focalization
        let inserted = store
            .insert_chunk(&[
                record("A1", "999", "F1"),
                record("B7", "100", "F1"),
                record("C1", "100", "F2"),
            ])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn failing_row_rolls_back_its_chunk_only() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_doc BEFORE INSERT ON enrollments
                 WHEN NEW.document_number = '666'
                 BEGIN SELECT RAISE(ABORT, 'rejected by trigger'); END;",
            )
            .unwrap();

        store.insert_chunk(&[record("A1", "100", "F1")]).unwrap();
        let err = store
            .insert_chunk(&[record("A2", "200", "F1"), record("A3", "666", "F1")])
            .unwrap_err();
        assert!(err.to_string().contains("rejected by trigger"));
        assert_eq!(store.count().unwrap(), 1, "A2 was rolled back with its chunk");
    }

    #[test]
    fn records_for_site_filters_and_sorts() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut b = record("B", "2", "F1");
        b.first_surname = "ARANGO".into();
        let mut other = record("C", "3", "F1");
        other.site = "OTRA SEDE".into();
        store.insert_chunk(&[record("A", "1", "F1"), b, other]).unwrap();

        let rows = store
            .records_for_site("INSTITUCION EDUCATIVA SAN JOSE SEDE A", "F1")
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn registry_reads_sites_by_folded_municipality() {
        let file = NamedTempFile::with_suffix(".db").unwrap();
        {
            let mut store = SqliteStore::open(file.path()).unwrap();
            store
                .load_sites(&[
                    CanonicalSite {
                        full_name: "SEDE CENTRAL".into(),
                        generic_name: None,
                        municipality: "Guadalajara de Buga".into(),
                        industrialized: true,
                        code: "B1".into(),
                    },
                    CanonicalSite {
                        full_name: "SEDE NORTE".into(),
                        generic_name: Some("NORTE".into()),
                        municipality: "YUMBO".into(),
                        industrialized: false,
                        code: "Y1".into(),
                    },
                ])
                .unwrap();
        }

        let registry = SqliteSiteRegistry::open(file.path()).unwrap();
        let buga = registry.sites_for_municipality("GUADALAJARA DE BUGA").unwrap();
        assert_eq!(buga.len(), 1);
        assert!(buga[0].industrialized);
        let yumbo = registry.sites_for_municipality("yumbo").unwrap();
        assert_eq!(yumbo[0].generic_name.as_deref(), Some("NORTE"));
        assert!(registry.sites_for_municipality("CALI").unwrap().is_empty());
    }

    #[test]
    fn registry_without_sites_table_is_an_error() {
        let file = NamedTempFile::with_suffix(".db").unwrap();
        Connection::open(file.path())
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .unwrap();
        let registry = SqliteSiteRegistry::open(file.path()).unwrap();
        let err = registry.sites_for_municipality("YUMBO").unwrap_err();
        assert!(matches!(err, IngestError::Registry(_)));
    }
}
