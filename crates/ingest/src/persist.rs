//! Storage-record construction and chunked, conflict-ignoring writes.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::RowProcessingError;
use crate::model::{CleanedRow, EnrollmentRecord};
use crate::normalize::fold_accents;
use crate::observer::{IngestObserver, PipelineEvent};

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("chunk rejected: {0}")]
    Rejected(String),
}

/// Where enrollment records end up.
pub trait EnrollmentStore {
    /// Insert one chunk as a single atomic unit, ignoring rows that collide
    /// with existing ones. Returns how many rows were actually written.
    fn insert_chunk(&mut self, records: &[EnrollmentRecord]) -> Result<usize, StoreError>;

    /// Total records held.
    fn count(&self) -> Result<usize, StoreError>;
}

/// Natural key a store may enforce: (document, year, focalization).
pub fn natural_key(record: &EnrollmentRecord) -> (String, i32, String) {
    (
        record.document_number.clone(),
        record.year,
        record.focalization.clone(),
    )
}

/// In-memory store with the same conflict rules as the SQLite one: unique id
/// and unique natural key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, EnrollmentRecord>,
    natural: BTreeSet<(String, i32, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &EnrollmentRecord> {
        self.records.values()
    }
}

impl EnrollmentStore for MemoryStore {
    fn insert_chunk(&mut self, records: &[EnrollmentRecord]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for record in records {
            let key = natural_key(record);
            if self.records.contains_key(&record.id) || self.natural.contains(&key) {
                continue;
            }
            self.natural.insert(key);
            self.records.insert(record.id.clone(), record.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

// ---------------------------------------------------------------------------
// Identifier synthesis
// ---------------------------------------------------------------------------

pub const MAX_ID_LEN: usize = 30;
const TRUNCATED_ID_LEN: usize = 20;
const MAX_DOC_DIGITS: usize = 12;
/// Attempts at a fresh opaque suffix when an id was already issued.
const MAX_ID_REDRAWS: usize = 8;

/// Source of the identifier tail.
pub trait IdSuffix {
    /// 8 opaque characters, used when the base identifier is too long.
    fn opaque(&mut self) -> String;
    /// 4 digits, used otherwise.
    fn clock(&mut self) -> String;
}

/// UUID v4 for the opaque tail, the nanosecond clock for the short one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdSuffix;

impl IdSuffix for SystemIdSuffix {
    fn opaque(&mut self) -> String {
        uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect()
    }

    fn clock(&mut self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("{:04}", nanos % 10_000)
    }
}

/// First three letters of the municipality, folded and uppercased, padded
/// with `X`.
pub fn municipality_prefix(municipality: &str) -> String {
    let mut prefix: String = fold_accents(municipality)
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while prefix.len() < 3 {
        prefix.push('X');
    }
    prefix
}

/// `year + MUN + digits + TAG`, then the suffix rule.
pub fn synthesize_id(
    year: i32,
    municipality: &str,
    document_digits: &str,
    focalization: &str,
    suffix: &mut dyn IdSuffix,
) -> String {
    let tag: String = fold_accents(focalization)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let base = format!("{year}{}{document_digits}{tag}", municipality_prefix(municipality));

    // ASCII only from here, so byte slicing is char slicing
    if base.len() > MAX_ID_LEN {
        format!("{}{}", &base[..TRUNCATED_ID_LEN], suffix.opaque())
    } else {
        format!("{base}{}", suffix.clock())
    }
}

// ---------------------------------------------------------------------------
// Age
// ---------------------------------------------------------------------------

const BIRTH_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    BIRTH_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Whole years between `birth` and `today`; one less if this year's birthday
/// has not come yet. Never negative.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Explicit age if it parses, otherwise derived from the birth date,
/// otherwise 0.
pub fn resolve_age(explicit: Option<&str>, birth_date: Option<&str>, today: NaiveDate) -> u32 {
    if let Some(age) = explicit.and_then(|a| a.trim().parse::<u32>().ok()) {
        return age;
    }
    birth_date
        .and_then(parse_birth_date)
        .map(|b| age_on(b, today))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    /// 1-based chunk number.
    pub index: usize,
    pub rows: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistenceOutcome {
    /// Rows handed to the gateway.
    pub submitted: usize,
    /// Records built; `submitted - constructed == row_errors.len()`.
    pub constructed: usize,
    pub inserted: usize,
    /// Rows of committed chunks the store skipped as duplicates.
    pub ignored_conflicts: usize,
    pub chunks_committed: usize,
    pub chunk_failures: Vec<ChunkFailure>,
    pub row_errors: Vec<RowProcessingError>,
}

impl PersistenceOutcome {
    pub fn is_complete(&self) -> bool {
        self.chunk_failures.is_empty()
    }
}

pub struct PersistenceGateway<'a> {
    store: &'a mut dyn EnrollmentStore,
    chunk_size: usize,
    fallback_municipality: String,
    today: NaiveDate,
    suffix: Box<dyn IdSuffix>,
    /// Ids handed out by this gateway; documents sharing their id digits
    /// must not share an id.
    issued: BTreeSet<String>,
}

impl<'a> PersistenceGateway<'a> {
    pub fn new(store: &'a mut dyn EnrollmentStore, fallback_municipality: &str) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fallback_municipality: fallback_municipality.to_string(),
            today: Local::now().date_naive(),
            suffix: Box::new(SystemIdSuffix),
            issued: BTreeSet::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_suffix(mut self, suffix: Box<dyn IdSuffix>) -> Self {
        self.suffix = suffix;
        self
    }

    /// Give back the suffix source, so a caller can reuse it across runs.
    pub fn into_suffix(self) -> Box<dyn IdSuffix> {
        self.suffix
    }

    /// Map one canonical row to its storage shape.
    pub fn build_record(
        &mut self,
        row: &CleanedRow,
    ) -> Result<EnrollmentRecord, RowProcessingError> {
        let digits: String = row
            .document_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(MAX_DOC_DIGITS)
            .collect();
        if digits.is_empty() {
            return Err(RowProcessingError {
                line: row.line,
                field: "document_number".into(),
                value: row.document_number.clone(),
                message: "document number has no digits".into(),
            });
        }

        let municipality = row
            .municipality
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.fallback_municipality.clone());
        let mut id = synthesize_id(
            row.year,
            &municipality,
            &digits,
            &row.focalization,
            self.suffix.as_mut(),
        );
        for _ in 0..MAX_ID_REDRAWS {
            if !self.issued.contains(&id) {
                break;
            }
            let head = &id[..id.len().min(TRUNCATED_ID_LEN)];
            id = format!("{}{}", head, self.suffix.opaque());
        }
        self.issued.insert(id.clone());

        Ok(EnrollmentRecord {
            id,
            year: row.year,
            etc_code: row.etc_code.clone(),
            municipality: Some(municipality),
            institution: row.institution.clone(),
            site: row.site.clone(),
            site_code: row.site_code.clone(),
            industrialized: row.industrialized,
            document_type: row.document_type.clone(),
            document_number: row.document_number.trim().to_string(),
            first_name: row.first_name.clone(),
            second_name: row.second_name.clone(),
            first_surname: row.first_surname.clone(),
            second_surname: row.second_surname.clone(),
            birth_date: row.birth_date.clone(),
            age: resolve_age(row.age.as_deref(), row.birth_date.as_deref(), self.today),
            ethnicity: row.ethnicity.clone(),
            gender: row.gender.clone(),
            grade_group: row.grade_group.clone(),
            education_level: row.education_level,
            complement_am: row.flags.am,
            complement_pm: row.flags.pm,
            lunch: row.flags.lunch,
            reinforcement: row.flags.reinforcement,
            focalization: row.focalization.clone(),
        })
    }

    /// Build every record, then write them in chunks. A failed chunk is
    /// recorded and skipped; chunks already committed stay committed.
    pub fn persist(
        &mut self,
        rows: &[CleanedRow],
        observer: &dyn IngestObserver,
    ) -> PersistenceOutcome {
        let mut outcome = PersistenceOutcome {
            submitted: rows.len(),
            ..PersistenceOutcome::default()
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match self.build_record(row) {
                Ok(record) => records.push(record),
                Err(error) => {
                    observer.on_event(&PipelineEvent::RowRejected { error: error.clone() });
                    outcome.row_errors.push(error);
                }
            }
        }
        outcome.constructed = records.len();

        for (i, chunk) in records.chunks(self.chunk_size).enumerate() {
            let index = i + 1;
            match self.store.insert_chunk(chunk) {
                Ok(inserted) => {
                    let ignored = chunk.len().saturating_sub(inserted);
                    outcome.inserted += inserted;
                    outcome.ignored_conflicts += ignored;
                    outcome.chunks_committed += 1;
                    observer.on_event(&PipelineEvent::ChunkCommitted { index, inserted, ignored });
                }
                Err(e) => {
                    let failure = ChunkFailure {
                        index,
                        rows: chunk.len(),
                        message: e.to_string(),
                    };
                    observer.on_event(&PipelineEvent::ChunkFailed {
                        index,
                        rows: failure.rows,
                        message: failure.message.clone(),
                    });
                    outcome.chunk_failures.push(failure);
                }
            }
        }

        outcome
    }
}
