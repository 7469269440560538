use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RowProcessingError};
use crate::normalize::header_key;
use crate::persist::PersistenceOutcome;
use crate::preview::PreviewTable;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which of the two supported roster layouts an upload uses. Chosen by the
/// caller, fixed for the whole upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    New,
    Original,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Original => write!(f, "original"),
        }
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "nuevo" => Ok(Self::New),
            "original" => Ok(Self::Original),
            other => Err(format!("unknown source format '{other}' (expected new or original)")),
        }
    }
}

/// One spreadsheet data row: column key -> raw cell text, in sheet order.
///
/// Keys are stored as `header_key` output (trimmed, uppercased, accents
/// folded) so lookups are insensitive to how the upload spelled the header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based sheet line; the header is line 1.
    pub line: usize,
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(line: usize, fields: Vec<(String, String)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (header_key(&k), v))
            .collect();
        Self { line, fields }
    }

    /// Raw value for `column`, trimmed. Empty cells read as `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        let key = header_key(column);
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

/// A parsed sheet: the header row plus every data row below it.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RowSet {
    pub fn has_column(&self, column: &str) -> bool {
        let key = header_key(column);
        self.headers.iter().any(|h| *h == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Canonical row
// ---------------------------------------------------------------------------

/// Four independent meal-complement eligibility markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplementFlags {
    pub am: bool,
    pub pm: bool,
    pub lunch: bool,
    pub reinforcement: bool,
}

impl ComplementFlags {
    pub const NONE: Self = Self { am: false, pm: false, lunch: false, reinforcement: false };

    pub fn any(&self) -> bool {
        self.am || self.pm || self.lunch || self.reinforcement
    }
}

/// Bucketed classification of a grade code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EducationLevel {
    Preescolar,
    PrimariaInicial,
    PrimariaFinal,
    Secundaria,
    Media,
}

impl EducationLevel {
    pub const ALL: [EducationLevel; 5] = [
        Self::Preescolar,
        Self::PrimariaInicial,
        Self::PrimariaFinal,
        Self::Secundaria,
        Self::Media,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Preescolar => "PREESCOLAR",
            Self::PrimariaInicial => "PRIMARIA_INICIAL",
            Self::PrimariaFinal => "PRIMARIA_FINAL",
            Self::Secundaria => "SECUNDARIA",
            Self::Media => "MEDIA",
        }
    }
}

impl std::fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for EducationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown education level '{s}'"))
    }
}

/// Canonical internal row shape, independent of the source layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRow {
    pub line: usize,
    pub etc_code: String,
    /// Municipality as written in the source; `None` when the layout has no
    /// municipality column.
    pub municipality: Option<String>,
    pub institution: String,
    /// Site name as written in the source until the canonical rewrite.
    pub site: String,
    /// Filled in by the canonical rewrite.
    pub site_code: Option<String>,
    pub industrialized: Option<bool>,
    pub document_type: Option<String>,
    pub document_number: String,
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_surname: String,
    pub second_surname: Option<String>,
    /// Birth date text; ISO formatted when the source cell was a date.
    pub birth_date: Option<String>,
    /// Explicit age text, if the layout carries one.
    pub age: Option<String>,
    pub ethnicity: Option<String>,
    pub gender: Option<String>,
    pub grade_group: String,
    pub education_level: EducationLevel,
    pub shift: Option<String>,
    pub flags: ComplementFlags,
    pub focalization: String,
    pub year: i32,
}

// ---------------------------------------------------------------------------
// Site registry + resolution
// ---------------------------------------------------------------------------

/// A school site as held by the canonical registry. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSite {
    pub full_name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    pub municipality: String,
    /// Centrally prepared (true) vs. prepared on site (false).
    #[serde(default)]
    pub industrialized: bool,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    ExactOrFuzzyFull,
    FuzzyGeneric,
    Unmatched,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactOrFuzzyFull => write!(f, "exact_or_fuzzy_full"),
            Self::FuzzyGeneric => write!(f, "fuzzy_generic"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// Outcome of resolving one distinct raw site name.
///
/// INVARIANT: `tier == Unmatched` iff `resolved_name.is_none()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMatch {
    pub resolved_name: Option<String>,
    pub site_code: Option<String>,
    pub industrialized: Option<bool>,
    pub tier: MatchTier,
    pub score: u8,
}

impl SiteMatch {
    pub fn unmatched(score: u8) -> Self {
        Self {
            resolved_name: None,
            site_code: None,
            industrialized: None,
            tier: MatchTier::Unmatched,
            score,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.tier != MatchTier::Unmatched
    }
}

/// Mapping key: a raw site name is resolved within one municipality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SiteKey {
    pub municipality: String,
    pub raw_name: String,
}

pub type SiteMapping = BTreeMap<SiteKey, SiteMatch>;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Storage shape of one enrollment. Created by the persistence gateway only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRecord {
    pub id: String,
    pub year: i32,
    pub etc_code: String,
    pub municipality: Option<String>,
    pub institution: String,
    pub site: String,
    pub site_code: Option<String>,
    pub industrialized: Option<bool>,
    pub document_type: Option<String>,
    pub document_number: String,
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_surname: String,
    pub second_surname: Option<String>,
    pub birth_date: Option<String>,
    pub age: u32,
    pub ethnicity: Option<String>,
    pub gender: Option<String>,
    pub grade_group: String,
    pub education_level: EducationLevel,
    pub complement_am: bool,
    pub complement_pm: bool,
    pub lunch: bool,
    pub reinforcement: bool,
    pub focalization: String,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// One resolved name in the match-quality report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub raw_name: String,
    pub municipality: String,
    pub resolved_name: String,
    pub score: u8,
}

/// Row counts for one source site, split by education level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStatistics {
    pub site: String,
    pub canonical_name: Option<String>,
    pub total: usize,
    pub by_level: BTreeMap<EducationLevel, usize>,
}

/// Where the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Validating,
    Transforming,
    Resolving,
    Filtering,
    Statistics,
    Persisting,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Transforming => write!(f, "transforming"),
            Self::Resolving => write!(f, "resolving"),
            Self::Filtering => write!(f, "filtering"),
            Self::Statistics => write!(f, "statistics"),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Everything a caller learns from one ingestion run. Always fully populated,
/// including on hard failure.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub success: bool,
    pub message: String,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_columns: Vec<String>,
    pub format: SourceFormat,
    pub focalization: String,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub resolved_rows: usize,
    pub exact_matches: usize,
    pub unmatched_sites: Vec<String>,
    pub fuzzy_full_matches: Vec<MatchReport>,
    pub fuzzy_generic_matches: Vec<MatchReport>,
    pub statistics: Vec<SiteStatistics>,
    pub persisted_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceOutcome>,
    pub errors: Vec<RowProcessingError>,
    pub warnings: Vec<String>,
    pub preview: PreviewTable,
}

impl IngestionResult {
    pub fn empty(format: SourceFormat, focalization: &str) -> Self {
        Self {
            success: false,
            message: String::new(),
            state: PipelineState::Validating,
            error_kind: None,
            missing_columns: Vec::new(),
            format,
            focalization: focalization.to_string(),
            total_rows: 0,
            valid_rows: 0,
            resolved_rows: 0,
            exact_matches: 0,
            unmatched_sites: Vec::new(),
            fuzzy_full_matches: Vec::new(),
            fuzzy_generic_matches: Vec::new(),
            statistics: Vec::new(),
            persisted_count: 0,
            persistence: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            preview: PreviewTable::default(),
        }
    }
}
