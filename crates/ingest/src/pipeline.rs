//! End-to-end ingestion of one uploaded roster.
//!
//! ```text
//! Validating -> Transforming -> Resolving -> Filtering -> Statistics -> [Persisting] -> Done
//!      \______________\_____________________________________________________ Failed
//! ```
//!
//! Only validation and transformation can fail the run. Everything after
//! degrades the result instead (fewer rows, unmatched sites, warnings).

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{
    CleanedRow, IngestionResult, MatchReport, MatchTier, PipelineState, RowSet, SiteMatch,
    SourceFormat,
};
use crate::normalize::normalize_name;
use crate::observer::{IngestObserver, LogObserver, PipelineEvent};
use crate::persist::{EnrollmentStore, IdSuffix, PersistenceGateway};
use crate::preview::PreviewTable;
use crate::resolver::{SiteNameResolver, SiteRegistry};
use crate::stats::StatisticsBuilder;
use crate::transform::FormatTransformer;
use crate::validate::{SpreadsheetValidator, UploadedFile, ValidationOutcome};

pub struct IngestionOrchestrator<'a> {
    config: &'a IngestConfig,
    registry: &'a dyn SiteRegistry,
    store: Option<&'a mut dyn EnrollmentStore>,
    observer: &'a dyn IngestObserver,
    today: Option<NaiveDate>,
    suffix: Option<Box<dyn IdSuffix>>,
}

impl<'a> IngestionOrchestrator<'a> {
    pub fn new(config: &'a IngestConfig, registry: &'a dyn SiteRegistry) -> Self {
        Self {
            config,
            registry,
            store: None,
            observer: &LogObserver,
            today: None,
            suffix: None,
        }
    }

    pub fn with_store(mut self, store: &'a mut dyn EnrollmentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn IngestObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Reference date for age computation. Defaults to the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_suffix(mut self, suffix: Box<dyn IdSuffix>) -> Self {
        self.suffix = Some(suffix);
        self
    }

    /// Run the whole pipeline. Never fails: hard errors come back as
    /// `success = false` with the state they happened in.
    pub fn run(
        &mut self,
        file: &UploadedFile,
        format: SourceFormat,
        focalization: &str,
        persist: bool,
    ) -> IngestionResult {
        self.run_with_rows(file, format, focalization, persist).0
    }

    /// Like `run`, also handing back the resolved rows (after the canonical
    /// rewrite). Empty on hard failure.
    pub fn run_with_rows(
        &mut self,
        file: &UploadedFile,
        format: SourceFormat,
        focalization: &str,
        persist: bool,
    ) -> (IngestionResult, Vec<CleanedRow>) {
        let mut result = IngestionResult::empty(format, focalization.trim());
        match self.execute(&mut result, file, format, focalization, persist) {
            Ok(rows) => (result, rows),
            Err(e) => {
                self.fail(&mut result, e);
                (result, Vec::new())
            }
        }
    }

    /// Validation stage only: type gate, parse, required columns and row
    /// filters. Nothing is resolved or written.
    pub fn validate_only(&self, file: &UploadedFile, format: SourceFormat) -> IngestionResult {
        let mut result = IngestionResult::empty(format, "");
        match self.validate_stage(&mut result, file, format) {
            Ok(rows) => {
                let passing = rows
                    .rows
                    .iter()
                    .filter(|r| crate::transform::passes_filters(r, format, self.config))
                    .count();
                result.valid_rows = passing;
                result.success = true;
                result.state = PipelineState::Done;
                result.message = format!(
                    "{} is a valid {} roster: {} rows, {} pass the filters",
                    file.file_name,
                    format,
                    rows.len(),
                    passing
                );
            }
            Err(e) => self.fail(&mut result, e),
        }
        result
    }

    fn enter(&self, result: &mut IngestionResult, state: PipelineState) {
        result.state = state;
        self.observer.on_event(&PipelineEvent::StageStarted { state });
    }

    fn warn(&self, result: &mut IngestionResult, message: String) {
        self.observer.on_event(&PipelineEvent::Warning { message: message.clone() });
        result.warnings.push(message);
    }

    fn fail(&self, result: &mut IngestionResult, err: IngestError) {
        let failed_in = result.state;
        if let IngestError::MissingColumns { columns, .. } = &err {
            result.missing_columns = columns.clone();
        }
        result.success = false;
        result.error_kind = Some(err.kind());
        result.message = err.to_string();
        result.state = PipelineState::Failed;
        self.observer.on_event(&PipelineEvent::Failed {
            state: failed_in,
            kind: err.kind(),
            message: result.message.clone(),
        });
    }

    fn validate_stage(
        &self,
        result: &mut IngestionResult,
        file: &UploadedFile,
        format: SourceFormat,
    ) -> Result<RowSet, IngestError> {
        self.enter(result, PipelineState::Validating);
        self.config.validate()?;

        let validator = SpreadsheetValidator::new(self.config);
        let rows = match validator.validate(file)? {
            ValidationOutcome::Accepted(rows) => rows,
            ValidationOutcome::Rejected { reason } => return Err(IngestError::InvalidFile(reason)),
        };
        result.total_rows = rows.len();
        self.observer.on_event(&PipelineEvent::RowsRead { total: rows.len() });

        let missing = validator.validate_structure(&rows, format);
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns { format, columns: missing });
        }

        validator.check_rows(&rows, format)?;
        Ok(rows)
    }

    fn execute(
        &mut self,
        result: &mut IngestionResult,
        file: &UploadedFile,
        format: SourceFormat,
        focalization: &str,
        persist: bool,
    ) -> Result<Vec<CleanedRow>, IngestError> {
        if persist && self.store.is_none() {
            self.enter(result, PipelineState::Validating);
            return Err(IngestError::Store(
                "persistence was requested but no enrollment store is configured".into(),
            ));
        }

        // Validating
        let raw = self.validate_stage(result, file, format)?;

        // Transforming
        self.enter(result, PipelineState::Transforming);
        let rows = FormatTransformer::new(self.config).transform(&raw.rows, format, focalization);
        result.valid_rows = rows.len();
        self.observer.on_event(&PipelineEvent::RowsTransformed {
            kept: rows.len(),
            filtered_out: raw.len() - rows.len(),
        });
        if rows.is_empty() {
            return Err(IngestError::NoValidRows("every row was filtered out".into()));
        }

        // Resolving
        self.enter(result, PipelineState::Resolving);
        let resolver = SiteNameResolver::new(self.registry, self.config.fallback_municipality())
            .with_threshold(self.config.match_threshold);
        let keys = resolver.distinct_keys(&rows);
        let resolution = resolver.resolve(&keys);
        for warning in &resolution.warnings {
            self.warn(result, warning.clone());
        }
        self.report_matches(result, &resolution.mapping);

        // Filtering
        self.enter(result, PipelineState::Filtering);
        let mut kept: Vec<(CleanedRow, SiteMatch)> = Vec::with_capacity(rows.len());
        let mut blank_sites = 0;
        for row in rows {
            let key = resolver.key_for(&row);
            match resolution.get(&key) {
                Some(m) if m.is_matched() => kept.push((row, m.clone())),
                _ => {
                    if row.site.trim().is_empty() {
                        blank_sites += 1;
                    }
                }
            }
        }
        let dropped = result.valid_rows - kept.len();
        result.resolved_rows = kept.len();
        self.observer.on_event(&PipelineEvent::RowsFiltered { kept: kept.len(), dropped });
        if blank_sites > 0 {
            self.warn(result, format!("{blank_sites} rows have no site name and were dropped"));
        }

        // Statistics, on source names, before the canonical rewrite
        self.enter(result, PipelineState::Statistics);
        result.statistics =
            StatisticsBuilder::build(kept.iter().map(|(row, m)| (row, m.resolved_name.as_deref())));

        let resolved: Vec<CleanedRow> = kept.into_iter().map(|(row, m)| rewrite(row, m)).collect();
        result.preview = PreviewTable::from_rows(&resolved, self.config.preview_rows);

        // Persisting
        if persist {
            self.enter(result, PipelineState::Persisting);
            self.persist_rows(result, &resolved);
        }

        self.enter(result, PipelineState::Done);
        result.success = true;
        result.message = summary(result, persist);
        self.observer.on_event(&PipelineEvent::Finished {
            success: true,
            persisted: result.persisted_count,
        });
        Ok(resolved)
    }

    fn report_matches(&self, result: &mut IngestionResult, mapping: &crate::model::SiteMapping) {
        let mut unmatched = BTreeSet::new();
        for (key, m) in mapping {
            let report = || MatchReport {
                raw_name: key.raw_name.clone(),
                municipality: key.municipality.clone(),
                resolved_name: m.resolved_name.clone().unwrap_or_default(),
                score: m.score,
            };
            match m.tier {
                // A perfect score can come from a token subset; only an
                // identical normalized name counts as exact
                MatchTier::ExactOrFuzzyFull if is_exact(&key.raw_name, m) => {
                    result.exact_matches += 1
                }
                MatchTier::ExactOrFuzzyFull => result.fuzzy_full_matches.push(report()),
                MatchTier::FuzzyGeneric => result.fuzzy_generic_matches.push(report()),
                MatchTier::Unmatched => {
                    if !key.raw_name.trim().is_empty() {
                        unmatched.insert(key.raw_name.clone());
                    }
                }
            }
        }
        result.unmatched_sites = unmatched.into_iter().collect();

        self.observer.on_event(&PipelineEvent::SitesResolved {
            distinct: mapping.len(),
            exact: result.exact_matches,
            fuzzy_full: result.fuzzy_full_matches.len(),
            fuzzy_generic: result.fuzzy_generic_matches.len(),
            unmatched: mapping.values().filter(|m| !m.is_matched()).count(),
        });
    }

    fn persist_rows(&mut self, result: &mut IngestionResult, rows: &[CleanedRow]) {
        let Some(store) = self.store.as_deref_mut() else {
            return;
        };

        let mut gateway = PersistenceGateway::new(store, self.config.fallback_municipality())
            .with_chunk_size(self.config.chunk_size);
        if let Some(today) = self.today {
            gateway = gateway.with_today(today);
        }
        if let Some(suffix) = self.suffix.take() {
            gateway = gateway.with_suffix(suffix);
        }

        let outcome = gateway.persist(rows, self.observer);
        self.suffix = Some(gateway.into_suffix());

        for failure in &outcome.chunk_failures {
            self.warn(
                result,
                format!(
                    "chunk {} ({} rows) was not written: {}",
                    failure.index, failure.rows, failure.message
                ),
            );
        }
        result.persisted_count = outcome.inserted;
        result.errors = outcome.row_errors.clone();
        result.persistence = Some(outcome);
    }
}

fn is_exact(raw_name: &str, m: &SiteMatch) -> bool {
    m.resolved_name
        .as_deref()
        .is_some_and(|resolved| normalize_name(resolved) == normalize_name(raw_name))
}

/// Canonical rewrite: the site field takes the registry's full name.
fn rewrite(mut row: CleanedRow, m: SiteMatch) -> CleanedRow {
    if let Some(name) = m.resolved_name {
        row.site = name;
    }
    row.site_code = m.site_code;
    row.industrialized = m.industrialized;
    row
}

fn summary(result: &IngestionResult, persist: bool) -> String {
    if result.resolved_rows == 0 {
        return format!(
            "no rows matched a canonical site ({} unmatched site names); nothing to persist",
            result.unmatched_sites.len()
        );
    }
    match &result.persistence {
        Some(outcome) if persist => {
            let mut msg = format!(
                "persisted {} of {} resolved rows",
                outcome.inserted, result.resolved_rows
            );
            if outcome.ignored_conflicts > 0 {
                msg.push_str(&format!(", {} already present", outcome.ignored_conflicts));
            }
            if !outcome.row_errors.is_empty() {
                msg.push_str(&format!(", {} rows rejected", outcome.row_errors.len()));
            }
            if !outcome.is_complete() {
                msg.push_str(&format!(", {} chunks failed", outcome.chunk_failures.len()));
            }
            msg
        }
        _ => format!(
            "{} of {} rows resolved to a canonical site (not persisted)",
            result.resolved_rows, result.valid_rows
        ),
    }
}
