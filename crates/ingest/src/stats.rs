//! Per-site, per-level row counts for the ingestion report.

use std::collections::BTreeMap;

use crate::model::{CleanedRow, EducationLevel, SiteStatistics};

/// Groups rows by the site name they were uploaded with. Must run before the
/// canonical rewrite; the canonical name is attached alongside, not used as
/// the grouping key.
#[derive(Debug, Default)]
pub struct StatisticsBuilder {
    sites: BTreeMap<String, SiteStatistics>,
}

impl StatisticsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: &CleanedRow, canonical_name: Option<&str>) {
        let entry = self.sites.entry(row.site.clone()).or_insert_with(|| SiteStatistics {
            site: row.site.clone(),
            canonical_name: canonical_name.map(str::to_string),
            total: 0,
            by_level: EducationLevel::ALL.iter().map(|l| (*l, 0)).collect(),
        });
        entry.total += 1;
        *entry.by_level.entry(row.education_level).or_insert(0) += 1;
    }

    /// Sorted by source site name.
    pub fn finish(self) -> Vec<SiteStatistics> {
        self.sites.into_values().collect()
    }

    pub fn build<'r>(
        rows: impl IntoIterator<Item = (&'r CleanedRow, Option<&'r str>)>,
    ) -> Vec<SiteStatistics> {
        let mut builder = Self::new();
        for (row, canonical) in rows {
            builder.add(row, canonical);
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComplementFlags;

    fn row(site: &str, level: EducationLevel) -> CleanedRow {
        CleanedRow {
            line: 2,
            etc_code: "76".into(),
            municipality: None,
            institution: "IE".into(),
            site: site.into(),
            site_code: None,
            industrialized: None,
            document_type: None,
            document_number: "1".into(),
            first_name: "A".into(),
            second_name: None,
            first_surname: "B".into(),
            second_surname: None,
            birth_date: None,
            age: None,
            ethnicity: None,
            gender: None,
            grade_group: "1".into(),
            education_level: level,
            shift: None,
            flags: ComplementFlags::NONE,
            focalization: "F".into(),
            year: 2026,
        }
    }

    #[test]
    fn groups_by_source_name_and_level() {
        let rows = vec![
            row("Sede A", EducationLevel::Preescolar),
            row("SEDE B", EducationLevel::Media),
            row("Sede A", EducationLevel::Preescolar),
            row("Sede A", EducationLevel::Secundaria),
        ];
        let stats = StatisticsBuilder::build(rows.iter().map(|r| (r, Some("CANON"))));
        assert_eq!(stats.len(), 2);

        let a = stats.iter().find(|s| s.site == "Sede A").unwrap();
        assert_eq!(a.total, 3);
        assert_eq!(a.by_level[&EducationLevel::Preescolar], 2);
        assert_eq!(a.by_level[&EducationLevel::Secundaria], 1);
        assert_eq!(a.by_level[&EducationLevel::Media], 0);
        assert_eq!(a.canonical_name.as_deref(), Some("CANON"));
        assert_eq!(a.by_level.values().sum::<usize>(), a.total);
    }

    #[test]
    fn empty_input_gives_no_sites() {
        assert!(StatisticsBuilder::build(std::iter::empty()).is_empty());
    }
}
