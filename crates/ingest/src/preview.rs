//! Bounded tabular view of cleaned rows, for display only.

use serde::Serialize;

use crate::model::CleanedRow;

pub const PREVIEW_COLUMNS: &[&str] = &[
    "line",
    "document",
    "name",
    "site",
    "municipality",
    "grade",
    "level",
    "shift",
    "am",
    "pm",
    "lunch",
    "reinforcement",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviewTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows available before the bound was applied.
    pub total_rows: usize,
}

impl PreviewTable {
    /// First `limit` rows of `rows`.
    pub fn from_rows(rows: &[CleanedRow], limit: usize) -> Self {
        Self {
            columns: PREVIEW_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: rows.iter().take(limit).map(preview_row).collect(),
            total_rows: rows.len(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.rows.len() < self.total_rows
    }
}

fn flag(b: bool) -> String {
    if b { "x" } else { "" }.to_string()
}

fn preview_row(row: &CleanedRow) -> Vec<String> {
    let name = [
        Some(row.first_name.as_str()),
        row.second_name.as_deref(),
        Some(row.first_surname.as_str()),
        row.second_surname.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    vec![
        row.line.to_string(),
        row.document_number.clone(),
        name,
        row.site.clone(),
        row.municipality.clone().unwrap_or_default(),
        row.grade_group.clone(),
        row.education_level.label().to_string(),
        row.shift.clone().unwrap_or_default(),
        flag(row.flags.am),
        flag(row.flags.pm),
        flag(row.flags.lunch),
        flag(row.flags.reinforcement),
    ]
}
