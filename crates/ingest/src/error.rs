use serde::Serialize;
use thiserror::Error;

use crate::model::SourceFormat;

/// Fatal pipeline errors. Any of these aborts an ingestion run; the
/// orchestrator converts them into a `success = false` result.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Wrong media type, extension, or size. Raised before parsing.
    #[error("invalid file: {0}")]
    InvalidFile(String),
    /// The parser could not read the workbook, or it holds no data rows.
    #[error("malformed file: {0}")]
    MalformedFile(String),
    /// Columns required by the selected layout are absent. Lists all of them.
    #[error("missing required columns for {format} layout: {}", .columns.join(", "))]
    MissingColumns {
        format: SourceFormat,
        columns: Vec<String>,
    },
    /// Structural filters left nothing to ingest.
    #[error("no valid rows: {0}")]
    NoValidRows(String),
    /// TOML parse / validation error.
    #[error("config error: {0}")]
    Config(String),
    /// The canonical site registry could not be read.
    #[error("site registry error: {0}")]
    Registry(String),
    /// The enrollment store rejected an operation.
    #[error("store error: {0}")]
    Store(String),
}

impl IngestError {
    /// Stable machine-readable kind, used in JSON output and exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFile(_) => ErrorKind::InvalidFile,
            Self::MalformedFile(_) => ErrorKind::MalformedFile,
            Self::MissingColumns { .. } => ErrorKind::MissingColumns,
            Self::NoValidRows(_) => ErrorKind::NoValidRows,
            Self::Config(_) => ErrorKind::Config,
            Self::Registry(_) => ErrorKind::Registry,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFile,
    MalformedFile,
    MissingColumns,
    NoValidRows,
    Config,
    Registry,
    Store,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFile => write!(f, "invalid_file"),
            Self::MalformedFile => write!(f, "malformed_file"),
            Self::MissingColumns => write!(f, "missing_columns"),
            Self::NoValidRows => write!(f, "no_valid_rows"),
            Self::Config => write!(f, "config"),
            Self::Registry => write!(f, "registry"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// A non-fatal, single-row failure raised while building the storage record.
/// The row is dropped and the batch continues.
///
/// `line` is the 1-based spreadsheet line (header = line 1), so the offending
/// cell can be found by opening the original upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowProcessingError {
    pub line: usize,
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for RowProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: {} '{}': {}",
            self.line, self.field, self.value, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_lists_every_column() {
        let err = IngestError::MissingColumns {
            format: SourceFormat::Original,
            columns: vec!["SEDE".into(), "JORNADA".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("original"));
        assert!(msg.contains("SEDE, JORNADA"));
        assert_eq!(err.kind(), ErrorKind::MissingColumns);
    }

    #[test]
    fn row_error_display_points_at_line() {
        let err = RowProcessingError {
            line: 14,
            field: "document_number".into(),
            value: "N/A".into(),
            message: "no digits".into(),
        };
        assert_eq!(err.to_string(), "line 14: document_number 'N/A': no digits");
    }
}
