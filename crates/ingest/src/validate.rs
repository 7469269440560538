//! Upload checks that run before any business logic.

use std::path::Path;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{RowSet, SourceFormat};
use crate::sheet;
use crate::transform::{self, passes_original_filters};

pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const XLS_MEDIA_TYPE: &str = "application/vnd.ms-excel";

pub const ACCEPTED_MEDIA_TYPES: &[&str] = &[XLSX_MEDIA_TYPE, XLS_MEDIA_TYPE];
pub const ACCEPTED_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Media type a client would declare for a file with this extension.
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "xlsx" => Some(XLSX_MEDIA_TYPE),
        "xls" => Some(XLS_MEDIA_TYPE),
        _ => None,
    }
}

/// An upload as the caller received it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    /// Declared media type. Not sniffed from the bytes.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Accepted(RowSet),
    Rejected { reason: String },
}

pub struct SpreadsheetValidator<'a> {
    config: &'a IngestConfig,
}

impl<'a> SpreadsheetValidator<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    /// Type/extension/size gate, then parse.
    ///
    /// A rejected upload is an `Ok(Rejected)` with a reason. A file that
    /// passes the gate but cannot be parsed is `Err(MalformedFile)`.
    pub fn validate(&self, file: &UploadedFile) -> Result<ValidationOutcome, IngestError> {
        if let Some(reason) = self.rejection(file) {
            log::info!("rejected upload {}: {}", file.file_name, reason);
            return Ok(ValidationOutcome::Rejected { reason });
        }
        if file.bytes.is_empty() {
            return Err(IngestError::MalformedFile(format!("{} is empty", file.file_name)));
        }
        let rows = sheet::read_rows(&file.bytes)?;
        Ok(ValidationOutcome::Accepted(rows))
    }

    fn rejection(&self, file: &UploadedFile) -> Option<String> {
        let media_type = file.media_type.trim().to_ascii_lowercase();
        if !ACCEPTED_MEDIA_TYPES.contains(&media_type.as_str()) {
            return Some(format!(
                "unsupported media type '{}' (expected an Excel spreadsheet)",
                file.media_type
            ));
        }

        match file.extension() {
            Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => {}
            Some(ext) => {
                return Some(format!("unsupported extension '.{ext}' (expected .xlsx or .xls)"))
            }
            None => {
                return Some("file name has no extension (expected .xlsx or .xls)".into())
            }
        }

        let size = file.bytes.len() as u64;
        if size > self.config.max_file_bytes {
            return Some(format!(
                "file is {} bytes, limit is {} bytes",
                size, self.config.max_file_bytes
            ));
        }

        None
    }

    /// Missing required columns for `format`. Empty means the structure is
    /// valid; every missing column is listed, not just the first.
    pub fn validate_structure(&self, rows: &RowSet, format: SourceFormat) -> Vec<String> {
        transform::required_columns(format, self.config)
            .into_iter()
            .filter(|col| !rows.has_column(col))
            .collect()
    }

    /// Row-level preconditions: at least one row must survive the layout's
    /// filters.
    pub fn check_rows(&self, rows: &RowSet, format: SourceFormat) -> Result<(), IngestError> {
        match format {
            SourceFormat::New => {
                let cfg = &self.config.new_format;
                let matching = rows
                    .rows
                    .iter()
                    .filter(|r| transform::is_discriminator_row(r, self.config))
                    .count();
                if matching == 0 {
                    return Err(IngestError::NoValidRows(format!(
                        "no row has {} = {}",
                        cfg.discriminator_column, cfg.discriminator_value
                    )));
                }
            }
            SourceFormat::Original => {
                let remaining = rows
                    .rows
                    .iter()
                    .filter(|r| passes_original_filters(r, self.config))
                    .count();
                if remaining == 0 {
                    let cfg = &self.config.original_format;
                    return Err(IngestError::NoValidRows(format!(
                        "no row is {} in the {} sector outside the excluded models",
                        cfg.enrolled_status, cfg.official_sector
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRow;

    fn file(name: &str, media: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile::new(name, media, bytes.to_vec())
    }

    fn reason(outcome: ValidationOutcome) -> String {
        match outcome {
            ValidationOutcome::Rejected { reason } => reason,
            ValidationOutcome::Accepted(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn rejects_wrong_media_type() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let out = v.validate(&file("roster.xlsx", "text/csv", b"a,b")).unwrap();
        assert!(reason(out).contains("media type"));
    }

    #[test]
    fn rejects_wrong_extension() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let out = v.validate(&file("roster.csv", XLSX_MEDIA_TYPE, b"x")).unwrap();
        assert!(reason(out).contains(".csv"));
        let out = v.validate(&file("roster", XLSX_MEDIA_TYPE, b"x")).unwrap();
        assert!(reason(out).contains("no extension"));
    }

    #[test]
    fn rejects_oversized_file() {
        let config = IngestConfig { max_file_bytes: 4, ..IngestConfig::default() };
        let v = SpreadsheetValidator::new(&config);
        let out = v.validate(&file("roster.XLSX", XLSX_MEDIA_TYPE, b"12345")).unwrap();
        assert!(reason(out).contains("limit"));
    }

    #[test]
    fn empty_upload_is_malformed_not_rejected() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let err = v.validate(&file("roster.xlsx", XLSX_MEDIA_TYPE, b"")).unwrap_err();
        assert!(matches!(err, IngestError::MalformedFile(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedFile);
    }

    #[test]
    fn unreadable_bytes_are_malformed_not_rejected() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let err = v.validate(&file("roster.xls", XLS_MEDIA_TYPE, b"garbage")).unwrap_err();
        assert!(matches!(err, IngestError::MalformedFile(_)));
    }

    #[test]
    fn structure_reports_all_missing_columns() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let rows = RowSet {
            headers: vec!["PROGRAMA".into(), "INSTITUCION".into(), "SEDE".into()],
            rows: vec![],
        };
        let missing = v.validate_structure(&rows, SourceFormat::New);
        assert_eq!(
            missing,
            vec!["DOCUMENTO", "NOMBRE1", "APELLIDO1", "FECHA_NACIMIENTO", "GRADO", "JORNADA"]
        );
    }

    #[test]
    fn zero_discriminator_rows_fail() {
        let config = IngestConfig::default();
        let v = SpreadsheetValidator::new(&config);
        let rows = RowSet {
            headers: vec!["PROGRAMA".into()],
            rows: vec![RawRow::new(2, vec![("PROGRAMA".into(), "OTRO".into())])],
        };
        let err = v.check_rows(&rows, SourceFormat::New).unwrap_err();
        assert!(matches!(err, IngestError::NoValidRows(_)));
    }

    #[test]
    fn extension_helper() {
        assert_eq!(media_type_for_extension("XLSX"), Some(XLSX_MEDIA_TYPE));
        assert_eq!(media_type_for_extension("csv"), None);
    }
}
