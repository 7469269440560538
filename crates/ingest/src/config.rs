use serde::Deserialize;

use crate::error::IngestError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

pub const DEFAULT_MATCH_THRESHOLD: u8 = 90;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// School year stamped on NEW-layout rows and used when an ORIGINAL row
    /// has no readable `ANO`.
    pub year: i32,
    /// Territorial entity code stamped on NEW-layout rows.
    pub etc_code: String,
    /// Municipalities this deployment serves. The first entry is the
    /// fallback for rows that carry no municipality.
    pub municipalities: Vec<String>,
    /// Minimum similarity (0-100) for a site-name match to be accepted.
    pub match_threshold: u8,
    /// Rows per atomic insert.
    pub chunk_size: usize,
    pub max_file_bytes: u64,
    /// Rows shown in the human preview.
    pub preview_rows: usize,
    pub new_format: NewFormatConfig,
    pub original_format: OriginalFormatConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            year: 2026,
            etc_code: "76".into(),
            municipalities: vec!["YUMBO".into()],
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            preview_rows: 20,
            new_format: NewFormatConfig::default(),
            original_format: OriginalFormatConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-layout sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewFormatConfig {
    /// Column whose value separates this program's rows from unrelated ones.
    pub discriminator_column: String,
    pub discriminator_value: String,
}

impl Default for NewFormatConfig {
    fn default() -> Self {
        Self {
            discriminator_column: "PROGRAMA".into(),
            discriminator_value: "PAE".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OriginalFormatConfig {
    pub enrolled_status: String,
    pub official_sector: String,
    /// Program models whose students are not served by the meal program.
    pub excluded_models: Vec<String>,
}

impl Default for OriginalFormatConfig {
    fn default() -> Self {
        Self {
            enrolled_status: "MATRICULADO".into(),
            official_sector: "OFICIAL".into(),
            excluded_models: vec![
                "ACELERACION DEL APRENDIZAJE".into(),
                "CICLO LECTIVO ESPECIAL INTEGRADO".into(),
                "PROGRAMA PARA JOVENES EN EXTRAEDAD Y ADULTOS".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl IngestConfig {
    pub fn from_toml(input: &str) -> Result<Self, IngestError> {
        let config: IngestConfig =
            toml::from_str(input).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.match_threshold == 0 || self.match_threshold > 100 {
            return Err(IngestError::Config(format!(
                "match_threshold must be between 1 and 100, got {}",
                self.match_threshold
            )));
        }

        if self.chunk_size == 0 {
            return Err(IngestError::Config("chunk_size must be greater than 0".into()));
        }

        if self.municipalities.iter().all(|m| m.trim().is_empty()) {
            return Err(IngestError::Config(
                "at least one municipality is required".into(),
            ));
        }

        if self.new_format.discriminator_column.trim().is_empty() {
            return Err(IngestError::Config(
                "new_format.discriminator_column must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// First non-blank municipality in scope.
    pub fn fallback_municipality(&self) -> &str {
        self.municipalities
            .iter()
            .map(|m| m.trim())
            .find(|m| !m.is_empty())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = IngestConfig::from_toml("").unwrap();
        assert_eq!(config.match_threshold, 90);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.new_format.discriminator_column, "PROGRAMA");
        assert_eq!(config.fallback_municipality(), "YUMBO");
    }

    #[test]
    fn parse_full_config() {
        let input = r#"
year = 2025
etc_code = "76111"
municipalities = ["BUGA", "CARTAGO"]
match_threshold = 85
chunk_size = 500
preview_rows = 5

[new_format]
discriminator_column = "ESTRATEGIA"
discriminator_value = "PAE JU"

[original_format]
excluded_models = ["SER HUMANO"]
"#;
        let config = IngestConfig::from_toml(input).unwrap();
        assert_eq!(config.year, 2025);
        assert_eq!(config.fallback_municipality(), "BUGA");
        assert_eq!(config.match_threshold, 85);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.new_format.discriminator_value, "PAE JU");
        assert_eq!(config.original_format.excluded_models, vec!["SER HUMANO"]);
        // Untouched fields keep their defaults
        assert_eq!(config.original_format.enrolled_status, "MATRICULADO");
    }

    #[test]
    fn reject_zero_chunk_size() {
        let err = IngestConfig::from_toml("chunk_size = 0").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn reject_threshold_out_of_range() {
        let err = IngestConfig::from_toml("match_threshold = 101").unwrap_err();
        assert!(err.to_string().contains("match_threshold"));
    }

    #[test]
    fn reject_empty_scope() {
        let err = IngestConfig::from_toml("municipalities = [\" \"]").unwrap_err();
        assert!(err.to_string().contains("municipality"));
    }

    #[test]
    fn reject_unknown_type() {
        assert!(IngestConfig::from_toml("chunk_size = \"big\"").is_err());
    }
}
