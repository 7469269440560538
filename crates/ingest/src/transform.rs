//! Layout-specific row parsing and the shared canonical row.
//!
//! Each source layout gets its own typed row struct. Both feed one
//! `CleanedRow` shape; the only rows ever removed here are the ones that fail
//! the layout's filter predicates.

use crate::config::IngestConfig;
use crate::model::{CleanedRow, RawRow, SourceFormat};
use crate::normalize::code_key;
use crate::persist::parse_birth_date;
use crate::rules::{self, Shift};

// ---------------------------------------------------------------------------
// Column layouts
// ---------------------------------------------------------------------------

/// Required NEW-layout columns, not counting the configured discriminator.
pub const NEW_REQUIRED: &[&str] = &[
    "INSTITUCION",
    "SEDE",
    "DOCUMENTO",
    "NOMBRE1",
    "APELLIDO1",
    "FECHA_NACIMIENTO",
    "GRADO",
    "JORNADA",
];

pub const ORIGINAL_REQUIRED: &[&str] = &[
    "ESTADO",
    "SECTOR",
    "MODELO",
    "MUNICIPIO",
    "INSTITUCION",
    "SEDE",
    "TIPODOC",
    "DOC",
    "APELLIDO1",
    "NOMBRE1",
    "FECHA_NACIMIENTO",
    "GENERO",
    "GRADO_COD",
    "GRUPO",
    "JORNADA",
];

/// Every column `format` needs, in report order.
pub fn required_columns(format: SourceFormat, config: &IngestConfig) -> Vec<String> {
    match format {
        SourceFormat::New => std::iter::once(config.new_format.discriminator_column.trim())
            .chain(NEW_REQUIRED.iter().copied())
            .map(str::to_string)
            .collect(),
        SourceFormat::Original => ORIGINAL_REQUIRED.iter().map(|c| c.to_string()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn same_code(value: Option<&str>, expected: &str) -> bool {
    value.map(code_key).is_some_and(|v| v == code_key(expected))
}

/// NEW layout: the row belongs to this upload's program.
pub fn is_discriminator_row(row: &RawRow, config: &IngestConfig) -> bool {
    same_code(
        row.get(&config.new_format.discriminator_column),
        &config.new_format.discriminator_value,
    )
}

/// ORIGINAL layout: enrolled, official sector, model not excluded.
pub fn passes_original_filters(row: &RawRow, config: &IngestConfig) -> bool {
    let rules = &config.original_format;
    if !same_code(row.get("ESTADO"), &rules.enrolled_status) {
        return false;
    }
    if !same_code(row.get("SECTOR"), &rules.official_sector) {
        return false;
    }
    let model = row.get("MODELO").map(code_key).unwrap_or_default();
    !rules.excluded_models.iter().any(|m| code_key(m) == model)
}

pub fn passes_filters(row: &RawRow, format: SourceFormat, config: &IngestConfig) -> bool {
    match format {
        SourceFormat::New => is_discriminator_row(row, config),
        SourceFormat::Original => passes_original_filters(row, config),
    }
}

// ---------------------------------------------------------------------------
// Typed source rows
// ---------------------------------------------------------------------------

fn text(row: &RawRow, column: &str) -> String {
    row.get(column).unwrap_or_default().to_string()
}

fn opt(row: &RawRow, column: &str) -> Option<String> {
    row.get(column).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFormatRow {
    pub line: usize,
    pub institution: String,
    pub site: String,
    pub document_type: Option<String>,
    pub document_number: String,
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_surname: String,
    pub second_surname: Option<String>,
    pub birth_date: Option<String>,
    pub age: Option<String>,
    pub ethnicity: Option<String>,
    pub gender: Option<String>,
    pub grade: String,
    pub group: Option<String>,
    pub shift: Option<String>,
}

impl NewFormatRow {
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            line: row.line,
            institution: text(row, "INSTITUCION"),
            site: text(row, "SEDE"),
            document_type: opt(row, "TIPO_DOCUMENTO"),
            document_number: text(row, "DOCUMENTO"),
            first_name: text(row, "NOMBRE1"),
            second_name: opt(row, "NOMBRE2"),
            first_surname: text(row, "APELLIDO1"),
            second_surname: opt(row, "APELLIDO2"),
            birth_date: opt(row, "FECHA_NACIMIENTO"),
            age: opt(row, "EDAD"),
            ethnicity: opt(row, "ETNIA"),
            gender: opt(row, "GENERO"),
            grade: text(row, "GRADO"),
            group: opt(row, "GRUPO"),
            shift: opt(row, "JORNADA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginalFormatRow {
    pub line: usize,
    pub year: Option<String>,
    pub etc: Option<String>,
    pub municipality: String,
    pub institution: String,
    pub site: String,
    pub document_type_code: Option<String>,
    pub document_number: String,
    pub first_surname: String,
    pub second_surname: Option<String>,
    pub first_name: String,
    pub second_name: Option<String>,
    pub birth_date: Option<String>,
    pub age: Option<String>,
    pub ethnicity: Option<String>,
    pub gender_code: Option<String>,
    pub grade_code: String,
    pub group: Option<String>,
    pub shift: Option<String>,
}

impl OriginalFormatRow {
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            line: row.line,
            year: opt(row, "ANO"),
            etc: opt(row, "ETC"),
            municipality: text(row, "MUNICIPIO"),
            institution: text(row, "INSTITUCION"),
            site: text(row, "SEDE"),
            document_type_code: opt(row, "TIPODOC"),
            document_number: text(row, "DOC"),
            first_surname: text(row, "APELLIDO1"),
            second_surname: opt(row, "APELLIDO2"),
            first_name: text(row, "NOMBRE1"),
            second_name: opt(row, "NOMBRE2"),
            birth_date: opt(row, "FECHA_NACIMIENTO"),
            age: opt(row, "EDAD"),
            ethnicity: opt(row, "ETNIA"),
            gender_code: opt(row, "GENERO"),
            grade_code: text(row, "GRADO_COD"),
            group: opt(row, "GRUPO"),
            shift: opt(row, "JORNADA"),
        }
    }
}

/// A filtered source row, tagged by layout.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRow {
    New(NewFormatRow),
    Original(OriginalFormatRow),
}

// ---------------------------------------------------------------------------
// Transformer
// ---------------------------------------------------------------------------

/// Turns filtered raw rows into canonical rows. Holds no state besides the
/// config; never touches the registry or the store.
pub struct FormatTransformer<'a> {
    config: &'a IngestConfig,
}

impl<'a> FormatTransformer<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    /// Filter, then map every surviving row. Output length equals the number
    /// of rows that pass the layout's filters.
    pub fn transform(
        &self,
        rows: &[RawRow],
        format: SourceFormat,
        focalization: &str,
    ) -> Vec<CleanedRow> {
        rows.iter()
            .filter(|row| passes_filters(row, format, self.config))
            .map(|row| match format {
                SourceFormat::New => SourceRow::New(NewFormatRow::from_raw(row)),
                SourceFormat::Original => SourceRow::Original(OriginalFormatRow::from_raw(row)),
            })
            .map(|row| self.clean(row, focalization))
            .collect()
    }

    pub fn clean(&self, row: SourceRow, focalization: &str) -> CleanedRow {
        match row {
            SourceRow::New(row) => self.clean_new(row, focalization),
            SourceRow::Original(row) => self.clean_original(row, focalization),
        }
    }

    fn clean_new(&self, row: NewFormatRow, focalization: &str) -> CleanedRow {
        let shift = row.shift.as_deref().map(Shift::parse).unwrap_or(Shift::Unknown);
        CleanedRow {
            line: row.line,
            etc_code: self.config.etc_code.clone(),
            municipality: None,
            institution: row.institution,
            site: row.site,
            site_code: None,
            industrialized: None,
            document_type: row.document_type,
            document_number: row.document_number,
            first_name: row.first_name,
            second_name: row.second_name,
            first_surname: row.first_surname,
            second_surname: row.second_surname,
            birth_date: row.birth_date.as_deref().map(normalize_date),
            age: row.age,
            ethnicity: row.ethnicity,
            gender: row.gender,
            education_level: rules::education_level(&row.grade),
            grade_group: grade_group(&row.grade, row.group.as_deref()),
            shift: shift_text(shift, row.shift),
            flags: rules::new_format_flags(shift),
            focalization: focalization.trim().to_string(),
            year: self.config.year,
        }
    }

    fn clean_original(&self, row: OriginalFormatRow, focalization: &str) -> CleanedRow {
        let shift = row.shift.as_deref().map(Shift::parse).unwrap_or(Shift::Unknown);
        let year = row
            .year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .unwrap_or(self.config.year);
        CleanedRow {
            line: row.line,
            etc_code: row.etc.unwrap_or_else(|| self.config.etc_code.clone()),
            flags: rules::original_format_flags(&row.municipality, shift),
            municipality: Some(row.municipality),
            institution: row.institution,
            site: row.site,
            site_code: None,
            industrialized: None,
            document_type: row
                .document_type_code
                .as_deref()
                .and_then(rules::document_type_label)
                .map(str::to_string),
            document_number: row.document_number,
            first_name: row.first_name,
            second_name: row.second_name,
            first_surname: row.first_surname,
            second_surname: row.second_surname,
            birth_date: row.birth_date.as_deref().map(normalize_date),
            age: row.age,
            ethnicity: row.ethnicity,
            gender: row
                .gender_code
                .as_deref()
                .and_then(rules::gender_label)
                .map(str::to_string),
            education_level: rules::education_level(&row.grade_code),
            grade_group: grade_group(&row.grade_code, row.group.as_deref()),
            shift: shift_text(shift, row.shift),
            focalization: focalization.trim().to_string(),
            year,
        }
    }
}

fn grade_group(grade: &str, group: Option<&str>) -> String {
    match group {
        Some(g) if !grade.is_empty() => format!("{grade}-{g}"),
        Some(g) => g.to_string(),
        None => grade.to_string(),
    }
}

/// Known shifts get their canonical label; unknown ones keep the source text.
fn shift_text(shift: Shift, raw: Option<String>) -> Option<String> {
    match shift {
        Shift::Unknown => raw,
        known => Some(known.label().to_string()),
    }
}

/// Birth dates typed as text come in a few regional formats. Rewrite the ones
/// we recognise to ISO; leave anything else as written.
pub fn normalize_date(raw: &str) -> String {
    parse_birth_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EducationLevel;

    fn raw(line: usize, fields: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            line,
            fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    fn new_row(line: usize, program: &str, shift: &str) -> RawRow {
        raw(
            line,
            &[
                ("PROGRAMA", program),
                ("INSTITUCION", "IE SAN JOSE"),
                ("SEDE", "SEDE A"),
                ("DOCUMENTO", "1.112.233"),
                ("NOMBRE1", "ANA"),
                ("APELLIDO1", "PEREZ"),
                ("FECHA_NACIMIENTO", "09/03/2015"),
                ("GRADO", "5"),
                ("GRUPO", "01"),
                ("JORNADA", shift),
            ],
        )
    }

    fn original_row(line: usize, status: &str, sector: &str, model: &str, muni: &str) -> RawRow {
        raw(
            line,
            &[
                ("ANO", "2025"),
                ("ESTADO", status),
                ("SECTOR", sector),
                ("MODELO", model),
                ("MUNICIPIO", muni),
                ("INSTITUCION", "IE LA ESPERANZA"),
                ("SEDE", "SEDE CENTRAL"),
                ("TIPODOC", "2"),
                ("DOC", "99887766"),
                ("APELLIDO1", "GOMEZ"),
                ("NOMBRE1", "LUIS"),
                ("FECHA_NACIMIENTO", "2012-11-30"),
                ("GENERO", "1"),
                ("GRADO_COD", "7"),
                ("GRUPO", "02"),
                ("JORNADA", "MAÑANA"),
            ],
        )
    }

    #[test]
    fn new_layout_keeps_only_discriminator_rows() {
        let config = IngestConfig::default();
        let rows = vec![
            new_row(2, "PAE", "UNICA"),
            new_row(3, "OTRO PROGRAMA", "UNICA"),
            new_row(4, "pae", "MAÑANA"),
        ];
        let out = FormatTransformer::new(&config).transform(&rows, SourceFormat::New, "F1");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].line, 2);
        assert_eq!(out[1].line, 4);
    }

    #[test]
    fn new_layout_stamps_constants_and_derives_fields() {
        let config = IngestConfig::default();
        let out = FormatTransformer::new(&config).transform(
            &[new_row(2, "PAE", "ÚNICA")],
            SourceFormat::New,
            " F1 ",
        );
        let row = &out[0];
        assert_eq!(row.year, 2026);
        assert_eq!(row.etc_code, "76");
        assert_eq!(row.municipality, None);
        assert_eq!(row.focalization, "F1");
        assert_eq!(row.grade_group, "5-01");
        assert_eq!(row.education_level, EducationLevel::PrimariaFinal);
        assert_eq!(row.birth_date.as_deref(), Some("2015-03-09"));
        assert_eq!(row.shift.as_deref(), Some("ÚNICA"));
        assert!(row.flags.am && row.flags.lunch && !row.flags.pm);
    }

    #[test]
    fn original_layout_applies_three_filters() {
        let config = IngestConfig::default();
        let rows = vec![
            original_row(2, "MATRICULADO", "OFICIAL", "TRADICIONAL", "YUMBO"),
            original_row(3, "RETIRADO", "OFICIAL", "TRADICIONAL", "YUMBO"),
            original_row(4, "MATRICULADO", "NO OFICIAL", "TRADICIONAL", "YUMBO"),
            original_row(5, "MATRICULADO", "OFICIAL", "Aceleración del Aprendizaje", "YUMBO"),
            original_row(6, "matriculado", "oficial", "ESCUELA NUEVA", "BUGA"),
        ];
        let passing = rows
            .iter()
            .filter(|r| passes_filters(r, SourceFormat::Original, &config))
            .count();
        let out = FormatTransformer::new(&config).transform(&rows, SourceFormat::Original, "F1");
        assert_eq!(out.len(), passing);
        assert_eq!(out.iter().map(|r| r.line).collect::<Vec<_>>(), vec![2, 6]);
    }

    #[test]
    fn original_layout_maps_codes_and_municipality_rules() {
        let config = IngestConfig::default();
        let out = FormatTransformer::new(&config).transform(
            &[original_row(2, "MATRICULADO", "OFICIAL", "TRADICIONAL", "YUMBO")],
            SourceFormat::Original,
            "F2",
        );
        let row = &out[0];
        assert_eq!(row.year, 2025);
        assert_eq!(row.municipality.as_deref(), Some("YUMBO"));
        assert_eq!(row.document_type.as_deref(), Some("TI"));
        assert_eq!(row.gender.as_deref(), Some("MASCULINO"));
        assert_eq!(row.education_level, EducationLevel::Secundaria);
        assert!(row.flags.am && !row.flags.pm && !row.flags.lunch);
    }

    #[test]
    fn unknown_codes_become_none_not_errors() {
        let config = IngestConfig::default();
        let mut fields = original_row(2, "MATRICULADO", "OFICIAL", "TRADICIONAL", "PALMIRA");
        fields = RawRow::new(
            fields.line,
            fields
                .columns()
                .map(|c| {
                    let v = match c {
                        "TIPODOC" => "77",
                        "GENERO" => "X",
                        "GRADO_COD" => "??",
                        "JORNADA" => "INTENSIVA",
                        other => fields.get(other).unwrap_or_default(),
                    };
                    (c.to_string(), v.to_string())
                })
                .collect(),
        );
        let out = FormatTransformer::new(&config).transform(&[fields], SourceFormat::Original, "F");
        let row = &out[0];
        assert_eq!(row.document_type, None);
        assert_eq!(row.gender, None);
        assert_eq!(row.education_level, rules::DEFAULT_LEVEL);
        assert_eq!(row.shift.as_deref(), Some("INTENSIVA"));
        assert!(!row.flags.any());
    }

    #[test]
    fn required_columns_lead_with_discriminator() {
        let config = IngestConfig::default();
        let cols = required_columns(SourceFormat::New, &config);
        assert_eq!(cols[0], "PROGRAMA");
        assert_eq!(cols.len(), NEW_REQUIRED.len() + 1);
        assert_eq!(
            required_columns(SourceFormat::Original, &config).len(),
            ORIGINAL_REQUIRED.len()
        );
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("2015-03-09"), "2015-03-09");
        assert_eq!(normalize_date("09/03/2015"), "2015-03-09");
        assert_eq!(normalize_date("09-03-2015"), "2015-03-09");
        assert_eq!(normalize_date("sin dato"), "sin dato");
    }
}
