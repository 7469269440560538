//! Business rule tables: shift and municipality -> complement flags,
//! grade -> education level, and the demographic code tables.
//!
//! Every lookup is total. Unknown inputs land on the table's single default
//! branch instead of failing the row.

use crate::model::{ComplementFlags, EducationLevel};
use crate::normalize::code_key;

// ---------------------------------------------------------------------------
// Shift
// ---------------------------------------------------------------------------

/// School session time block (`JORNADA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shift {
    Manana,
    Tarde,
    Nocturna,
    FinDeSemana,
    Completa,
    Unica,
    Unknown,
}

impl Shift {
    pub const KNOWN: [Shift; 6] = [
        Self::Manana,
        Self::Tarde,
        Self::Nocturna,
        Self::FinDeSemana,
        Self::Completa,
        Self::Unica,
    ];

    /// Accepts the label (any case, with or without accents) or the numeric
    /// SIMAT code.
    pub fn parse(raw: &str) -> Self {
        match code_key(raw).as_str() {
            "1" | "MANANA" | "JORNADA MANANA" => Self::Manana,
            "2" | "TARDE" | "JORNADA TARDE" => Self::Tarde,
            "3" | "NOCTURNA" | "NOCHE" => Self::Nocturna,
            "4" | "FIN DE SEMANA" | "SABATINA" => Self::FinDeSemana,
            "5" | "COMPLETA" | "JORNADA COMPLETA" => Self::Completa,
            "6" | "UNICA" | "JORNADA UNICA" | "JU" => Self::Unica,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Manana => "MAÑANA",
            Self::Tarde => "TARDE",
            Self::Nocturna => "NOCTURNA",
            Self::FinDeSemana => "FIN DE SEMANA",
            Self::Completa => "COMPLETA",
            Self::Unica => "ÚNICA",
            Self::Unknown => "DESCONOCIDA",
        }
    }
}

// ---------------------------------------------------------------------------
// Complement flags
// ---------------------------------------------------------------------------

const fn flags(am: bool, pm: bool, lunch: bool) -> ComplementFlags {
    ComplementFlags { am, pm, lunch, reinforcement: false }
}

const fn reinforced(base: ComplementFlags) -> ComplementFlags {
    ComplementFlags { reinforcement: true, ..base }
}

const AM_LUNCH: ComplementFlags = flags(true, false, true);
const AM_PM: ComplementFlags = flags(true, true, false);
const AM_ONLY: ComplementFlags = flags(true, false, false);
const PM_ONLY: ComplementFlags = flags(false, true, false);
const LUNCH_ONLY: ComplementFlags = flags(false, false, true);

/// Flags for the NEW layout. One table for every municipality.
pub fn new_format_flags(shift: Shift) -> ComplementFlags {
    match shift {
        Shift::Unica => AM_LUNCH,
        Shift::Manana | Shift::Tarde | Shift::Completa => AM_PM,
        _ => ComplementFlags::NONE,
    }
}

/// Municipalities with their own ORIGINAL-layout rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMunicipality {
    Yumbo,
    Buga,
    Cartago,
}

impl RuleMunicipality {
    pub fn parse(raw: &str) -> Option<Self> {
        match code_key(raw).as_str() {
            "YUMBO" => Some(Self::Yumbo),
            "BUGA" | "GUADALAJARA DE BUGA" => Some(Self::Buga),
            "CARTAGO" => Some(Self::Cartago),
            _ => None,
        }
    }
}

/// Flags for the ORIGINAL layout. A municipality without a rule set gets no
/// flags; that is not an error.
pub fn original_format_flags(municipality: &str, shift: Shift) -> ComplementFlags {
    let Some(muni) = RuleMunicipality::parse(municipality) else {
        return ComplementFlags::NONE;
    };
    match (muni, shift) {
        (RuleMunicipality::Yumbo, Shift::Unica) => AM_LUNCH,
        (RuleMunicipality::Yumbo, Shift::Manana) => AM_ONLY,
        (RuleMunicipality::Yumbo, Shift::Tarde) => PM_ONLY,
        (RuleMunicipality::Yumbo, Shift::Completa) => AM_PM,

        (RuleMunicipality::Buga, Shift::Unica) => LUNCH_ONLY,
        (RuleMunicipality::Buga, Shift::Manana | Shift::Tarde | Shift::Completa) => AM_PM,

        (RuleMunicipality::Cartago, Shift::Unica) => reinforced(AM_LUNCH),
        (RuleMunicipality::Cartago, Shift::Manana) => reinforced(AM_ONLY),
        (RuleMunicipality::Cartago, Shift::Tarde) => reinforced(PM_ONLY),

        _ => ComplementFlags::NONE,
    }
}

// ---------------------------------------------------------------------------
// Education level
// ---------------------------------------------------------------------------

/// Bucket for grades that cannot be parsed or fall outside every range.
pub const DEFAULT_LEVEL: EducationLevel = EducationLevel::PrimariaInicial;

/// Parse a grade cell into its numeric SIMAT code.
///
/// Accepts `"5"`, `"05"`, `"10°"`, `"-1"`, preschool abbreviations and the
/// Spanish grade names.
pub fn parse_grade(raw: &str) -> Option<i32> {
    let key = code_key(raw);
    let named = match key.as_str() {
        "PJ" | "PREJARDIN" | "PRE JARDIN" => Some(-2),
        "J" | "JARDIN" => Some(-1),
        "T" | "TR" | "TRANSICION" | "GRADO 0" => Some(0),
        "PRIMERO" => Some(1),
        "SEGUNDO" => Some(2),
        "TERCERO" => Some(3),
        "CUARTO" => Some(4),
        "QUINTO" => Some(5),
        "SEXTO" => Some(6),
        "SEPTIMO" => Some(7),
        "OCTAVO" => Some(8),
        "NOVENO" => Some(9),
        "DECIMO" => Some(10),
        "UNDECIMO" | "ONCE" => Some(11),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    // `code_key` drops the minus sign, so read it from the raw text.
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-');
    let digits: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let n: i32 = digits.parse().ok()?;
    Some(if negative { -n } else { n })
}

/// Table lookup on the numeric grade.
fn level_from_table(grade: i32) -> Option<EducationLevel> {
    match grade {
        -2..=0 => Some(EducationLevel::Preescolar),
        1..=3 => Some(EducationLevel::PrimariaInicial),
        4..=5 => Some(EducationLevel::PrimariaFinal),
        6..=9 => Some(EducationLevel::Secundaria),
        10..=11 => Some(EducationLevel::Media),
        _ => None,
    }
}

/// Range bucketing for codes the table does not list: complementary grades
/// of normal schools and adult cycles.
fn level_from_range(grade: i32) -> Option<EducationLevel> {
    match grade {
        12..=13 => Some(EducationLevel::Media),
        21..=26 => Some(EducationLevel::Secundaria),
        _ => None,
    }
}

/// Education level for a grade cell: table, then range, then default.
pub fn education_level(raw_grade: &str) -> EducationLevel {
    match parse_grade(raw_grade) {
        Some(grade) => level_from_table(grade)
            .or_else(|| level_from_range(grade))
            .unwrap_or(DEFAULT_LEVEL),
        None => DEFAULT_LEVEL,
    }
}

// ---------------------------------------------------------------------------
// Demographic reference tables (ORIGINAL layout)
// ---------------------------------------------------------------------------

/// Document type code -> label. Unknown codes map to `None`.
pub fn document_type_label(code: &str) -> Option<&'static str> {
    match code_key(code).as_str() {
        "1" | "CC" => Some("CC"),
        "2" | "TI" => Some("TI"),
        "3" | "RC" => Some("RC"),
        "4" | "CE" => Some("CE"),
        "5" | "NIP" => Some("NIP"),
        "6" | "NUIP" => Some("NUIP"),
        "7" | "PEP" => Some("PEP"),
        "8" | "PPT" => Some("PPT"),
        "9" | "NES" => Some("NES"),
        _ => None,
    }
}

/// Gender code -> label. Unknown codes map to `None`.
pub fn gender_label(code: &str) -> Option<&'static str> {
    match code_key(code).as_str() {
        "1" | "M" | "MASCULINO" => Some("MASCULINO"),
        "2" | "F" | "FEMENINO" => Some("FEMENINO"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_parses_labels_and_codes() {
        assert_eq!(Shift::parse("ÚNICA"), Shift::Unica);
        assert_eq!(Shift::parse("jornada unica"), Shift::Unica);
        assert_eq!(Shift::parse("6"), Shift::Unica);
        assert_eq!(Shift::parse("Mañana"), Shift::Manana);
        assert_eq!(Shift::parse("MANANA"), Shift::Manana);
        assert_eq!(Shift::parse("5"), Shift::Completa);
        assert_eq!(Shift::parse("intensiva"), Shift::Unknown);
        assert_eq!(Shift::parse(""), Shift::Unknown);
    }

    #[test]
    fn new_format_single_shift_gets_am_and_lunch() {
        let flags = new_format_flags(Shift::Unica);
        assert!(flags.am && flags.lunch);
        assert!(!flags.pm && !flags.reinforcement);
    }

    #[test]
    fn new_format_split_shifts_get_am_and_pm() {
        for shift in [Shift::Manana, Shift::Tarde, Shift::Completa] {
            assert_eq!(new_format_flags(shift), AM_PM, "{shift:?}");
        }
        assert_eq!(new_format_flags(Shift::Nocturna), ComplementFlags::NONE);
        assert_eq!(new_format_flags(Shift::Unknown), ComplementFlags::NONE);
    }

    #[test]
    fn original_format_rules_differ_per_municipality() {
        assert_eq!(original_format_flags("YUMBO", Shift::Unica), AM_LUNCH);
        assert_eq!(original_format_flags("Guadalajara de Buga", Shift::Unica), LUNCH_ONLY);
        let cartago = original_format_flags("cartago", Shift::Tarde);
        assert!(cartago.pm && cartago.reinforcement && !cartago.am);
        assert_eq!(original_format_flags("YUMBO", Shift::Tarde), PM_ONLY);
    }

    #[test]
    fn unknown_municipality_yields_no_flags() {
        for shift in Shift::KNOWN {
            assert_eq!(original_format_flags("PALMIRA", shift), ComplementFlags::NONE);
        }
    }

    #[test]
    fn every_known_shift_has_defined_flags() {
        for muni in ["YUMBO", "BUGA", "CARTAGO", "OTRO"] {
            for shift in Shift::KNOWN {
                // Total: never panics, always returns a value.
                let _ = original_format_flags(muni, shift);
            }
        }
        for shift in Shift::KNOWN {
            let _ = new_format_flags(shift);
        }
    }

    #[test]
    fn every_grade_in_range_has_a_level() {
        for grade in -2..=11 {
            let level = education_level(&grade.to_string());
            let expected = level_from_table(grade).expect("table covers -2..=11");
            assert_eq!(level, expected, "grade {grade}");
        }
    }

    #[test]
    fn grade_buckets() {
        assert_eq!(education_level("-2"), EducationLevel::Preescolar);
        assert_eq!(education_level("TRANSICIÓN"), EducationLevel::Preescolar);
        assert_eq!(education_level("03"), EducationLevel::PrimariaInicial);
        assert_eq!(education_level("quinto"), EducationLevel::PrimariaFinal);
        assert_eq!(education_level("7°"), EducationLevel::Secundaria);
        assert_eq!(education_level("11"), EducationLevel::Media);
    }

    #[test]
    fn range_fallback_and_default() {
        assert_eq!(education_level("12"), EducationLevel::Media);
        assert_eq!(education_level("23"), EducationLevel::Secundaria);
        assert_eq!(education_level("99"), DEFAULT_LEVEL);
        assert_eq!(education_level("-5"), DEFAULT_LEVEL);
        assert_eq!(education_level("aceleración"), DEFAULT_LEVEL);
        assert_eq!(education_level(""), DEFAULT_LEVEL);
    }

    #[test]
    fn parse_grade_forms() {
        assert_eq!(parse_grade("PJ"), Some(-2));
        assert_eq!(parse_grade("-1"), Some(-1));
        assert_eq!(parse_grade("10°"), Some(10));
        assert_eq!(parse_grade("Undécimo"), Some(11));
        assert_eq!(parse_grade("abc"), None);
    }

    #[test]
    fn demographic_codes() {
        assert_eq!(document_type_label("2"), Some("TI"));
        assert_eq!(document_type_label("rc"), Some("RC"));
        assert_eq!(document_type_label("42"), None);
        assert_eq!(gender_label("1"), Some("MASCULINO"));
        assert_eq!(gender_label("f"), Some("FEMENINO"));
        assert_eq!(gender_label("X"), None);
    }
}
