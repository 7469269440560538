//! Text normalization shared by the transformer and the site resolver.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fold the accented characters that occur in Spanish school names to ASCII.
/// Characters outside the fixed set pass through untouched.
pub fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Canonical form used for fuzzy site matching.
///
/// Lowercase, drop punctuation, fold accents, collapse whitespace, trim.
/// Idempotent: `normalize_name(normalize_name(s)) == normalize_name(s)`.
pub fn normalize_name(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    let folded = fold_accents(&stripped);
    WHITESPACE.replace_all(&folded, " ").trim().to_string()
}

/// Key used for header lookups: trimmed, uppercased, accents folded,
/// inner whitespace runs collapsed to one space.
pub fn header_key(s: &str) -> String {
    let folded = fold_accents(s.trim()).to_uppercase();
    WHITESPACE.replace_all(&folded, " ").to_string()
}

/// Key used for coded values (shift, status, municipality): like
/// `header_key` but punctuation is dropped too, so `"MAÑANA."` and
/// `"manana"` compare equal.
pub fn code_key(s: &str) -> String {
    normalize_name(s).to_uppercase()
}
