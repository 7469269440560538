//! Symmetric edit-distance similarity scores on a 0-100 scale.
//!
//! Inputs are expected to be `normalize_name` output already.

use std::collections::BTreeSet;

/// Length of the longest common subsequence, over chars.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Single rolling row; `prev_diag` carries dp[i-1][j-1].
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut prev_diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag + 1
            } else {
                above.max(row[j])
            };
            prev_diag = above;
        }
    }
    row[b.len()]
}

/// Indel ratio: `2 * LCS / (|a| + |b|)`, scaled to 0-100.
/// Equivalent to one minus the insert/delete-only edit distance over the
/// total length.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Token-set ratio: compares the shared tokens against each side's full
/// token set, so extra words on one side ("institucion educativa") cost
/// less than they do in a plain ratio.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = ta.intersection(&tb).copied().collect();
    let only_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let only_b: Vec<&str> = tb.difference(&ta).copied().collect();

    let base = common.join(" ");
    let join = |rest: &[&str]| -> String {
        match (base.is_empty(), rest.is_empty()) {
            (true, _) => rest.join(" "),
            (false, true) => base.clone(),
            (false, false) => format!("{base} {}", rest.join(" ")),
        }
    };
    let full_a = join(&only_a);
    let full_b = join(&only_b);

    let mut best = indel_ratio(&full_a, &full_b);
    if !base.is_empty() {
        best = best
            .max(indel_ratio(&base, &full_a))
            .max(indel_ratio(&base, &full_b));
    }
    best
}

/// Score used by the resolver: the better of the plain and token-set ratios,
/// rounded to an integer.
pub fn similarity(a: &str, b: &str) -> u8 {
    let score = indel_ratio(a, b).max(token_set_ratio(a, b));
    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(similarity("colegio santa ana", "colegio santa ana"), 100);
        assert_eq!(similarity("", ""), 100);
    }

    #[test]
    fn disjoint_strings_score_low() {
        assert!(similarity("abc", "xyz") < 10);
        assert_eq!(similarity("abc", ""), 0);
    }

    #[test]
    fn single_substitution_in_ten_chars_is_90() {
        assert_eq!(similarity("abcdefghij", "abcdefghik"), 90);
    }

    #[test]
    fn single_substitution_in_nine_chars_is_89() {
        assert_eq!(similarity("abcdefghx", "abcdefghy"), 89);
    }

    #[test]
    fn abbreviated_site_reaches_threshold_via_token_set() {
        let raw = "ie san jose sede a";
        let canonical = "institucion educativa san jose sede a";
        assert!(indel_ratio(raw, canonical) < 90.0);
        assert_eq!(similarity(raw, canonical), 91);
    }

    #[test]
    fn scores_are_symmetric() {
        let pairs = [
            ("ie san jose sede a", "institucion educativa san jose sede a"),
            ("sede rural el placer", "el placer"),
            ("colegio", "escuela"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn lcs_handles_repeats() {
        let a: Vec<char> = "aab".chars().collect();
        let b: Vec<char> = "abab".chars().collect();
        assert_eq!(lcs_len(&a, &b), 3);
    }
}
