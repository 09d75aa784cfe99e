use strsim::normalized_levenshtein;

/// Fuzzy similarity between two strings on a 0..=100 scale (100 = identical).
///
/// Case-sensitive; callers that want case-folded matching lower-case both
/// sides first.
pub fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// `ratio` with both sides lower-cased, so case differences never count
/// against the score.
pub fn ratio_ignore_case(a: &str, b: &str) -> f64 {
    ratio(&a.to_lowercase(), &b.to_lowercase())
}
