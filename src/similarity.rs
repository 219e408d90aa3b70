//! Fuzzy track comparison: normalized edit distance over fingerprint
//! fields plus duration closeness, blended into a single confidence
//! score in `[0, 1]`.

use crate::fingerprint::TrackFingerprint;

/// Normalized Levenshtein similarity. Identical strings score 1,
/// either-empty non-equal strings score 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Duration closeness: 1.0 within 10% of the longer duration, then a
/// linear falloff to 0 as the gap approaches it. Two streams (both zero)
/// compare as identical.
pub fn duration_similarity(d1_ms: u64, d2_ms: u64) -> f64 {
    let max = d1_ms.max(d2_ms) as f64;
    if max == 0.0 {
        return 1.0;
    }
    let diff = d1_ms.abs_diff(d2_ms) as f64;
    if diff < max * 0.1 {
        1.0
    } else {
        (1.0 - diff / max).max(0.0)
    }
}

/// Confidence that two fingerprints denote the same recording.
///
/// Identical backend identifiers short-circuit to 1.0. When either side
/// has unknown authorship (topic channels), the score leans on the title
/// with duration as a tiebreaker; otherwise title dominates with author
/// support, and an exact match on one field plus a strong match on the
/// other is floored at 0.9.
pub fn compare(a: &TrackFingerprint, b: &TrackFingerprint) -> f64 {
    if a.identifier == b.identifier {
        return 1.0;
    }

    let title = similarity(&a.normalized_title, &b.normalized_title);
    let duration = duration_similarity(a.duration_ms, b.duration_ms);

    if a.normalized_author.is_empty() || b.normalized_author.is_empty() {
        let score = title * 0.8 + duration * 0.2;
        if a.normalized_title == b.normalized_title {
            return score.max(0.9);
        }
        return score;
    }

    let author = similarity(&a.normalized_author, &b.normalized_author);

    if (a.normalized_title == b.normalized_title && author > 0.7)
        || (a.normalized_author == b.normalized_author && title > 0.7)
    {
        return (title * 0.7 + author * 0.3).max(0.9);
    }

    title * 0.7 + author * 0.25 + duration * 0.05
}
