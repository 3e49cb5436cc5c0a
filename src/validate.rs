//! Input validation for record-store writes.
//!
//! Statuses and severities are canonical upper-case values. Resolution is
//! exact match → synonym lookup → error with the closest suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

// ── Valid value sets ─────────────────────────────────────────

pub static VALID_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["OPEN", "CONFIRMED", "REOPENED", "RESOLVED", "CLOSED"]
        .into_iter()
        .collect()
});

pub static VALID_SEVERITIES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["INFO", "MINOR", "MAJOR", "CRITICAL", "BLOCKER"]
        .into_iter()
        .collect()
});

// ── Synonym maps ─────────────────────────────────────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("NEW", "OPEN"),
        ("TODO", "OPEN"),
        ("ACCEPTED", "CONFIRMED"),
        ("FIXED", "RESOLVED"),
        ("DONE", "CLOSED"),
    ]
    .into_iter()
    .collect()
});

pub static SEVERITY_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("TRIVIAL", "INFO"),
        ("LOW", "MINOR"),
        ("MEDIUM", "MAJOR"),
        ("HIGH", "CRITICAL"),
        ("URGENT", "BLOCKER"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status string via exact match or synonym lookup.
///
/// Returns the canonical status, or an error with the original input
/// and an optional suggestion.
pub fn normalize_status(input: &str) -> Result<String, (String, Option<String>)> {
    normalize(input, &VALID_STATUSES, &STATUS_SYNONYMS)
}

/// Normalize a severity string via exact match or synonym lookup.
pub fn normalize_severity(input: &str) -> Result<String, (String, Option<String>)> {
    normalize(input, &VALID_SEVERITIES, &SEVERITY_SYNONYMS)
}

fn normalize(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Result<String, (String, Option<String>)> {
    let upper = input.trim().to_uppercase();

    if valid.contains(upper.as_str()) {
        return Ok(upper);
    }

    if let Some(&canonical) = synonyms.get(upper.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(&upper, valid, synonyms);
    Err((input.to_string(), suggestion))
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // Synonyms suggest what they map to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}
