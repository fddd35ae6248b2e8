//! Normalization functions for cue sheet fields.
//!
//! Composer and publisher cells are reduced to a canonical multi-party
//! string, episode identifiers are pulled from file names, and episodes get a
//! stable display order.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

use crate::models::{CellValue, DEFAULT_EPISODE, NOT_AVAILABLE, PARTICIPANT_SEPARATOR};

// ============================================================================
// Regex Patterns
// ============================================================================

/// Parenthesized annotations such as rights-society codes: "(BMI)", "(SGAE)"
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// Episode markers in file names: "EP12", "Cap 3", "Episodio 7"
static EPISODE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:EP|CAP|Episodio)\s*([0-9]+)").unwrap());

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

const EPISODE_PAD_WIDTH: usize = 3;

// ============================================================================
// Participants
// ============================================================================

/// Canonicalize a composer/publisher cell.
///
/// Strips parenthesized text, splits on `/`, trims each piece, drops empty
/// pieces and rejoins with `" / "`. Returns `"N/A"` when nothing survives.
pub fn normalize_participant(cell: &CellValue) -> String {
    if cell.is_blank() {
        return NOT_AVAILABLE.to_string();
    }
    normalize_participant_str(&cell.as_text())
}

/// String form of [`normalize_participant`].
pub fn normalize_participant_str(text: &str) -> String {
    let cleaned = PARENTHESIZED.replace_all(text, "");
    let parts: Vec<&str> = cleaned
        .split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        parts.join(PARTICIPANT_SEPARATOR)
    }
}

/// Split a normalized participant field into individual names.
///
/// The `"N/A"` sentinel yields nothing.
pub fn split_participants(field: &str) -> impl Iterator<Item = &str> {
    let field = if field == NOT_AVAILABLE { "" } else { field };
    field
        .split(PARTICIPANT_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

// ============================================================================
// Episodes
// ============================================================================

/// Extract a zero-padded episode identifier from a file name.
///
/// Returns `None` when the name carries no episode marker.
pub fn extract_episode(file_name: &str) -> Option<String> {
    EPISODE_MARKER
        .captures(file_name)
        .map(|caps| format!("{:0>width$}", &caps[1], width = EPISODE_PAD_WIDTH))
}

/// Like [`extract_episode`], falling back to `"000"`.
pub fn episode_or_default(file_name: &str) -> String {
    extract_episode(file_name).unwrap_or_else(|| DEFAULT_EPISODE.to_string())
}

/// Compare two episode identifiers for display.
///
/// Identifiers containing digits sort by their first number, ascending;
/// identifiers without digits sort after, by raw string.
pub fn compare_episodes(a: &str, b: &str) -> Ordering {
    match (FIRST_NUMBER.find(a), FIRST_NUMBER.find(b)) {
        (Some(na), Some(nb)) => {
            compare_digit_strings(na.as_str(), nb.as_str()).then_with(|| a.cmp(b))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort episode identifiers into display order.
pub fn sort_episodes<'a, I>(episodes: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut sorted: Vec<String> = episodes.into_iter().cloned().collect();
    sorted.sort_by(|a, b| compare_episodes(a, b));
    sorted
}

/// Numeric comparison of ASCII digit strings of any length.
fn compare_digit_strings(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize_participant(&CellValue::from(s))
    }

    #[test]
    fn test_normalize_participant_basic() {
        assert_eq!(norm("John Smith (BMI)"), "John Smith");
        assert_eq!(norm("A/B"), "A / B");
        assert_eq!(norm(" A (ASCAP) /  B (PRS) / "), "A / B");
        assert_eq!(norm("(SGAE)"), "N/A");
        assert_eq!(norm("  "), "N/A");
        assert_eq!(norm(""), "N/A");
    }

    #[test]
    fn test_normalize_participant_non_text() {
        assert_eq!(normalize_participant(&CellValue::Empty), "N/A");
        assert_eq!(normalize_participant(&CellValue::Integer(0)), "N/A");
        assert_eq!(normalize_participant(&CellValue::Integer(42)), "42");
    }

    #[test]
    fn test_normalized_sentinel_is_stable() {
        // "N/A" itself splits on '/' into "N" and "A"
        assert_eq!(norm("N/A"), "N / A");
        assert_eq!(split_participants("N/A").count(), 0);
    }

    #[test]
    fn test_split_participants() {
        let names: Vec<&str> = split_participants("A / B").collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(split_participants("Solo").collect::<Vec<_>>(), vec!["Solo"]);
    }

    #[test]
    fn test_extract_episode() {
        assert_eq!(extract_episode("Show_EP12_cues.md"), Some("012".to_string()));
        assert_eq!(extract_episode("cap 7.csv"), Some("007".to_string()));
        assert_eq!(extract_episode("Episodio1234.md"), Some("1234".to_string()));
        assert_eq!(extract_episode("cues.md"), None);
        assert_eq!(episode_or_default("cues.md"), "000");
    }

    #[test]
    fn test_episode_ordering() {
        let eps: Vec<String> = ["010", "bonus", "002", "special", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sort_episodes(&eps),
            vec!["1", "002", "010", "bonus", "special"]
        );
    }

    #[test]
    fn test_episode_ordering_large_numbers() {
        assert_eq!(
            compare_episodes("99999999999999999999999", "100000000000000000000000"),
            Ordering::Less
        );
    }
}
