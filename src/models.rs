//! Core data models for cue sheet statistics.
//!
//! This module contains the record, cell, tally and bundle types shared by
//! the normalizers, the aggregator, the derived views and the report writers.

use chrono::{NaiveTime, Timelike};
use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

// ============================================================================
// Constants
// ============================================================================

/// Canonical representation of an absent composer/publisher field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Separator joining multiple participants inside one composer/publisher field.
pub const PARTICIPANT_SEPARATOR: &str = " / ";

/// Episode identifier used when none can be extracted from a file name.
pub const DEFAULT_EPISODE: &str = "000";

/// Width of one duration histogram bin, in seconds.
pub const BUCKET_WIDTH_SECONDS: u64 = 30;

// ============================================================================
// Raw Cells
// ============================================================================

/// A raw cell value as produced by a source file reader.
///
/// Spreadsheets hand back loosely typed values; the normalizers pattern-match
/// on this enum instead of inspecting types at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    /// Numeric cell, possibly a fraction of a day.
    Number(f64),
    Integer(i64),
    /// Time-of-day cell.
    Time(NaiveTime),
}

impl CellValue {
    /// Text rendering used for regex matching and log messages.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format!("{:?}", n),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Time(t) => {
                if t.nanosecond() > 0 {
                    format!(
                        "{:02}:{:02}:{:02}.{:06}",
                        t.hour(),
                        t.minute(),
                        t.second(),
                        t.nanosecond() / 1_000
                    )
                } else {
                    t.format("%H:%M:%S").to_string()
                }
            }
        }
    }

    /// Whether the cell carries no usable value (empty text, zero, nothing).
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(n) => *n == 0.0,
            CellValue::Integer(i) => *i == 0,
            CellValue::Time(_) => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<NaiveTime> for CellValue {
    fn from(t: NaiveTime) -> Self {
        CellValue::Time(t)
    }
}

// ============================================================================
// Records
// ============================================================================

/// One logged usage of a music track within an episode.
///
/// `composer` and `publisher` are never empty: absence is always
/// [`NOT_AVAILABLE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackUsageRecord {
    pub title: String,
    pub duration_seconds: u64,
    pub composer: String,
    pub publisher: String,
    pub episode: String,
}

impl TrackUsageRecord {
    pub fn new(
        title: impl Into<String>,
        duration_seconds: u64,
        composer: impl Into<String>,
        publisher: impl Into<String>,
        episode: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            duration_seconds,
            composer: composer.into(),
            publisher: publisher.into(),
            episode: episode.into(),
        }
    }
}

// ============================================================================
// Insertion-Ordered Tally
// ============================================================================

/// Entries addressable by a string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Multiset keyed by string that remembers first-insertion order.
///
/// Entries live in a Vec and the map only stores indices into it, so
/// iteration order is the order in which keys were first seen. Ranking code
/// relies on this for tie-breaks.
#[derive(Clone, Debug, PartialEq)]
pub struct Tally<T> {
    entries: Vec<T>,
    index: FxHashMap<String, usize>,
}

impl<T: Keyed> Tally<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Return the entry for `key`, creating it with `make` on first sight.
    pub fn entry_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.entries.push(make());
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        &mut self.entries[idx]
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Keyed> Default for Tally<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for Tally<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

/// Occurrence count of one track title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TitleCount {
    pub title: String,
    pub count: u64,
}

impl Keyed for TitleCount {
    fn key(&self) -> &str {
        &self.title
    }
}

/// Occurrence count and accumulated duration of one composer or publisher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParticipantStats {
    pub name: String,
    pub occurrences: u64,
    pub duration_seconds: u64,
}

impl Keyed for ParticipantStats {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Which participant field a view is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Composer,
    Publisher,
}

// ============================================================================
// Consolidated Tracks
// ============================================================================

/// Unique track identity keyed by `(title, composer)`.
///
/// `publisher` is the publisher of the first record seen under the key; it is
/// not part of the identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsolidatedTrack {
    pub title: String,
    pub composer: String,
    pub publisher: String,
    pub total_duration_seconds: u64,
    pub occurrence_count: u64,
    pub episodes: BTreeSet<String>,
}

impl ConsolidatedTrack {
    /// Grouping key: the literal `title|composer` concatenation.
    pub fn grouping_key(title: &str, composer: &str) -> String {
        format!("{}|{}", title, composer)
    }

    pub fn key(&self) -> String {
        Self::grouping_key(&self.title, &self.composer)
    }
}

/// Occurrence-ranked view of a consolidated track, ready for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackUsageDetail {
    pub title: String,
    pub composer: String,
    pub publisher: String,
    pub count: u64,
    pub total_seconds: u64,
    pub formatted_total: String,
    pub episode_count: usize,
    /// Episodes in display order (numeric first, by number).
    pub episodes: Vec<String>,
}

impl TrackUsageDetail {
    pub fn episode_list(&self) -> String {
        self.episodes.join(", ")
    }
}

// ============================================================================
// Duration Histogram
// ============================================================================

/// One fixed-width bin of the duration histogram.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DurationBucket {
    /// Human-readable range, e.g. `"00:31-01:00"`.
    pub label: String,
    pub start_seconds: u64,
    pub end_seconds: u64,
    pub count: u64,
}

// ============================================================================
// Statistics Bundle
// ============================================================================

/// Complete set of aggregate metrics derived from one batch of records.
///
/// Produced fresh by every aggregation call; never updated in place.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatisticsBundle {
    pub total_tracks: usize,
    pub total_duration_seconds: u64,
    pub titles: Tally<TitleCount>,
    pub composers: Tally<ParticipantStats>,
    pub publishers: Tally<ParticipantStats>,
    pub episodes: BTreeSet<String>,
    /// Ascending by bin start.
    pub duration_histogram: Vec<DurationBucket>,
    /// Stable-sorted by total duration, descending.
    pub tracks_by_duration: Vec<ConsolidatedTrack>,
    /// Stable-sorted by occurrence count, descending.
    pub tracks_by_occurrence: Vec<TrackUsageDetail>,
    pub unique_track_count: usize,
}

impl StatisticsBundle {
    pub fn participants(&self, role: ParticipantRole) -> &Tally<ParticipantStats> {
        match role {
            ParticipantRole::Composer => &self.composers,
            ParticipantRole::Publisher => &self.publishers,
        }
    }

    pub fn composer_count(&self, name: &str) -> u64 {
        self.composers.get(name).map_or(0, |c| c.occurrences)
    }

    pub fn composer_duration(&self, name: &str) -> u64 {
        self.composers.get(name).map_or(0, |c| c.duration_seconds)
    }

    pub fn publisher_count(&self, name: &str) -> u64 {
        self.publishers.get(name).map_or(0, |p| p.occurrences)
    }

    pub fn publisher_duration(&self, name: &str) -> u64 {
        self.publishers.get(name).map_or(0, |p| p.duration_seconds)
    }

    pub fn title_count(&self, title: &str) -> u64 {
        self.titles.get(title).map_or(0, |t| t.count)
    }

    /// Sum of all publisher durations (a multi-publisher record counts once per publisher).
    pub fn total_publisher_seconds(&self) -> u64 {
        self.publishers.iter().map(|p| p.duration_seconds).sum()
    }

    pub fn consolidated_track(&self, title: &str, composer: &str) -> Option<&ConsolidatedTrack> {
        self.tracks_by_duration
            .iter()
            .find(|t| t.title == title && t.composer == composer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_keeps_first_insertion_order() {
        let mut tally: Tally<TitleCount> = Tally::new();
        for title in ["b", "a", "b", "c", "a"] {
            tally
                .entry_or_insert_with(title, || TitleCount {
                    title: title.to_string(),
                    count: 0,
                })
                .count += 1;
        }
        let order: Vec<&str> = tally.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(tally.get("a").map(|t| t.count), Some(2));
        assert!(!tally.contains("d"));
    }

    #[test]
    fn test_tally_serializes_as_sequence() {
        let mut tally: Tally<TitleCount> = Tally::new();
        tally.entry_or_insert_with("x", || TitleCount {
            title: "x".to_string(),
            count: 3,
        });
        let json = serde_json::to_string(&tally).unwrap();
        assert_eq!(json, r#"[{"title":"x","count":3}]"#);
    }

    #[test]
    fn test_cell_text_rendering() {
        assert_eq!(CellValue::from("  3:25 ").as_text(), "3:25");
        assert_eq!(CellValue::Number(12.0).as_text(), "12.0");
        let t = NaiveTime::from_hms_opt(0, 3, 25).unwrap();
        assert_eq!(CellValue::Time(t).as_text(), "00:03:25");
        assert!(CellValue::Integer(0).is_blank());
        assert!(!CellValue::Time(t).is_blank());
    }

    #[test]
    fn test_grouping_key() {
        assert_eq!(ConsolidatedTrack::grouping_key("X", "A / B"), "X|A / B");
    }
}
