//! Derived metrics read from a statistics bundle.
//!
//! Report tables, the JSON export and any chart renderer read these views
//! instead of the raw bundle, so every consumer shows the same numbers.

use serde::Serialize;

use crate::models::{
    DurationBucket, ParticipantRole, ParticipantStats, StatisticsBundle, Tally, TrackUsageDetail,
    NOT_AVAILABLE,
};
use crate::normalize::split_participants;
use crate::time::format_duration;

/// Label of the pie slice collecting publishers below the share threshold.
pub const OTHERS_LABEL: &str = "Others";

/// Whole minutes, rounded up.
pub fn ceil_minutes(seconds: u64) -> u64 {
    seconds.div_ceil(60)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

// ============================================================================
// Summary Metrics
// ============================================================================

/// Time attributed to one highlighted publisher.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HighlightShare {
    pub publisher: String,
    pub seconds: u64,
    pub formatted: String,
    pub minutes: u64,
    /// Share of all publisher seconds, 0-100.
    pub percent: f64,
}

/// Headline numbers for a bundle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub episodes: usize,
    pub total_tracks: usize,
    pub unique_tracks: usize,
    pub total_seconds: u64,
    pub total_formatted: String,
    pub total_minutes: u64,
    pub average_seconds: u64,
    pub average_formatted: String,
    pub unique_composers: usize,
    pub unique_publishers: usize,
    pub highlight: HighlightShare,
}

impl SummaryMetrics {
    pub fn from_bundle(bundle: &StatisticsBundle, highlight_publisher: &str) -> Self {
        let average_seconds = bundle.total_duration_seconds / bundle.total_tracks.max(1) as u64;
        Self {
            episodes: bundle.episodes.len(),
            total_tracks: bundle.total_tracks,
            unique_tracks: bundle.unique_track_count,
            total_seconds: bundle.total_duration_seconds,
            total_formatted: format_duration(bundle.total_duration_seconds),
            total_minutes: ceil_minutes(bundle.total_duration_seconds),
            average_seconds,
            average_formatted: format_duration(average_seconds),
            unique_composers: bundle.composers.len(),
            unique_publishers: bundle.publishers.len(),
            highlight: highlight_share(bundle, highlight_publisher),
        }
    }
}

/// Seconds credited to the publisher entity named `publisher`, matched
/// case-insensitively. A record adds to an entity at most once, so the
/// result never exceeds the music time of the bundle.
pub fn highlight_share(bundle: &StatisticsBundle, publisher: &str) -> HighlightShare {
    let needle = publisher.trim().to_lowercase();
    let seconds = bundle
        .publishers
        .iter()
        .find(|p| !needle.is_empty() && p.name.to_lowercase() == needle)
        .map_or(0, |p| p.duration_seconds);
    HighlightShare {
        publisher: publisher.to_string(),
        seconds,
        formatted: format_duration(seconds),
        minutes: ceil_minutes(seconds),
        percent: percent(seconds, bundle.total_publisher_seconds()),
    }
}

// ============================================================================
// Rankings
// ============================================================================

/// Participants with nonzero time, stable-sorted by time descending.
pub fn ranked_participants(tally: &Tally<ParticipantStats>, n: usize) -> Vec<&ParticipantStats> {
    let mut ranked: Vec<&ParticipantStats> = tally
        .iter()
        .filter(|p| p.name != NOT_AVAILABLE && p.duration_seconds > 0)
        .collect();
    ranked.sort_by(|a, b| b.duration_seconds.cmp(&a.duration_seconds));
    ranked.truncate(n);
    ranked
}

/// Tracks credited to `name` in the given role, stable-sorted by total time.
pub fn tracks_for_participant<'a>(
    bundle: &'a StatisticsBundle,
    role: ParticipantRole,
    name: &str,
    n: usize,
) -> Vec<&'a TrackUsageDetail> {
    let mut tracks: Vec<&TrackUsageDetail> = bundle
        .tracks_by_occurrence
        .iter()
        .filter(|t| {
            let field = match role {
                ParticipantRole::Composer => &t.composer,
                ParticipantRole::Publisher => &t.publisher,
            };
            split_participants(field).any(|p| p == name)
        })
        .collect();
    tracks.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds));
    tracks.truncate(n);
    tracks
}

// ============================================================================
// Publisher Shares
// ============================================================================

/// One slice of the publisher distribution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublisherShare {
    pub publisher: String,
    pub seconds: u64,
    pub minutes: u64,
    pub percent: f64,
}

/// Publisher share of total publisher time.
///
/// Publishers below `threshold_percent` are folded into a trailing
/// [`OTHERS_LABEL`] slice. Empty when no publisher has any time.
pub fn publisher_shares(bundle: &StatisticsBundle, threshold_percent: f64) -> Vec<PublisherShare> {
    let total = bundle.total_publisher_seconds();
    if total == 0 {
        return Vec::new();
    }

    let mut shares = Vec::new();
    let mut others_seconds = 0;
    let mut has_others = false;
    for p in bundle.publishers.iter() {
        let pct = percent(p.duration_seconds, total);
        if pct >= threshold_percent {
            shares.push(PublisherShare {
                publisher: p.name.clone(),
                seconds: p.duration_seconds,
                minutes: ceil_minutes(p.duration_seconds),
                percent: pct,
            });
        } else {
            others_seconds += p.duration_seconds;
            has_others = true;
        }
    }

    if has_others {
        shares.push(PublisherShare {
            publisher: OTHERS_LABEL.to_string(),
            seconds: others_seconds,
            minutes: ceil_minutes(others_seconds),
            percent: percent(others_seconds, total),
        });
    }
    shares
}

// ============================================================================
// Episodes
// ============================================================================

/// Per-episode comparison row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub episode: String,
    pub tracks: usize,
    pub unique_tracks: usize,
    pub duration_seconds: u64,
    pub formatted: String,
}

impl EpisodeSummary {
    pub fn new(episode: &str, bundle: &StatisticsBundle) -> Self {
        Self {
            episode: episode.to_string(),
            tracks: bundle.total_tracks,
            unique_tracks: bundle.unique_track_count,
            duration_seconds: bundle.total_duration_seconds,
            formatted: format_duration(bundle.total_duration_seconds),
        }
    }
}

/// Build comparison rows, preserving the order of `per_episode`.
pub fn episode_summaries(per_episode: &[(String, StatisticsBundle)]) -> Vec<EpisodeSummary> {
    per_episode
        .iter()
        .map(|(ep, bundle)| EpisodeSummary::new(ep, bundle))
        .collect()
}

// ============================================================================
// Histogram
// ============================================================================

/// Histogram bucket with its share of `total`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramRow {
    pub label: String,
    pub count: u64,
    pub percent: f64,
}

/// Histogram rows against an explicit denominator (track count or histogram sum).
pub fn histogram_rows(buckets: &[DurationBucket], total: u64) -> Vec<HistogramRow> {
    buckets
        .iter()
        .map(|b| HistogramRow {
            label: b.label.clone(),
            count: b.count,
            percent: percent(b.count, total),
        })
        .collect()
}

/// Number of tracks counted in the histogram (zero-duration tracks excluded).
pub fn histogram_total(buckets: &[DurationBucket]) -> u64 {
    buckets.iter().map(|b| b.count).sum()
}

// ============================================================================
// TESTS
// ============================================================================
