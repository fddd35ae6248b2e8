//! Statistics aggregation over a batch of track-usage records.
//!
//! [`aggregate`] is a pure function: one pass accumulates totals, per-entity
//! tallies, the duration histogram and consolidated tracks; a second pass
//! derives the two rankings. Nothing is shared between calls, so the global
//! bundle and every per-episode bundle can be computed in parallel.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::models::{
    ConsolidatedTrack, DurationBucket, ParticipantStats, StatisticsBundle, Tally, TitleCount,
    TrackUsageDetail, TrackUsageRecord, BUCKET_WIDTH_SECONDS,
};
use crate::normalize::{sort_episodes, split_participants};
use crate::time::{format_duration, parse_formatted};

/// Index mapping a `title|composer` key to its position in the track Vec
type TrackIndex = FxHashMap<String, usize>;

// ============================================================================
// Aggregation
// ============================================================================

/// Compute the statistics bundle for a batch of records.
pub fn aggregate(records: &[TrackUsageRecord]) -> StatisticsBundle {
    let mut total_duration_seconds: u64 = 0;
    let mut titles: Tally<TitleCount> = Tally::new();
    let mut composers: Tally<ParticipantStats> = Tally::new();
    let mut publishers: Tally<ParticipantStats> = Tally::new();
    let mut episodes: BTreeSet<String> = BTreeSet::new();
    let mut buckets: Vec<DurationBucket> = Vec::new();
    let mut bucket_index: FxHashMap<u64, usize> = FxHashMap::default();
    let mut tracks: Vec<ConsolidatedTrack> = Vec::new();
    let mut track_index: TrackIndex = FxHashMap::default();

    for record in records {
        let duration = record.duration_seconds;
        let title = record.title.trim();

        episodes.insert(record.episode.clone());
        total_duration_seconds += duration;

        titles
            .entry_or_insert_with(title, || TitleCount {
                title: title.to_string(),
                count: 0,
            })
            .count += 1;

        tally_participants(&mut composers, &record.composer, duration);
        tally_participants(&mut publishers, &record.publisher, duration);

        if duration > 0 {
            let idx = (duration - 1) / BUCKET_WIDTH_SECONDS;
            let slot = *bucket_index.entry(idx).or_insert_with(|| {
                buckets.push(new_bucket(idx));
                buckets.len() - 1
            });
            buckets[slot].count += 1;
        }

        // Identity uses the unsplit composer: "A / B" is a single key.
        let key = ConsolidatedTrack::grouping_key(title, &record.composer);
        match track_index.get(&key) {
            Some(&idx) => {
                let track = &mut tracks[idx];
                track.total_duration_seconds += duration;
                track.occurrence_count += 1;
                track.episodes.insert(record.episode.clone());
            }
            None => {
                track_index.insert(key, tracks.len());
                tracks.push(ConsolidatedTrack {
                    title: title.to_string(),
                    composer: record.composer.clone(),
                    publisher: record.publisher.clone(),
                    total_duration_seconds: duration,
                    occurrence_count: 1,
                    episodes: std::iter::once(record.episode.clone()).collect(),
                });
            }
        }
    }

    let unique_track_count = tracks.len();
    let tracks_by_occurrence = rank_by_occurrence(&tracks);
    let tracks_by_duration = rank_by_duration(tracks);

    // Histogram order comes from the labels, not from insertion.
    buckets.sort_by_key(|b| bucket_start_from_label(&b.label).unwrap_or(u64::MAX));

    StatisticsBundle {
        total_tracks: records.len(),
        total_duration_seconds,
        titles,
        composers,
        publishers,
        episodes,
        duration_histogram: buckets,
        tracks_by_duration,
        tracks_by_occurrence,
        unique_track_count,
    }
}

/// Aggregate the records of each episode independently, in parallel.
///
/// Returns `(episode, bundle)` pairs in episode display order.
pub fn aggregate_by_episode(records: &[TrackUsageRecord]) -> Vec<(String, StatisticsBundle)> {
    let mut grouped: FxHashMap<&str, Vec<TrackUsageRecord>> = FxHashMap::default();
    for record in records {
        grouped
            .entry(record.episode.as_str())
            .or_default()
            .push(record.clone());
    }

    let keys: Vec<String> = grouped.keys().map(|k| k.to_string()).collect();
    let order = sort_episodes(&keys);
    let subsets: Vec<(String, Vec<TrackUsageRecord>)> = order
        .into_iter()
        .map(|ep| {
            let subset = grouped.remove(ep.as_str()).unwrap_or_default();
            (ep, subset)
        })
        .collect();

    subsets
        .into_par_iter()
        .map(|(ep, subset)| {
            let bundle = aggregate(&subset);
            (ep, bundle)
        })
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn tally_participants(tally: &mut Tally<ParticipantStats>, field: &str, duration: u64) {
    for name in split_participants(field) {
        let entry = tally.entry_or_insert_with(name, || ParticipantStats {
            name: name.to_string(),
            occurrences: 0,
            duration_seconds: 0,
        });
        entry.occurrences += 1;
        entry.duration_seconds += duration;
    }
}

fn new_bucket(idx: u64) -> DurationBucket {
    let start_seconds = idx * BUCKET_WIDTH_SECONDS + 1;
    let end_seconds = (idx + 1) * BUCKET_WIDTH_SECONDS;
    DurationBucket {
        label: format!(
            "{}-{}",
            format_duration(start_seconds),
            format_duration(end_seconds)
        ),
        start_seconds,
        end_seconds,
        count: 0,
    }
}

/// Starting second of a `"MM:SS-MM:SS"` histogram label.
fn bucket_start_from_label(label: &str) -> Option<u64> {
    let (start, _) = label.split_once('-')?;
    parse_formatted(start)
}

/// Stable sort by total duration, descending. Ties keep first-seen order.
fn rank_by_duration(mut tracks: Vec<ConsolidatedTrack>) -> Vec<ConsolidatedTrack> {
    tracks.sort_by(|a, b| b.total_duration_seconds.cmp(&a.total_duration_seconds));
    tracks
}

/// Stable sort by occurrence count, descending. Ties keep first-seen order.
fn rank_by_occurrence(tracks: &[ConsolidatedTrack]) -> Vec<TrackUsageDetail> {
    let mut details: Vec<TrackUsageDetail> = tracks
        .iter()
        .map(|t| TrackUsageDetail {
            title: t.title.clone(),
            composer: t.composer.clone(),
            publisher: t.publisher.clone(),
            count: t.occurrence_count,
            total_seconds: t.total_duration_seconds,
            formatted_total: format_duration(t.total_duration_seconds),
            episode_count: t.episodes.len(),
            episodes: sort_episodes(&t.episodes),
        })
        .collect();
    details.sort_by(|a, b| b.count.cmp(&a.count));
    details
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOT_AVAILABLE;
    use proptest::prelude::*;

    fn rec(title: &str, secs: u64, composer: &str, publisher: &str, ep: &str) -> TrackUsageRecord {
        TrackUsageRecord::new(title, secs, composer, publisher, ep)
    }

    #[test]
    fn test_empty_batch() {
        let bundle = aggregate(&[]);
        assert_eq!(bundle.total_tracks, 0);
        assert_eq!(bundle.total_duration_seconds, 0);
        assert_eq!(bundle.unique_track_count, 0);
        assert!(bundle.duration_histogram.is_empty());
        assert!(bundle.tracks_by_duration.is_empty());
    }

    #[test]
    fn test_two_occurrences_same_track() {
        let records = vec![
            rec("Song1", 90, NOT_AVAILABLE, "Acme", "001"),
            rec("Song1", 30, NOT_AVAILABLE, "Acme", "002"),
        ];
        let bundle = aggregate(&records);

        assert_eq!(bundle.total_duration_seconds, 120);
        assert_eq!(bundle.unique_track_count, 1);
        let track = bundle.consolidated_track("Song1", NOT_AVAILABLE).unwrap();
        assert_eq!(track.key(), "Song1|N/A");
        assert_eq!(track.occurrence_count, 2);
        assert_eq!(track.total_duration_seconds, 120);
        assert_eq!(
            track.episodes.iter().cloned().collect::<Vec<_>>(),
            vec!["001", "002"]
        );

        assert!(bundle.composers.is_empty());
        assert_eq!(bundle.publisher_count("Acme"), 2);
        assert_eq!(bundle.publisher_duration("Acme"), 120);

        let labels: Vec<&str> = bundle
            .duration_histogram
            .iter()
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(labels, vec!["00:01-00:30", "01:01-01:30"]);
    }

    #[test]
    fn test_compound_composer_is_one_track_but_two_composers() {
        let records = vec![
            rec("X", 60, "A / B", "Pub1", "001"),
            rec("X", 45, "A / B", "Pub2", "002"),
        ];
        let bundle = aggregate(&records);

        assert_eq!(bundle.unique_track_count, 1);
        let track = bundle.consolidated_track("X", "A / B").unwrap();
        assert_eq!(track.key(), "X|A / B");
        assert_eq!(track.occurrence_count, 2);
        // First-seen publisher is kept as the representative
        assert_eq!(track.publisher, "Pub1");

        assert_eq!(bundle.composer_count("A"), 2);
        assert_eq!(bundle.composer_count("B"), 2);
        assert_eq!(bundle.composer_duration("A"), 105);
        assert_eq!(bundle.composer_duration("B"), 105);
        assert!(!bundle.composers.contains("A / B"));
        assert_eq!(bundle.publisher_count("Pub1"), 1);
        assert_eq!(bundle.publisher_count("Pub2"), 1);
    }

    #[test]
    fn test_zero_duration_record() {
        let records = vec![rec("Silent", 0, "Comp", "Pub", "001")];
        let bundle = aggregate(&records);
        assert_eq!(bundle.total_tracks, 1);
        assert_eq!(bundle.total_duration_seconds, 0);
        assert!(bundle.duration_histogram.is_empty());
        assert_eq!(bundle.composer_count("Comp"), 1);
        assert_eq!(bundle.composer_duration("Comp"), 0);
        assert_eq!(bundle.publisher_count("Pub"), 1);
    }

    #[test]
    fn test_sentinel_excluded_from_participants() {
        let records = vec![rec("T", 10, NOT_AVAILABLE, NOT_AVAILABLE, "001")];
        let bundle = aggregate(&records);
        assert_eq!(bundle.total_tracks, 1);
        assert!(bundle.composers.is_empty());
        assert!(bundle.publishers.is_empty());
        assert_eq!(bundle.total_publisher_seconds(), 0);
    }

    #[test]
    fn test_bucket_boundaries() {
        let labels = |secs: u64| {
            aggregate(&[rec("T", secs, "C", "P", "001")])
                .duration_histogram
                .into_iter()
                .map(|b| b.label)
                .collect::<Vec<_>>()
        };
        assert_eq!(labels(1), vec!["00:01-00:30"]);
        assert_eq!(labels(30), vec!["00:01-00:30"]);
        assert_eq!(labels(31), vec!["00:31-01:00"]);
        assert_eq!(labels(60), vec!["00:31-01:00"]);
        assert_eq!(labels(3601), vec!["60:01-60:30"]);
    }

    #[test]
    fn test_histogram_sorted_by_start_not_label_text() {
        // "100:01" sorts before "20:01" as text; by start time it comes last
        let records = vec![
            rec("Long", 6001, "C", "P", "001"),
            rec("Mid", 1201, "C", "P", "001"),
            rec("Short", 5, "C", "P", "001"),
        ];
        let bundle = aggregate(&records);
        let starts: Vec<u64> = bundle
            .duration_histogram
            .iter()
            .map(|b| b.start_seconds)
            .collect();
        assert_eq!(starts, vec![1, 1201, 6001]);
    }

    #[test]
    fn test_duration_ranking_ties_keep_first_seen_order() {
        let records = vec![
            rec("First", 60, "C1", "P", "001"),
            rec("Big", 300, "C2", "P", "001"),
            rec("Second", 60, "C3", "P", "001"),
        ];
        let bundle = aggregate(&records);
        let order: Vec<&str> = bundle
            .tracks_by_duration
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(order, vec!["Big", "First", "Second"]);
    }

    #[test]
    fn test_occurrence_ranking_and_episode_list() {
        let records = vec![
            rec("Once", 60, "C1", "P", "001"),
            rec("Often", 10, "C2", "P", "010"),
            rec("Often", 10, "C2", "P", "bonus"),
            rec("Often", 10, "C2", "P", "002"),
            rec("Also once", 60, "C3", "P", "001"),
        ];
        let bundle = aggregate(&records);
        let order: Vec<&str> = bundle
            .tracks_by_occurrence
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(order, vec!["Often", "Once", "Also once"]);

        let often = &bundle.tracks_by_occurrence[0];
        assert_eq!(often.count, 3);
        assert_eq!(often.formatted_total, "00:30");
        assert_eq!(often.episode_count, 3);
        assert_eq!(often.episode_list(), "002, 010, bonus");
    }

    #[test]
    fn test_titles_counted_without_composer() {
        let records = vec![
            rec("Same", 10, "C1", "P", "001"),
            rec("Same", 10, "C2", "P", "001"),
        ];
        let bundle = aggregate(&records);
        assert_eq!(bundle.title_count("Same"), 2);
        assert_eq!(bundle.unique_track_count, 2);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let records = vec![
            rec("A", 90, "X / Y", "P1", "001"),
            rec("B", 200, "Z", "P2", "002"),
            rec("A", 90, "X / Y", "P3", "002"),
        ];
        assert_eq!(aggregate(&records), aggregate(&records));
    }

    #[test]
    fn test_aggregate_by_episode() {
        let records = vec![
            rec("A", 90, "X", "P", "010"),
            rec("B", 30, "Y", "P", "002"),
            rec("C", 30, "Y", "P", "010"),
        ];
        let per_episode = aggregate_by_episode(&records);
        let eps: Vec<&str> = per_episode.iter().map(|(ep, _)| ep.as_str()).collect();
        assert_eq!(eps, vec!["002", "010"]);
        assert_eq!(per_episode[1].1.total_tracks, 2);
        assert_eq!(per_episode[1].1.total_duration_seconds, 120);
        assert_eq!(per_episode[0].1, aggregate(&records[1..2]));
    }

    proptest! {
        #[test]
        fn single_record_totals_and_one_bucket(secs in 0u64..10_000) {
            let bundle = aggregate(&[rec("T", secs, "C", "P", "001")]);
            prop_assert_eq!(bundle.total_tracks, 1);
            prop_assert_eq!(bundle.total_duration_seconds, secs);
            prop_assert_eq!(bundle.duration_histogram.len(), usize::from(secs > 0));
            if let Some(bucket) = bundle.duration_histogram.first() {
                prop_assert_eq!(bucket.count, 1);
                prop_assert!(bucket.start_seconds <= secs && secs <= bucket.end_seconds);
            }
        }
    }
}
