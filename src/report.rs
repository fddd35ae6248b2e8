//! Markdown reports and JSON export.
//!
//! Renderers are pure `&StatisticsBundle -> String` functions; [`ReportWriter`]
//! decides file names and writes atomically into the output directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ReportConfig;
use crate::ingest::CueSheet;
use crate::models::{ParticipantRole, ParticipantStats, StatisticsBundle, NOT_AVAILABLE};
use crate::time::format_duration;
use crate::views::{
    episode_summaries, histogram_rows, histogram_total, publisher_shares, ranked_participants,
    tracks_for_participant, EpisodeSummary, PublisherShare, SummaryMetrics,
};

// ============================================================================
// Formatting Helpers
// ============================================================================

/// Cut `text` to `limit` characters plus `...` when it is longer than `limit + 3`.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit + 3 {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

/// `1234567` -> `1,234,567`
pub fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn participant_rows(out: &mut String, ranked: &[&ParticipantStats]) {
    for p in ranked {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            p.name,
            p.occurrences,
            format_duration(p.duration_seconds)
        ));
    }
}

fn histogram_table(out: &mut String, bundle: &StatisticsBundle, denominator: u64, thousands: bool) {
    out.push_str("| Range (MM:SS) | Tracks | % of Total |\n");
    out.push_str("|:--------------|:------:|:----------:|\n");
    for row in histogram_rows(&bundle.duration_histogram, denominator) {
        let count = if thousands {
            with_thousands(row.count)
        } else {
            row.count.to_string()
        };
        out.push_str(&format!("| {} | {} | {:.1}% |\n", row.label, count, row.percent));
    }
    out.push('\n');
}

// ============================================================================
// Episode Reports
// ============================================================================

/// Statistics report for a single episode.
pub fn render_episode_report(
    episode: &str,
    bundle: &StatisticsBundle,
    config: &ReportConfig,
) -> String {
    let summary = SummaryMetrics::from_bundle(bundle, &config.highlight_publisher);
    let mut out = format!("# Music Report - Episode {}\n\n## Executive Summary\n\n", episode);
    out.push_str("| Metric | Value |\n|:-------|------:|\n");
    out.push_str(&format!("| Total tracks (uses) | {} |\n", summary.total_tracks));
    out.push_str(&format!(
        "| Unique tracks (title+composer) | {} |\n",
        summary.unique_tracks
    ));
    out.push_str(&format!("| Total music time | {} |\n", summary.total_formatted));
    out.push_str(&format!(
        "| Average duration / track | {} |\n",
        summary.average_formatted
    ));
    out.push_str(&format!("| Unique composers | {} |\n", summary.unique_composers));
    out.push_str(&format!("| Unique publishers | {} |\n\n", summary.unique_publishers));

    let top_tracks: Vec<_> = bundle
        .tracks_by_duration
        .iter()
        .take(config.episode_top_tracks)
        .collect();
    if !top_tracks.is_empty() {
        out.push_str(&format!(
            "## Top {} Tracks (by Total Time in Episode)\n\n",
            top_tracks.len()
        ));
        out.push_str("| # | Title | Composer | Publisher | Total Time | Occurrences |\n");
        out.push_str("|:--|:------|:---------|:----------|:----------:|:-----------:|\n");
        for (i, t) in top_tracks.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                i + 1,
                truncate(&t.title, 30),
                truncate(&t.composer, 25),
                truncate(&t.publisher, 25),
                format_duration(t.total_duration_seconds),
                t.occurrence_count
            ));
        }
        out.push('\n');
    }

    let composers = ranked_participants(&bundle.composers, config.episode_top_composers);
    if !composers.is_empty() {
        out.push_str(&format!(
            "## Top {} Composers (by Total Time in Episode)\n\n",
            composers.len()
        ));
        out.push_str("| Composer | Tracks | Total Time |\n|:---------|:------:|:----------:|\n");
        participant_rows(&mut out, &composers);
        out.push('\n');
    }

    let publishers = ranked_participants(&bundle.publishers, config.episode_top_publishers);
    if !publishers.is_empty() {
        out.push_str(&format!(
            "## Top {} Publishers (by Total Time in Episode)\n\n",
            publishers.len()
        ));
        out.push_str("| Publisher | Tracks | Total Time |\n|:----------|:------:|:----------:|\n");
        participant_rows(&mut out, &publishers);
        out.push('\n');
    }

    if !bundle.duration_histogram.is_empty() {
        out.push_str("## Track Duration Distribution\n\n");
        // Percentages here are of all tracks, zero-length ones included
        histogram_table(&mut out, bundle, bundle.total_tracks as u64, false);
    }

    out.push_str("## Episode Highlights\n\n");
    let top_composer = composers.first().map_or(NOT_AVAILABLE, |p| p.name.as_str());
    let top_publisher = publishers.first().map_or(NOT_AVAILABLE, |p| p.name.as_str());
    let top_track = top_tracks.first().map_or(NOT_AVAILABLE, |t| t.title.as_str());
    out.push_str(&format!("- **Lead composer (by time):** {}\n", top_composer));
    out.push_str(&format!("- **Lead publisher (by time):** {}\n", top_publisher));
    out.push_str(&format!("- **Lead track (by accumulated time):** {}\n", top_track));
    out
}

/// Plain track listing of one sheet, as read from its source file.
pub fn render_episode_table(sheet: &CueSheet, config: &ReportConfig) -> String {
    let mut out = format!(
        "# Episode {}\n\n## Track Table ({})\n\n",
        sheet.episode,
        sheet.format.label()
    );
    out.push_str("| SEQ# | TITLE | PUBLISHER | COMPOSER | TIME (MM:SS) |\n");
    out.push_str("|:----:|:------|:----------|:---------|:------------:|\n");
    for row in &sheet.rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            row.seq,
            truncate(&row.title, config.title_width),
            truncate(&row.publisher, config.participant_width),
            truncate(&row.composer, config.participant_width),
            row.time
        ));
    }
    out
}

// ============================================================================
// Global Report
// ============================================================================

/// Consolidated report across every episode.
pub fn render_global_report(
    report_name: &str,
    bundle: &StatisticsBundle,
    per_episode: &[(String, StatisticsBundle)],
    config: &ReportConfig,
) -> String {
    let summary = SummaryMetrics::from_bundle(bundle, &config.highlight_publisher);
    let episodes: Vec<&str> = per_episode.iter().map(|(ep, _)| ep.as_str()).collect();

    let mut out = format!("# {} - Global Music Report\n\n", report_name);
    if episodes.is_empty() {
        out.push_str("*No episodes were processed.*\n\n");
    } else {
        out.push_str(&format!(
            "*Episodes included ({}): {}*\n\n",
            episodes.len(),
            episodes.join(", ")
        ));
    }

    out.push_str("## General Summary\n\n");
    out.push_str("| Metric | Value |\n|:-------|------:|\n");
    out.push_str(&format!("| Total episodes | {} |\n", episodes.len()));
    out.push_str(&format!(
        "| Total tracks (uses) | {} |\n",
        with_thousands(summary.total_tracks as u64)
    ));
    out.push_str(&format!(
        "| Unique tracks (title+composer) | {} |\n",
        with_thousands(summary.unique_tracks as u64)
    ));
    out.push_str(&format!(
        "| Total music time (MM:SS) | {} |\n",
        summary.total_formatted
    ));
    out.push_str(&format!(
        "| Average duration / track (MM:SS) | {} |\n",
        summary.average_formatted
    ));
    out.push_str(&format!("| Unique composers | {} |\n", summary.unique_composers));
    out.push_str(&format!("| Unique publishers | {} |\n", summary.unique_publishers));
    out.push_str(&format!(
        "| {} time (MM:SS) | {} ({} min, {:.1}%) |\n\n",
        summary.highlight.publisher,
        summary.highlight.formatted,
        summary.highlight.minutes,
        summary.highlight.percent
    ));

    if !per_episode.is_empty() {
        out.push_str("## Episode Comparison\n\n");
        out.push_str("| Episode | Tracks | Unique | Duration (MM:SS) |\n");
        out.push_str("|:--------|:------:|:------:|:----------------:|\n");
        for s in episode_summaries(per_episode) {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                s.episode, s.tracks, s.unique_tracks, s.formatted
            ));
        }
        out.push('\n');
    }

    let trending: Vec<_> = bundle
        .tracks_by_occurrence
        .iter()
        .take(config.global_top_tracks)
        .collect();
    if !trending.is_empty() {
        out.push_str("## Track Trends\n\n");
        out.push_str(&format!(
            "### Top {} Most Used Tracks (by Occurrences)\n\n",
            trending.len()
        ));
        out.push_str("| # | Title | Composer | Eps | Uses | Total (MM:SS) |\n");
        out.push_str("|:--|:------|:---------|:---:|:----:|:-------------:|\n");
        for (i, t) in trending.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                i + 1,
                truncate(&t.title, 40),
                truncate(&t.composer, 35),
                t.episode_count,
                t.count,
                t.formatted_total
            ));
        }
        out.push('\n');
    }

    let composers = ranked_participants(&bundle.composers, config.global_top_composers);
    if !composers.is_empty() {
        out.push_str("## Composer Analysis\n\n");
        out.push_str(&format!(
            "#### Top {} Composers by Time\n\n| Composer | Tracks | Total (MM:SS) |\n|:---------|:------:|:-------------:|\n",
            composers.len()
        ));
        participant_rows(&mut out, &composers);
        out.push('\n');
    }

    let publishers = ranked_participants(&bundle.publishers, config.global_top_publishers);
    if !publishers.is_empty() {
        out.push_str("## Publisher Analysis\n\n");
        let shares = publisher_shares(bundle, config.others_threshold_percent);
        if !shares.is_empty() {
            out.push_str("### Time Share by Publisher\n\n");
            out.push_str("| Publisher | Minutes | Share |\n|:----------|:-------:|:-----:|\n");
            for s in &shares {
                out.push_str(&format!(
                    "| {} | {} | {:.1}% |\n",
                    s.publisher, s.minutes, s.percent
                ));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "#### Top {} Publishers by Time\n\n| Publisher | Tracks | Total (MM:SS) |\n|:----------|:------:|:-------------:|\n",
            publishers.len()
        ));
        participant_rows(&mut out, &publishers);
        out.push('\n');
    }

    if (!composers.is_empty() || !publishers.is_empty()) && !trending.is_empty() {
        out.push_str("## Leading Track Details\n");
        if let Some(top) = composers.first() {
            let tracks = tracks_for_participant(
                bundle,
                ParticipantRole::Composer,
                &top.name,
                config.global_detail_tracks,
            );
            if !tracks.is_empty() {
                out.push_str(&format!(
                    "\n### Top {} Tracks by {}\n\n| Title | Publisher | Uses | Total (MM:SS) |\n|:------|:----------|:----:|:-------------:|\n",
                    tracks.len(),
                    top.name
                ));
                for t in tracks {
                    out.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        truncate(&t.title, 35),
                        truncate(&t.publisher, 30),
                        t.count,
                        t.formatted_total
                    ));
                }
                out.push('\n');
            }
        }
        if let Some(top) = publishers.first() {
            let tracks = tracks_for_participant(
                bundle,
                ParticipantRole::Publisher,
                &top.name,
                config.global_detail_tracks,
            );
            if !tracks.is_empty() {
                out.push_str(&format!(
                    "\n### Top {} Tracks from {}\n\n| Title | Composer | Uses | Total (MM:SS) |\n|:------|:---------|:----:|:-------------:|\n",
                    tracks.len(),
                    top.name
                ));
                for t in tracks {
                    out.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        truncate(&t.title, 35),
                        truncate(&t.composer, 30),
                        t.count,
                        t.formatted_total
                    ));
                }
                out.push('\n');
            }
        }
    }

    if !bundle.duration_histogram.is_empty() {
        out.push_str("## Track Duration Distribution\n\n");
        histogram_table(
            &mut out,
            bundle,
            histogram_total(&bundle.duration_histogram),
            true,
        );
    }
    out
}

// ============================================================================
// JSON Export
// ============================================================================

/// Machine-readable counterpart of the global report.
#[derive(Debug, Serialize)]
pub struct StatsExport<'a> {
    pub report_name: &'a str,
    pub generated_at: String,
    pub summary: SummaryMetrics,
    pub publisher_shares: Vec<PublisherShare>,
    pub episodes: Vec<EpisodeSummary>,
    pub statistics: &'a StatisticsBundle,
}

impl<'a> StatsExport<'a> {
    pub fn new(
        report_name: &'a str,
        bundle: &'a StatisticsBundle,
        per_episode: &[(String, StatisticsBundle)],
        config: &ReportConfig,
    ) -> Self {
        Self {
            report_name,
            generated_at: chrono::Local::now().to_rfc3339(),
            summary: SummaryMetrics::from_bundle(bundle, &config.highlight_publisher),
            publisher_shares: publisher_shares(bundle, config.others_threshold_percent),
            episodes: episode_summaries(per_episode),
            statistics: bundle,
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes every report for one run into the output directory.
pub struct ReportWriter<'a> {
    output_dir: PathBuf,
    report_name: String,
    config: &'a ReportConfig,
}

impl<'a> ReportWriter<'a> {
    pub fn new(output_dir: &Path, report_name: &str, config: &'a ReportConfig) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Create output dir {}", output_dir.display()))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            report_name: report_name.to_string(),
            config,
        })
    }

    pub fn episode_report_path(&self, episode: &str) -> PathBuf {
        self.output_dir.join(format!("Episode_{}_Report.md", episode))
    }

    pub fn episode_table_path(&self, episode: &str) -> PathBuf {
        self.output_dir.join(format!("Episode_{}.md", episode))
    }

    pub fn global_report_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_Global.md", self.report_name))
    }

    pub fn stats_json_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_stats.json", self.report_name))
    }

    pub fn write_episode_report(&self, episode: &str, bundle: &StatisticsBundle) -> Result<PathBuf> {
        let path = self.episode_report_path(episode);
        write_atomic(&path, &render_episode_report(episode, bundle, self.config))?;
        info!(episode, path = %path.display(), "wrote episode report");
        Ok(path)
    }

    pub fn write_episode_table(&self, sheet: &CueSheet) -> Result<PathBuf> {
        let path = self.episode_table_path(&sheet.episode);
        write_atomic(&path, &render_episode_table(sheet, self.config))?;
        info!(episode = %sheet.episode, path = %path.display(), "wrote episode track table");
        Ok(path)
    }

    pub fn write_global_report(
        &self,
        bundle: &StatisticsBundle,
        per_episode: &[(String, StatisticsBundle)],
    ) -> Result<PathBuf> {
        let path = self.global_report_path();
        let content = render_global_report(&self.report_name, bundle, per_episode, self.config);
        write_atomic(&path, &content)?;
        info!(path = %path.display(), "wrote global report");
        Ok(path)
    }

    pub fn write_stats_json(
        &self,
        bundle: &StatisticsBundle,
        per_episode: &[(String, StatisticsBundle)],
    ) -> Result<PathBuf> {
        let path = self.stats_json_path();
        StatsExport::new(&self.report_name, bundle, per_episode, self.config)
            .write_to_file(&path)
            .with_context(|| format!("Write stats {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON statistics");
        Ok(path)
    }
}

/// Write through a temp file and rename, so readers never see partial reports.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let f = fs::File::create(&tmp).with_context(|| format!("Create {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        w.write_all(content.as_bytes())?;
        w.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, aggregate_by_episode};
    use crate::ingest::{CueRow, SheetFormat};
    use crate::models::TrackUsageRecord;
    use tempfile::tempdir;

    fn records() -> Vec<TrackUsageRecord> {
        vec![
            TrackUsageRecord::new("Opening", 120, "Ana / Ben", "RHAPSOLODY MUSIC LB", "001"),
            TrackUsageRecord::new("Chase", 95, "Ben", "Big Label", "001"),
            TrackUsageRecord::new("Opening", 60, "Ana / Ben", "RHAPSOLODY MUSIC LB", "002"),
            TrackUsageRecord::new("Sting", 5, "Cleo", "Tiny Pub", "002"),
        ]
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        // Exactly limit + 3 is kept whole
        assert_eq!(truncate("abcdefgh", 5), "abcdefgh");
        assert_eq!(truncate("abcdefghi", 5), "abcde...");
        assert_eq!(truncate("ñandú ñandú", 3), "ñan...");
    }

    #[test]
    fn test_with_thousands() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_episode_report_sections() {
        let per_episode = aggregate_by_episode(&records());
        let (ep, bundle) = &per_episode[0];
        let report = render_episode_report(ep, bundle, &ReportConfig::default());

        assert!(report.starts_with("# Music Report - Episode 001"));
        assert!(report.contains("| Total tracks (uses) | 2 |"));
        assert!(report.contains("| Total music time | 03:35 |"));
        assert!(report.contains("## Top 2 Tracks (by Total Time in Episode)"));
        assert!(report.contains("| 1 | Opening | Ana / Ben | RHAPSOLODY MUSIC LB | 02:00 | 1 |"));
        assert!(report.contains("| Ben | 2 | 03:35 |"));
        // Both tracks land in the same bucket
        assert!(report.contains("| 01:31-02:00 | 2 | 100.0% |"));
        assert!(report.contains("- **Lead composer (by time):** Ben"));
        assert!(report.contains("- **Lead track (by accumulated time):** Opening"));
    }

    #[test]
    fn test_empty_episode_highlights() {
        let report = render_episode_report("000", &aggregate(&[]), &ReportConfig::default());
        assert!(report.contains("- **Lead composer (by time):** N/A"));
        assert!(!report.contains("## Top"));
    }

    #[test]
    fn test_global_report_sections() {
        let recs = records();
        let bundle = aggregate(&recs);
        let per_episode = aggregate_by_episode(&recs);
        let report =
            render_global_report("Season_1", &bundle, &per_episode, &ReportConfig::default());

        assert!(report.starts_with("# Season_1 - Global Music Report"));
        assert!(report.contains("*Episodes included (2): 001, 002*"));
        assert!(report.contains("| 001 | 2 | 2 | 03:35 |"));
        assert!(report.contains("| 1 | Opening | Ana / Ben | 2 | 2 | 03:00 |"));
        assert!(report.contains("| RHAPSOLODY MUSIC LB time (MM:SS) | 03:00 (3 min, 64.3%) |"));
        assert!(report.contains("### Top 2 Tracks by Ben"));
        assert!(report.contains("### Top 1 Tracks from RHAPSOLODY MUSIC LB"));
        assert!(report.contains("| Others | 1 | 1.8% |"));
        assert!(report.contains("| 00:01-00:30 | 1 | 25.0% |"));
    }

    #[test]
    fn test_episode_table() {
        let sheet = CueSheet {
            path: PathBuf::from("EP7.csv"),
            format: SheetFormat::Csv,
            episode: "007".to_string(),
            rows: vec![CueRow {
                seq: 1,
                title: "A very long title that keeps going well past the limit".to_string(),
                publisher: "Pub".to_string(),
                composer: "Comp".to_string(),
                time: "03:25".to_string(),
                duration_seconds: 205,
            }],
        };
        let table = render_episode_table(&sheet, &ReportConfig::default());
        assert!(table.starts_with("# Episode 007\n\n## Track Table (CSV)"));
        assert!(table
            .contains("| 1 | A very long title that keeps going well ... | Pub | Comp | 03:25 |"));
    }

    #[test]
    fn test_writer_outputs() {
        let dir = tempdir().unwrap();
        let config = ReportConfig::default();
        let writer = ReportWriter::new(&dir.path().join("out"), "Run", &config).unwrap();
        let recs = records();
        let bundle = aggregate(&recs);
        let per_episode = aggregate_by_episode(&recs);

        let global = writer.write_global_report(&bundle, &per_episode).unwrap();
        assert!(global.ends_with("Run_Global.md"));
        let episode = writer.write_episode_report("001", &per_episode[0].1).unwrap();
        assert!(episode.ends_with("Episode_001_Report.md"));

        let json_path = writer.write_stats_json(&bundle, &per_episode).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["report_name"], "Run");
        assert_eq!(json["summary"]["total_tracks"], 4);
        assert_eq!(json["episodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["statistics"]["unique_track_count"], 3);
        assert!(!dir.path().join("out").join("Run_Global.tmp").exists());
    }
}
