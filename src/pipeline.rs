//! End-to-end run: discover, ingest, aggregate, write reports.

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::aggregate::{aggregate, aggregate_by_episode};
use crate::config::ReportConfig;
use crate::ingest::{discover_files, ingest_all};
use crate::models::StatisticsBundle;
use crate::progress::{Phase, PhaseProgress};
use crate::report::ReportWriter;
use crate::safety::{sanitize_report_name, validate_output_dir};

/// Inputs of one run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Files or directories holding cue sheets.
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub report_name: String,
    pub write_json: bool,
    pub config: ReportConfig,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub report_name: String,
    pub files_total: usize,
    pub files_with_data: usize,
    pub files_without_data: usize,
    pub files_failed: usize,
    pub written: Vec<PathBuf>,
    /// `None` when no file yielded any track.
    pub global: Option<StatisticsBundle>,
}

pub fn run(opts: &RunOptions) -> Result<RunSummary> {
    let report_name = sanitize_report_name(&opts.report_name);

    let files = discover_files(&opts.inputs);
    if files.is_empty() {
        bail!("No valid cue sheets (.md, .xlsx or .csv) found in the given inputs");
    }
    validate_output_dir(&opts.output_dir, &files)?;
    info!(files = files.len(), report_name = %report_name, "processing cue sheets");

    let writer = ReportWriter::new(&opts.output_dir, &report_name, &opts.config)?;

    let progress = PhaseProgress::counted(Phase::Ingest, files.len() as u64);
    let ingested = ingest_all(&files, &progress);
    progress.finish();

    let mut summary = RunSummary {
        report_name,
        files_total: files.len(),
        files_with_data: ingested.files_with_data(),
        files_without_data: ingested.files_without_data(),
        files_failed: ingested.files_failed(),
        ..Default::default()
    };
    info!(
        with_data = summary.files_with_data,
        without_data = summary.files_without_data,
        failed = summary.files_failed,
        "ingestion finished"
    );

    for sheet in ingested
        .sheets
        .iter()
        .filter(|s| s.format.is_spreadsheet() && !s.rows.is_empty())
    {
        match writer.write_episode_table(sheet) {
            Ok(path) => summary.written.push(path),
            Err(e) => warn!(file = %sheet.file_name(), error = %e, "failed to write track table"),
        }
    }

    let records = ingested.records();
    if records.is_empty() {
        info!("no valid tracks found, skipping reports");
        return Ok(summary);
    }

    let spinner = PhaseProgress::spinner(Phase::Aggregate);
    let (global, per_episode) =
        rayon::join(|| aggregate(&records), || aggregate_by_episode(&records));
    spinner.finish();
    info!(
        tracks = global.total_tracks,
        unique = global.unique_track_count,
        episodes = per_episode.len(),
        "aggregated statistics"
    );

    let progress = PhaseProgress::counted(Phase::Reports, per_episode.len() as u64);
    for (episode, bundle) in &per_episode {
        match writer.write_episode_report(episode, bundle) {
            Ok(path) => summary.written.push(path),
            Err(e) => warn!(episode = %episode, error = %e, "failed to write episode report"),
        }
        progress.tick();
    }
    progress.finish();

    summary
        .written
        .push(writer.write_global_report(&global, &per_episode)?);
    if opts.write_json {
        summary
            .written
            .push(writer.write_stats_json(&global, &per_episode)?);
    }

    summary.global = Some(global);
    Ok(summary)
}
