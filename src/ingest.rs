//! Cue sheet ingestion.
//!
//! Turns Markdown, Excel and CSV cue sheets into normalized rows and
//! [`TrackUsageRecord`]s. A file that cannot be read fails on its own; the
//! rest of the batch continues.

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::models::{CellValue, TrackUsageRecord, DEFAULT_EPISODE};
use crate::normalize::{extract_episode, normalize_participant};
use crate::progress::PhaseProgress;
use crate::time::parse_duration;

// ============================================================================
// Layout Constants
// ============================================================================

/// Markdown table separator row: `|---|:--:|`
static MD_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\|(?:\s*:?-+:?\s*\|)+").unwrap());

/// Markdown data row: seq, title, publisher, composer, time
static MD_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\|\s*(\d+)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|").unwrap()
});

const MD_TITLE_HEADERS: [&str; 2] = ["TITLE", "TÍTULO"];
const MD_TIME_HEADERS: [&str; 4] = ["TIME", "TIEMPO", "DURATION", "DURACIÓN"];

/// First data row of a spreadsheet cue sheet (1-based).
pub const SHEET_FIRST_ROW: usize = 17;
// 0-based column positions shared by workbooks and their CSV exports
const SHEET_COL_TITLE: usize = 3;
const SHEET_COL_TIME: usize = 6;
const SHEET_COL_COMPOSER: usize = 8;
const SHEET_COL_PUBLISHER: usize = 13;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

// ============================================================================
// Types
// ============================================================================

/// Supported cue sheet formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SheetFormat {
    Markdown,
    Xlsx,
    Csv,
}

impl SheetFormat {
    /// Detect format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" => Some(SheetFormat::Markdown),
            "xlsx" => Some(SheetFormat::Xlsx),
            "csv" => Some(SheetFormat::Csv),
            _ => None,
        }
    }

    /// Spreadsheet sources get a plain per-episode track table.
    pub fn is_spreadsheet(self) -> bool {
        matches!(self, SheetFormat::Xlsx | SheetFormat::Csv)
    }

    pub fn label(self) -> &'static str {
        match self {
            SheetFormat::Markdown => "Markdown",
            SheetFormat::Xlsx => "Excel",
            SheetFormat::Csv => "CSV",
        }
    }
}

/// One kept row of a cue sheet, after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CueRow {
    /// 1-based position among the kept rows of the file.
    pub seq: usize,
    pub title: String,
    pub publisher: String,
    pub composer: String,
    /// `MM:SS`
    pub time: String,
    pub duration_seconds: u64,
}

/// A parsed cue sheet file.
#[derive(Clone, Debug)]
pub struct CueSheet {
    pub path: PathBuf,
    pub format: SheetFormat,
    pub episode: String,
    pub rows: Vec<CueRow>,
}

impl CueSheet {
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    pub fn records(&self) -> impl Iterator<Item = TrackUsageRecord> + '_ {
        self.rows.iter().map(|row| {
            TrackUsageRecord::new(
                row.title.as_str(),
                row.duration_seconds,
                row.composer.as_str(),
                row.publisher.as_str(),
                self.episode.as_str(),
            )
        })
    }
}

/// Outcome of ingesting a batch of files.
#[derive(Debug, Default)]
pub struct IngestSummary {
    /// Successfully read sheets, in input order (some may have no rows).
    pub sheets: Vec<CueSheet>,
    pub failures: Vec<(PathBuf, IngestError)>,
}

impl IngestSummary {
    pub fn files_with_data(&self) -> usize {
        self.sheets.iter().filter(|s| !s.rows.is_empty()).count()
    }

    pub fn files_without_data(&self) -> usize {
        self.sheets.iter().filter(|s| s.rows.is_empty()).count()
    }

    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }

    /// All records of all sheets, in input order.
    pub fn records(&self) -> Vec<TrackUsageRecord> {
        self.sheets.iter().flat_map(|s| s.records()).collect()
    }
}

// ============================================================================
// Discovery
// ============================================================================

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Office lock files and macOS resource forks.
fn is_hidden_artifact(path: &Path) -> bool {
    let name = file_name_of(path);
    name.starts_with("~$") || name.starts_with("._")
}

fn is_candidate(path: &Path) -> bool {
    SheetFormat::from_path(path).is_some() && !is_hidden_artifact(path)
}

/// Expand input paths into the sorted, de-duplicated list of cue sheets.
///
/// Directories are scanned one level deep. Missing paths and unsupported
/// files are skipped with a warning.
pub fn discover_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    for input in inputs {
        if input.is_dir() {
            let before = found.len();
            for entry in WalkDir::new(input)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_file() && is_candidate(path) {
                    found.insert(canonical(path));
                }
            }
            info!(dir = %input.display(), found = found.len() - before, "scanned directory");
        } else if input.is_file() {
            if is_candidate(input) {
                found.insert(canonical(input));
            } else {
                warn!(path = %input.display(), "skipping unsupported file");
            }
        } else {
            warn!(path = %input.display(), "path not found, ignored");
        }
    }

    found.into_iter().collect()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

// ============================================================================
// Ingestion
// ============================================================================

/// Ingest files in parallel, preserving input order in the summary.
pub fn ingest_all(paths: &[PathBuf], progress: &PhaseProgress) -> IngestSummary {
    let results: Vec<(PathBuf, Result<CueSheet, IngestError>)> = paths
        .par_iter()
        .map(|path| {
            let result = ingest_file(path);
            progress.tick();
            (path.clone(), result)
        })
        .collect();

    let mut summary = IngestSummary::default();
    for (path, result) in results {
        match result {
            Ok(sheet) => summary.sheets.push(sheet),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to ingest file");
                summary.failures.push((path, e));
            }
        }
    }
    summary
}

/// Read one cue sheet.
pub fn ingest_file(path: &Path) -> Result<CueSheet, IngestError> {
    let format =
        SheetFormat::from_path(path).ok_or_else(|| IngestError::UnsupportedFormat(path.into()))?;

    let name = file_name_of(path);
    let episode = extract_episode(&name).unwrap_or_else(|| {
        warn!(file = %name, default = DEFAULT_EPISODE, "no episode number in file name");
        DEFAULT_EPISODE.to_string()
    });

    let rows = match format {
        SheetFormat::Markdown => {
            let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
                path: path.into(),
                source,
            })?;
            parse_markdown_sheet(&text).unwrap_or_else(|| {
                warn!(file = %name, "no music table found");
                Vec::new()
            })
        }
        SheetFormat::Xlsx => parse_xlsx_sheet(path)?,
        SheetFormat::Csv => {
            let file = File::open(path).map_err(|source| IngestError::Io {
                path: path.into(),
                source,
            })?;
            parse_csv_sheet(file).map_err(|source| IngestError::Csv {
                path: path.into(),
                source,
            })?
        }
    };

    debug!(file = %name, episode = %episode, rows = rows.len(), "ingested cue sheet");
    Ok(CueSheet {
        path: path.to_path_buf(),
        format,
        episode,
        rows,
    })
}

/// Apply the row policy shared by every format.
///
/// Rows without a title or time, or whose duration comes out as zero, are
/// dropped.
fn build_row(
    seq: usize,
    title: &str,
    time: &CellValue,
    composer: &CellValue,
    publisher: &CellValue,
) -> Option<CueRow> {
    let title = title.trim();
    if title.is_empty() || time.as_text().is_empty() {
        return None;
    }
    let parsed = parse_duration(time);
    if parsed.seconds == 0 {
        return None;
    }
    Some(CueRow {
        seq,
        title: title.to_string(),
        publisher: normalize_participant(publisher),
        composer: normalize_participant(composer),
        time: parsed.formatted,
        duration_seconds: parsed.seconds,
    })
}

// ============================================================================
// Markdown
// ============================================================================

fn is_md_header(line: &str) -> bool {
    let upper = line.to_uppercase();
    MD_TITLE_HEADERS.iter().any(|h| upper.contains(h))
        && MD_TIME_HEADERS.iter().any(|h| upper.contains(h))
}

/// Parse the music table of a Markdown cue sheet.
///
/// Returns `None` when no header row followed by a separator row exists.
pub fn parse_markdown_sheet(text: &str) -> Option<Vec<CueRow>> {
    let mut header_found = false;
    let mut separator_found = false;
    let mut rows = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('|') {
            continue;
        }
        if !header_found {
            header_found = is_md_header(line);
            continue;
        }
        if !separator_found {
            separator_found = MD_SEPARATOR.is_match(line);
            continue;
        }
        let Some(caps) = MD_ROW.captures(line) else {
            continue;
        };
        let row = build_row(
            rows.len() + 1,
            &caps[2],
            &CellValue::from(caps[5].trim()),
            &CellValue::from(caps[4].trim()),
            &CellValue::from(caps[3].trim()),
        );
        rows.extend(row);
    }

    (header_found && separator_found).then_some(rows)
}

// ============================================================================
// Excel
// ============================================================================

/// Read the first worksheet of an `.xlsx` workbook.
pub fn parse_xlsx_sheet(path: &Path) -> Result<Vec<CueRow>, IngestError> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|source| IngestError::Xlsx {
        path: path.into(),
        source,
    })?;
    match workbook.worksheet_range_at(0) {
        Some(range) => {
            let range = range.map_err(|source| IngestError::Xlsx {
                path: path.into(),
                source,
            })?;
            Ok(xlsx_rows(&range))
        }
        None => {
            warn!(path = %path.display(), "workbook has no worksheets");
            Ok(Vec::new())
        }
    }
}

/// Apply the spreadsheet layout to a worksheet range.
///
/// Only text cells count as titles. Positions are absolute, so a range that
/// starts below row 1 still lines up.
pub fn xlsx_rows(range: &Range<Data>) -> Vec<CueRow> {
    let Some((last_row, _)) = range.end() else {
        return Vec::new();
    };
    let cell = |row: u32, col: usize| range.get_value((row, col as u32));

    let mut rows = Vec::new();
    for row in (SHEET_FIRST_ROW as u32 - 1)..=last_row {
        let Some(Data::String(title)) = cell(row, SHEET_COL_TITLE) else {
            continue;
        };
        let time = xlsx_cell(cell(row, SHEET_COL_TIME));
        let kept = build_row(
            rows.len() + 1,
            title,
            &time,
            &xlsx_cell(cell(row, SHEET_COL_COMPOSER)),
            &xlsx_cell(cell(row, SHEET_COL_PUBLISHER)),
        );
        rows.extend(kept);
    }
    rows
}

fn xlsx_cell(data: Option<&Data>) -> CellValue {
    match data {
        None | Some(Data::Empty) => CellValue::Empty,
        Some(Data::Int(i)) => CellValue::Integer(*i),
        Some(Data::Float(f)) => CellValue::Number(*f),
        Some(Data::DateTime(dt)) => time_of_day(dt.as_f64())
            .map_or_else(|| CellValue::Number(dt.as_f64()), CellValue::Time),
        Some(Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s)) => {
            CellValue::Text(s.clone())
        }
        Some(Data::Bool(b)) => CellValue::Text(b.to_string()),
        Some(Data::Error(e)) => CellValue::Text(e.to_string()),
    }
}

/// Clock time carried by a date/time serial; the date part is dropped.
/// Rounds to the microsecond so float noise does not read as a fraction.
fn time_of_day(serial: f64) -> Option<NaiveTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let micros = (serial.fract() * MICROS_PER_DAY).round() as u64 % MICROS_PER_DAY as u64;
    NaiveTime::from_num_seconds_from_midnight_opt(
        (micros / 1_000_000) as u32,
        (micros % 1_000_000) as u32 * 1_000,
    )
}

// ============================================================================
// CSV
// ============================================================================

/// Numeric-looking time cells are spreadsheet numbers, the rest is text.
fn csv_time_cell(raw: &str) -> CellValue {
    let raw = raw.trim();
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match raw.parse::<f64>() {
        Ok(n) => CellValue::Number(n),
        Err(_) => CellValue::Text(raw.to_string()),
    }
}

fn csv_text_cell(raw: &str) -> CellValue {
    let raw = raw.trim();
    if raw.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(raw.to_string())
    }
}

/// Parse a CSV export of a spreadsheet cue sheet.
///
/// Cells are decoded lossily so Latin-1 exports still load.
pub fn parse_csv_sheet<R: Read>(reader: R) -> Result<Vec<CueRow>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.byte_records().skip(SHEET_FIRST_ROW - 1) {
        let record = record?;
        let cell = |idx: usize| -> String {
            record
                .get(idx)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default()
        };
        let row = build_row(
            rows.len() + 1,
            &cell(SHEET_COL_TITLE),
            &csv_time_cell(&cell(SHEET_COL_TIME)),
            &csv_text_cell(&cell(SHEET_COL_COMPOSER)),
            &csv_text_cell(&cell(SHEET_COL_PUBLISHER)),
        );
        rows.extend(row);
    }
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
