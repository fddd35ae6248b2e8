use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cuesheet_stats::config::{ReportConfig, DEFAULT_REPORT_NAME};
use cuesheet_stats::pipeline::{run, RunOptions};
use cuesheet_stats::progress::{format_elapsed, set_log_only};
use cuesheet_stats::time::format_duration;

#[derive(Parser, Debug)]
#[command(name = "cuesheet-stats")]
#[command(about = "Build music-usage statistics and reports from episode cue sheets")]
struct Args {
    /// Cue sheet files (.md, .xlsx, .csv) or directories containing them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for generated reports
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Base name for the global report files
    #[arg(long, default_value = DEFAULT_REPORT_NAME)]
    report_name: String,

    /// TOML file overriding report limits
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Skip the JSON statistics export
    #[arg(long)]
    no_json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuesheet_stats=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let config = ReportConfig::load_or_default(args.config.as_deref())?;
    let start = Instant::now();

    let summary = run(&RunOptions {
        inputs: args.inputs,
        output_dir: args.output_dir,
        report_name: args.report_name,
        write_json: !args.no_json,
        config,
    })?;

    println!("\n{:=<60}", "");
    println!("Processing complete: {}", summary.report_name);
    println!("  Files: {}", summary.files_total);
    println!("    with data:    {}", summary.files_with_data);
    if summary.files_without_data > 0 {
        println!("    without data: {}", summary.files_without_data);
    }
    if summary.files_failed > 0 {
        println!("    failed:       {}", summary.files_failed);
    }
    match &summary.global {
        Some(global) => {
            println!("  Tracks: {}", global.total_tracks);
            println!("  Unique tracks: {}", global.unique_track_count);
            println!("  Episodes: {}", global.episodes.len());
            println!(
                "  Music time: {}",
                format_duration(global.total_duration_seconds)
            );
        }
        None => println!("  No valid tracks found; global reports not generated"),
    }
    println!("  Reports written: {}", summary.written.len());
    println!("  Elapsed: {}", format_elapsed(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
