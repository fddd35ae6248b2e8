//! Progress reporting for the phases of a run.
//!
//! On a terminal each phase draws an indicatif bar or spinner. In log-only
//! mode the bars stay hidden and a phase reports through periodic tracing
//! lines instead, which reads better in CI logs and `tail -f`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format wall-clock time for phase summaries: `4.2s`, `1.5m`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Ingest,
    Aggregate,
    Reports,
}

impl Phase {
    /// Message shown next to the bar.
    pub fn message(self) -> &'static str {
        match self {
            Phase::Ingest => "Reading cue sheets",
            Phase::Aggregate => "Aggregating statistics",
            Phase::Reports => "Writing episode reports",
        }
    }

    /// Short name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Ingest => "ingest",
            Phase::Aggregate => "aggregate",
            Phase::Reports => "reports",
        }
    }

    /// Items between two log-only progress lines.
    fn log_every(self) -> u64 {
        match self {
            Phase::Ingest => 25,
            Phase::Aggregate => 0,
            Phase::Reports => 10,
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:<24} {pos:>5}/{len:5} [{bar:32.green/white}] {elapsed}")
        .unwrap()
        .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} ({elapsed})")
        .unwrap()
}

// ============================================================================
// Phase Progress
// ============================================================================

/// Progress of one phase. Shared by reference across rayon workers.
pub struct PhaseProgress {
    phase: Phase,
    bar: ProgressBar,
    total: u64,
    done: AtomicU64,
    started: Instant,
}

impl PhaseProgress {
    /// A phase over a known number of items.
    pub fn counted(phase: Phase, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_style(bar_style());
        }
        Self::with_bar(phase, bar, total)
    }

    /// A phase with no item count.
    pub fn spinner(phase: Phase) -> Self {
        let bar = ProgressBar::new_spinner();
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        Self::with_bar(phase, bar, 0)
    }

    /// Never drawn and never logged per item.
    pub fn hidden(phase: Phase, total: u64) -> Self {
        Self::with_bar(phase, ProgressBar::hidden(), total)
    }

    fn with_bar(phase: Phase, bar: ProgressBar, total: u64) -> Self {
        bar.set_message(phase.message());
        Self {
            phase,
            bar,
            total,
            done: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Mark one item done.
    pub fn tick(&self) {
        self.bar.inc(1);
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if is_log_only() && should_log(done, self.total, self.phase.log_every()) {
            info!(
                phase = self.phase.name(),
                done,
                total = self.total,
                "{:.1}%",
                percent_done(done, self.total)
            );
        }
    }

    pub fn completed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Clear the bar and log how long the phase took. Returns the items done.
    pub fn finish(self) -> u64 {
        self.bar.finish_and_clear();
        let done = self.completed();
        info!(
            phase = self.phase.name(),
            done,
            elapsed = %format_elapsed(self.started.elapsed()),
            "phase finished"
        );
        done
    }
}

fn should_log(done: u64, total: u64, every: u64) -> bool {
    done == total || (every > 0 && done % every == 0)
}

fn percent_done(done: u64, total: u64) -> f64 {
    100.0 * done as f64 / total.max(1) as f64
}
