//! Duration parsing for cue sheet time cells.
//!
//! Cells arrive as frame-accurate timecodes, clock strings, spreadsheet
//! numbers or time-of-day values. Integer and float cells share the same
//! day-fraction heuristic. Every form is reduced to whole seconds, rounding
//! any sub-second remainder up.

use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::warn;

use crate::error::DurationParseError;
use crate::models::CellValue;

// ============================================================================
// Regex Patterns
// ============================================================================

/// `H:MM:SS` followed by a frame/fraction group: `0:03:25;12`, `0:03:25.5`
static TIMECODE_WITH_FRAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,2}):([0-9]{1,2}):([0-9]{1,2})[;.:]([0-9]+)").unwrap());

/// `H:MM:SS` with optional decimal seconds
static HOURS_MINUTES_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,2}):([0-9]{1,2}):([0-9]+(?:\.[0-9]+)?)").unwrap());

/// `M:SS` with optional decimal seconds; minutes may exceed 59
static MINUTES_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,3}):([0-9]{1,2}(?:\.[0-9]+)?)").unwrap());

/// Numeric cells at or below this value are read as fractions of a day.
pub const DAY_FRACTION_MAX: f64 = 5.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Remainders at or below this are float noise, not a real fraction.
const FRACTION_EPSILON: f64 = 1e-9;

// ============================================================================
// Types
// ============================================================================

/// A normalized duration: the `MM:SS` rendering and the whole seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParsedDuration {
    pub formatted: String,
    pub seconds: u64,
}

impl ParsedDuration {
    pub fn zero() -> Self {
        Self::from_seconds(0)
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            formatted: format_duration(seconds),
            seconds,
        }
    }
}

/// Whole seconds before rounding, plus whether a sub-second part was seen.
struct RawDuration {
    seconds: i64,
    fraction_present: bool,
}

// ============================================================================
// Formatting
// ============================================================================

/// Format seconds as zero-padded `MM:SS`. Minutes are never wrapped into hours.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Like [`format_duration`], with negative values treated as zero.
pub fn format_signed_duration(seconds: i64) -> String {
    format_duration(seconds.max(0) as u64)
}

/// Parse an `MM:SS` string produced by [`format_duration`] back into seconds.
pub fn parse_formatted(s: &str) -> Option<u64> {
    let (minutes, seconds) = s.trim().split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    Some(minutes * 60 + seconds)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a duration cell, logging and returning zero on failure.
pub fn parse_duration(cell: &CellValue) -> ParsedDuration {
    match try_parse_duration(cell) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(cell = %cell.as_text(), error = %e, "could not parse time, using 0s");
            ParsedDuration::zero()
        }
    }
}

/// Parse a duration cell.
///
/// Rules are tried in order and the first match wins. If any rule saw a
/// sub-second component the result is rounded up by exactly one second.
/// Negative results collapse to zero.
pub fn try_parse_duration(cell: &CellValue) -> Result<ParsedDuration, DurationParseError> {
    let raw = match cell {
        CellValue::Empty => return Ok(ParsedDuration::zero()),
        CellValue::Text(text) => parse_text(text.trim())?,
        CellValue::Number(n) => parse_number(*n)?,
        CellValue::Integer(i) => parse_number(*i as f64)?,
        CellValue::Time(t) => RawDuration {
            seconds: i64::from(t.hour() * 3600 + t.minute() * 60 + t.second()),
            fraction_present: t.nanosecond() > 0,
        },
    };

    let mut seconds = raw.seconds;
    if raw.fraction_present && seconds >= 0 {
        seconds += 1;
    }
    Ok(ParsedDuration::from_seconds(seconds.max(0) as u64))
}

fn parse_text(text: &str) -> Result<RawDuration, DurationParseError> {
    if let Some(caps) = TIMECODE_WITH_FRAMES.captures(text) {
        let h = capture_int(&caps, 1, text)?;
        let m = capture_int(&caps, 2, text)?;
        let s = capture_int(&caps, 3, text)?;
        let frames = &caps[4];
        return Ok(RawDuration {
            seconds: h * 3600 + m * 60 + s,
            fraction_present: frames.bytes().any(|b| b != b'0'),
        });
    }

    if let Some(caps) = HOURS_MINUTES_SECONDS.captures(text) {
        let h = capture_int(&caps, 1, text)?;
        let m = capture_int(&caps, 2, text)?;
        let (s, fraction_present) = capture_seconds(&caps, 3, text)?;
        return Ok(RawDuration {
            seconds: h * 3600 + m * 60 + s,
            fraction_present,
        });
    }

    if let Some(caps) = MINUTES_SECONDS.captures(text) {
        let m = capture_int(&caps, 1, text)?;
        let (s, fraction_present) = capture_seconds(&caps, 2, text)?;
        return Ok(RawDuration {
            seconds: m * 60 + s,
            fraction_present,
        });
    }

    Err(DurationParseError::Unrecognized(text.to_string()))
}

/// Numeric cells: small values are spreadsheet day fractions, larger values
/// are already seconds.
fn parse_number(n: f64) -> Result<RawDuration, DurationParseError> {
    if !n.is_finite() {
        return Err(DurationParseError::NonFinite(n));
    }
    let seconds_float = if n > DAY_FRACTION_MAX {
        n
    } else {
        n * SECONDS_PER_DAY
    };
    let whole = seconds_float.trunc();
    Ok(RawDuration {
        seconds: whole as i64,
        fraction_present: (seconds_float - whole) > FRACTION_EPSILON,
    })
}

fn capture_int(caps: &Captures, group: usize, text: &str) -> Result<i64, DurationParseError> {
    caps[group]
        .parse()
        .map_err(|_| DurationParseError::InvalidNumber(text.to_string()))
}

/// Seconds that may carry a decimal part: returns the truncated value and
/// whether the decimal part was nonzero.
fn capture_seconds(
    caps: &Captures,
    group: usize,
    text: &str,
) -> Result<(i64, bool), DurationParseError> {
    let value: f64 = caps[group]
        .parse()
        .map_err(|_| DurationParseError::InvalidNumber(text.to_string()))?;
    let whole = value.trunc();
    Ok((whole as i64, value > whole))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use proptest::prelude::*;

    fn secs(cell: impl Into<CellValue>) -> u64 {
        parse_duration(&cell.into()).seconds
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(90), "01:30");
        // Minutes are not wrapped into hours
        assert_eq!(format_duration(3725), "62:05");
        assert_eq!(format_signed_duration(-5), "00:00");
    }

    #[test]
    fn test_timecode_with_frames() {
        assert_eq!(secs("0:03:25;00"), 205);
        assert_eq!(secs("0:03:25;12"), 206);
        assert_eq!(secs("01:00:00:01"), 3601);
        // A decimal after H:MM:SS is read as a frame group
        assert_eq!(secs("0:03:25.5"), 206);
    }

    #[test]
    fn test_hours_minutes_seconds() {
        assert_eq!(secs("0:03:25"), 205);
        assert_eq!(secs("1:02:03"), 3723);
        assert_eq!(parse_duration(&"1:02:03".into()).formatted, "62:03");
    }

    #[test]
    fn test_minutes_seconds() {
        assert_eq!(secs("3:25"), 205);
        assert_eq!(secs("3:25.000"), 205);
        assert_eq!(secs("3:25.1"), 206);
        assert_eq!(secs("125:00"), 7500);
        assert_eq!(secs("  00:30 "), 30);
    }

    #[test]
    fn test_day_fraction_heuristic() {
        // 205 seconds as a fraction of a day
        assert_eq!(secs(205.0 / 86_400.0), 205);
        assert_eq!(secs(0.5), 43_200);
        // Values above 5 are taken as seconds
        assert_eq!(secs(90.0), 90);
        assert_eq!(secs(90.25), 91);
        // The inherited boundary: 5.0 is still a day fraction
        assert_eq!(secs(5.0), 432_000);
    }

    #[test]
    fn test_time_of_day() {
        let t = NaiveTime::from_hms_opt(0, 3, 25).unwrap();
        assert_eq!(secs(t), 205);
        let t = NaiveTime::from_hms_micro_opt(0, 3, 25, 500_000).unwrap();
        assert_eq!(secs(t), 206);
    }

    #[test]
    fn test_integer_follows_numeric_rule() {
        // A bare 4 is four days whether the cell holds an int or a float
        assert_eq!(secs(4_i64), 345_600);
        assert_eq!(secs(4_i64), secs(4.0));
        assert_eq!(secs(5_i64), 432_000);
        assert_eq!(secs(240_i64), 240);
        assert_eq!(secs(0_i64), 0);
    }

    #[test]
    fn test_failures_collapse_to_zero() {
        assert_eq!(parse_duration(&"abc".into()), ParsedDuration::zero());
        assert_eq!(secs("90"), 0);
        assert_eq!(secs(f64::NAN), 0);
        assert_eq!(secs(-100.0), 0);
        assert_eq!(secs(-3_i64), 0);
        assert_eq!(parse_duration(&CellValue::Empty), ParsedDuration::zero());
        assert!(matches!(
            try_parse_duration(&"abc".into()),
            Err(DurationParseError::Unrecognized(_))
        ));
    }

    #[test]
    fn test_parse_formatted() {
        assert_eq!(parse_formatted("01:01"), Some(61));
        assert_eq!(parse_formatted("62:05"), Some(3725));
        assert_eq!(parse_formatted("nope"), None);
    }

    proptest! {
        #[test]
        fn fractional_seconds_round_up_by_one(
            h in 0u64..10,
            m in 0u64..60,
            s in 0u64..60,
            frac in 1u32..1000,
        ) {
            let text = format!("{}:{:02}:{:02}.{:03}", h, m, s, frac);
            let parsed = parse_duration(&CellValue::Text(text));
            prop_assert_eq!(parsed.seconds, h * 3600 + m * 60 + s + 1);
        }

        #[test]
        fn formatted_string_matches_seconds(text in "[0-9]{1,3}:[0-9]{1,2}(\\.[0-9]{1,3})?") {
            let parsed = parse_duration(&CellValue::Text(text));
            prop_assert_eq!(format_duration(parsed.seconds), parsed.formatted);
        }

        #[test]
        fn numeric_cells_never_negative(n in -1.0e7f64..1.0e7) {
            let parsed = parse_duration(&CellValue::Number(n));
            prop_assert_eq!(format_duration(parsed.seconds), parsed.formatted);
            if n <= 0.0 {
                prop_assert_eq!(parsed.seconds, 0);
            }
        }
    }
}
