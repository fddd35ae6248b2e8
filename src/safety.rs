//! Safety checks for report output.
//!
//! Report names become file names, and the output directory must never
//! point at one of the cue sheets being read.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::DEFAULT_REPORT_NAME;

/// Characters not allowed in file names on common filesystems
static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Turn a user-supplied report name into a safe file name stem.
///
/// Empty names fall back to the default; invalid characters become `_`.
pub fn sanitize_report_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        warn!(default = DEFAULT_REPORT_NAME, "empty report name, using default");
        return DEFAULT_REPORT_NAME.to_string();
    }

    let sanitized = INVALID_FILENAME_CHARS.replace_all(trimmed, "_");
    if sanitized != trimmed {
        warn!(original = trimmed, sanitized = %sanitized, "report name contained invalid characters");
    }
    sanitized.into_owned()
}

/// Validates that an output directory is safe to write reports into.
///
/// # Returns
/// * `Ok(())` if the directory does not collide with any input
/// * `Err` with a descriptive message if it is one of the input files
pub fn validate_output_dir(output: &Path, inputs: &[PathBuf]) -> Result<()> {
    if output.is_file() {
        bail!(
            "Safety check failed: output directory '{}' is an existing file",
            output.display()
        );
    }

    let canonical_output = output.canonicalize().ok();
    for input in inputs {
        let same = match (&canonical_output, input.canonicalize().ok()) {
            (Some(out), Some(inp)) => *out == inp,
            _ => output == input.as_path(),
        };
        if same && !input.is_dir() {
            bail!(
                "Safety check failed: output directory '{}' cannot be the same as input '{}'",
                output.display(),
                input.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_sanitize_report_name() {
        assert_eq!(sanitize_report_name("Season 2"), "Season 2");
        assert_eq!(sanitize_report_name("  Q1/Q2: final?  "), "Q1_Q2_ final_");
        assert_eq!(sanitize_report_name("a<b>c\"d|e*f\\g"), "a_b_c_d_e_f_g");
    }

    #[test]
    fn test_empty_name_uses_default() {
        assert_eq!(sanitize_report_name(""), "Cuesheets_Report");
        assert_eq!(sanitize_report_name("   "), "Cuesheets_Report");
    }

    #[test]
    fn test_valid_output_dir() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("EP01.md");
        std::fs::write(&input, "").unwrap();
        // The directory holding the inputs is a fine place for reports
        assert!(validate_output_dir(dir.path(), &[input]).is_ok());
        assert!(validate_output_dir(&dir.path().join("new"), &[]).is_ok());
    }

    #[test]
    fn test_output_equals_input() {
        let file = NamedTempFile::new().unwrap();
        let result = validate_output_dir(file.path(), &[file.path().to_path_buf()]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Safety check failed"));
    }
}
