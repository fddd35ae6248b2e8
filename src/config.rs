//! Report configuration.
//!
//! Every field has a default; a TOML file only needs to name the values it
//! overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Publisher whose share of airtime is called out in every report.
pub const DEFAULT_HIGHLIGHT_PUBLISHER: &str = "RHAPSOLODY MUSIC LB";

/// Default base name for global report files.
pub const DEFAULT_REPORT_NAME: &str = "Cuesheets_Report";

/// Row limits and chart settings used by the report writers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub global_top_tracks: usize,
    pub global_top_composers: usize,
    pub global_top_publishers: usize,
    /// Rows in the detail tables for the leading composer and publisher.
    pub global_detail_tracks: usize,
    pub episode_top_tracks: usize,
    pub episode_top_composers: usize,
    pub episode_top_publishers: usize,
    /// Publishers below this share (percent) are grouped as "Others".
    pub others_threshold_percent: f64,
    pub highlight_publisher: String,
    /// Title cells in plain episode tables are truncated past this width.
    pub title_width: usize,
    pub participant_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            global_top_tracks: 20,
            global_top_composers: 15,
            global_top_publishers: 15,
            global_detail_tracks: 10,
            episode_top_tracks: 10,
            episode_top_composers: 10,
            episode_top_publishers: 10,
            others_threshold_percent: 3.0,
            highlight_publisher: DEFAULT_HIGHLIGHT_PUBLISHER.to_string(),
            title_width: 40,
            participant_width: 35,
        }
    }
}

impl ReportConfig {
    /// Load overrides from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ReportConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "loaded report config");
        Ok(config)
    }

    /// Defaults, or the file at `path` when one is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert_eq!(config.global_top_tracks, 20);
        assert_eq!(config.global_top_composers, 15);
        assert_eq!(config.episode_top_publishers, 10);
        assert_eq!(config.others_threshold_percent, 3.0);
        assert_eq!(config.highlight_publisher, "RHAPSOLODY MUSIC LB");
    }

    #[test]
    fn test_partial_override() {
        let config: ReportConfig = toml::from_str(
            r#"
            global_top_tracks = 5
            highlight_publisher = "Big Label"
            "#,
        )
        .unwrap();
        assert_eq!(config.global_top_tracks, 5);
        assert_eq!(config.highlight_publisher, "Big Label");
        assert_eq!(config.global_top_composers, 15);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "others_threshold_percent = 5.5").unwrap();
        let config = ReportConfig::load(file.path()).unwrap();
        assert_eq!(config.others_threshold_percent, 5.5);
    }

    #[test]
    fn test_load_errors() {
        let missing = ReportConfig::load(Path::new("/nonexistent/report.toml"));
        assert!(missing
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "global_top_tracks = \"many\"").unwrap();
        let bad = ReportConfig::load(file.path());
        assert!(bad.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_load_or_default() {
        assert_eq!(
            ReportConfig::load_or_default(None).unwrap(),
            ReportConfig::default()
        );
    }
}
