//! Music-usage statistics for broadcast cue sheets.
//!
//! Cue sheets (Markdown tables, Excel workbooks or their CSV exports) are normalized into
//! track-usage records, aggregated per episode and globally, and rendered as
//! Markdown reports plus a JSON export.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod safety;
pub mod time;
pub mod views;
