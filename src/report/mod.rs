//! Finding reporters.
//!
//! - [`terminal`]: streamed findings, summary table and the closing count line.
//! - [`file`]: sorted, diffable `--output-file` in text or JSON.

pub mod file;
pub mod terminal;

/// Format of the `--output-file` report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One tab-separated line per finding
    #[default]
    Text,
    /// Pretty-printed JSON array
    Json,
}
