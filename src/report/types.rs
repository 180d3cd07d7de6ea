//! Data types describing what a report run produced.

use chrono::{DateTime, Local};
use serde::Serialize;

/// A table or figure that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactFailure {
    pub file: String,
    pub error: String,
}

/// Outcome for a single program folder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgramReport {
    pub program: String,
    pub folder: String,
    pub rows: usize,
    /// Rows removed by student validation.
    pub removed_rows: usize,
    pub tables: Vec<String>,
    pub figures: Vec<String>,
    /// Tables written from the first rows because required columns were missing.
    pub fallbacks: Vec<String>,
    pub failures: Vec<ArtifactFailure>,
    /// Set when the program had no rows left and nothing was written.
    pub skipped: bool,
}

impl ProgramReport {
    pub fn new(program: &str, folder: &str) -> Self {
        Self {
            program: program.to_string(),
            folder: folder.to_string(),
            ..Default::default()
        }
    }
}

/// Top-level index of a report run, written as `index.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportIndex {
    pub generated_at: DateTime<Local>,
    pub source: String,
    pub programs: Vec<ProgramReport>,
}

impl ReportIndex {
    pub fn failure_count(&self) -> usize {
        self.programs.iter().map(|p| p.failures.len()).sum()
    }
}
