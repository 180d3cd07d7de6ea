//! Per-program assessment reports.
//!
//! This module splits the consolidated data by academic program and, for
//! each one, writes nine summary tables as XLSX and two bar charts as PNG,
//! then records what was produced in a JSON index.

pub mod figures;
pub mod pivot;
pub mod program;
pub mod stats;
pub mod tables;
pub mod types;

pub use program::{ReportOptions, generate_reports};
pub use types::{ProgramReport, ReportIndex};
