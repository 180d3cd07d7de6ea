//! Per-program report generation.
//!
//! The consolidated workbook is loaded once and shared between blocking
//! workers, one per program, throttled by a semaphore.

use anyhow::{Context, Result, bail};
use chrono::Local;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, warn};

use super::figures::FIGURES;
use super::tables::TABLES;
use super::types::{ArtifactFailure, ProgramReport, ReportIndex};
use crate::columns;
use crate::dataset::{CellValue, Table};
use crate::layout::DataLayout;
use crate::output::write_json;
use crate::reader::{load_csv_text, load_workbook};

/// Knobs of a report run.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Programs processed at the same time.
    pub concurrency: usize,
    /// Drop rows whose student is not mapped to the program being reported.
    pub validate_students: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            validate_students: false,
        }
    }
}

/// Student codes mapped to their program, as (code key, program) pairs.
pub type StudentMap = HashSet<(String, String)>;

/// Generates every program's tables and figures and writes `index.json`.
#[tracing::instrument(skip_all, fields(root = %layout.root.display(), concurrency = options.concurrency))]
pub async fn generate_reports(layout: &DataLayout, options: &ReportOptions) -> Result<ReportIndex> {
    let source = layout.consolidated_file();
    let map_path = layout.student_map_file();
    if !map_path.exists() {
        bail!(
            "Student map not found at {}. Run `consolidate` first.",
            map_path.display()
        );
    }

    let data = load_workbook(&source).context("loading consolidated data")?;
    let map = load_student_map(&map_path)?;
    info!(rows = data.len(), mapped = map.len(), "Consolidated data loaded");

    let Some(program_idx) = columns::program(&data.columns) else {
        bail!("No program column in {}", source.display());
    };
    let programs = programs(&data, program_idx);
    let folders = unique_folder_names(&programs);
    info!(programs = programs.len(), "Generating program reports");

    layout.ensure_dirs()?;

    let data = Arc::new(data);
    let map = Arc::new(map);
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = Vec::with_capacity(programs.len());

    for (program, folder) in programs.into_iter().zip(folders) {
        let sem = semaphore.clone();
        let data = data.clone();
        let map = map.clone();
        let reports_dir = layout.reports_dir.clone();
        let validate = options.validate_students;

        let span = tracing::info_span!("program", program = %program);
        let worker_span = span.clone();

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                tokio::task::spawn_blocking(move || {
                    let _entered = worker_span.enter();
                    generate_program(
                        &data,
                        program_idx,
                        &map,
                        &program,
                        &folder,
                        &reports_dir,
                        validate,
                    )
                })
                .await?
            }
            .instrument(span),
        );
        tasks.push(task);
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => error!(error = %e, "Program report failed"),
            Err(e) => error!(error = %e, "Program task panicked"),
        }
    }

    let index = ReportIndex {
        generated_at: Local::now(),
        source: source.display().to_string(),
        programs: reports,
    };
    write_json(&layout.report_index_file(), &index)?;
    info!(
        programs = index.programs.len(),
        failures = index.failure_count(),
        path = %layout.report_index_file().display(),
        "Report index written"
    );

    Ok(index)
}

fn load_student_map(path: &Path) -> Result<StudentMap> {
    let table = load_csv_text(path).context("loading student map")?;
    let (Some(student_idx), Some(program_idx)) = (
        columns::student(&table.columns),
        columns::program(&table.columns),
    ) else {
        bail!("Student map {} lacks code or program columns", path.display());
    };

    Ok(table
        .rows
        .iter()
        .map(|r| (r[student_idx].key(), program_name(&r[program_idx])))
        .collect())
}

fn program_name(cell: &CellValue) -> String {
    cell.to_string().trim().to_string()
}

/// Sorted distinct non-empty program names.
pub fn programs(data: &Table, program_idx: usize) -> Vec<String> {
    data.column(program_idx)
        .map(program_name)
        .filter(|p| !p.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keeps the rows whose student is mapped to `program`.
///
/// Returns the filtered rows and how many were removed. Data without a
/// student column is returned unchanged.
pub fn check_students(df: &Table, map: &StudentMap, program: &str) -> (Table, usize) {
    let Some(student_idx) = columns::student(&df.columns) else {
        warn!("No student column, skipping student validation");
        return (df.clone(), 0);
    };

    let kept = df.filter_rows(|r| map.contains(&(r[student_idx].key(), program.to_string())));
    let removed = df.len() - kept.len();
    if removed > 0 {
        warn!(removed, "Rows removed, students not mapped to program");
    } else {
        info!("All students belong to the program");
    }
    (kept, removed)
}

/// Replaces path separators and characters not allowed in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Sanitized folder name per program, in the same order.
///
/// Programs whose names sanitize to the same folder get `_2`, `_3`, ...
/// suffixes so no two workers write into the same directory.
pub fn unique_folder_names(programs: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    programs
        .iter()
        .map(|program| {
            let base = sanitize_file_name(program);
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.to_lowercase()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            if n > 1 {
                warn!(program = %program, folder = %name, "Folder name already in use, adding suffix");
            }
            name
        })
        .collect()
}

/// Creates `<reports_dir>/<program>/` and returns it.
pub fn program_folder(reports_dir: &Path, program: &str) -> Result<PathBuf> {
    let folder = reports_dir.join(sanitize_file_name(program));
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("creating program folder {}", folder.display()))?;
    Ok(folder)
}

/// Writes the tables and figures of one program.
///
/// Artifacts are independent: a failing one is logged and recorded in the
/// returned report, and the rest are still produced.
pub fn generate_program(
    data: &Table,
    program_idx: usize,
    map: &StudentMap,
    program: &str,
    folder_name: &str,
    reports_dir: &Path,
    validate_students: bool,
) -> Result<ProgramReport> {
    let name = sanitize_file_name(folder_name);
    let mut report = ProgramReport::new(program, &name);

    let rows = data.filter_rows(|r| program_name(&r[program_idx]) == program);
    let rows = if validate_students {
        let (kept, removed) = check_students(&rows, map, program);
        report.removed_rows = removed;
        kept
    } else {
        rows
    };

    if rows.is_empty() {
        warn!("No rows for program, skipping");
        report.skipped = true;
        return Ok(report);
    }
    report.rows = rows.len();

    let df = rows.drop_column(&data.columns[program_idx]);
    let folder = program_folder(reports_dir, &name)?;

    for (n, build) in TABLES {
        let file = format!("{name}_tabla_{n}.xlsx");
        let sheet = build(&df);
        if let Some(missing) = sheet.missing_columns() {
            warn!(table = n, ?missing, "Required columns missing, writing first rows instead");
            report.fallbacks.push(file.clone());
        }
        match sheet.write(&folder.join(&file)) {
            Ok(()) => {
                debug!(file = %file, "Table written");
                report.tables.push(file);
            }
            Err(e) => {
                error!(table = n, error = %e, "Failed to write table");
                report.failures.push(ArtifactFailure {
                    file,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    for (n, build) in FIGURES {
        let file = format!("{name}_figura_{n}.png");
        let figure = build(&df);
        if figure.is_placeholder() {
            warn!(figure = n, "Required columns missing, drawing placeholder");
        }
        match figure.render(&folder.join(&file)) {
            Ok(()) => {
                debug!(file = %file, "Figure written");
                report.figures.push(file);
            }
            Err(e) => {
                error!(figure = n, error = %e, "Failed to render figure");
                report.failures.push(ArtifactFailure {
                    file,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    info!(
        rows = report.rows,
        tables = report.tables.len(),
        figures = report.figures.len(),
        failures = report.failures.len(),
        folder = %folder.display(),
        "Program report generated"
    );
    Ok(report)
}
