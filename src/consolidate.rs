//! Consolidation of the raw assessment workbook with the admissions list.
//!
//! Every assessment row of `base.xlsx` is kept and tagged with the real
//! entry cohort of its student, taken from the class start date recorded in
//! `admitidos.xlsx`. Rows without a cohort or a score are then dropped and a
//! student/program map is derived for the report step.

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use crate::columns;
use crate::dataset::{CellValue, Table};
use crate::layout::DataLayout;
use crate::output::{SheetStyle, write_csv, write_table};
use crate::reader::load_workbook;

pub const STUDENT_CODE_COLUMN: &str = "Código del estudiante";
pub const ADMISSION_CODE_COLUMN: &str = "CODIGO";
pub const START_DATE_COLUMN: &str = "Fecha inicio de clases";
pub const COHORT_COLUMN: &str = "Cohorte Real";
pub const SCORE_COLUMN: &str = "Puntaje criterio";

pub const MAP_STUDENT_COLUMN: &str = "código del estudiante";
pub const MAP_PROGRAM_COLUMN: &str = "programa";

/// Row counts of one consolidation run.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ConsolidationSummary {
    pub base_rows: usize,
    pub admitted_rows: usize,
    pub merged_rows: usize,
    pub without_cohort: usize,
    pub consolidated_rows: usize,
    pub mapped_students: usize,
}

/// Reads the raw workbooks and writes the consolidated workbook and the
/// student/program map.
#[tracing::instrument(skip_all, fields(root = %layout.root.display()))]
pub fn generate_consolidated_file(layout: &DataLayout) -> Result<ConsolidationSummary> {
    let (base, admitidos) = load_inputs(layout)?;

    let merged = merge_admissions(&base, &admitidos)?;
    let cohort_idx = locate(&merged, COHORT_COLUMN)?;
    let without_cohort = merged
        .column(cohort_idx)
        .filter(|c| c.is_empty())
        .count();
    if without_cohort > 0 {
        warn!(without_cohort, "Assessment rows without an admission cohort");
    }

    let consolidated = clean(&merged)?;
    let map = student_program_map(&consolidated)?;

    layout.ensure_dirs()?;
    write_table(
        &layout.consolidated_file(),
        "Sheet1",
        &consolidated,
        &SheetStyle::default(),
    )?;
    write_csv(&layout.student_map_file(), &map)?;

    let summary = ConsolidationSummary {
        base_rows: base.len(),
        admitted_rows: admitidos.len(),
        merged_rows: merged.len(),
        without_cohort,
        consolidated_rows: consolidated.len(),
        mapped_students: map.len(),
    };
    info!(
        base_rows = summary.base_rows,
        merged_rows = summary.merged_rows,
        consolidated_rows = summary.consolidated_rows,
        mapped_students = summary.mapped_students,
        path = %layout.consolidated_file().display(),
        "Consolidated file generated"
    );
    Ok(summary)
}

/// Loads `base.xlsx` and `admitidos.xlsx`.
pub fn load_inputs(layout: &DataLayout) -> Result<(Table, Table)> {
    info!("Loading raw workbooks");
    let base = load_workbook(&layout.base_file()).context("loading assessment base")?;
    let admitidos = load_workbook(&layout.admitidos_file()).context("loading admissions")?;
    Ok((base, admitidos))
}

/// Left join of `base` with the admission start dates, appending
/// [`COHORT_COLUMN`].
///
/// A student with several admission records yields one row per record;
/// unmatched rows keep an empty cohort.
pub fn merge_admissions(base: &Table, admitidos: &Table) -> Result<Table> {
    let code_idx = locate(base, STUDENT_CODE_COLUMN).context("in the assessment base")?;
    let adm_code_idx = locate(admitidos, ADMISSION_CODE_COLUMN).context("in the admissions")?;
    let date_idx = locate(admitidos, START_DATE_COLUMN).context("in the admissions")?;

    let mut starts: HashMap<String, Vec<&CellValue>> = HashMap::new();
    for row in &admitidos.rows {
        let key = row[adm_code_idx].key();
        if key.is_empty() {
            continue;
        }
        starts.entry(key).or_default().push(&row[date_idx]);
    }

    let mut columns = base.columns.clone();
    columns.push(COHORT_COLUMN.to_string());
    let mut merged = Table::new(columns);

    for row in &base.rows {
        let key = row[code_idx].key();
        match starts.get(&key).filter(|_| !key.is_empty()) {
            Some(dates) => {
                for date in dates {
                    let mut out = row.clone();
                    out.push(cohort_label(date).into());
                    merged.push_row(out);
                }
            }
            None => {
                let mut out = row.clone();
                out.push(CellValue::Empty);
                merged.push_row(out);
            }
        }
    }

    Ok(merged)
}

/// Cohort label of a class start date: `<year>10` for the first half of the
/// year, `<year>20` for the second. Values that are not dates yield `None`.
pub fn cohort_label(cell: &CellValue) -> Option<String> {
    let date = coerce_date(cell)?;
    let half = if date.month() <= 6 { "10" } else { "20" };
    Some(format!("{}{}", date.year(), half))
}

fn coerce_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(d.date()),
        CellValue::Int(_) | CellValue::Float(_) => {
            let serial = cell.as_f64()?;
            // Excel day serials, 1900-01-01 ..= 9999-12-31
            if !(1.0..=2_958_465.0).contains(&serial) {
                return None;
            }
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_days(chrono::Days::new(serial.trunc() as u64))
        }
        CellValue::Text(s) => parse_date_text(s.trim()),
        _ => None,
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|d| d.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

/// Drops duplicate rows, then rows lacking a cohort or a criterion score.
pub fn clean(table: &Table) -> Result<Table> {
    let cohort_idx = locate(table, COHORT_COLUMN)?;
    let score_idx = locate(table, SCORE_COLUMN)?;
    Ok(table.distinct().drop_empty(&[cohort_idx, score_idx]))
}

/// Distinct (student code, program) pairs, sorted.
pub fn student_program_map(table: &Table) -> Result<Table> {
    let Some(student_idx) = columns::student(&table.columns) else {
        bail!("No student code column in the consolidated data");
    };
    let Some(program_idx) = columns::program(&table.columns) else {
        bail!("No program column in the consolidated data");
    };

    let pairs: BTreeSet<(String, String)> = table
        .rows
        .iter()
        .map(|r| (r[student_idx].key(), r[program_idx].to_string().trim().to_string()))
        .filter(|(code, program)| !code.is_empty() && !program.is_empty())
        .collect();

    let mut map = Table::new(vec![
        MAP_STUDENT_COLUMN.to_string(),
        MAP_PROGRAM_COLUMN.to_string(),
    ]);
    for (code, program) in pairs {
        map.push_row(vec![code.into(), program.into()]);
    }
    Ok(map)
}

/// Exact header match first, then a trimmed case-insensitive one.
fn locate(table: &Table, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .or_else(|| {
            let wanted = name.to_lowercase();
            table
                .columns
                .iter()
                .position(|c| c.trim().to_lowercase() == wanted)
        })
        .with_context(|| format!("Column '{name}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn base() -> Table {
        let mut t = Table::new(vec![
            STUDENT_CODE_COLUMN.into(),
            "programa".into(),
            SCORE_COLUMN.into(),
        ]);
        t.push_row(vec![CellValue::Float(1.0), "ADM".into(), CellValue::Float(4.0)]);
        t.push_row(vec![CellValue::Float(1.0), "ADM".into(), CellValue::Float(4.0)]);
        t.push_row(vec![CellValue::Float(2.0), "ECO".into(), CellValue::Empty]);
        t.push_row(vec![CellValue::Float(3.0), "ECO".into(), CellValue::Float(3.0)]);
        t
    }

    fn admitidos() -> Table {
        let mut t = Table::new(vec![ADMISSION_CODE_COLUMN.into(), START_DATE_COLUMN.into()]);
        t.push_row(vec![CellValue::Int(1), date(2022, 2, 1)]);
        t.push_row(vec![CellValue::Int(2), date(2022, 8, 1)]);
        t
    }

    #[test]
    fn test_cohort_label_halves() {
        assert_eq!(cohort_label(&date(2023, 3, 15)).as_deref(), Some("202310"));
        assert_eq!(cohort_label(&date(2023, 6, 30)).as_deref(), Some("202310"));
        assert_eq!(cohort_label(&date(2023, 7, 1)).as_deref(), Some("202320"));
    }

    #[test]
    fn test_cohort_label_coerces_text_and_serials() {
        assert_eq!(cohort_label(&"2021-08-09".into()).as_deref(), Some("202120"));
        assert_eq!(cohort_label(&"15/01/2020".into()).as_deref(), Some("202010"));
        // 45000 is 2023-03-15
        assert_eq!(cohort_label(&CellValue::Float(45000.0)).as_deref(), Some("202310"));
        assert_eq!(cohort_label(&"sin fecha".into()), None);
        assert_eq!(cohort_label(&CellValue::Empty), None);
    }

    #[test]
    fn test_merge_keeps_every_base_row() {
        let merged = merge_admissions(&base(), &admitidos()).unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.columns.last().unwrap(), COHORT_COLUMN);
        assert_eq!(merged.rows[0][3], CellValue::Text("202210".into()));
        assert_eq!(merged.rows[2][3], CellValue::Text("202220".into()));
        assert!(merged.rows[3][3].is_empty());
    }

    #[test]
    fn test_merge_duplicates_on_repeated_admission() {
        let mut adm = admitidos();
        adm.push_row(vec![CellValue::Int(3), date(2019, 1, 20)]);
        adm.push_row(vec![CellValue::Int(3), date(2020, 9, 1)]);

        let merged = merge_admissions(&base(), &adm).unwrap();
        assert_eq!(merged.len(), 5);
        let cohorts: Vec<String> = merged.rows[3..].iter().map(|r| r[3].to_string()).collect();
        assert_eq!(cohorts, vec!["201910", "202020"]);
    }

    #[test]
    fn test_merge_requires_key_columns() {
        let mut adm = Table::new(vec!["ID".into(), START_DATE_COLUMN.into()]);
        adm.push_row(vec![CellValue::Int(1), date(2022, 2, 1)]);
        let err = merge_admissions(&base(), &adm).unwrap_err();
        assert!(format!("{err:#}").contains("CODIGO"));
    }

    #[test]
    fn test_clean_drops_duplicates_and_incomplete_rows() {
        let merged = merge_admissions(&base(), &admitidos()).unwrap();
        let cleaned = clean(&merged).unwrap();
        // duplicate of student 1 removed, student 2 has no score, student 3 no cohort
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.len() <= merged.len());
        assert_eq!(cleaned.rows[0][0].key(), "1");
    }

    #[test]
    fn test_student_program_map_is_sorted_and_distinct() {
        let map = student_program_map(&base()).unwrap();
        assert_eq!(map.columns, vec![MAP_STUDENT_COLUMN, MAP_PROGRAM_COLUMN]);
        let pairs: Vec<(String, String)> = map
            .rows
            .iter()
            .map(|r| (r[0].to_string(), r[1].to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("1".to_string(), "ADM".to_string()),
                ("2".to_string(), "ECO".to_string()),
                ("3".to_string(), "ECO".to_string()),
            ]
        );
    }

    #[test]
    fn test_locate_is_case_insensitive() {
        let t = Table::new(vec!["  cohorte real ".into()]);
        assert_eq!(locate(&t, COHORT_COLUMN).unwrap(), 0);
        assert!(locate(&t, SCORE_COLUMN).is_err());
    }
}
