//! Spreadsheet loading into [`Table`]s.
//!
//! Workbooks are read with `calamine` (first worksheet, header in the first
//! row); CSV files with the `csv` crate.

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::dataset::{CellValue, Table};

/// Loads the first worksheet of an `.xlsx`/`.xls`/`.ods` workbook.
///
/// # Errors
///
/// Fails when the file is missing, cannot be parsed or has no worksheet.
pub fn load_workbook(path: &Path) -> Result<Table> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("opening {}", path.display()))?;

    let sheet_names = workbook.sheet_names();
    let Some(first) = sheet_names.first() else {
        bail!("No worksheets in {}", path.display());
    };

    let range = workbook
        .worksheet_range(first)
        .with_context(|| format!("reading sheet '{first}' of {}", path.display()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };

    let mut table = Table::new(header_names(header.iter().map(data_to_string)));
    for row in rows {
        table.push_row(row.iter().map(data_to_cell).collect());
    }

    // Formatting can extend the used range past the last real record.
    while table
        .rows
        .last()
        .is_some_and(|r| r.iter().all(CellValue::is_empty))
    {
        table.rows.pop();
    }

    debug!(
        path = %path.display(),
        sheet = %first,
        rows = table.len(),
        columns = table.columns.len(),
        "Workbook loaded"
    );
    Ok(table)
}

/// Loads a CSV file with a header row, guessing each cell's type.
pub fn load_csv(path: &Path) -> Result<Table> {
    read_csv(path, guess_cell)
}

/// Loads a CSV file keeping every non-empty cell as text.
///
/// Identifiers such as `0123` keep their leading zeros.
pub fn load_csv_text(path: &Path) -> Result<Table> {
    read_csv(path, text_cell)
}

fn read_csv(path: &Path, cell: fn(&str) -> CellValue) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;

    let headers = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut table = Table::new(header_names(headers.into_iter()));
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        table.push_row(record.iter().map(cell).collect());
    }

    Ok(table)
}

/// Blank headers become `Unnamed: <i>`, repeats get `.1`, `.2`, ... suffixes.
fn header_names(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.enumerate()
        .map(|(i, name)| {
            let name = name.trim().to_string();
            let name = if name.is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let count = seen.entry(name.clone()).or_insert(0);
            let out = if *count == 0 {
                name
            } else {
                format!("{name}.{count}")
            };
            *count += 1;
            out
        })
        .collect()
}

fn data_to_string(d: &Data) -> String {
    data_to_cell(d).to_string()
}

fn data_to_cell(d: &Data) -> CellValue {
    match d {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => CellValue::Date(ndt),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

fn text_cell(s: &str) -> CellValue {
    if s.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(s.to_string())
    }
}

fn guess_cell(s: &str) -> CellValue {
    if s.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::Text(s.to_string())
}
