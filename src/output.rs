//! Persistence of tables and report metadata.
//!
//! Supports XLSX worksheets (flat or with a two-level header), CSV files and
//! pretty-printed JSON.

use anyhow::{Context, Result};
use rust_xlsxwriter::{ConditionalFormat3ColorScale, Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::dataset::{CellValue, Table};

/// Presentation options for a written worksheet.
#[derive(Debug, Clone, Default)]
pub struct SheetStyle {
    /// Number format for float cells, e.g. `"0.00"`.
    pub number_format: Option<&'static str>,
    /// Leading label columns, written bold and excluded from the color scale.
    pub label_columns: usize,
    /// Red-yellow-green scale over the value block.
    pub color_scale: bool,
    /// Wrap long text cells.
    pub wrap_text: bool,
}

/// A header group spanning several value columns (e.g. `μ` and `σ` of one objective).
#[derive(Debug, Clone)]
pub struct HeaderGroup {
    pub title: String,
    pub columns: Vec<String>,
}

/// A table whose value columns sit under merged group headers.
#[derive(Debug, Clone)]
pub struct GroupedTable {
    pub label_header: String,
    pub groups: Vec<HeaderGroup>,
    /// Row label followed by one cell per value column.
    pub rows: Vec<(CellValue, Vec<CellValue>)>,
}

struct Formats {
    header: Format,
    label: Format,
    number: Format,
    date: Format,
    text: Format,
}

impl Formats {
    fn new(style: &SheetStyle) -> Self {
        let mut number = Format::new();
        if let Some(fmt) = style.number_format {
            number = number.set_num_format(fmt);
        }
        let mut text = Format::new();
        if style.wrap_text {
            text = text.set_text_wrap();
        }
        Self {
            header: Format::new().set_bold(),
            label: Format::new().set_bold(),
            number,
            date: Format::new().set_num_format("yyyy-mm-dd"),
            text,
        }
    }
}

/// Writes `table` as the only worksheet of a new workbook at `path`.
pub fn write_table(path: &Path, sheet: &str, table: &Table, style: &SheetStyle) -> Result<()> {
    debug!(path = %path.display(), sheet, rows = table.len(), "Writing worksheet");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    fill_flat(worksheet, sheet, table, style)
        .with_context(|| format!("building sheet '{sheet}'"))?;

    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    Ok(())
}

fn fill_flat(
    ws: &mut Worksheet,
    sheet: &str,
    table: &Table,
    style: &SheetStyle,
) -> Result<(), XlsxError> {
    ws.set_name(sheet)?;
    let formats = Formats::new(style);

    for (c, name) in table.columns.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, name, &formats.header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            let label = c < style.label_columns;
            write_cell(ws, r, c as u16, cell, &formats, label)?;
        }
    }

    if style.color_scale && !table.is_empty() && table.columns.len() > style.label_columns {
        let scale = ConditionalFormat3ColorScale::new();
        ws.add_conditional_format(
            1,
            style.label_columns as u16,
            table.len() as u32,
            (table.columns.len() - 1) as u16,
            &scale,
        )?;
    }

    ws.autofit();
    Ok(())
}

/// Writes a [`GroupedTable`]: merged group titles on the first row, value
/// column names on the second, data from the third.
pub fn write_grouped_table(
    path: &Path,
    sheet: &str,
    table: &GroupedTable,
    style: &SheetStyle,
) -> Result<()> {
    debug!(path = %path.display(), sheet, rows = table.rows.len(), "Writing grouped worksheet");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    fill_grouped(worksheet, sheet, table, style)
        .with_context(|| format!("building sheet '{sheet}'"))?;

    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    Ok(())
}

fn fill_grouped(
    ws: &mut Worksheet,
    sheet: &str,
    table: &GroupedTable,
    style: &SheetStyle,
) -> Result<(), XlsxError> {
    ws.set_name(sheet)?;
    let formats = Formats::new(style);

    ws.merge_range(0, 0, 1, 0, &table.label_header, &formats.header)?;

    let mut col: u16 = 1;
    for group in &table.groups {
        let width = group.columns.len() as u16;
        if width > 1 {
            ws.merge_range(0, col, 0, col + width - 1, &group.title, &formats.header)?;
        } else if width == 1 {
            ws.write_string_with_format(0, col, &group.title, &formats.header)?;
        }
        for (i, name) in group.columns.iter().enumerate() {
            ws.write_string_with_format(1, col + i as u16, name, &formats.header)?;
        }
        col += width;
    }

    for (r, (label, values)) in table.rows.iter().enumerate() {
        let r = r as u32 + 2;
        write_cell(ws, r, 0, label, &formats, true)?;
        for (c, cell) in values.iter().enumerate() {
            write_cell(ws, r, c as u16 + 1, cell, &formats, false)?;
        }
    }

    ws.autofit();
    Ok(())
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    formats: &Formats,
    label: bool,
) -> Result<(), XlsxError> {
    match cell {
        CellValue::Empty => {}
        CellValue::Float(f) if f.is_nan() => {}
        CellValue::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        CellValue::Int(i) => {
            ws.write_number(row, col, *i as f64)?;
        }
        CellValue::Float(f) => {
            ws.write_number_with_format(row, col, *f, &formats.number)?;
        }
        CellValue::Text(s) => {
            let fmt = if label { &formats.label } else { &formats.text };
            ws.write_string_with_format(row, col, s, fmt)?;
        }
        CellValue::Date(d) => {
            ws.write_datetime_with_format(row, col, d, &formats.date)?;
        }
    }
    Ok(())
}

/// Writes `table` as CSV with a header row.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    debug!(path = %path.display(), rows = table.len(), "Writing CSV");

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;

    Ok(())
}

/// Serializes `value` as pretty-printed JSON into `path`.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{load_csv, load_workbook};
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn sample() -> Table {
        let mut t = Table::new(vec!["Periodo".into(), "Promedio".into()]);
        t.push_row(vec!["202310".into(), CellValue::Float(3.25)]);
        t.push_row(vec!["202320".into(), CellValue::Empty]);
        t
    }

    #[test]
    fn test_write_table_round_trips_through_reader() {
        let path = temp_path("aol_reports_test_table.xlsx");
        let _ = fs::remove_file(&path);

        let style = SheetStyle {
            number_format: Some("0.00"),
            label_columns: 1,
            color_scale: true,
            ..Default::default()
        };
        write_table(&path, "Tabla 6", &sample(), &style).unwrap();

        let back = load_workbook(&path).unwrap();
        assert_eq!(back.columns, vec!["Periodo", "Promedio"]);
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows[0][1].as_f64(), Some(3.25));
        assert!(back.rows[1][1].is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_grouped_table_layout() {
        let path = temp_path("aol_reports_test_grouped.xlsx");
        let _ = fs::remove_file(&path);

        let table = GroupedTable {
            label_header: "Cohorte Real".into(),
            groups: vec![HeaderGroup {
                title: "Obj 1".into(),
                columns: vec!["μ".into(), "σ".into()],
            }],
            rows: vec![(
                "202310".into(),
                vec![CellValue::Float(3.5), CellValue::Float(0.71)],
            )],
        };
        write_grouped_table(&path, "Tabla 9", &table, &SheetStyle::default()).unwrap();

        // The reader treats the group row as the header.
        let back = load_workbook(&path).unwrap();
        assert_eq!(back.columns[1], "Obj 1");
        assert_eq!(back.rows[0][1], CellValue::Text("μ".into()));
        assert_eq!(back.rows[1][2].as_f64(), Some(0.71));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_csv_header_and_rows() {
        let path = temp_path("aol_reports_test_map.csv");
        let _ = fs::remove_file(&path);

        write_csv(&path, &sample()).unwrap();
        let back = load_csv(&path).unwrap();
        assert_eq!(back.columns, vec!["Periodo", "Promedio"]);
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows[0][0], CellValue::Int(202310));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json_is_pretty() {
        let path = temp_path("aol_reports_test_index.json");
        let _ = fs::remove_file(&path);

        write_json(&path, &serde_json::json!({ "programs": [] })).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n"));
        assert!(content.contains("\"programs\""));

        fs::remove_file(&path).unwrap();
    }
}
