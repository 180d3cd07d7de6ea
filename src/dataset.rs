//! In-memory tabular data loaded from spreadsheets.
//!
//! [`CellValue`] is a dynamically typed cell and [`Table`] a header plus
//! row-major cells. Cells are totally ordered and hashable so they can key
//! `BTreeMap`s when grouping.

use chrono::{NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl CellValue {
    /// True for missing data: empty cells, blank text and NaN.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Numeric text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) if !f.is_nan() => Some(*f),
            CellValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Normalized text used to compare identifiers across workbooks.
    ///
    /// `201912345.0` and `201912345` produce the same key.
    pub fn key(&self) -> String {
        match self {
            CellValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            CellValue::Text(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Empty => 0,
            CellValue::Bool(_) => 1,
            CellValue::Int(_) => 2,
            CellValue::Float(_) => 3,
            CellValue::Text(_) => 4,
            CellValue::Date(_) => 5,
        }
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Empty, Empty) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Empty => {}
            CellValue::Bool(b) => b.hash(state),
            CellValue::Int(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Text(s) => s.hash(state),
            CellValue::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Date(d) => {
                if d.time().num_seconds_from_midnight() == 0 {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// A header row plus data rows, every row as wide as the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column with exactly this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterates the cells of one column.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &CellValue> {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// Projection onto the given column positions, in that order.
    pub fn select(&self, idxs: &[usize]) -> Table {
        Table {
            columns: idxs.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| idxs.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        }
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[CellValue]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Removes a column by name; a missing column leaves the table unchanged.
    pub fn drop_column(&self, name: &str) -> Table {
        match self.column_index(name) {
            Some(idx) => {
                let keep: Vec<usize> = (0..self.columns.len()).filter(|&i| i != idx).collect();
                self.select(&keep)
            }
            None => self.clone(),
        }
    }

    /// Appends a column whose cells come from `values`, one per row.
    pub fn push_column(&mut self, name: &str, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Drops repeated rows, keeping the first occurrence of each.
    pub fn distinct(&self) -> Table {
        let mut seen = HashSet::new();
        self.filter_rows(|r| seen.insert(r.to_vec()))
    }

    /// Drops rows with an empty cell in any of the given columns.
    pub fn drop_empty(&self, idxs: &[usize]) -> Table {
        self.filter_rows(|r| idxs.iter().all(|&i| !r[i].is_empty()))
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Table {
        let mut t = Table::new(vec!["a".into(), "b".into()]);
        t.push_row(vec![CellValue::Int(1), "x".into()]);
        t.push_row(vec![CellValue::Int(1), "x".into()]);
        t.push_row(vec![CellValue::Int(2), CellValue::Empty]);
        t
    }

    #[test]
    fn test_key_normalizes_integral_floats() {
        assert_eq!(CellValue::Float(201912345.0).key(), "201912345");
        assert_eq!(CellValue::Int(201912345).key(), "201912345");
        assert_eq!(CellValue::Text(" 201912345 ".into()).key(), "201912345");
        assert_eq!(CellValue::Float(2.5).key(), "2.5");
    }

    #[test]
    fn test_empty_semantics() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text("   ".into()).is_empty());
        assert!(CellValue::Float(f64::NAN).is_empty());
        assert!(!CellValue::Int(0).is_empty());
    }

    #[test]
    fn test_ordering_across_types() {
        let mut cells = vec![
            CellValue::Text("b".into()),
            CellValue::Int(3),
            CellValue::Empty,
            CellValue::Int(1),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                CellValue::Empty,
                CellValue::Int(1),
                CellValue::Int(3),
                CellValue::Text("b".into())
            ]
        );
    }

    #[test]
    fn test_date_display() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(CellValue::Date(d).to_string(), "2024-02-01");
    }

    #[test]
    fn test_as_f64_parses_text() {
        assert_eq!(CellValue::Text("3,5".into()).as_f64(), Some(3.5));
        assert_eq!(CellValue::Text("n/a".into()).as_f64(), None);
    }

    #[test]
    fn test_distinct_keeps_first() {
        let t = sample().distinct();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[1][0], CellValue::Int(2));
    }

    #[test]
    fn test_drop_empty() {
        let t = sample().drop_empty(&[1]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_drop_and_push_column() {
        let mut t = sample().drop_column("a");
        assert_eq!(t.columns, vec!["b".to_string()]);
        t.push_column("c", vec![CellValue::Int(7); 3]);
        assert_eq!(t.columns.len(), 2);
        assert_eq!(t.rows[2][1], CellValue::Int(7));
    }

    #[test]
    fn test_push_row_pads() {
        let mut t = Table::new(vec!["a".into(), "b".into(), "c".into()]);
        t.push_row(vec![CellValue::Int(1)]);
        assert_eq!(t.rows[0].len(), 3);
    }
}
