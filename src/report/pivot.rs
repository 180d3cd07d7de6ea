//! Two-way grouping of numeric values, the shape behind most report tables.

use std::collections::{BTreeMap, BTreeSet};

use super::stats::mean;
use crate::dataset::CellValue;

/// Values grouped by a row key and a column key, both kept sorted.
///
/// Keys are registered even when the value is missing, so a group with no
/// numeric data still gets a row and column (with an empty cell).
#[derive(Debug)]
pub struct Pivot<R: Ord + Clone> {
    rows: BTreeSet<R>,
    cols: BTreeSet<CellValue>,
    cells: BTreeMap<(R, CellValue), Vec<f64>>,
    counts: BTreeMap<(R, CellValue), usize>,
}

impl<R: Ord + Clone> Default for Pivot<R> {
    fn default() -> Self {
        Self {
            rows: BTreeSet::new(),
            cols: BTreeSet::new(),
            cells: BTreeMap::new(),
            counts: BTreeMap::new(),
        }
    }
}

impl<R: Ord + Clone> Pivot<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: R, col: CellValue, value: Option<f64>) {
        self.rows.insert(row.clone());
        self.cols.insert(col.clone());
        *self.counts.entry((row.clone(), col.clone())).or_default() += 1;
        if let Some(v) = value {
            self.cells.entry((row, col)).or_default().push(v);
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &R> {
        self.rows.iter()
    }

    pub fn cols(&self) -> impl Iterator<Item = &CellValue> {
        self.cols.iter()
    }

    /// Numeric values recorded for one cell.
    pub fn values(&self, row: &R, col: &CellValue) -> &[f64] {
        self.cells
            .get(&(row.clone(), col.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rows recorded for one cell, numeric or not.
    pub fn count(&self, row: &R, col: &CellValue) -> usize {
        self.counts
            .get(&(row.clone(), col.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn mean(&self, row: &R, col: &CellValue) -> Option<f64> {
        mean(self.values(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_sorted_and_registered_without_values() {
        let mut p: Pivot<CellValue> = Pivot::new();
        p.add("202320".into(), "B".into(), Some(4.0));
        p.add("202310".into(), "A".into(), None);
        p.add("202310".into(), "B".into(), Some(2.0));
        p.add("202310".into(), "B".into(), Some(3.0));

        let rows: Vec<String> = p.rows().map(|r| r.to_string()).collect();
        assert_eq!(rows, vec!["202310", "202320"]);
        let cols: Vec<String> = p.cols().map(|c| c.to_string()).collect();
        assert_eq!(cols, vec!["A", "B"]);

        assert_eq!(p.mean(&"202310".into(), &"A".into()), None);
        assert_eq!(p.count(&"202310".into(), &"A".into()), 1);
        assert_eq!(p.mean(&"202310".into(), &"B".into()), Some(2.5));
        assert_eq!(p.count(&"202320".into(), &"A".into()), 0);
    }
}
