//! Summary tables of a program's assessment data.
//!
//! Each builder computes one sheet from the program rows (program column
//! already removed). When a builder cannot find the columns it needs it
//! returns [`TableSheet::Fallback`] carrying the first rows of the data.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::pivot::Pivot;
use super::stats::{mean, round2, sample_stddev};
use crate::columns;
use crate::dataset::{CellValue, Table};
use crate::output::{GroupedTable, HeaderGroup, SheetStyle, write_grouped_table, write_table};

/// Rows copied into a fallback sheet.
pub const FALLBACK_ROWS: usize = 50;

const DECIMALS: Option<&str> = Some("0.00");
const EMPTY_COUNT: &str = "—";

/// A computed worksheet, ready to be written.
#[derive(Debug)]
pub enum TableSheet {
    Flat {
        name: &'static str,
        table: Table,
        style: SheetStyle,
    },
    Grouped {
        name: &'static str,
        table: GroupedTable,
        style: SheetStyle,
    },
    Fallback {
        name: &'static str,
        table: Table,
        missing: Vec<&'static str>,
    },
}

impl TableSheet {
    pub fn write(&self, path: &Path) -> Result<()> {
        match self {
            TableSheet::Flat { name, table, style } => write_table(path, name, table, style),
            TableSheet::Grouped { name, table, style } => {
                write_grouped_table(path, name, table, style)
            }
            TableSheet::Fallback { name, table, .. } => {
                write_table(path, name, table, &SheetStyle::default())
            }
        }
    }

    /// Names of the column roles that were not found, if this is a fallback.
    pub fn missing_columns(&self) -> Option<&[&'static str]> {
        match self {
            TableSheet::Fallback { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

pub type TableBuilder = fn(&Table) -> TableSheet;

/// Table builders in report order, with their number.
pub const TABLES: [(u8, TableBuilder); 9] = [
    (1, competences_goals_objectives),
    (2, measurements_per_objective),
    (3, criteria_per_objective),
    (4, mean_per_competence_and_period),
    (5, mean_per_criterion_and_period),
    (6, mean_per_period),
    (7, mean_per_evaluation_criterion),
    (8, mean_per_competence_and_cohort),
    (9, mean_and_deviation_per_objective),
];

/// Locates required column roles, remembering the ones that are missing.
struct Roles<'a> {
    columns: &'a [String],
    missing: Vec<&'static str>,
}

impl<'a> Roles<'a> {
    fn new(table: &'a Table) -> Self {
        Self {
            columns: &table.columns,
            missing: Vec::new(),
        }
    }

    fn need(&mut self, role: &'static str, find: fn(&[String]) -> Option<usize>) -> Option<usize> {
        let found = find(self.columns);
        if found.is_none() {
            self.missing.push(role);
        }
        found
    }

    fn fallback(self, df: &Table, name: &'static str) -> TableSheet {
        TableSheet::Fallback {
            name,
            table: df.head(FALLBACK_ROWS),
            missing: self.missing,
        }
    }
}

fn column_header(df: &Table, idx: usize) -> String {
    df.columns[idx].clone()
}

fn rounded(v: Option<f64>) -> CellValue {
    v.map(round2).into()
}

/// Table 1: competences with their learning goals and objectives.
pub fn competences_goals_objectives(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let comp = roles.need("competence", columns::competence);
    let goal = roles.need("learning goal", columns::learning_goal);
    let obj = roles.need("learning objective", columns::learning_objective);
    let (Some(comp), Some(goal), Some(obj)) = (comp, goal, obj) else {
        return roles.fallback(df, "Datos");
    };

    let tmp = df.select(&[comp, goal, obj]).drop_empty(&[0, 1, 2]).distinct();

    let mut groups: BTreeMap<CellValue, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
    for row in &tmp.rows {
        let entry = groups.entry(row[0].clone()).or_default();
        entry.0.insert(row[1].to_string());
        entry.1.insert(row[2].to_string());
    }

    let mut out = Table::new(vec![
        "Competencia".into(),
        "Metas de aprendizaje".into(),
        "Objetivos de aprendizaje".into(),
    ]);
    for (competence, (goals, objectives)) in groups {
        out.push_row(vec![
            competence,
            join_lines(&goals).into(),
            join_lines(&objectives).into(),
        ]);
    }

    TableSheet::Flat {
        name: "Tabla 1",
        table: out,
        style: SheetStyle {
            label_columns: 1,
            wrap_text: true,
            ..Default::default()
        },
    }
}

fn join_lines(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

/// Table 2: number of measurements per learning objective and period.
pub fn measurements_per_objective(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let per = roles.need("period", columns::period);
    let obj = roles.need("learning objective", columns::learning_objective);
    let (Some(per), Some(obj)) = (per, obj) else {
        return roles.fallback(df, "Datos");
    };

    let mut pivot: Pivot<CellValue> = Pivot::new();
    for row in &df.rows {
        if row[per].is_empty() || row[obj].is_empty() {
            continue;
        }
        pivot.add(row[per].clone(), row[obj].clone(), None);
    }

    let objectives: Vec<&CellValue> = pivot.cols().collect();
    let mut header = vec![column_header(df, per)];
    header.extend(objectives.iter().map(|o| o.to_string()));
    header.push("# Total".into());
    let mut out = Table::new(header);

    let mut column_totals = vec![0usize; objectives.len() + 1];
    for period in pivot.rows() {
        let counts: Vec<usize> = objectives.iter().map(|o| pivot.count(period, o)).collect();
        let total: usize = counts.iter().sum();

        let mut row = vec![period.clone()];
        for (i, c) in counts.iter().chain(std::iter::once(&total)).enumerate() {
            column_totals[i] += c;
            row.push(count_cell(*c));
        }
        out.push_row(row);
    }

    let mut total_row = vec![CellValue::from("Total")];
    total_row.extend(column_totals.into_iter().map(count_cell));
    out.push_row(total_row);

    TableSheet::Flat {
        name: "Tabla 2",
        table: out,
        style: SheetStyle {
            label_columns: 1,
            ..Default::default()
        },
    }
}

fn count_cell(n: usize) -> CellValue {
    if n == 0 {
        CellValue::from(EMPTY_COUNT)
    } else {
        CellValue::Int(n as i64)
    }
}

/// Table 3: evaluation criteria of each learning objective.
pub fn criteria_per_objective(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let obj = roles.need("learning objective", columns::learning_objective);
    let crit = roles.need("criterion", columns::criterion);
    let (Some(obj), Some(crit)) = (obj, crit) else {
        return roles.fallback(df, "Datos");
    };

    let mut criteria: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in &df.rows {
        if row[obj].is_empty() || row[crit].is_empty() {
            continue;
        }
        criteria
            .entry(row[obj].to_string())
            .or_default()
            .insert(row[crit].to_string());
    }

    let mut out = Table::new(vec![
        "Objetivos de aprendizaje".into(),
        "Número de criterios".into(),
        "Nombre del criterio".into(),
    ]);
    let mut total = 0usize;
    for (objective, names) in &criteria {
        total += names.len();
        for (i, name) in names.iter().enumerate() {
            let (label, count) = if i == 0 {
                (objective.as_str().into(), CellValue::Int(names.len() as i64))
            } else {
                (CellValue::Empty, CellValue::Empty)
            };
            out.push_row(vec![label, count, name.as_str().into()]);
        }
    }
    out.push_row(vec![
        "Total criterios".into(),
        CellValue::Int(total as i64),
        "".into(),
    ]);

    TableSheet::Flat {
        name: "Tabla 3",
        table: out,
        style: SheetStyle {
            label_columns: 1,
            wrap_text: true,
            ..Default::default()
        },
    }
}

/// Table 4: mean criterion score per period and competence.
pub fn mean_per_competence_and_period(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let per = roles.need("period", columns::period);
    let comp = roles.need("competence", columns::competence);
    let score = roles.need("score", columns::score);
    let (Some(per), Some(comp), Some(score)) = (per, comp, score) else {
        return roles.fallback(df, "Datos");
    };

    let mut pivot: Pivot<CellValue> = Pivot::new();
    for row in &df.rows {
        if row[per].is_empty() || row[comp].is_empty() {
            continue;
        }
        pivot.add(row[per].clone(), row[comp].clone(), row[score].as_f64());
    }

    let competences: Vec<&CellValue> = pivot.cols().collect();
    let mut header = vec![column_header(df, per)];
    header.extend(competences.iter().map(|c| c.to_string()));
    let mut out = Table::new(header);

    for period in pivot.rows() {
        let mut row = vec![period.clone()];
        row.extend(competences.iter().map(|c| rounded(pivot.mean(period, c))));
        out.push_row(row);
    }

    TableSheet::Flat {
        name: "Tabla 4",
        table: out,
        style: SheetStyle {
            number_format: DECIMALS,
            label_columns: 1,
            ..Default::default()
        },
    }
}

/// Shared body of tables 5 and 7: mean score per (objective, criterion)
/// across periods, shaded with a color scale.
fn criterion_period_heatmap(df: &Table, name: &'static str) -> TableSheet {
    let mut roles = Roles::new(df);
    let per = roles.need("period", columns::period);
    let obj = roles.need("learning objective", columns::learning_objective);
    let crit = roles.need("criterion", columns::criterion);
    let score = roles.need("score", columns::score);
    let (Some(per), Some(obj), Some(crit), Some(score)) = (per, obj, crit, score) else {
        return roles.fallback(df, "Datos");
    };

    let mut pivot: Pivot<(CellValue, CellValue)> = Pivot::new();
    for row in &df.rows {
        if [per, obj, crit, score].iter().any(|&i| row[i].is_empty()) {
            continue;
        }
        let Some(value) = row[score].as_f64() else {
            continue;
        };
        pivot.add(
            (row[obj].clone(), row[crit].clone()),
            row[per].clone(),
            Some(value),
        );
    }

    let periods: Vec<&CellValue> = pivot.cols().collect();
    let mut header = vec![column_header(df, obj), column_header(df, crit)];
    header.extend(periods.iter().map(|p| p.to_string()));
    let mut out = Table::new(header);

    for key in pivot.rows() {
        let mut row = vec![key.0.clone(), key.1.clone()];
        row.extend(periods.iter().map(|p| rounded(pivot.mean(key, p))));
        out.push_row(row);
    }

    TableSheet::Flat {
        name,
        table: out,
        style: SheetStyle {
            number_format: DECIMALS,
            label_columns: 2,
            color_scale: true,
            wrap_text: true,
        },
    }
}

/// Table 5: mean score per criterion within objective, by period.
pub fn mean_per_criterion_and_period(df: &Table) -> TableSheet {
    criterion_period_heatmap(df, "Tabla 5")
}

/// Table 6: mean per cohort (or period), from the writing average when present.
pub fn mean_per_period(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let per = roles.need("cohort or period", columns::cohort_or_period);
    let value = columns::average(&df.columns).or_else(|| columns::score(&df.columns));
    if value.is_none() {
        roles.missing.push("average or score");
    }
    let (Some(per), Some(value)) = (per, value) else {
        return roles.fallback(df, "Fallback");
    };

    let mut groups: BTreeMap<CellValue, Vec<f64>> = BTreeMap::new();
    for row in &df.rows {
        if row[per].is_empty() {
            continue;
        }
        if let Some(v) = row[value].as_f64() {
            groups.entry(row[per].clone()).or_default().push(v);
        }
    }

    let mut out = Table::new(vec!["Periodo".into(), "Promedio".into()]);
    for (period, values) in groups {
        out.push_row(vec![period, rounded(mean(&values))]);
    }

    TableSheet::Flat {
        name: "Tabla 6",
        table: out,
        style: SheetStyle {
            number_format: DECIMALS,
            label_columns: 1,
            ..Default::default()
        },
    }
}

/// Table 7: mean score per evaluation criterion and academic period.
pub fn mean_per_evaluation_criterion(df: &Table) -> TableSheet {
    criterion_period_heatmap(df, "Tabla 7")
}

/// Table 8: mean score per competence and entry cohort, with row and
/// column averages.
pub fn mean_per_competence_and_cohort(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let coh = roles.need("cohort", columns::cohort);
    let comp = roles.need("competence", columns::competence);
    let score = roles.need("score", columns::score);
    let (Some(coh), Some(comp), Some(score)) = (coh, comp, score) else {
        return roles.fallback(df, "Datos");
    };

    let mut pivot: Pivot<CellValue> = Pivot::new();
    for row in &df.rows {
        if row[coh].is_empty() || row[comp].is_empty() {
            continue;
        }
        pivot.add(row[coh].clone(), row[comp].clone(), row[score].as_f64());
    }

    let competences: Vec<&CellValue> = pivot.cols().collect();
    let mut header = vec!["Cohorte".to_string()];
    header.extend(competences.iter().map(|c| c.to_string()));
    header.push("Promedio".into());
    let mut out = Table::new(header);

    // per output column, the rounded values for the closing average row
    let mut by_column: Vec<Vec<f64>> = vec![Vec::new(); competences.len() + 1];
    for cohort in pivot.rows() {
        let means: Vec<Option<f64>> = competences.iter().map(|c| pivot.mean(cohort, c)).collect();
        let present: Vec<f64> = means.iter().flatten().copied().collect();
        let row_mean = mean(&present);

        let mut row = vec![CellValue::Text(format!("Cohorte {cohort}"))];
        for (i, m) in means.iter().chain(std::iter::once(&row_mean)).enumerate() {
            if let Some(v) = m {
                by_column[i].push(round2(*v));
            }
            row.push(rounded(*m));
        }
        out.push_row(row);
    }

    let mut average_row = vec![CellValue::from("Promedio")];
    average_row.extend(by_column.iter().map(|values| rounded(mean(values))));
    out.push_row(average_row);

    TableSheet::Flat {
        name: "Tabla 8",
        table: out,
        style: SheetStyle {
            number_format: DECIMALS,
            label_columns: 1,
            ..Default::default()
        },
    }
}

/// Table 9: mean (μ) and sample deviation (σ) per learning objective and
/// cohort.
pub fn mean_and_deviation_per_objective(df: &Table) -> TableSheet {
    let mut roles = Roles::new(df);
    let coh = roles.need("cohort or period", columns::cohort_or_period);
    let obj = roles.need("learning objective", columns::learning_objective);
    let score = roles.need("score", columns::score);
    let (Some(coh), Some(obj), Some(score)) = (coh, obj, score) else {
        return roles.fallback(df, "Datos");
    };

    let mut pivot: Pivot<CellValue> = Pivot::new();
    for row in &df.rows {
        if [coh, obj, score].iter().any(|&i| row[i].is_empty()) {
            continue;
        }
        let Some(value) = row[score].as_f64() else {
            continue;
        };
        pivot.add(row[coh].clone(), row[obj].clone(), Some(value));
    }

    let objectives: Vec<&CellValue> = pivot.cols().collect();
    let groups: Vec<HeaderGroup> = objectives
        .iter()
        .map(|o| HeaderGroup {
            title: o.to_string(),
            columns: vec!["μ".into(), "σ".into()],
        })
        .collect();

    let mut by_column: Vec<Vec<f64>> = vec![Vec::new(); objectives.len() * 2];
    let mut rows = Vec::new();
    for cohort in pivot.rows() {
        let mut cells: Vec<CellValue> = Vec::with_capacity(objectives.len() * 2);
        for (i, o) in objectives.iter().enumerate() {
            let values = pivot.values(cohort, o);
            for (j, stat) in [mean(values), sample_stddev(values)].into_iter().enumerate() {
                let stat = stat.map(round2);
                if let Some(v) = stat {
                    by_column[i * 2 + j].push(v);
                }
                cells.push(stat.into());
            }
        }
        rows.push((cohort.clone(), cells));
    }
    rows.push((
        CellValue::from("Promedio"),
        by_column.iter().map(|values| rounded(mean(values))).collect(),
    ));

    TableSheet::Grouped {
        name: "Tabla 9",
        table: GroupedTable {
            label_header: column_header(df, coh),
            groups,
            rows,
        },
        style: SheetStyle {
            number_format: DECIMALS,
            label_columns: 1,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: [&str; 8] = [
        "Código del estudiante",
        "Semestre",
        "Competencia",
        "Meta de aprendizaje",
        "Objetivo de aprendizaje",
        "Código y nombre del criterio",
        "Puntaje criterio",
        "Cohorte Real",
    ];

    fn row(student: i64, sem: &str, comp: &str, obj: &str, crit: &str, score: f64, coh: &str) -> Vec<CellValue> {
        vec![
            CellValue::Int(student),
            sem.into(),
            comp.into(),
            format!("Meta {comp}").into(),
            obj.into(),
            crit.into(),
            CellValue::Float(score),
            coh.into(),
        ]
    }

    fn program_data() -> Table {
        let mut t = Table::new(COLUMNS.iter().map(|c| c.to_string()).collect());
        t.push_row(row(1, "202310", "C1", "O1", "K1", 4.0, "202110"));
        t.push_row(row(1, "202310", "C1", "O1", "K2", 3.0, "202110"));
        t.push_row(row(2, "202310", "C2", "O2", "K3", 5.0, "202120"));
        t.push_row(row(3, "202320", "C1", "O1", "K1", 2.0, "202120"));
        t.push_row(row(4, "202320", "C1", "O1", "K1", 3.0, "202120"));
        t
    }

    fn flat(sheet: TableSheet) -> Table {
        match sheet {
            TableSheet::Flat { table, .. } => table,
            other => panic!("expected a flat sheet, got {other:?}"),
        }
    }

    #[test]
    fn test_table_1_groups_goals_and_objectives() {
        let t = flat(competences_goals_objectives(&program_data()));
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0][0], CellValue::Text("C1".into()));
        assert_eq!(t.rows[0][1], CellValue::Text("Meta C1".into()));
        assert_eq!(t.rows[0][2], CellValue::Text("O1".into()));
    }

    #[test]
    fn test_table_2_totals() {
        let t = flat(measurements_per_objective(&program_data()));
        assert_eq!(t.columns, vec!["Semestre", "O1", "O2", "# Total"]);
        assert_eq!(
            t.rows[0],
            vec!["202310".into(), CellValue::Int(2), CellValue::Int(1), CellValue::Int(3)]
        );
        // zero counts are shown as a dash
        assert_eq!(t.rows[1][2], CellValue::Text("—".into()));
        assert_eq!(
            t.rows[2],
            vec!["Total".into(), CellValue::Int(4), CellValue::Int(1), CellValue::Int(5)]
        );
    }

    #[test]
    fn test_table_3_counts_distinct_criteria() {
        let t = flat(criteria_per_objective(&program_data()));
        assert_eq!(t.len(), 4);
        assert_eq!(t.rows[0], vec!["O1".into(), CellValue::Int(2), "K1".into()]);
        assert_eq!(t.rows[1], vec![CellValue::Empty, CellValue::Empty, "K2".into()]);
        assert_eq!(t.rows[3][0], CellValue::Text("Total criterios".into()));
        assert_eq!(t.rows[3][1], CellValue::Int(3));
    }

    #[test]
    fn test_table_4_means() {
        let t = flat(mean_per_competence_and_period(&program_data()));
        assert_eq!(t.columns, vec!["Semestre", "C1", "C2"]);
        assert_eq!(t.rows[0][1], CellValue::Float(3.5));
        assert_eq!(t.rows[1][1], CellValue::Float(2.5));
        assert!(t.rows[1][2].is_empty());
    }

    #[test]
    fn test_table_5_has_color_scale() {
        match mean_per_criterion_and_period(&program_data()) {
            TableSheet::Flat { table, style, name } => {
                assert_eq!(name, "Tabla 5");
                assert!(style.color_scale);
                assert_eq!(
                    table.rows[0][..2].to_vec(),
                    vec![CellValue::from("O1"), CellValue::from("K1")]
                );
                assert_eq!(table.rows[0][2], CellValue::Float(4.0));
                assert_eq!(table.rows[0][3], CellValue::Float(2.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_table_6_prefers_cohort() {
        let t = flat(mean_per_period(&program_data()));
        assert_eq!(t.columns, vec!["Periodo", "Promedio"]);
        assert_eq!(t.rows[0], vec!["202110".into(), CellValue::Float(3.5)]);
        assert_eq!(t.rows[1], vec!["202120".into(), CellValue::Float(3.33)]);
    }

    #[test]
    fn test_table_8_row_and_column_averages() {
        let t = flat(mean_per_competence_and_cohort(&program_data()));
        assert_eq!(t.columns, vec!["Cohorte", "C1", "C2", "Promedio"]);
        assert_eq!(t.rows[0][0], CellValue::Text("Cohorte 202110".into()));
        assert_eq!(t.rows[1][1], CellValue::Float(2.5));
        assert_eq!(t.rows[1][3], CellValue::Float(3.75));
        let last = t.rows.last().unwrap();
        assert_eq!(last[0], CellValue::Text("Promedio".into()));
        assert_eq!(last[1], CellValue::Float(3.0));
    }

    #[test]
    fn test_table_9_mean_and_deviation() {
        match mean_and_deviation_per_objective(&program_data()) {
            TableSheet::Grouped { table, .. } => {
                assert_eq!(table.label_header, "Cohorte Real");
                assert_eq!(table.groups.len(), 2);
                let (label, cells) = &table.rows[0];
                assert_eq!(label, &CellValue::Text("202110".into()));
                assert_eq!(cells[0], CellValue::Float(3.5));
                assert_eq!(cells[1], CellValue::Float(0.71));
                // one O2 value in 202120: mean only
                let (_, cells) = &table.rows[1];
                assert_eq!(cells[2], CellValue::Float(5.0));
                assert!(cells[3].is_empty());
                assert_eq!(table.rows.last().unwrap().0, CellValue::Text("Promedio".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fallback_when_columns_missing() {
        let mut df = Table::new(vec!["x".into()]);
        for i in 0..60 {
            df.push_row(vec![CellValue::Int(i)]);
        }
        let sheet = measurements_per_objective(&df);
        assert_eq!(
            sheet.missing_columns(),
            Some(&["period", "learning objective"][..])
        );
        match sheet {
            TableSheet::Fallback { name, table, .. } => {
                assert_eq!(name, "Datos");
                assert_eq!(table.len(), FALLBACK_ROWS);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            mean_per_period(&df),
            TableSheet::Fallback { name: "Fallback", .. }
        ));
    }
}
