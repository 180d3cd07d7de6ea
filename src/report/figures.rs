//! Bar charts of evaluated students, rendered to PNG with plotters.

use anyhow::{Result, anyhow};
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::columns;
use crate::dataset::{CellValue, Table};

pub const WIDTH: u32 = 1500;
pub const HEIGHT: u32 = 900;

const FONT: &str = "sans-serif";
const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Vertical,
    Horizontal,
}

/// Labelled counts, in drawing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarSeries {
    pub labels: Vec<String>,
    pub counts: Vec<u32>,
}

impl BarSeries {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug)]
pub enum Figure {
    Bars {
        title: &'static str,
        value_desc: &'static str,
        group_desc: &'static str,
        orientation: Orientation,
        series: BarSeries,
    },
    Placeholder {
        message: &'static str,
    },
}

pub type FigureBuilder = fn(&Table) -> Figure;

pub const FIGURES: [(u8, FigureBuilder); 2] = [
    (1, evaluations_per_period),
    (2, evaluations_per_cohort),
];

/// Distinct students per value of the `group` column, groups sorted.
///
/// Rows with an empty group or student are ignored. Student codes are
/// compared through [`CellValue::key`].
pub fn students_per_group(df: &Table, group: usize, student: usize) -> BTreeMap<CellValue, usize> {
    let mut seen: BTreeMap<CellValue, HashSet<String>> = BTreeMap::new();
    for row in &df.rows {
        if row[group].is_empty() || row[student].is_empty() {
            continue;
        }
        seen.entry(row[group].clone())
            .or_default()
            .insert(row[student].key());
    }
    seen.into_iter().map(|(g, s)| (g, s.len())).collect()
}

/// Figure 1: evaluated students per application period.
pub fn evaluations_per_period(df: &Table) -> Figure {
    let (Some(per), Some(stu)) = (columns::period(&df.columns), columns::student(&df.columns))
    else {
        return Figure::Placeholder {
            message: "No hay columnas de periodo/estudiante",
        };
    };

    let mut series = BarSeries::default();
    for (period, n) in students_per_group(df, per, stu) {
        series.labels.push(period.to_string());
        series.counts.push(n as u32);
    }

    Figure::Bars {
        title: "Número de evaluaciones AOL MM",
        value_desc: "Número de estudiantes evaluados en AOL MM",
        group_desc: "Periodo - semestre",
        orientation: Orientation::Vertical,
        series,
    }
}

/// Figure 2: evaluated students per entry cohort, first cohort on top.
pub fn evaluations_per_cohort(df: &Table) -> Figure {
    let (Some(coh), Some(stu)) = (columns::cohort(&df.columns), columns::student(&df.columns))
    else {
        return Figure::Placeholder {
            message: "No hay columnas PERIODO/Código estudiante",
        };
    };

    let mut series = BarSeries::default();
    for (cohort, n) in students_per_group(df, coh, stu) {
        series.labels.push(format!("Cohorte {cohort}"));
        series.counts.push(n as u32);
    }

    Figure::Bars {
        title: "Estudiantes evaluados en AOL desagregado por cohorte de ingreso",
        value_desc: "Número de estudiantes evaluados AOL MM",
        group_desc: "Cohorte de ingreso",
        orientation: Orientation::Horizontal,
        series,
    }
}

impl Figure {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Figure::Placeholder { .. })
    }

    /// Draws the figure as a PNG at `path`.
    pub fn render(&self, path: &Path) -> Result<()> {
        let drawn = match self {
            Figure::Placeholder { message } => render_message(path, message),
            Figure::Bars { series, .. } if series.is_empty() => {
                render_message(path, "Sin datos para graficar")
            }
            Figure::Bars {
                title,
                value_desc,
                group_desc,
                orientation: Orientation::Vertical,
                series,
            } => render_vertical(path, title, group_desc, value_desc, series),
            Figure::Bars {
                title,
                value_desc,
                group_desc,
                orientation: Orientation::Horizontal,
                series,
            } => render_horizontal(path, title, value_desc, group_desc, series),
        };
        drawn.map_err(|e| anyhow!("rendering {}: {e}", path.display()))
    }
}

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn segment_label(labels: &[String], v: &SegmentValue<u32>) -> String {
    match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
            labels.get(*i as usize).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    }
}

/// Segment of the `i`-th of `n` bars on an upward-growing axis, so that the
/// first bar is drawn on top.
fn top_down_slot(n: u32, i: usize) -> u32 {
    n - 1 - i as u32
}

fn render_vertical(
    path: &Path,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    series: &BarSeries,
) -> DrawResult {
    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    // integer axis ranges are inclusive, one segment per bar
    let n = series.counts.len() as u32;
    let top = series.max() + series.max() / 10 + 1;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 36))
        .margin(30)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d((0u32..n - 1).into_segmented(), 0u32..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .x_labels(n as usize)
        .x_label_formatter(&|v| segment_label(&series.labels, v))
        .axis_desc_style((FONT, 24))
        .label_style((FONT, 20))
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BAR_COLOR.filled())
            .margin(20)
            .data(series.counts.iter().enumerate().map(|(i, c)| (i as u32, *c))),
    )?;

    let style = TextStyle::from((FONT, 22).into_font()).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(series.counts.iter().enumerate().map(|(i, c)| {
        Text::new(
            c.to_string(),
            (SegmentValue::CenterOf(i as u32), *c),
            style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn render_horizontal(
    path: &Path,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    series: &BarSeries,
) -> DrawResult {
    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = series.counts.len() as u32;
    let slot = |i: usize| top_down_slot(n, i);
    let labels: Vec<String> = series.labels.iter().rev().cloned().collect();

    let right = series.max() + series.max() / 10 + 1;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 36))
        .margin(30)
        .x_label_area_size(70)
        .y_label_area_size(180)
        .build_cartesian_2d(0u32..right, (0u32..n - 1).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .y_labels(n as usize)
        .y_label_formatter(&|v| segment_label(&labels, v))
        .axis_desc_style((FONT, 24))
        .label_style((FONT, 20))
        .draw()?;

    chart.draw_series(
        Histogram::horizontal(&chart)
            .style(BAR_COLOR.filled())
            .margin(15)
            .data(series.counts.iter().enumerate().map(|(i, c)| (slot(i), *c))),
    )?;

    let style = TextStyle::from((FONT, 22).into_font()).pos(Pos::new(HPos::Left, VPos::Center));
    chart.draw_series(series.counts.iter().enumerate().map(|(i, c)| {
        Text::new(
            format!(" {c}"),
            (*c, SegmentValue::CenterOf(slot(i))),
            style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn render_message(path: &Path, message: &str) -> DrawResult {
    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let style = TextStyle::from((FONT, 36).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(
        message,
        ((WIDTH / 2) as i32, (HEIGHT / 2) as i32),
        style,
    ))?;

    root.present()?;
    Ok(())
}
