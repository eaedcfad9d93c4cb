//! SVG charts for the deforestation report.
//!
//! Categorical axes use segmented integer coordinates: slot `i` spans
//! `Exact(i)..Exact(i + 1)` (the last slot ends at `Last`) and is labelled at
//! its centre.

pub mod palette;

use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::info;

use crate::correlation::CorrelationReport;
use crate::error::Result;
use crate::io::ensure_parent;
use crate::unified::{self, Pivot, UnifiedRecord};

use palette::{tab20, COOLWARM, GREENS, ORANGE, REDS, UNDEFINED};

pub const TOP_MUNICIPALITIES_FILE: &str = "top_10_municipios.svg";
pub const BIOME_AREA_FILE: &str = "area_por_bioma.svg";
pub const MONTHLY_FILE: &str = "desmatamento_mensal.svg";
pub const MUNICIPALITY_BIOME_HEATMAP_FILE: &str = "heatmap_municipio_bioma.svg";
pub const BIOME_SHARE_FILE: &str = "desmatamento_por_municipio_bioma.svg";

const TOP_N: usize = 10;
const FONT: &str = "sans-serif";

/// Paths of the five report charts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSet {
    pub top_municipalities: PathBuf,
    pub biome_area: PathBuf,
    pub monthly: PathBuf,
    pub municipality_biome_heatmap: PathBuf,
    pub biome_share: PathBuf,
}

impl ChartSet {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            top_municipalities: dir.join(TOP_MUNICIPALITIES_FILE),
            biome_area: dir.join(BIOME_AREA_FILE),
            monthly: dir.join(MONTHLY_FILE),
            municipality_biome_heatmap: dir.join(MUNICIPALITY_BIOME_HEATMAP_FILE),
            biome_share: dir.join(BIOME_SHARE_FILE),
        }
    }

    pub fn paths(&self) -> [&Path; 5] {
        [
            &self.top_municipalities,
            &self.biome_area,
            &self.monthly,
            &self.municipality_biome_heatmap,
            &self.biome_share,
        ]
    }
}

/// Render every report chart from the unified table into `dir`.
pub fn render_all(dir: &Path, records: &[UnifiedRecord], months: &[String]) -> Result<ChartSet> {
    let set = ChartSet::in_dir(dir);
    top_municipalities_chart(&set.top_municipalities, &unified::top_municipalities(records, TOP_N))?;
    biome_area_chart(&set.biome_area, &unified::biome_totals(records))?;
    monthly_chart(&set.monthly, &unified::monthly_totals(records, months))?;
    municipality_biome_heatmap(&set.municipality_biome_heatmap, &unified::municipality_biome_pivot(records))?;
    biome_share_chart(&set.biome_share, &unified::biome_proportions(records))?;
    info!(dir = ?dir, "rendered report charts");
    Ok(set)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn canvas(path: &Path, size: (u32, u32)) -> Result<DrawingArea<SVGBackend<'_>, Shift>> {
    ensure_parent(path)?;
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

/// Upper bound of the segmented range holding `n` slots.
fn last_slot(n: usize) -> i32 {
    n.saturating_sub(1) as i32
}

fn span(i: usize, n: usize) -> (SegmentValue<i32>, SegmentValue<i32>) {
    let end = if i + 1 < n { SegmentValue::Exact(i as i32 + 1) } else { SegmentValue::Last };
    (SegmentValue::Exact(i as i32), end)
}

fn slot_label(labels: &[String], v: &SegmentValue<i32>) -> String {
    match v {
        SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => {
            usize::try_from(*i).ok().and_then(|i| labels.get(i)).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    }
}

fn axis_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.filter(|v| v.is_finite()).fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Coolwarm over `[-1, 1]`; undefined coefficients are grey.
fn correlation_fill(r: f64) -> RGBColor {
    if r.is_nan() {
        UNDEFINED
    } else {
        COOLWARM.at((r + 1.0) / 2.0)
    }
}

/// Two-decimal annotation, blank when undefined.
fn correlation_label(r: f64) -> String {
    if r.is_nan() {
        String::new()
    } else {
        format!("{r:.2}")
    }
}

fn centered(size: i32) -> TextStyle<'static> {
    (FONT, size).into_font().color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center))
}

// ── Bar and line charts ──────────────────────────────────────────────────────

/// Horizontal bars, largest at the top, reversed Reds.
pub fn top_municipalities_chart(path: &Path, data: &[(String, f64)]) -> Result<()> {
    let root = canvas(path, (1000, 600))?;
    let n = data.len();
    let labels: Vec<String> = data.iter().rev().map(|(code, _)| code.clone()).collect();
    let max = axis_max(data.iter().map(|(_, ha)| *ha));

    let mut chart = ChartBuilder::on(&root)
        .caption("Top 10 Municípios com Maior Área Desmatada (ha)", (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(100)
        .build_cartesian_2d(0.0..max, (0..last_slot(n)).into_segmented())?;
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n.max(1))
        .y_label_formatter(&|v| slot_label(&labels, v))
        .x_desc("Área Desmatada (ha)")
        .y_desc("Município")
        .draw()?;

    let colors = REDS.sample(n, true);
    chart.draw_series(data.iter().zip(&colors).enumerate().map(|(rank, ((_, ha), color))| {
        let (lo, hi) = span(n - 1 - rank, n);
        let mut bar = Rectangle::new([(0.0, lo), (*ha, hi)], color.filled());
        bar.set_margin(4, 4, 0, 0);
        bar
    }))?;
    root.present()?;
    Ok(())
}

/// Vertical bars per biome, reversed Greens.
pub fn biome_area_chart(path: &Path, data: &[(String, f64)]) -> Result<()> {
    let root = canvas(path, (800, 600))?;
    let n = data.len();
    let labels: Vec<String> = data.iter().map(|(biome, _)| biome.clone()).collect();
    let max = axis_max(data.iter().map(|(_, ha)| *ha));

    let mut chart = ChartBuilder::on(&root)
        .caption("Área Desmatada por Bioma (ha)", (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(80)
        .build_cartesian_2d((0..last_slot(n)).into_segmented(), 0.0..max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|v| slot_label(&labels, v))
        .x_desc("Bioma")
        .y_desc("Área Desmatada (ha)")
        .draw()?;

    let colors = GREENS.sample(n, true);
    chart.draw_series(data.iter().zip(&colors).enumerate().map(|(i, ((_, ha), color))| {
        let (lo, hi) = span(i, n);
        let mut bar = Rectangle::new([(lo, 0.0), (hi, *ha)], color.filled());
        bar.set_margin(0, 0, 8, 8);
        bar
    }))?;
    root.present()?;
    Ok(())
}

/// Orange line with markers over the configured months.
pub fn monthly_chart(path: &Path, data: &[(String, f64)]) -> Result<()> {
    let root = canvas(path, (800, 600))?;
    let n = data.len();
    let labels: Vec<String> = data.iter().map(|(month, _)| month.clone()).collect();
    let max = axis_max(data.iter().map(|(_, ha)| *ha));

    let mut chart = ChartBuilder::on(&root)
        .caption("Monthly Deforestation (ha)", (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(80)
        .build_cartesian_2d((0..last_slot(n)).into_segmented(), 0.0..max)?;
    chart
        .configure_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|v| slot_label(&labels, v))
        .x_desc("Month")
        .y_desc("Deforested Area (ha)")
        .draw()?;

    let points: Vec<(SegmentValue<i32>, f64)> =
        data.iter().enumerate().map(|(i, (_, ha))| (SegmentValue::CenterOf(i as i32), *ha)).collect();
    chart.draw_series(LineSeries::new(points.clone(), ORANGE.stroke_width(2)))?;
    chart.draw_series(points.into_iter().map(|p| Circle::new(p, 5, ORANGE.filled())))?;
    root.present()?;
    Ok(())
}

/// Biomes stacked by municipality share, one tab20 colour per municipality.
pub fn biome_share_chart(path: &Path, pivot: &Pivot) -> Result<()> {
    let root = canvas(path, (1200, 600))?;
    let n = pivot.rows.len();

    let mut chart = ChartBuilder::on(&root)
        .caption("Proportion of Deforested Area per Municipality within each Biome", (FONT, 22))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d((0..last_slot(n)).into_segmented(), 0.0..1.0)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|v| slot_label(&pivot.rows, v))
        .x_desc("Biome")
        .y_desc("Proportion of Area")
        .draw()?;

    let mut bottoms = vec![0.0; n];
    for (j, code) in pivot.columns.iter().enumerate() {
        let color = tab20(j);
        let bars: Vec<_> = (0..n)
            .filter(|&i| pivot.values[i][j] > 0.0)
            .map(|i| {
                let (lo, hi) = span(i, n);
                let bottom = bottoms[i];
                bottoms[i] += pivot.values[i][j];
                let mut bar = Rectangle::new([(lo, bottom), (hi, bottoms[i])], color.filled());
                bar.set_margin(0, 0, 10, 10);
                bar
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(code.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

// ── Heatmaps ─────────────────────────────────────────────────────────────────

/// Municipality rows × biome columns, Reds scaled to the largest cell.
pub fn municipality_biome_heatmap(path: &Path, pivot: &Pivot) -> Result<()> {
    let rows = pivot.rows.len();
    let cols = pivot.columns.len();
    let height = (200 + 14 * rows as u32).max(800);
    let root = canvas(path, (1200, height))?;
    // First row on top.
    let row_labels: Vec<String> = pivot.rows.iter().rev().cloned().collect();
    let max = pivot.max_value();

    let mut chart = ChartBuilder::on(&root)
        .caption("Desmatamento por Município e Bioma (ha)", (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(100)
        .build_cartesian_2d((0..last_slot(cols)).into_segmented(), (0..last_slot(rows)).into_segmented())?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(cols.max(1))
        .y_labels(rows.max(1))
        .x_label_formatter(&|v| slot_label(&pivot.columns, v))
        .y_label_formatter(&|v| slot_label(&row_labels, v))
        .x_desc("Bioma")
        .y_desc("Município")
        .draw()?;

    chart.draw_series(pivot.values.iter().enumerate().flat_map(|(i, row)| {
        row.iter().enumerate().map(move |(j, ha)| {
            let (x0, x1) = span(j, cols);
            let (y0, y1) = span(rows - 1 - i, rows);
            let t = if max > 0.0 { ha / max } else { 0.0 };
            Rectangle::new([(x0, y0), (x1, y1)], REDS.at(t).filled())
        })
    }))?;
    root.present()?;
    Ok(())
}

/// Annotated correlation heatmap, coolwarm over `[-1, 1]`.
pub fn correlation_heatmap(path: &Path, report: &CorrelationReport) -> Result<()> {
    let root = canvas(path, (800, 600))?;
    let n = report.labels.len();
    let row_labels: Vec<String> = report.labels.iter().rev().cloned().collect();

    let mut chart = ChartBuilder::on(&root)
        .caption("Matriz de Correlação", (FONT, 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(160)
        .build_cartesian_2d((0..last_slot(n)).into_segmented(), (0..last_slot(n)).into_segmented())?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n.max(1))
        .y_labels(n.max(1))
        .x_label_formatter(&|v| slot_label(&report.labels, v))
        .y_label_formatter(&|v| slot_label(&row_labels, v))
        .draw()?;

    let cells: Vec<(usize, usize, f64)> = report
        .matrix
        .iter()
        .enumerate()
        .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, r)| (n - 1 - i, j, *r)))
        .collect();
    chart.draw_series(cells.iter().map(|&(slot, j, r)| {
        let (x0, x1) = span(j, n);
        let (y0, y1) = span(slot, n);
        let mut cell = Rectangle::new([(x0, y0), (x1, y1)], correlation_fill(r).filled());
        cell.set_margin(1, 1, 1, 1);
        cell
    }))?;
    chart.draw_series(cells.iter().map(|&(slot, j, r)| {
        Text::new(
            correlation_label(r),
            (SegmentValue::CenterOf(j as i32), SegmentValue::CenterOf(slot as i32)),
            centered(18),
        )
    }))?;
    root.present()?;
    info!(?path, "rendered correlation heatmap");
    Ok(())
}
