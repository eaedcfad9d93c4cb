//! Stage 2c: descriptive statistics over the merged hotspot layer, plus the
//! correlation helpers used by stage 2d.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::geometry::HECTARES_PER_KM2;
use crate::hotspots::HotspotLayer;

/// Aggregated hotspot areas. Maps are keyed and ordered by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HotspotSummary {
    /// Total hectares per report month, in report order. Absent months are 0.
    pub month_hectares: Vec<(String, f64)>,
    pub biome_km2: BTreeMap<String, f64>,
    pub municipality_km2: BTreeMap<String, f64>,
}

impl HotspotSummary {
    pub fn hectares_for(&self, month: &str) -> Option<f64> {
        self.month_hectares.iter().find(|(m, _)| m == month).map(|(_, ha)| *ha)
    }
}

/// Aggregate per-hotspot metric areas by month, biome and municipality.
pub fn summarize(layer: &HotspotLayer, months: &[String]) -> Result<HotspotSummary> {
    let areas = layer.areas_km2()?;
    let mut by_month: BTreeMap<&str, f64> = BTreeMap::new();
    let mut biome_km2 = BTreeMap::new();
    let mut municipality_km2 = BTreeMap::new();

    for (h, km2) in layer.hotspots.iter().zip(areas) {
        *by_month.entry(h.month.as_str()).or_default() += km2;
        *biome_km2.entry(h.biome.clone()).or_default() += km2;
        *municipality_km2.entry(h.municipality_code.clone()).or_default() += km2;
    }

    let month_hectares = months
        .iter()
        .map(|m| (m.clone(), by_month.get(m.as_str()).map_or(0.0, |km2| km2 * HECTARES_PER_KM2)))
        .collect();
    debug!(biomes = biome_km2.len(), municipalities = municipality_km2.len(), "summarized hotspots");
    Ok(HotspotSummary { month_hectares, biome_km2, municipality_km2 })
}

impl fmt::Display for HotspotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (month, ha) in &self.month_hectares {
            writeln!(f, "Área desmatada em {month}: {ha:.2} hectares")?;
        }
        writeln!(f, "\nÁrea desmatada por bioma (km²):")?;
        for (biome, km2) in &self.biome_km2 {
            writeln!(f, "  {biome:<24} {km2:>12.4}")?;
        }
        writeln!(f, "\nÁrea desmatada por município (km²):")?;
        for (code, km2) in &self.municipality_km2 {
            writeln!(f, "  {code:<24} {km2:>12.4}")?;
        }
        Ok(())
    }
}

// ── Correlation ──────────────────────────────────────────────────────────────

/// Pearson correlation coefficient. NaN when fewer than two samples or
/// either series is constant.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let num: f64 = x.iter().zip(y).map(|(&a, &b)| (a - mx) * (b - my)).sum();
    let vx = x.iter().map(|&a| (a - mx).powi(2)).sum::<f64>().sqrt();
    let vy = y.iter().map(|&b| (b - my).powi(2)).sum::<f64>().sqrt();
    if vx < 1e-12 || vy < 1e-12 {
        return f64::NAN;
    }
    (num / (vx * vy)).clamp(-1.0, 1.0)
}

/// Pairwise Pearson matrix over equally long columns.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    columns
        .iter()
        .map(|a| columns.iter().map(|b| pearson_r(a, b)).collect())
        .collect()
}
