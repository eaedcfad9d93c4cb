//! The unified hotspot table (`area_km2,Bioma,NuFis,mes`) read by the
//! chart stage, and the aggregations drawn from it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CanopyError, Result};
use crate::geometry::HECTARES_PER_KM2;
use crate::hotspots::HotspotLayer;
use crate::io::ensure_parent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub area_km2: f64,
    #[serde(rename = "Bioma", default)]
    pub biome: String,
    #[serde(rename = "NuFis", default)]
    pub municipality_code: String,
    #[serde(rename = "mes", default)]
    pub month: String,
}

impl UnifiedRecord {
    pub fn area_ha(&self) -> f64 {
        self.area_km2 * HECTARES_PER_KM2
    }
}

/// Codes exported through floating-point columns come back as `3100104.0`.
fn normalize_code(code: &str) -> String {
    let code = code.trim();
    match code.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() && !code.contains(['e', 'E']) => format!("{f:.0}"),
        _ => code.to_owned(),
    }
}

pub fn records_from_layer(layer: &HotspotLayer) -> Result<Vec<UnifiedRecord>> {
    let areas = layer.areas_km2()?;
    Ok(layer
        .hotspots
        .iter()
        .zip(areas)
        .map(|(h, area_km2)| UnifiedRecord {
            area_km2,
            biome: h.biome.clone(),
            municipality_code: h.municipality_code.clone(),
            month: h.month.clone(),
        })
        .collect())
}

pub fn write_unified_csv(path: &Path, records: &[UnifiedRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for r in records {
        writer.serialize(r)?;
    }
    writer.flush().map_err(|e| CanopyError::io(path, e))?;
    info!(?path, rows = records.len(), "wrote unified hotspot table");
    Ok(())
}

/// Read the unified table. Columns beyond the four known ones are ignored.
pub fn read_unified_csv(path: &Path) -> Result<Vec<UnifiedRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<UnifiedRecord>()
        .map(|r| {
            r.map(|mut rec| {
                rec.municipality_code = normalize_code(&rec.municipality_code);
                rec
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(?path, rows = records.len(), "read unified hotspot table");
    Ok(records)
}

// ── Aggregations (hectares) ──────────────────────────────────────────────────

fn totals_by<'a>(records: &'a [UnifiedRecord], key: impl Fn(&'a UnifiedRecord) -> &'a str) -> BTreeMap<&'a str, f64> {
    let mut totals = BTreeMap::new();
    for r in records {
        *totals.entry(key(r)).or_default() += r.area_ha();
    }
    totals
}

fn descending(totals: BTreeMap<&str, f64>) -> Vec<(String, f64)> {
    let mut v: Vec<(String, f64)> = totals.into_iter().map(|(k, ha)| (k.to_owned(), ha)).collect();
    v.sort_by(|a, b| b.1.total_cmp(&a.1));
    v
}

/// The `n` municipalities with the largest deforested area, largest first.
pub fn top_municipalities(records: &[UnifiedRecord], n: usize) -> Vec<(String, f64)> {
    let mut v = descending(totals_by(records, |r| r.municipality_code.as_str()));
    v.truncate(n);
    v
}

/// Area per biome, largest first.
pub fn biome_totals(records: &[UnifiedRecord]) -> Vec<(String, f64)> {
    descending(totals_by(records, |r| r.biome.as_str()))
}

/// Area per month in `months` order. Months without records report 0;
/// months not listed are left out.
pub fn monthly_totals(records: &[UnifiedRecord], months: &[String]) -> Vec<(String, f64)> {
    let totals = totals_by(records, |r| r.month.as_str());
    months
        .iter()
        .map(|m| (m.clone(), totals.get(m.as_str()).copied().unwrap_or(0.0)))
        .collect()
}

/// A dense label × label table, both axes sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `values[row][column]`, zero where no record exists.
    pub values: Vec<Vec<f64>>,
}

impl Pivot {
    fn build<'a>(
        records: &'a [UnifiedRecord],
        row_key: impl Fn(&'a UnifiedRecord) -> &'a str,
        col_key: impl Fn(&'a UnifiedRecord) -> &'a str,
    ) -> Self {
        let rows: Vec<String> = records.iter().map(&row_key).collect::<BTreeSet<_>>().into_iter().map(String::from).collect();
        let columns: Vec<String> = records.iter().map(&col_key).collect::<BTreeSet<_>>().into_iter().map(String::from).collect();
        let mut values = vec![vec![0.0; columns.len()]; rows.len()];
        for r in records {
            // Both keys were collected from `records`, so the searches hit.
            if let (Ok(i), Ok(j)) = (
                rows.binary_search_by(|k| k.as_str().cmp(row_key(r))),
                columns.binary_search_by(|k| k.as_str().cmp(col_key(r))),
            ) {
                values[i][j] += r.area_ha();
            }
        }
        Self { rows, columns, values }
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().flatten().copied().fold(0.0, f64::max)
    }
}

/// Municipality × biome hectares.
pub fn municipality_biome_pivot(records: &[UnifiedRecord]) -> Pivot {
    Pivot::build(records, |r| r.municipality_code.as_str(), |r| r.biome.as_str())
}

/// Biome × municipality share of each biome's area. Every row sums to 1,
/// except rows with no area, which stay all zero.
pub fn biome_proportions(records: &[UnifiedRecord]) -> Pivot {
    let mut pivot = Pivot::build(records, |r| r.biome.as_str(), |r| r.municipality_code.as_str());
    for row in &mut pivot.values {
        let total: f64 = row.iter().sum();
        if total > 0.0 {
            row.iter_mut().for_each(|v| *v /= total);
        }
    }
    pivot
}
