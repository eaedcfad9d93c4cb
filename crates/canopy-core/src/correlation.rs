//! Stage 2d: spatial join of hotspots onto municipality parts and the
//! correlation between population, GDP per capita and deforested area.

use geo::{BoundingRect, Intersects, Rect};
use serde::Serialize;
use tracing::{debug, info};

use crate::boundary::BoundaryLayer;
use crate::error::Result;
use crate::geometry::area_hectares;
use crate::hotspots::HotspotLayer;
use crate::indicators::IndicatorTable;
use crate::stats::correlation_matrix;

pub const LABELS: [&str; 3] = ["populacao", "pib", "desmatamento_hectare"];

/// One municipality part with its joined values.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityRow {
    pub code: String,
    pub name: String,
    pub population: Option<f64>,
    pub gdp_per_capita: Option<f64>,
    /// Hectares of every hotspot intersecting the part; `None` when none do.
    pub hectares: Option<f64>,
}

impl MunicipalityRow {
    fn values(&self) -> Option<[f64; 3]> {
        match (self.population, self.gdp_per_capita, self.hectares) {
            (Some(p), Some(g), Some(h)) => Some([p, g, h]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationReport {
    pub labels: Vec<String>,
    /// Row-major 3×3 Pearson matrix in `labels` order. NaN where undefined.
    pub matrix: Vec<Vec<f64>>,
    pub rows_total: usize,
    pub rows_used: usize,
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// Sum the hectares of intersecting hotspots onto every boundary part. The
/// boundaries are brought into the hotspot layer's system first.
pub fn join_hotspots(boundaries: &BoundaryLayer, hotspots: &HotspotLayer) -> Result<Vec<Option<f64>>> {
    let boundaries = if boundaries.crs == hotspots.crs {
        boundaries.clone()
    } else {
        boundaries.reproject(hotspots.crs)?
    };
    let indexed: Vec<_> = hotspots
        .hotspots
        .iter()
        .filter_map(|h| h.geometry.bounding_rect().map(|r| (r, &h.geometry, area_hectares(&h.geometry))))
        .collect();

    let sums = boundaries
        .parts
        .iter()
        .map(|part| {
            let rect = part.geometry.bounding_rect()?;
            indexed
                .iter()
                .filter(|(r, g, _)| rects_overlap(r, &rect) && part.geometry.intersects(*g))
                .map(|(_, _, ha)| *ha)
                .reduce(|a, b| a + b)
        })
        .collect::<Vec<_>>();
    debug!(parts = sums.len(), matched = sums.iter().filter(|s| s.is_some()).count(), "joined hotspots");
    Ok(sums)
}

/// Attach indicators by exact name; population and GDP are truncated to
/// whole numbers.
pub fn build_rows(boundaries: &BoundaryLayer, hotspots: &HotspotLayer, indicators: &IndicatorTable) -> Result<Vec<MunicipalityRow>> {
    let sums = join_hotspots(boundaries, hotspots)?;
    Ok(boundaries
        .parts
        .iter()
        .zip(sums)
        .map(|(part, hectares)| {
            let record = indicators.lookup(&part.name);
            MunicipalityRow {
                code: part.code.clone(),
                name: part.name.clone(),
                population: record.and_then(|r| r.population).map(f64::trunc),
                gdp_per_capita: record.and_then(|r| r.gdp_per_capita).map(f64::trunc),
                hectares,
            }
        })
        .collect())
}

/// Rows whose three values are all present and non-zero.
pub fn complete_cases(rows: &[MunicipalityRow]) -> Vec<[f64; 3]> {
    rows.iter()
        .filter_map(MunicipalityRow::values)
        .filter(|v| v.iter().all(|x| *x != 0.0))
        .collect()
}

pub fn correlate(rows: &[MunicipalityRow]) -> CorrelationReport {
    let complete = complete_cases(rows);
    let columns: Vec<Vec<f64>> = (0..LABELS.len()).map(|i| complete.iter().map(|v| v[i]).collect()).collect();
    let matrix = correlation_matrix(&columns);
    info!(rows = rows.len(), complete = complete.len(), "computed correlation matrix");
    CorrelationReport {
        labels: LABELS.iter().map(|s| (*s).to_owned()).collect(),
        matrix,
        rows_total: rows.len(),
        rows_used: complete.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::MunicipalityPart;
    use crate::crs::{Crs, UtmZone};
    use crate::hotspots::Hotspot;
    use crate::indicators::IndicatorRecord;
    use approx::assert_relative_eq;
    use geo::{polygon, MultiPolygon, Polygon};
    use geojson::JsonObject;

    const UTM: Crs = Crs::Utm(UtmZone { zone: 23, south: true });

    fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
        polygon![(x: x, y: y), (x: x + side, y: y), (x: x + side, y: y + side), (x: x, y: y + side)]
    }

    fn part(name: &str, geometry: Polygon<f64>) -> MunicipalityPart {
        MunicipalityPart {
            code: name.to_lowercase(),
            name: name.to_owned(),
            properties: JsonObject::new(),
            geometry,
            area_km2: None,
        }
    }

    fn hotspot(geometry: Polygon<f64>) -> Hotspot {
        Hotspot {
            geometry: MultiPolygon(vec![geometry]),
            biome: "Cerrado".to_owned(),
            municipality_code: String::new(),
            month: "agosto".to_owned(),
            attributes: JsonObject::new(),
        }
    }

    fn row(p: Option<f64>, g: Option<f64>, h: Option<f64>) -> MunicipalityRow {
        MunicipalityRow { code: String::new(), name: String::new(), population: p, gdp_per_capita: g, hectares: h }
    }

    #[test]
    fn hotspots_are_summed_per_intersecting_part() {
        let boundaries = BoundaryLayer {
            crs: UTM,
            parts: vec![part("A", square(0.0, 0.0, 1000.0)), part("B", square(5000.0, 0.0, 1000.0))],
        };
        let hotspots = HotspotLayer {
            crs: UTM,
            // 1 ha inside A, 4 ha across its corner, one outside both.
            hotspots: vec![
                hotspot(square(100.0, 100.0, 100.0)),
                hotspot(square(900.0, 900.0, 200.0)),
                hotspot(square(3000.0, 3000.0, 100.0)),
            ],
        };
        let sums = join_hotspots(&boundaries, &hotspots).unwrap();
        assert_relative_eq!(sums[0].unwrap(), 5.0, max_relative = 1e-9);
        assert_eq!(sums[1], None);
    }

    #[test]
    fn rows_take_first_indicator_match_and_truncate() {
        let boundaries = BoundaryLayer { crs: UTM, parts: vec![part("A", square(0.0, 0.0, 1000.0))] };
        let hotspots = HotspotLayer { crs: UTM, hotspots: vec![hotspot(square(0.0, 0.0, 100.0))] };
        let indicators = IndicatorTable {
            records: vec![
                IndicatorRecord { municipality: "A".to_owned(), gdp_per_capita: Some(30512.7), population: Some(7000.9) },
                IndicatorRecord { municipality: "A".to_owned(), gdp_per_capita: Some(1.0), population: Some(1.0) },
            ],
        };
        let rows = build_rows(&boundaries, &hotspots, &indicators).unwrap();
        assert_eq!(rows[0].population, Some(7000.0));
        assert_eq!(rows[0].gdp_per_capita, Some(30512.0));
    }

    #[test]
    fn complete_cases_drop_missing_and_zero_values() {
        let rows = vec![
            row(Some(1.0), Some(2.0), Some(3.0)),
            row(None, Some(2.0), Some(3.0)),
            row(Some(1.0), Some(0.0), Some(3.0)),
            row(Some(1.0), Some(2.0), None),
            row(Some(4.0), Some(5.0), Some(6.0)),
        ];
        let kept = complete_cases(&rows);
        assert_eq!(kept, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(kept.iter().flatten().all(|v| *v != 0.0));
    }

    #[test]
    fn too_few_rows_yield_nan() {
        let report = correlate(&[row(Some(1.0), Some(2.0), Some(3.0))]);
        assert_eq!(report.rows_used, 1);
        assert!(report.matrix.iter().flatten().all(|v| v.is_nan()));
    }

    #[test]
    fn correlation_over_complete_rows() {
        let rows = vec![
            row(Some(100.0), Some(10.0), Some(1.0)),
            row(Some(200.0), Some(20.0), Some(2.0)),
            row(Some(300.0), Some(10.0), Some(3.0)),
            row(Some(400.0), None, Some(9.0)),
        ];
        let report = correlate(&rows);
        assert_eq!(report.labels, LABELS);
        assert_eq!((report.rows_total, report.rows_used), (4, 3));
        assert_relative_eq!(report.matrix[0][2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(report.matrix[0][1], 0.0, epsilon = 1e-12);
    }
}
