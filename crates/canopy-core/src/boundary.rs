//! Stage 1: municipal boundary acquisition and normalization.
//!
//! Fetch → explode multi-part features → estimate UTM zone → reproject →
//! area in km² → back to lon/lat → GeoJSON.

use std::path::Path;

use geo::Polygon;
use geojson::{feature::Id, Feature, FeatureCollection, JsonObject, JsonValue};
use tracing::{debug, info, warn};

use crate::crs::{reproject, Crs, UtmZone};
use crate::error::{CanopyError, Result};
use crate::geometry::{area_km2, only_polys, polygons_bounds};
use crate::io::{json_text, parse_feature_collection, read_feature_collection, write_feature_collection};

/// Property holding the municipality fiscal (IBGE) code.
pub const CODE_PROPERTY: &str = "id";
pub const NAME_PROPERTY: &str = "name";
pub const AREA_PROPERTY: &str = "area_km2";

// ── Types ────────────────────────────────────────────────────────────────────

/// One single-part polygon of a municipality.
#[derive(Debug, Clone)]
pub struct MunicipalityPart {
    pub code: String,
    pub name: String,
    /// Source feature properties, written back unchanged.
    pub properties: JsonObject,
    pub geometry: Polygon<f64>,
    pub area_km2: Option<f64>,
}

/// Municipality parts in one coordinate system.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    pub crs: Crs,
    pub parts: Vec<MunicipalityPart>,
}

// ── Acquisition ──────────────────────────────────────────────────────────────

/// Download the boundary FeatureCollection. Non-2xx responses are errors.
pub fn fetch_boundaries(url: &str) -> Result<FeatureCollection> {
    info!(%url, "downloading municipal boundaries");
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let body = response.bytes()?;
    debug!(bytes = body.len(), "downloaded boundary document");
    parse_feature_collection(&body)
}

fn feature_code(feature: &Feature) -> String {
    feature
        .property(CODE_PROPERTY)
        .and_then(json_text)
        .or_else(|| match &feature.id {
            Some(Id::String(s)) => Some(s.clone()),
            Some(Id::Number(n)) => Some(n.to_string()),
            None => None,
        })
        .unwrap_or_default()
}

/// Split every feature into its single-part polygons, each carrying the
/// parent's identity. Features without polygonal geometry are skipped.
pub fn explode(fc: FeatureCollection) -> Result<Vec<MunicipalityPart>> {
    let mut parts = Vec::with_capacity(fc.features.len());
    for feature in fc.features {
        let code = feature_code(&feature);
        let name = feature
            .property(NAME_PROPERTY)
            .and_then(json_text)
            .unwrap_or_default();
        let area_km2 = feature.property(AREA_PROPERTY).and_then(JsonValue::as_f64);
        let Some(geometry) = feature.geometry else {
            warn!(%code, %name, "feature without geometry skipped");
            continue;
        };
        let geometry = geo::Geometry::<f64>::try_from(geometry)?;
        let polys = only_polys(std::iter::once(geometry));
        if polys.is_empty() {
            warn!(%code, %name, "non-polygonal feature skipped");
            continue;
        }
        let properties = feature.properties.unwrap_or_default();
        for polygon in polys {
            parts.push(MunicipalityPart {
                code: code.clone(),
                name: name.clone(),
                properties: properties.clone(),
                geometry: polygon,
                area_km2,
            });
        }
    }
    Ok(parts)
}

// ── Normalization ────────────────────────────────────────────────────────────

impl BoundaryLayer {
    pub fn reproject(&self, to: Crs) -> Result<Self> {
        let parts = self
            .parts
            .iter()
            .map(|p| {
                Ok(MunicipalityPart {
                    geometry: reproject(&p.geometry, self.crs, to)?,
                    ..p.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { crs: to, parts })
    }

    /// Number of distinct municipality codes.
    pub fn municipality_count(&self) -> usize {
        let mut codes: Vec<&str> = self.parts.iter().map(|p| p.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }
}

/// Compute `area_km2` for every geographic part in the best-fit UTM zone and
/// return the layer in geographic coordinates.
pub fn normalize(parts: Vec<MunicipalityPart>) -> Result<BoundaryLayer> {
    let bounds = polygons_bounds(parts.iter().map(|p| &p.geometry))
        .ok_or_else(|| CanopyError::ProjectionEstimate("boundary layer is empty".to_owned()))?;
    let zone = UtmZone::estimate(bounds)?;
    let utm = Crs::Utm(zone);
    debug!(epsg = zone.epsg(), "estimated boundary projection");

    let projected = BoundaryLayer { crs: Crs::Geographic, parts }.reproject(utm)?;
    let measured = BoundaryLayer {
        crs: utm,
        parts: projected
            .parts
            .into_iter()
            .map(|p| MunicipalityPart { area_km2: Some(area_km2(&p.geometry)), ..p })
            .collect(),
    };
    measured.reproject(Crs::Geographic)
}

// ── Persistence ──────────────────────────────────────────────────────────────

fn to_feature(part: &MunicipalityPart) -> Feature {
    let mut properties = part.properties.clone();
    if let Some(area) = part.area_km2 {
        properties.insert(AREA_PROPERTY.to_owned(), JsonValue::from(area));
    }
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&part.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn write_boundaries(path: &Path, layer: &BoundaryLayer) -> Result<()> {
    let foreign_members = if layer.crs.is_geographic() {
        None
    } else {
        let mut m = JsonObject::new();
        m.insert("crs".to_owned(), layer.crs.to_geojson_member());
        Some(m)
    };
    let fc = FeatureCollection {
        bbox: None,
        features: layer.parts.iter().map(to_feature).collect(),
        foreign_members,
    };
    write_feature_collection(path, &fc)?;
    info!(?path, parts = layer.parts.len(), "wrote boundary layer");
    Ok(())
}

/// Load a boundary file written by [`write_boundaries`], exploding any
/// multi-part features.
pub fn read_boundaries(path: &Path) -> Result<BoundaryLayer> {
    let fc = read_feature_collection(path)?;
    let crs = Crs::from_geojson_members(fc.foreign_members.as_ref())?;
    let parts = explode(fc)?;
    Ok(BoundaryLayer { crs, parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TWO_MUNICIPALITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"id": "3106200", "name": "Belo Horizonte", "description": "Belo Horizonte"},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[-44.00, -19.90], [-43.95, -19.90], [-43.95, -19.85], [-44.00, -19.85], [-44.00, -19.90]]],
                [[[-43.90, -19.90], [-43.88, -19.90], [-43.88, -19.88], [-43.90, -19.88], [-43.90, -19.90]]]
             ]}},
            {"type": "Feature",
             "properties": {"id": 3100104, "name": "Abadia dos Dourados"},
             "geometry": {"type": "Polygon", "coordinates":
                [[[-47.40, -18.50], [-47.35, -18.50], [-47.35, -18.45], [-47.40, -18.45], [-47.40, -18.50]]]
             }}
        ]
    }"#;

    fn sample() -> FeatureCollection {
        parse_feature_collection(TWO_MUNICIPALITIES.as_bytes()).unwrap()
    }

    #[test]
    fn explode_keeps_parent_identity() {
        let fc = sample();
        let n_features = fc.features.len();
        let parts = explode(fc).unwrap();
        assert!(parts.len() >= n_features);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].code, "3106200");
        assert_eq!(parts[1].code, "3106200");
        assert_eq!(parts[1].name, "Belo Horizonte");
        // Numeric codes are kept as text.
        assert_eq!(parts[2].code, "3100104");
    }

    #[test]
    fn normalize_adds_area_and_returns_geographic() {
        let layer = normalize(explode(sample()).unwrap()).unwrap();
        assert_eq!(layer.crs, Crs::Geographic);
        assert_eq!(layer.municipality_count(), 2);
        for part in &layer.parts {
            let area = part.area_km2.unwrap();
            assert!(area > 0.0);
            // Coordinates stay in degrees.
            assert!(part.geometry.exterior().0[0].x > -48.0);
        }
        // 0.05° × 0.05° near 19.9° S is roughly 5.2 km × 5.5 km.
        let big = layer.parts[0].area_km2.unwrap();
        assert!(big > 25.0 && big < 33.0, "got {big}");
        // The small part is 0.02° square, about 16% of the large one.
        assert_relative_eq!(layer.parts[1].area_km2.unwrap() / big, 0.16, max_relative = 0.01);
    }

    #[test]
    fn boundary_file_roundtrip_keeps_area_and_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("municipios.geojson");
        let layer = normalize(explode(sample()).unwrap()).unwrap();
        write_boundaries(&path, &layer).unwrap();

        let back = read_boundaries(&path).unwrap();
        assert_eq!(back.crs, Crs::Geographic);
        assert_eq!(back.parts.len(), 3);
        assert_eq!(back.parts[2].properties.get("name").and_then(|v| v.as_str()), Some("Abadia dos Dourados"));
        assert_relative_eq!(
            back.parts[0].area_km2.unwrap(),
            layer.parts[0].area_km2.unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn normalize_rejects_empty_layer() {
        assert!(matches!(normalize(Vec::new()), Err(CanopyError::ProjectionEstimate(_))));
    }
}
