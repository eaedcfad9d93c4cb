//! Stage 2b: merge the monthly hotspot GeoPackages into one UTM layer.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, MultiPolygon, Rect};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::crs::{reproject, Crs, UtmZone};
use crate::error::{CanopyError, Result};
use crate::geometry::{area_km2, to_multipolygon, union_bounds};
use crate::gpkg::read_features;
use crate::io::{json_text, write_feature_collection};

pub const BIOME_ATTRIBUTE: &str = "Bioma";
pub const CODE_ATTRIBUTE: &str = "NuFis";
pub const MONTH_ATTRIBUTE: &str = "mes";

const GPKG_EXTENSION: &str = "gpkg";

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Hotspot {
    pub geometry: MultiPolygon<f64>,
    pub biome: String,
    /// Municipality fiscal code.
    pub municipality_code: String,
    pub month: String,
    /// Every other source column, carried through to the merged output.
    pub attributes: JsonObject,
}

#[derive(Debug, Clone)]
pub struct HotspotLayer {
    pub crs: Crs,
    pub hotspots: Vec<Hotspot>,
}

impl HotspotLayer {
    pub fn bounds(&self) -> Option<Rect<f64>> {
        union_bounds(self.hotspots.iter().filter_map(|h| h.geometry.bounding_rect()))
    }

    pub fn reproject(&self, to: Crs) -> Result<Self> {
        let hotspots = self
            .hotspots
            .iter()
            .map(|h| Ok(Hotspot { geometry: reproject(&h.geometry, self.crs, to)?, ..h.clone() }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { crs: to, hotspots })
    }

    /// Per-hotspot area in km². Only meaningful in a metric system.
    pub fn areas_km2(&self) -> Result<Vec<f64>> {
        if self.crs.is_geographic() {
            return Err(CanopyError::ProjectionEstimate(
                "hotspot areas require a projected layer".to_owned(),
            ));
        }
        Ok(self.hotspots.iter().map(|h| area_km2(&h.geometry)).collect())
    }
}

// ── Sources ──────────────────────────────────────────────────────────────────

/// Configured hotspot sources resolved against `data_dir`, in configuration
/// order and paired with their month. Every configured source must exist and
/// every GeoPackage found in `data_dir` must be one of them.
pub fn discover_sources(config: &PipelineConfig) -> Result<Vec<(PathBuf, String)>> {
    let mut sources = Vec::with_capacity(config.hotspot_sources.len());
    let mut configured = Vec::with_capacity(config.hotspot_sources.len());
    for source in &config.hotspot_sources {
        let path = config.resolve(&source.file);
        if !path.is_file() {
            return Err(CanopyError::MissingArtifact { artifact: "hotspot geopackage", path });
        }
        configured.push(fs::canonicalize(&path).map_err(|e| CanopyError::io(&path, e))?);
        sources.push((path, source.month.clone()));
    }

    let dir = &config.data_dir;
    let entries = fs::read_dir(dir).map_err(|e| CanopyError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CanopyError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == GPKG_EXTENSION) {
            found.push(path);
        }
    }
    found.sort();
    for path in found {
        let canonical = fs::canonicalize(&path).map_err(|e| CanopyError::io(&path, e))?;
        if !configured.contains(&canonical) {
            return Err(CanopyError::UnmappedSource { path });
        }
    }
    Ok(sources)
}

fn take_text(attributes: &mut JsonObject, key: &str) -> String {
    attributes.remove(key).as_ref().and_then(json_text).unwrap_or_default()
}

/// Read one GeoPackage, convert it to geographic coordinates and tag every
/// record with `month`.
pub fn load_source(path: &Path, month: &str) -> Result<HotspotLayer> {
    let table = read_features(path)?;
    let mut hotspots = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        let Some(geometry) = row.geometry else {
            warn!(?path, "hotspot without geometry skipped");
            continue;
        };
        let geometry = reproject(&to_multipolygon(geometry)?, table.crs, Crs::Geographic)?;
        let mut attributes = row.attributes;
        let biome = take_text(&mut attributes, BIOME_ATTRIBUTE);
        let municipality_code = take_text(&mut attributes, CODE_ATTRIBUTE);
        hotspots.push(Hotspot {
            geometry,
            biome,
            municipality_code,
            month: month.to_owned(),
            attributes,
        });
    }
    info!(?path, %month, hotspots = hotspots.len(), epsg = table.crs.epsg(), "loaded hotspot source");
    Ok(HotspotLayer { crs: Crs::Geographic, hotspots })
}

/// Concatenate layers and project the result into the UTM zone that best
/// fits the combined extent.
pub fn merge(layers: Vec<HotspotLayer>) -> Result<HotspotLayer> {
    let mut hotspots = Vec::new();
    for layer in layers {
        let geographic = if layer.crs.is_geographic() { layer } else { layer.reproject(Crs::Geographic)? };
        hotspots.extend(geographic.hotspots);
    }
    let merged = HotspotLayer { crs: Crs::Geographic, hotspots };
    let bounds = merged
        .bounds()
        .ok_or_else(|| CanopyError::ProjectionEstimate("no hotspot geometries to merge".to_owned()))?;
    let zone = UtmZone::estimate(bounds)?;
    debug!(epsg = zone.epsg(), hotspots = merged.hotspots.len(), "estimated hotspot projection");
    merged.reproject(Crs::Utm(zone))
}

/// Discover, load and merge every configured hotspot source.
pub fn merge_hotspots(config: &PipelineConfig) -> Result<HotspotLayer> {
    let layers = discover_sources(config)?
        .iter()
        .map(|(path, month)| load_source(path, month))
        .collect::<Result<Vec<_>>>()?;
    merge(layers)
}

// ── Persistence ──────────────────────────────────────────────────────────────

fn to_feature(h: &Hotspot) -> Feature {
    let mut properties = h.attributes.clone();
    properties.insert(BIOME_ATTRIBUTE.to_owned(), JsonValue::from(h.biome.clone()));
    properties.insert(CODE_ATTRIBUTE.to_owned(), JsonValue::from(h.municipality_code.clone()));
    properties.insert(MONTH_ATTRIBUTE.to_owned(), JsonValue::from(h.month.clone()));
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&h.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Write the layer as GeoJSON in its own CRS. Projected layers carry a
/// named `crs` member so readers do not assume lon/lat.
pub fn write_hotspots(path: &Path, layer: &HotspotLayer) -> Result<()> {
    let foreign_members = if layer.crs.is_geographic() {
        None
    } else {
        let mut m = JsonObject::new();
        m.insert("crs".to_owned(), layer.crs.to_geojson_member());
        Some(m)
    };
    let fc = FeatureCollection {
        bbox: None,
        features: layer.hotspots.iter().map(to_feature).collect(),
        foreign_members,
    };
    write_feature_collection(path, &fc)?;
    info!(?path, epsg = layer.crs.epsg(), hotspots = layer.hotspots.len(), "wrote merged hotspots");
    Ok(())
}
