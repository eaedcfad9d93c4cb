//! Polygon helpers shared by the boundary and hotspot stages.
//! Area helpers assume metric (projected) coordinates.

use geo::{Area, BoundingRect, Geometry, MultiPolygon, Polygon, Rect};

use crate::error::{CanopyError, Result};

pub const M2_PER_KM2: f64 = 1_000_000.0;
pub const M2_PER_HECTARE: f64 = 10_000.0;
pub const HECTARES_PER_KM2: f64 = 100.0;

/// Flatten any polygonal geometry into its single-part polygons.
/// Points and lines are dropped.
pub fn only_polys(geometries: impl IntoIterator<Item = Geometry<f64>>) -> Vec<Polygon<f64>> {
    geometries
        .into_iter()
        .filter_map(|g| match g {
            Geometry::Polygon(p) => Some(vec![p]),
            Geometry::MultiPolygon(mp) => Some(mp.0),
            Geometry::GeometryCollection(gc) => Some(only_polys(gc)),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Promote a polygonal geometry to a multipolygon. Other types are rejected.
pub fn to_multipolygon(geometry: Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        other => Err(CanopyError::UnsupportedGeometry(geometry_name(&other).to_owned())),
    }
}

pub fn geometry_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Area in km² of a geometry in metric coordinates.
pub fn area_km2<G: Area<f64>>(g: &G) -> f64 {
    g.unsigned_area() / M2_PER_KM2
}

/// Area in hectares of a geometry in metric coordinates.
pub fn area_hectares<G: Area<f64>>(g: &G) -> f64 {
    g.unsigned_area() / M2_PER_HECTARE
}

/// Smallest rectangle covering every input box. `None` when the input is empty.
pub fn union_bounds(rects: impl IntoIterator<Item = Rect<f64>>) -> Option<Rect<f64>> {
    rects.into_iter().reduce(|a, b| {
        Rect::new(
            geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        )
    })
}

/// Combined extent of a set of polygons.
pub fn polygons_bounds<'a>(polys: impl IntoIterator<Item = &'a Polygon<f64>>) -> Option<Rect<f64>> {
    union_bounds(polys.into_iter().filter_map(|p| p.bounding_rect()))
}
