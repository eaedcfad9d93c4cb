//! Coordinate reference systems: geographic lon/lat and UTM zones.
//!
//! Projection is a transverse Mercator on the WGS84 ellipsoid using the
//! third-order Krüger series, accurate to well under a millimetre inside a
//! zone. SIRGAS 2000 is treated as coincident with WGS84. SAD69 (EPSG 4618)
//! is read as geographic without a datum shift, so its coordinates land
//! roughly 60 m off their WGS84 position; areas are unaffected at that scale.
//! Coordinates follow the GeoJSON convention: `x` = longitude / easting,
//! `y` = latitude / northing.

use geo::{Coord, MapCoords, Rect};
use serde_json::{json, Map, Value};

use crate::error::{CanopyError, Result};

// ── Constants ────────────────────────────────────────────────────────────────

/// WGS84 semi-major axis (m).
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM scale factor on the central meridian.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

// ── Types ────────────────────────────────────────────────────────────────────

/// A UTM zone (1–60) and hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    pub zone: u8,
    pub south: bool,
}

/// The coordinate systems the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326 and its SIRGAS equivalents).
    Geographic,
    Utm(UtmZone),
}

impl UtmZone {
    pub fn new(zone: u8, south: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(CanopyError::ProjectionEstimate(format!("UTM zone {zone} out of range")));
        }
        Ok(Self { zone, south })
    }

    /// Best-fit zone for a geographic extent: the zone holding the extent
    /// centre, southern hemisphere when the centre latitude is negative.
    pub fn estimate(bounds: Rect<f64>) -> Result<Self> {
        let c = bounds.center();
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(CanopyError::ProjectionEstimate(format!(
                "non-finite extent centre ({}, {})",
                c.x, c.y
            )));
        }
        if c.x.abs() > 180.0 || c.y.abs() > 90.0 {
            return Err(CanopyError::ProjectionEstimate(format!(
                "extent centre ({:.4}, {:.4}) is not a longitude/latitude pair",
                c.x, c.y
            )));
        }
        let zone = (((c.x + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Self::new(zone, c.y < 0.0)
    }

    /// EPSG code of the WGS84 / UTM zone.
    pub fn epsg(self) -> i64 {
        let base = if self.south { 32_700 } else { 32_600 };
        base + i64::from(self.zone)
    }

    /// Central meridian in degrees.
    pub fn central_meridian(self) -> f64 {
        f64::from(self.zone) * 6.0 - 183.0
    }

    /// (lon, lat) degrees → (easting, northing) metres.
    pub fn forward(self, lon: f64, lat: f64) -> (f64, f64) {
        TransverseMercator::for_zone(self).forward(lon, lat)
    }

    /// (easting, northing) metres → (lon, lat) degrees.
    pub fn inverse(self, easting: f64, northing: f64) -> (f64, f64) {
        TransverseMercator::for_zone(self).inverse(easting, northing)
    }
}

impl Crs {
    /// Map an EPSG code onto a supported system.
    pub fn from_epsg(code: i64) -> Result<Self> {
        match code {
            4326 | 4674 | 4618 => Ok(Crs::Geographic),
            32_601..=32_660 => Ok(Crs::Utm(UtmZone::new((code - 32_600) as u8, false)?)),
            32_701..=32_760 => Ok(Crs::Utm(UtmZone::new((code - 32_700) as u8, true)?)),
            // SIRGAS 2000 / UTM zones 18S–25S.
            31_978..=31_985 => Ok(Crs::Utm(UtmZone::new((code - 31_960) as u8, true)?)),
            _ => Err(CanopyError::UnsupportedCrs(code)),
        }
    }

    pub fn epsg(self) -> i64 {
        match self {
            Crs::Geographic => 4326,
            Crs::Utm(z) => z.epsg(),
        }
    }

    pub fn is_geographic(self) -> bool {
        matches!(self, Crs::Geographic)
    }

    /// Legacy GeoJSON `crs` member naming this system.
    pub fn to_geojson_member(self) -> Value {
        json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", self.epsg()) }
        })
    }

    /// Read a GeoJSON `crs` member. Absent members mean geographic (RFC 7946).
    pub fn from_geojson_members(members: Option<&Map<String, Value>>) -> Result<Self> {
        let name = members
            .and_then(|m| m.get("crs"))
            .and_then(|crs| crs.pointer("/properties/name"))
            .and_then(Value::as_str);
        let Some(name) = name else {
            return Ok(Crs::Geographic);
        };
        if name.ends_with("CRS84") {
            return Ok(Crs::Geographic);
        }
        let code = name
            .rsplit(':')
            .next()
            .and_then(|c| c.parse::<i64>().ok())
            .ok_or_else(|| CanopyError::ProjectionEstimate(format!("unparseable crs name `{name}`")))?;
        Crs::from_epsg(code)
    }
}

// ── Transverse Mercator ──────────────────────────────────────────────────────

/// Precomputed Krüger series for one zone.
#[derive(Debug, Clone, Copy)]
struct TransverseMercator {
    zone: UtmZone,
    /// k0 · A, the scaled rectifying radius.
    k0_a: f64,
    n: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl TransverseMercator {
    fn for_zone(zone: UtmZone) -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
        Self {
            zone,
            k0_a: UTM_K0 * a,
            n,
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }

    fn false_northing(&self) -> f64 {
        if self.zone.south { UTM_FALSE_NORTHING_SOUTH } else { 0.0 }
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let dl = (lon - self.zone.central_meridian()).to_radians();
        let c = 2.0 * self.n.sqrt() / (1.0 + self.n);

        // Conformal latitude via t = sinh(ψ).
        let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
        let xi_p = t.atan2(dl.cos());
        let eta_p = (dl.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, &a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        (
            UTM_FALSE_EASTING + self.k0_a * eta,
            self.false_northing() + self.k0_a * xi,
        )
    }

    fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let xi = (northing - self.false_northing()) / self.k0_a;
        let eta = (easting - UTM_FALSE_EASTING) / self.k0_a;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, &b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= b * (k * xi).sin() * (k * eta).cosh();
            eta_p -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut phi = chi;
        for (j, &d) in self.delta.iter().enumerate() {
            phi += d * (2.0 * (j + 1) as f64 * chi).sin();
        }
        let dl = eta_p.sinh().atan2(xi_p.cos());

        (self.zone.central_meridian() + dl.to_degrees(), phi.to_degrees())
    }
}

// ── Reprojection ─────────────────────────────────────────────────────────────

/// Transform one coordinate between systems.
pub fn transform(c: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>> {
    if from == to {
        return Ok(c);
    }
    let (lon, lat) = match from {
        Crs::Geographic => (c.x, c.y),
        Crs::Utm(z) => z.inverse(c.x, c.y),
    };
    let (x, y) = match to {
        Crs::Geographic => (lon, lat),
        Crs::Utm(z) => z.forward(lon, lat),
    };
    if !x.is_finite() || !y.is_finite() {
        return Err(CanopyError::ProjectionEstimate(format!(
            "({}, {}) has no image in EPSG:{}",
            c.x,
            c.y,
            to.epsg()
        )));
    }
    Ok(Coord { x, y })
}

/// Reproject any `geo` geometry between systems.
pub fn reproject<G>(geometry: &G, from: Crs, to: Crs) -> Result<G::Output>
where
    G: MapCoords<f64, f64>,
{
    geometry.try_map_coords(|c| transform(c, from, to))
}
