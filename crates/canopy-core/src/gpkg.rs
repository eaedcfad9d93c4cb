//! Minimal GeoPackage feature reader.
//!
//! Reads the first feature table listed in `gpkg_contents`, resolves its SRS,
//! and decodes geometry blobs (GeoPackage binary header + WKB). Z and M
//! ordinates are read and discarded.
//!
//! Blob layout:
//!   "GP" | version u8 | flags u8 | srs_id i32 | envelope (0/32/48/64 B) | WKB
//! flags: bit 0 = header byte order (1 = little endian),
//!        bits 1–3 = envelope kind, bit 4 = empty geometry.

use std::path::Path;

use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::{JsonObject, JsonValue};
use rusqlite::{types::ValueRef, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, trace};

use crate::crs::Crs;
use crate::error::{CanopyError, Result};

/// Primary-key column, not carried as an attribute.
const FID_COLUMN: &str = "fid";

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GpkgRow {
    /// `None` for NULL or empty geometries.
    pub geometry: Option<Geometry<f64>>,
    pub attributes: JsonObject,
}

#[derive(Debug, Clone)]
pub struct GpkgTable {
    pub name: String,
    pub crs: Crs,
    pub rows: Vec<GpkgRow>,
}

// ── Reader ───────────────────────────────────────────────────────────────────

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn resolve_crs(conn: &Connection, srs_id: i64) -> Result<Crs> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let code = match row {
        Some((org, id)) if org.eq_ignore_ascii_case("EPSG") => id,
        _ => srs_id,
    };
    Crs::from_epsg(code)
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Read every row of the first feature table in a GeoPackage.
pub fn read_features(path: &Path) -> Result<GpkgTable> {
    debug!(?path, "opening geopackage");
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let (table, geom_column, srs_id): (String, String, i64) = conn
        .query_row(
            "SELECT c.table_name, g.column_name, g.srs_id \
             FROM gpkg_contents c JOIN gpkg_geometry_columns g ON g.table_name = c.table_name \
             WHERE c.data_type = 'features' ORDER BY c.table_name LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| {
            CanopyError::MalformedGeometry(format!("{} has no feature table", path.display()))
        })?;
    let crs = resolve_crs(&conn, srs_id)?;
    debug!(%table, %geom_column, srs_id, "resolved feature table");

    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(&table)))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut geometry = None;
        let mut attributes = JsonObject::new();
        for (i, name) in names.iter().enumerate() {
            let value = row.get_ref(i)?;
            if name == &geom_column {
                if let ValueRef::Blob(blob) = value {
                    geometry = decode_geometry_blob(blob)?;
                }
            } else if !name.eq_ignore_ascii_case(FID_COLUMN) {
                attributes.insert(name.clone(), to_json(value));
            }
        }
        out.push(GpkgRow { geometry, attributes });
    }
    trace!(%table, rows = out.len(), "read geopackage rows");

    Ok(GpkgTable { name: table, crs, rows: out })
}

// ── Geometry blobs ───────────────────────────────────────────────────────────

/// Decode a GeoPackage geometry blob. Empty geometries decode to `None`.
pub fn decode_geometry_blob(blob: &[u8]) -> Result<Option<Geometry<f64>>> {
    if blob.len() < 8 || &blob[..2] != b"GP" {
        return Err(CanopyError::MalformedGeometry("missing GeoPackage blob magic".to_owned()));
    }
    let flags = blob[3];
    if flags & 0b1_0000 != 0 {
        return Ok(None);
    }
    let envelope = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(CanopyError::MalformedGeometry(format!("invalid envelope indicator {other}")))
        }
    };
    let start = 8 + envelope;
    if blob.len() <= start {
        return Err(CanopyError::MalformedGeometry("truncated GeoPackage header".to_owned()));
    }
    decode_wkb(&blob[start..]).map(Some)
}

/// Decode an ISO or extended WKB geometry.
pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>> {
    let mut reader = WkbReader { buf: bytes, pos: 0, little: true };
    reader.geometry()
}

struct WkbReader<'a> {
    buf: &'a [u8],
    pos: usize,
    little: bool,
}

/// Ordinate layout of one geometry.
#[derive(Clone, Copy)]
struct Dims {
    extra: usize,
}

impl<'a> WkbReader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| CanopyError::MalformedGeometry(format!("WKB truncated at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take::<4>()?;
        Ok(if self.little { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take::<8>()?;
        Ok(if self.little { f64::from_le_bytes(b) } else { f64::from_be_bytes(b) })
    }

    fn coord(&mut self, dims: Dims) -> Result<Coord<f64>> {
        let x = self.f64()?;
        let y = self.f64()?;
        for _ in 0..dims.extra {
            self.f64()?;
        }
        Ok(Coord { x, y })
    }

    fn ring(&mut self, dims: Dims) -> Result<LineString<f64>> {
        let n = self.u32()? as usize;
        let mut coords = Vec::with_capacity(n.min(1 << 16));
        for _ in 0..n {
            coords.push(self.coord(dims)?);
        }
        Ok(LineString(coords))
    }

    fn polygon_body(&mut self, dims: Dims) -> Result<Polygon<f64>> {
        let n = self.u32()? as usize;
        let mut rings = Vec::with_capacity(n.min(1 << 10));
        for _ in 0..n {
            rings.push(self.ring(dims)?);
        }
        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap_or_else(|| LineString(Vec::new()));
        Ok(Polygon::new(exterior, rings.collect()))
    }

    /// Read a nested geometry and require a specific variant.
    fn members<T>(&mut self, extract: fn(Geometry<f64>) -> Option<T>, what: &str) -> Result<Vec<T>> {
        let n = self.u32()? as usize;
        let mut out = Vec::with_capacity(n.min(1 << 10));
        for _ in 0..n {
            let g = self.geometry()?;
            out.push(extract(g).ok_or_else(|| {
                CanopyError::MalformedGeometry(format!("unexpected member inside {what}"))
            })?);
        }
        Ok(out)
    }

    fn geometry(&mut self) -> Result<Geometry<f64>> {
        self.little = match self.u8()? {
            0 => false,
            1 => true,
            other => return Err(CanopyError::MalformedGeometry(format!("bad WKB byte order {other}"))),
        };
        let raw = self.u32()?;

        // EWKB high-bit flags.
        let ewkb_z = raw & 0x8000_0000 != 0;
        let ewkb_m = raw & 0x4000_0000 != 0;
        if raw & 0x2000_0000 != 0 {
            self.u32()?; // embedded SRID
        }
        let iso = raw & 0x0FFF_FFFF;
        let (kind, iso_dims) = (iso % 1000, iso / 1000);
        let extra = match iso_dims {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(CanopyError::MalformedGeometry(format!("bad WKB type {raw}"))),
        } + usize::from(ewkb_z)
            + usize::from(ewkb_m);
        let dims = Dims { extra };

        Ok(match kind {
            1 => Geometry::Point(Point(self.coord(dims)?)),
            2 => Geometry::LineString(self.ring(dims)?),
            3 => Geometry::Polygon(self.polygon_body(dims)?),
            4 => Geometry::MultiPoint(MultiPoint(self.members(
                |g| if let Geometry::Point(p) = g { Some(p) } else { None },
                "MultiPoint",
            )?)),
            5 => Geometry::MultiLineString(MultiLineString(self.members(
                |g| if let Geometry::LineString(l) = g { Some(l) } else { None },
                "MultiLineString",
            )?)),
            6 => Geometry::MultiPolygon(MultiPolygon(self.members(
                |g| if let Geometry::Polygon(p) = g { Some(p) } else { None },
                "MultiPolygon",
            )?)),
            7 => Geometry::GeometryCollection(GeometryCollection(self.members(Some, "GeometryCollection")?)),
            other => return Err(CanopyError::UnsupportedGeometry(format!("WKB type {other}"))),
        })
    }
}
