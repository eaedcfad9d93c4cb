//! File helpers shared by every stage.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geojson::{FeatureCollection, GeoJson, JsonValue};
use tracing::{debug, trace};

use crate::error::{CanopyError, Result};

/// Text form of a scalar attribute. Integral floats print without a
/// fractional part so numeric codes compare equal to their string form.
pub fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{f:.0}")),
            _ => Some(n.to_string()),
        },
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Fail fast when a stage's input artifact is absent.
pub fn require_artifact(artifact: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CanopyError::MissingArtifact { artifact, path: path.to_path_buf() })
    }
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| CanopyError::io(dir, e))
        }
        _ => Ok(()),
    }
}

pub fn parse_feature_collection(bytes: &[u8]) -> Result<FeatureCollection> {
    let geo = GeoJson::from_reader(bytes)?;
    Ok(FeatureCollection::try_from(geo)?)
}

pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    debug!(?path, "reading geojson");
    let file = File::open(path).map_err(|e| CanopyError::io(path, e))?;
    let geo = GeoJson::from_reader(BufReader::new(file))?;
    trace!(?path, "parsed geojson");
    Ok(FeatureCollection::try_from(geo)?)
}

pub fn write_feature_collection(path: &Path, fc: &FeatureCollection) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| CanopyError::io(path, e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, fc)?;
    out.flush().map_err(|e| CanopyError::io(path, e))?;
    debug!(?path, features = fc.features.len(), "wrote geojson");
    Ok(())
}

pub fn write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| CanopyError::io(path, e))
}
