use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Every failure the pipeline can report. Join misses are not errors: they
/// surface as `None` values and are dropped by the complete-cases filter.
#[derive(Debug, Error)]
pub enum CanopyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("GeoPackage query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("spreadsheet {}: {message}", path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stage was asked to read an artifact that an earlier stage (or an
    /// external collaborator) should have produced.
    #[error("missing prerequisite artifact `{artifact}` at {}", path.display())]
    MissingArtifact { artifact: &'static str, path: PathBuf },

    #[error("column `{column}` not found in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("no month mapping configured for hotspot source {}", path.display())]
    UnmappedSource { path: PathBuf },

    #[error("unsupported coordinate reference system EPSG:{0}")]
    UnsupportedCrs(i64),

    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("cannot estimate a metric projection: {0}")]
    ProjectionEstimate(String),

    #[error("chart rendering failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, CanopyError>;

impl CanopyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

impl From<DrawingAreaErrorKind<std::io::Error>> for CanopyError {
    fn from(e: DrawingAreaErrorKind<std::io::Error>) -> Self {
        Self::Render(e.to_string())
    }
}
