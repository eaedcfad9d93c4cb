//! Pipeline configuration: every input/output location and constant the three
//! stages use. Built once at process start and passed to each stage.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CanopyError, Result};

/// Municipal boundaries for Minas Gerais (IBGE code 31).
pub const DEFAULT_BOUNDARY_URL: &str =
    "https://raw.githubusercontent.com/tbrugz/geodata-br/master/geojson/geojs-31-mun.json";

// ── Public structs ────────────────────────────────────────────────────────────

/// Header names of the three spreadsheet columns the pipeline keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorColumns {
    pub municipality: String,
    pub gdp_per_capita: String,
    pub population: String,
}

impl Default for IndicatorColumns {
    fn default() -> Self {
        Self {
            municipality: "Município [-]".to_owned(),
            gdp_per_capita: "PIB per capita - R$ [2021]".to_owned(),
            population: "População no último censo - pessoas [2022]".to_owned(),
        }
    }
}

/// One hotspot GeoPackage and the month its records belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotSource {
    /// Relative to `data_dir` unless absolute.
    pub file: PathBuf,
    pub month: String,
}

/// All paths are relative to `data_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub boundary_url: String,
    /// Normalized boundary GeoJSON written by stage 1.
    pub boundary_file: PathBuf,
    pub indicators_spreadsheet: PathBuf,
    pub indicators_csv: PathBuf,
    pub indicator_columns: IndicatorColumns,
    pub hotspot_sources: Vec<HotspotSource>,
    /// Merged hotspots, written in the estimated UTM projection.
    pub hotspot_output: PathBuf,
    /// Months reported by the statistics and the monthly chart, in order.
    pub report_months: Vec<String>,
    pub summary_output: PathBuf,
    pub correlation_output: PathBuf,
    /// Unified table written by stage 2c, one row per hotspot
    /// (`area_km2,Bioma,NuFis,mes`).
    pub unified_export: PathBuf,
    /// Externally supplied stage-3 table. Never written by the pipeline;
    /// when unset, stage 3 reads `unified_export`.
    pub unified_csv: Option<PathBuf>,
    pub charts_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dados"),
            boundary_url: DEFAULT_BOUNDARY_URL.to_owned(),
            boundary_file: PathBuf::from("municipios-mg.geojson"),
            indicators_spreadsheet: PathBuf::from("task_02/ibge_mg.xlsx"),
            indicators_csv: PathBuf::from("populacao-pib-municipios-mg.csv"),
            indicator_columns: IndicatorColumns::default(),
            hotspot_sources: vec![
                HotspotSource {
                    file: PathBuf::from("desmatamento_ago22.gpkg"),
                    month: "agosto".to_owned(),
                },
                HotspotSource {
                    file: PathBuf::from("desmatamento_set_22.gpkg"),
                    month: "setembro".to_owned(),
                },
            ],
            hotspot_output: PathBuf::from("focos-desmatamento-mg.geojson"),
            report_months: vec!["agosto".to_owned(), "setembro".to_owned()],
            summary_output: PathBuf::from("task_02/resumo-desmatamento.json"),
            correlation_output: PathBuf::from("task_02/correlation_matrix.svg"),
            unified_export: PathBuf::from("task_02/focos-desmatamento-unificados.csv"),
            unified_csv: None,
            charts_dir: PathBuf::from("task_03"),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CanopyError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve a configured path against `data_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Stage-3 input: the externally supplied table when one is configured,
    /// otherwise the table exported by stage 2c.
    pub fn chart_input(&self) -> PathBuf {
        match &self.unified_csv {
            Some(path) => self.resolve(path),
            None => self.resolve(&self.unified_export),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_data_dir() {
        let cfg = PipelineConfig { data_dir: PathBuf::from("/srv/dados"), ..Default::default() };
        assert_eq!(
            cfg.resolve(&cfg.boundary_file),
            PathBuf::from("/srv/dados/municipios-mg.geojson")
        );
        assert_eq!(cfg.resolve(Path::new("/tmp/x.csv")), PathBuf::from("/tmp/x.csv"));
    }

    #[test]
    fn chart_input_prefers_the_external_table() {
        let mut cfg = PipelineConfig { data_dir: PathBuf::from("/srv/dados"), ..Default::default() };
        assert_eq!(cfg.chart_input(), PathBuf::from("/srv/dados/task_02/focos-desmatamento-unificados.csv"));
        cfg.unified_csv = Some(PathBuf::from("desmatamentoDadosUnificados.csv"));
        assert_eq!(cfg.chart_input(), PathBuf::from("/srv/dados/desmatamentoDadosUnificados.csv"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{ "data_dir": "elsewhere", "report_months": ["agosto"] }"#)
                .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("elsewhere"));
        assert_eq!(cfg.report_months, vec!["agosto".to_owned()]);
        assert_eq!(cfg.boundary_url, DEFAULT_BOUNDARY_URL);
        assert_eq!(cfg.hotspot_sources.len(), 2);
        assert_eq!(cfg.unified_csv, None);

        let cfg: PipelineConfig =
            serde_json::from_str(r#"{ "unified_csv": "desmatamentoDadosUnificados.csv" }"#).unwrap();
        assert_eq!(cfg.unified_csv, Some(PathBuf::from("desmatamentoDadosUnificados.csv")));
    }
}
