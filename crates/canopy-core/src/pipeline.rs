//! Stage orchestration: boundaries, hotspot analysis and report charts, with
//! typed artifacts passed from one stage to the next.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::boundary::{self, BoundaryLayer};
use crate::charts::{self, ChartSet};
use crate::config::PipelineConfig;
use crate::correlation::{self, CorrelationReport};
use crate::error::Result;
use crate::hotspots::{self, HotspotLayer};
use crate::indicators::{self, IndicatorTable};
use crate::io::{require_artifact, write_json_pretty};
use crate::stats::{self, HotspotSummary};
use crate::unified::{self, UnifiedRecord};

// ── Stage artifacts ───────────────────────────────────────────────────────────

/// Normalized municipal boundaries and where they were written.
#[derive(Debug, Clone)]
pub struct BoundaryArtifact {
    pub path: PathBuf,
    pub layer: BoundaryLayer,
}

/// Merged hotspots in their metric projection.
#[derive(Debug, Clone)]
pub struct HotspotArtifact {
    pub path: PathBuf,
    pub layer: HotspotLayer,
}

/// The stage-3 input table.
#[derive(Debug, Clone)]
pub struct UnifiedArtifact {
    pub path: PathBuf,
    pub records: Vec<UnifiedRecord>,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub boundaries: PathBuf,
    pub municipalities: usize,
    pub indicators_csv: PathBuf,
    pub hotspots: PathBuf,
    pub hotspot_count: usize,
    pub summary: HotspotSummary,
    pub summary_path: PathBuf,
    pub unified: PathBuf,
    /// Table the charts were rendered from.
    pub chart_input: PathBuf,
    pub correlation: CorrelationReport,
    pub correlation_path: PathBuf,
    pub charts: ChartSet,
}

/// Outputs of stages 2b through 3.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub hotspots: HotspotArtifact,
    pub summary: HotspotSummary,
    pub unified: UnifiedArtifact,
    pub correlation: CorrelationReport,
    pub chart_input: UnifiedArtifact,
    pub charts: ChartSet,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs the three stages in order. Every stage reads its inputs from disk
/// and fails with `MissingArtifact` when one is absent.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PipelineReport> {
        self.run_with(|_| {})
    }

    /// Like [`Pipeline::run`], handing the stage-2c summary to `on_summary`
    /// as soon as it is computed.
    pub fn run_with(&self, on_summary: impl FnMut(&HotspotSummary)) -> Result<PipelineReport> {
        // ── 1. Boundaries ───────────────────────────────────────────────────
        let boundaries = self.stage_boundaries()?;

        // ── 2a. Indicators ──────────────────────────────────────────────────
        let indicator_table = self.stage_indicators()?;

        let analysis = self.analyze(&indicator_table, on_summary)?;

        Ok(PipelineReport {
            boundaries: boundaries.path,
            municipalities: boundaries.layer.municipality_count(),
            indicators_csv: self.config.resolve(&self.config.indicators_csv),
            hotspots: analysis.hotspots.path,
            hotspot_count: analysis.hotspots.layer.hotspots.len(),
            summary: analysis.summary,
            summary_path: self.config.resolve(&self.config.summary_output),
            unified: analysis.unified.path,
            chart_input: analysis.chart_input.path,
            correlation: analysis.correlation,
            correlation_path: self.config.resolve(&self.config.correlation_output),
            charts: analysis.charts,
        })
    }

    /// Stages 2b through 3, given the stage-2a indicators and a stage-1
    /// boundary file on disk.
    pub fn analyze(
        &self,
        indicator_table: &IndicatorTable,
        mut on_summary: impl FnMut(&HotspotSummary),
    ) -> Result<Analysis> {
        // ── 2b. Hotspots ────────────────────────────────────────────────────
        let hotspots = self.stage_hotspots()?;

        // ── 2c. Statistics and unified export ───────────────────────────────
        let summary = self.stage_statistics(&hotspots)?;
        on_summary(&summary);
        let unified = self.stage_unified_export(&hotspots)?;

        // ── 2d. Correlation ─────────────────────────────────────────────────
        let correlation = self.stage_correlation(&hotspots, indicator_table)?;

        // ── 3. Charts ───────────────────────────────────────────────────────
        let chart_input = self.load_unified(&self.config.chart_input())?;
        let charts = self.stage_visualize(&chart_input)?;

        Ok(Analysis { hotspots, summary, unified, correlation, chart_input, charts })
    }

    /// Stage 1: download, explode, measure and persist the boundaries.
    pub fn stage_boundaries(&self) -> Result<BoundaryArtifact> {
        let fc = boundary::fetch_boundaries(&self.config.boundary_url)?;
        let layer = boundary::normalize(boundary::explode(fc)?)?;
        let path = self.config.resolve(&self.config.boundary_file);
        boundary::write_boundaries(&path, &layer)?;
        info!(municipalities = layer.municipality_count(), parts = layer.parts.len(), "stage 1 complete");
        Ok(BoundaryArtifact { path, layer })
    }

    /// Stage 2a.
    pub fn stage_indicators(&self) -> Result<IndicatorTable> {
        let sheet = self.config.resolve(&self.config.indicators_spreadsheet);
        require_artifact("indicator spreadsheet", &sheet)?;
        let table = indicators::load_indicators(&sheet, &self.config.indicator_columns)?;
        let csv = self.config.resolve(&self.config.indicators_csv);
        indicators::write_indicators_csv(&csv, &table, &self.config.indicator_columns)?;
        Ok(table)
    }

    /// Stage 2b.
    pub fn stage_hotspots(&self) -> Result<HotspotArtifact> {
        let layer = hotspots::merge_hotspots(&self.config)?;
        let path = self.config.resolve(&self.config.hotspot_output);
        hotspots::write_hotspots(&path, &layer)?;
        Ok(HotspotArtifact { path, layer })
    }

    /// Stage 2c: aggregate and persist the summary.
    pub fn stage_statistics(&self, hotspots: &HotspotArtifact) -> Result<HotspotSummary> {
        let summary = stats::summarize(&hotspots.layer, &self.config.report_months)?;
        let path = self.config.resolve(&self.config.summary_output);
        write_json_pretty(&path, &summary)?;
        for (month, hectares) in &summary.month_hectares {
            info!(%month, hectares, "deforested area");
        }
        info!(?path, "wrote hotspot summary");
        Ok(summary)
    }

    /// Export the unified table to `unified_export`. An externally supplied
    /// table at the same location is left untouched.
    pub fn stage_unified_export(&self, hotspots: &HotspotArtifact) -> Result<UnifiedArtifact> {
        let records = unified::records_from_layer(&hotspots.layer)?;
        let path = self.config.resolve(&self.config.unified_export);
        let external = self.config.unified_csv.as_ref().map(|p| self.config.resolve(p));
        if external.as_ref() == Some(&path) {
            warn!(?path, "unified export targets the external stage-3 table; not overwritten");
        } else {
            unified::write_unified_csv(&path, &records)?;
        }
        Ok(UnifiedArtifact { path, records })
    }

    /// Stage 2d: join against the boundary file written by stage 1.
    pub fn stage_correlation(&self, hotspots: &HotspotArtifact, indicator_table: &IndicatorTable) -> Result<CorrelationReport> {
        let path = self.config.resolve(&self.config.boundary_file);
        require_artifact("municipal boundaries", &path)?;
        let boundaries = boundary::read_boundaries(&path)?;
        let rows = correlation::build_rows(&boundaries, &hotspots.layer, indicator_table)?;
        let report = correlation::correlate(&rows);
        charts::correlation_heatmap(&self.config.resolve(&self.config.correlation_output), &report)?;
        Ok(report)
    }

    /// Read the unified table from `path`.
    pub fn load_unified(&self, path: &Path) -> Result<UnifiedArtifact> {
        require_artifact("unified hotspot table", path)?;
        let records = unified::read_unified_csv(path)?;
        Ok(UnifiedArtifact { path: path.to_path_buf(), records })
    }

    /// Stage 3.
    pub fn stage_visualize(&self, unified: &UnifiedArtifact) -> Result<ChartSet> {
        let dir = self.config.resolve(&self.config.charts_dir);
        charts::render_all(&dir, &unified.records, &self.config.report_months)
    }
}
