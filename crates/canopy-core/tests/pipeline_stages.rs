use std::fs;
use std::path::{Path, PathBuf};

use canopy_core::boundary::{explode, normalize, write_boundaries};
use canopy_core::crs::{Crs, UtmZone};
use canopy_core::indicators::{IndicatorRecord, IndicatorTable};
use canopy_core::io::parse_feature_collection;
use canopy_core::unified::read_unified_csv;
use canopy_core::{CanopyError, Pipeline, PipelineConfig};
use rusqlite::{params, Connection};

const MUNICIPALITIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"id": "3106200", "name": "Belo Horizonte"},
         "geometry": {"type": "Polygon", "coordinates":
            [[[-44.00, -19.90], [-43.95, -19.90], [-43.95, -19.85], [-44.00, -19.85], [-44.00, -19.90]]]}},
        {"type": "Feature", "properties": {"id": "3100104", "name": "Abadia dos Dourados"},
         "geometry": {"type": "Polygon", "coordinates":
            [[[-47.40, -18.50], [-47.35, -18.50], [-47.35, -18.45], [-47.40, -18.45], [-47.40, -18.50]]]}},
        {"type": "Feature", "properties": {"id": "3100203", "name": "Abaeté"},
         "geometry": {"type": "Polygon", "coordinates":
            [[[-45.45, -19.20], [-45.40, -19.20], [-45.40, -19.15], [-45.45, -19.15], [-45.45, -19.20]]]}}
    ]
}"#;

type Ring = [(f64, f64); 5];

fn square(x: f64, y: f64, side: f64) -> Ring {
    [(x, y), (x + side, y), (x + side, y + side), (x, y + side), (x, y)]
}

fn wkb(ring: &Ring) -> Vec<u8> {
    let mut out = vec![1u8];
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for (x, y) in ring {
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
    }
    out
}

fn write_gpkg(path: &Path, rows: &[(&str, &str, Ring)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT, srs_id INTEGER PRIMARY KEY,
             organization TEXT, organization_coordsys_id INTEGER, definition TEXT);
         CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT);
         CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT,
             geometry_type_name TEXT, srs_id INTEGER, z INTEGER, m INTEGER);
         CREATE TABLE focos (fid INTEGER PRIMARY KEY, geom BLOB, Bioma TEXT, NuFis TEXT);
         INSERT INTO gpkg_spatial_ref_sys VALUES ('SIRGAS 2000', 4674, 'EPSG', 4674, '');
         INSERT INTO gpkg_contents VALUES ('focos', 'features');
         INSERT INTO gpkg_geometry_columns VALUES ('focos', 'geom', 'POLYGON', 4674, 0, 0);",
    )
    .unwrap();
    for (biome, code, ring) in rows {
        let mut blob = b"GP\x00\x01".to_vec();
        blob.extend_from_slice(&4674i32.to_le_bytes());
        blob.extend_from_slice(&wkb(ring));
        conn.execute("INSERT INTO focos (geom, Bioma, NuFis) VALUES (?1, ?2, ?3)", params![blob, biome, code])
            .unwrap();
    }
}

fn indicators() -> IndicatorTable {
    let rec = |name: &str, gdp: f64, pop: f64| IndicatorRecord {
        municipality: name.to_owned(),
        gdp_per_capita: Some(gdp),
        population: Some(pop),
    };
    IndicatorTable {
        records: vec![
            rec("Belo Horizonte", 42000.3, 2315560.0),
            rec("Abadia dos Dourados", 30512.7, 7000.0),
            rec("Abaeté", 25000.0, 22675.0),
        ],
    }
}

fn prepare(dir: &Path) -> PipelineConfig {
    let config = PipelineConfig { data_dir: dir.to_path_buf(), ..PipelineConfig::default() };

    let layer = normalize(explode(parse_feature_collection(MUNICIPALITIES.as_bytes()).unwrap()).unwrap()).unwrap();
    write_boundaries(&config.resolve(&config.boundary_file), &layer).unwrap();

    write_gpkg(
        &dir.join("desmatamento_ago22.gpkg"),
        &[
            ("Mata Atlântica", "3106200", square(-43.98, -19.88, 0.01)),
            ("Cerrado", "3100104", square(-47.38, -18.48, 0.005)),
        ],
    );
    write_gpkg(
        &dir.join("desmatamento_set_22.gpkg"),
        &[("Cerrado", "3100104", square(-47.39, -18.49, 0.01)), ("Cerrado", "3100203", square(-45.44, -19.19, 0.002))],
    );
    config
}

#[test]
fn analysis_and_charts_run_offline() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(prepare(dir.path()));
    let config = pipeline.config().clone();

    let hotspots = pipeline.stage_hotspots().unwrap();
    assert_eq!(hotspots.layer.crs, Crs::Utm(UtmZone { zone: 23, south: true }));
    assert_eq!(hotspots.layer.hotspots.len(), 4);
    assert!(hotspots.path.ends_with("focos-desmatamento-mg.geojson"));

    let summary = pipeline.stage_statistics(&hotspots).unwrap();
    let agosto = summary.hectares_for("agosto").unwrap();
    let setembro = summary.hectares_for("setembro").unwrap();
    assert!(agosto > 0.0 && setembro > 0.0);
    // 0.01° squares near 19° S are roughly 1.05 km × 1.1 km.
    assert!(setembro > 100.0 && setembro < 140.0, "got {setembro}");
    assert!(config.resolve(&config.summary_output).is_file());
    let total_km2: f64 = summary.biome_km2.values().sum();
    let municipal_km2: f64 = summary.municipality_km2.values().sum();
    assert!((total_km2 - municipal_km2).abs() < 1e-9);

    let unified = pipeline.stage_unified_export(&hotspots).unwrap();
    assert_eq!(unified.records.len(), 4);

    let report = pipeline.stage_correlation(&hotspots, &indicators()).unwrap();
    assert_eq!(report.rows_total, 3);
    assert_eq!(report.rows_used, 3);
    assert!((report.matrix[0][0] - 1.0).abs() < 1e-12);
    assert!(config.resolve(&config.correlation_output).is_file());

    let reread = pipeline.load_unified(&unified.path).unwrap();
    assert_eq!(reread.records.len(), unified.records.len());
    let charts = pipeline.stage_visualize(&reread).unwrap();
    for path in charts.paths() {
        assert!(path.is_file(), "missing chart {}", path.display());
        assert!(path.starts_with(config.resolve(&config.charts_dir)));
    }
}

#[test]
fn stages_fail_fast_on_missing_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig { data_dir: dir.path().to_path_buf(), ..PipelineConfig::default() };
    let pipeline = Pipeline::new(config);

    assert!(matches!(pipeline.stage_indicators(), Err(CanopyError::MissingArtifact { .. })));
    assert!(matches!(pipeline.stage_hotspots(), Err(CanopyError::MissingArtifact { .. })));
    let err = pipeline.load_unified(&dir.path().join("desmatamentoDadosUnificados.csv")).unwrap_err();
    assert!(matches!(err, CanopyError::MissingArtifact { artifact: "unified hotspot table", .. }));
}

#[test]
fn correlation_requires_the_boundary_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepare(dir.path());
    std::fs::remove_file(config.resolve(&config.boundary_file)).unwrap();
    let pipeline = Pipeline::new(config);

    let hotspots = pipeline.stage_hotspots().unwrap();
    let err = pipeline.stage_correlation(&hotspots, &indicators()).unwrap_err();
    assert!(matches!(err, CanopyError::MissingArtifact { artifact: "municipal boundaries", .. }));
}

const EXTERNAL_TABLE: &str = "area_km2,Bioma,NuFis,mes\n9.0,Pampa,4300000,outubro\n";

#[test]
fn external_unified_table_survives_the_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = prepare(dir.path());
    config.unified_csv = Some(PathBuf::from("desmatamentoDadosUnificados.csv"));
    let external = config.resolve(Path::new("desmatamentoDadosUnificados.csv"));
    fs::write(&external, EXTERNAL_TABLE).unwrap();
    let pipeline = Pipeline::new(config.clone());

    let analysis = pipeline.analyze(&indicators(), |_| {}).unwrap();
    assert_eq!(fs::read_to_string(&external).unwrap(), EXTERNAL_TABLE);
    assert_eq!(analysis.chart_input.path, external);
    assert_eq!(analysis.chart_input.records.len(), 1);
    assert_eq!(analysis.chart_input.records[0].biome, "Pampa");

    assert_eq!(analysis.unified.path, config.resolve(&config.unified_export));
    assert_eq!(read_unified_csv(&analysis.unified.path).unwrap().len(), 4);
}

#[test]
fn export_never_overwrites_the_external_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = prepare(dir.path());
    config.unified_csv = Some(PathBuf::from("desmatamentoDadosUnificados.csv"));
    config.unified_export = PathBuf::from("desmatamentoDadosUnificados.csv");
    let external = config.chart_input();
    fs::write(&external, EXTERNAL_TABLE).unwrap();
    let pipeline = Pipeline::new(config);

    let hotspots = pipeline.stage_hotspots().unwrap();
    let unified = pipeline.stage_unified_export(&hotspots).unwrap();
    assert_eq!(unified.records.len(), 4);
    assert_eq!(fs::read_to_string(&external).unwrap(), EXTERNAL_TABLE);
}

#[test]
fn summary_is_reported_before_later_stages_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = prepare(dir.path());
    config.unified_csv = Some(PathBuf::from("absent.csv"));
    let pipeline = Pipeline::new(config);

    let mut reported = None;
    let err = pipeline.analyze(&indicators(), |summary| reported = Some(summary.clone())).unwrap_err();
    assert!(matches!(err, CanopyError::MissingArtifact { artifact: "unified hotspot table", .. }));
    let summary = reported.expect("summary reported before stage 3");
    assert!(summary.hectares_for("agosto").unwrap() > 0.0);
}
