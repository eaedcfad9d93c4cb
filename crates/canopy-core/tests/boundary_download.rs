use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use canopy_core::boundary::{fetch_boundaries, AREA_PROPERTY};
use canopy_core::crs::Crs;
use canopy_core::io::read_feature_collection;
use canopy_core::{CanopyError, Pipeline, PipelineConfig};

const MUNICIPALITIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"id": "3106200", "name": "Belo Horizonte"},
         "geometry": {"type": "Polygon", "coordinates":
            [[[-44.00, -19.90], [-43.95, -19.90], [-43.95, -19.85], [-44.00, -19.85], [-44.00, -19.90]]]}},
        {"type": "Feature", "properties": {"id": "3100104", "name": "Abadia dos Dourados"},
         "geometry": {"type": "MultiPolygon", "coordinates": [
            [[[-47.40, -18.50], [-47.35, -18.50], [-47.35, -18.45], [-47.40, -18.45], [-47.40, -18.50]]],
            [[[-47.30, -18.50], [-47.28, -18.50], [-47.28, -18.48], [-47.30, -18.48], [-47.30, -18.50]]]]}}
    ]
}"#;

/// Answer exactly one HTTP request with `status` and `body`; returns the URL.
fn serve_once(status: &'static str, body: &'static str) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1");
    std::env::set_var("no_proxy", "127.0.0.1");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{addr}/geojs-31-mun.json")
}

#[test]
fn non_success_status_is_an_http_error() {
    let url = serve_once("404 Not Found", "{}");
    assert!(matches!(fetch_boundaries(&url), Err(CanopyError::Http(_))));
}

#[test]
fn non_feature_collection_body_is_rejected() {
    let url = serve_once("200 OK", r#"{"type": "Point", "coordinates": [-44.0, -19.0]}"#);
    assert!(matches!(fetch_boundaries(&url), Err(CanopyError::GeoJson(_))));
}

#[test]
fn malformed_body_is_rejected() {
    let url = serve_once("200 OK", "<html>not geojson</html>");
    assert!(matches!(fetch_boundaries(&url), Err(CanopyError::GeoJson(_))));
}

#[test]
fn stage_one_writes_measured_geographic_parts() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        data_dir: dir.path().to_path_buf(),
        boundary_url: serve_once("200 OK", MUNICIPALITIES),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config);

    let artifact = pipeline.stage_boundaries().unwrap();
    assert_eq!(artifact.layer.crs, Crs::Geographic);
    assert_eq!(artifact.layer.parts.len(), 3);
    assert_eq!(artifact.layer.municipality_count(), 2);

    let fc = read_feature_collection(&artifact.path).unwrap();
    assert_eq!(Crs::from_geojson_members(fc.foreign_members.as_ref()).unwrap(), Crs::Geographic);
    assert_eq!(fc.features.len(), 3);
    for feature in &fc.features {
        let area = feature.property(AREA_PROPERTY).and_then(|v| v.as_f64()).unwrap();
        assert!(area > 0.0 && area < 100.0, "area {area}");
        let geometry = geo::Geometry::<f64>::try_from(feature.geometry.clone().unwrap()).unwrap();
        let rect = geo::BoundingRect::bounding_rect(&geometry).unwrap();
        assert!(rect.min().x > -48.0 && rect.max().y < -18.0, "not lon/lat: {rect:?}");
    }
}
