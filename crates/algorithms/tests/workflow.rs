//! End-to-end: read stream lines and a DEM from files, build a network,
//! drape it, and discretize it on a MODFLOW grid.

use approx::assert_relative_eq;
use std::fs;
use std::path::Path;
use swn_algorithms::modflow::{ModelGrid, SegmentDataParams, SfrNetwork, SfrParams};
use swn_algorithms::network::{ProfileParams, SurfaceWaterNetwork};
use swn_algorithms::spatial::interp_2d_to_3d;
use swn_core::io::{read_ascii_grid, read_geojson};
use swn_core::vector::LineStringZ;
use tempfile::TempDir;

const LINES_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "EPSG:2193"}},
  "features": [
    {"type": "Feature", "id": 0, "properties": {"name": "main"},
     "geometry": {"type": "LineString", "coordinates": [[60, 100], [60, 80]]}},
    {"type": "Feature", "id": 1, "properties": {"name": "left"},
     "geometry": {"type": "LineString", "coordinates": [[40, 130], [60, 100]]}},
    {"type": "Feature", "id": 2, "properties": {"name": "right"},
     "geometry": {"type": "LineString", "coordinates": [[70, 130], [60, 100]]}}
  ]
}"#;

const DEM_ASC: &str = "\
ncols        2
nrows        3
xllcorner    30.0
yllcorner    70.0
cellsize     20.0
NODATA_value -9999
15 15
14 14
13 13
";

fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let lines = dir.join("lines.geojson");
    let dem = dir.join("dem.asc");
    fs::write(&lines, LINES_GEOJSON).unwrap();
    fs::write(&dem, DEM_ASC).unwrap();
    (lines, dem)
}

fn draped_network(dir: &Path) -> SurfaceWaterNetwork {
    let (lines_path, dem_path) = write_fixtures(dir);
    let fc = read_geojson(&lines_path).unwrap();
    let n2d = SurfaceWaterNetwork::from_features(&fc, None, None).unwrap();
    assert!(!n2d.has_z());

    let dem = read_ascii_grid(&dem_path).unwrap();
    let lines: Vec<LineStringZ> = n2d.segments().iter().map(|s| s.geometry.clone()).collect();
    let draped = interp_2d_to_3d(&lines, &dem).unwrap();
    let keyed = n2d.segnums().into_iter().zip(draped).collect();
    let mut n = SurfaceWaterNetwork::from_lines(keyed, None).unwrap();
    n.set_crs(n2d.crs().cloned());
    n
}

#[test]
fn read_and_build() {
    let dir = TempDir::new().unwrap();
    let (lines_path, _) = write_fixtures(dir.path());
    let fc = read_geojson(&lines_path).unwrap();
    let n = SurfaceWaterNetwork::from_features(&fc, None, None).unwrap();
    assert_eq!(n.len(), 3);
    assert_eq!(n.headwater(), vec![1, 2]);
    assert_eq!(n.outlets(), vec![0]);
    assert!(n.warnings.is_empty() && n.errors.is_empty());
    assert!(n.crs().is_some());
}

#[test]
fn drape_and_adjust_profile() {
    let dir = TempDir::new().unwrap();
    let mut n = draped_network(dir.path());
    assert!(n.has_z());
    assert!(n.warnings.is_empty(), "{:?}", n.warnings);
    let z0 = n.segment(0).unwrap().geometry.z().unwrap().to_vec();
    assert_relative_eq!(z0[0], 14.0, epsilon = 1e-9);
    assert_relative_eq!(z0[1], 13.0, epsilon = 1e-9);

    n.adjust_elevation_profile(&ProfileParams::default()).unwrap();
    assert!(n.messages.is_empty());
    assert_eq!(n.profiles().unwrap().len(), 3);
}

#[test]
fn sfr_from_dem_grid() {
    let dir = TempDir::new().unwrap();
    let n = draped_network(dir.path());
    let dem = read_ascii_grid(dir.path().join("dem.asc")).unwrap();
    let grid = ModelGrid::from_raster(&dem).unwrap();

    let mut sfr = SfrNetwork::from_network(&n, grid, &SfrParams::default()).unwrap();
    assert_eq!(sfr.reaches().len(), 7);
    sfr.default_segment_data(&SegmentDataParams::default()).unwrap();
    let data = sfr.segment_data().unwrap();
    assert_eq!(data.len(), 3);
    assert!(data.iter().all(|d| d.width1 == 10.0));
    assert_relative_eq!(data[2].elevdn, 13.25, epsilon = 1e-9);

    let incisions = sfr.fix_segment_elevs(0.2, 1e-4, None).unwrap();
    assert!(incisions.iter().all(|(up, _)| *up >= 0.2 - 1e-9));
    let data = sfr.segment_data().unwrap();
    for sd in &data[..2] {
        assert_eq!(sd.outseg, 3);
        assert!(sd.elevup > sd.elevdn);
        assert!(sd.elevdn > data[2].elevup);
    }
    sfr.reconcile_reach_strtop().unwrap();

    let out = dir.path().join("reaches.json");
    fs::write(&out, serde_json::to_string_pretty(sfr.reaches()).unwrap()).unwrap();
    let back: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(back.as_array().unwrap().len(), 7);
    assert_eq!(back[0]["segnum"], 1);
    assert!(back[0].get("geometry").is_none());
    assert!(back[0].get("divid").is_none());
}
