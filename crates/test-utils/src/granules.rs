//! Granule fixtures for the JSON granule format.

use std::path::{Path, PathBuf};

use ingest_common::{ArrayDataset, GranuleDocument};

/// A lat/lon grid dataset with an `sst` variable. Values count up
/// row-major from 280.0; the north-east quadrant is NaN so empty-tile
/// filtering has something to drop.
pub fn global_grid_dataset(lat_len: u64, lon_len: u64) -> ArrayDataset {
    let lats: Vec<f64> = (0..lat_len)
        .map(|i| -90.0 + 180.0 * (i as f64 + 0.5) / lat_len as f64)
        .collect();
    let lons: Vec<f64> = (0..lon_len)
        .map(|i| -180.0 + 360.0 * (i as f64 + 0.5) / lon_len as f64)
        .collect();

    let mut values = Vec::with_capacity((lat_len * lon_len) as usize);
    for i in 0..lat_len {
        for j in 0..lon_len {
            if i >= lat_len / 2 && j >= lon_len / 2 {
                values.push(f64::NAN);
            } else {
                values.push(280.0 + (i * lon_len + j) as f64 * 0.01);
            }
        }
    }

    ArrayDataset::new(vec![("lat".to_string(), lat_len), ("lon".to_string(), lon_len)])
        .with_variable("lat", &["lat"], lats)
        .unwrap()
        .with_variable("lon", &["lon"], lons)
        .unwrap()
        .with_variable("sst", &["lat", "lon"], values)
        .unwrap()
}

/// Write a dataset as a JSON granule file and return its path.
pub fn write_granule(dir: &Path, name: &str, dataset: &ArrayDataset) -> PathBuf {
    let path = dir.join(name);
    let doc = GranuleDocument::from_dataset(dataset);
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
    path
}
