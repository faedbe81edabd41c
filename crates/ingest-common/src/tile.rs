//! Tiles: bounded sub-blocks of a granule, the unit of storage and indexing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spec::TileSpec;

/// Namespace for deterministic tile ids. The same logical tile keeps the
/// same id across re-ingestion of the same granule.
const TILE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8f1c_62d4_41a7_4c6e_9d0b_53e8_a2f7_19c3);

/// Derive the stable id for a tile from its identity seed:
/// dataset name, granule name, variable names, and section spec.
pub fn tile_id(dataset: &str, granule: &str, variables: &[String], spec: &TileSpec) -> Uuid {
    let seed = format!("{}!{}!{}!{}", dataset, granule, variables.join(","), spec);
    Uuid::new_v5(&TILE_ID_NAMESPACE, seed.as_bytes())
}

/// Geographic bounds of a tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Bounds of a coordinate pair set; `None` when no finite coordinates exist.
    pub fn from_coords(lats: &[f64], lons: &[f64]) -> Option<Self> {
        let (min_lat, max_lat) = finite_min_max(lats)?;
        let (min_lon, max_lon) = finite_min_max(lons)?;
        Some(Self::new(min_lat, max_lat, min_lon, max_lon))
    }
}

fn finite_min_max(values: &[f64]) -> Option<(f64, f64)> {
    let mut bounds: Option<(f64, f64)> = None;
    for &v in values.iter().filter(|v| v.is_finite()) {
        bounds = Some(match bounds {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    bounds
}

/// Summary statistics over a tile's measurement values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Number of finite values contributing to the stats.
    pub count: u64,
}

/// The searchable description of a tile, written to the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileSummary {
    pub tile_id: Uuid,
    pub dataset_name: String,
    /// Basename of the source granule.
    pub granule: String,
    pub section_spec: TileSpec,
    pub bbox: Option<BoundingBox>,
    pub stats: Option<TileStats>,
}

/// An n-dimensional block of measurement values (row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericBlock {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NumericBlock {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        Self { shape, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the block holds at least one finite value.
    pub fn has_data(&self) -> bool {
        self.values.iter().any(|v| v.is_finite())
    }
}

/// An n-dimensional block of coordinate values (row-major, f64).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordBlock {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl CoordBlock {
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        Self { shape, values }
    }
}

/// Regular grid section: 1-D latitude/longitude axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPayload {
    pub variable: String,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Epoch seconds of the section, when the granule carries a time axis.
    pub time: Option<i64>,
    pub values: NumericBlock,
}

/// Scan-geometry section: per-cell latitude/longitude/time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwathPayload {
    pub variable: String,
    pub latitudes: CoordBlock,
    pub longitudes: CoordBlock,
    pub times: Vec<i64>,
    pub values: NumericBlock,
}

/// Model-native grid section: values indexed on the model's own tile
/// geometry (face + per-cell coordinates) rather than a regular axis pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeGridPayload {
    pub variable: String,
    pub face: u32,
    pub latitudes: CoordBlock,
    pub longitudes: CoordBlock,
    pub time: Option<i64>,
    pub values: NumericBlock,
}

/// Time-series section: one value sequence per fixed location set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPayload {
    pub variable: String,
    pub times: Vec<i64>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: NumericBlock,
}

/// One named variable's values inside a multi-variable tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablePayload {
    pub variable: String,
    pub values: NumericBlock,
}

/// Tile measurement data. Exactly one geometry per tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TilePayload {
    Grid(GridPayload),
    Swath(SwathPayload),
    NativeGrid(NativeGridPayload),
    TimeSeries(TimeSeriesPayload),
    MultiVariable(Vec<VariablePayload>),
}

impl TilePayload {
    /// All measurement blocks in the payload.
    pub fn blocks(&self) -> Vec<&NumericBlock> {
        match self {
            TilePayload::Grid(p) => vec![&p.values],
            TilePayload::Swath(p) => vec![&p.values],
            TilePayload::NativeGrid(p) => vec![&p.values],
            TilePayload::TimeSeries(p) => vec![&p.values],
            TilePayload::MultiVariable(vars) => vars.iter().map(|v| &v.values).collect(),
        }
    }

    /// Mutable access to all measurement blocks.
    pub fn blocks_mut(&mut self) -> Vec<&mut NumericBlock> {
        match self {
            TilePayload::Grid(p) => vec![&mut p.values],
            TilePayload::Swath(p) => vec![&mut p.values],
            TilePayload::NativeGrid(p) => vec![&mut p.values],
            TilePayload::TimeSeries(p) => vec![&mut p.values],
            TilePayload::MultiVariable(vars) => vars.iter_mut().map(|v| &mut v.values).collect(),
        }
    }

    /// Geographic bounds of the payload's coordinates, when it has any.
    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            TilePayload::Grid(p) => BoundingBox::from_coords(&p.latitudes, &p.longitudes),
            TilePayload::Swath(p) => {
                BoundingBox::from_coords(&p.latitudes.values, &p.longitudes.values)
            }
            TilePayload::NativeGrid(p) => {
                BoundingBox::from_coords(&p.latitudes.values, &p.longitudes.values)
            }
            TilePayload::TimeSeries(p) => BoundingBox::from_coords(&p.latitudes, &p.longitudes),
            TilePayload::MultiVariable(_) => None,
        }
    }

    /// True when no block holds a finite value.
    pub fn is_empty(&self) -> bool {
        !self.blocks().iter().any(|b| b.has_data())
    }
}

/// A tile: summary plus (once a read stage has run) measurement data.
///
/// Created as a skeleton by the executor, filled progressively by the
/// processor chain, serialized at every store boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub summary: TileSummary,
    pub payload: Option<TilePayload>,
}

impl Tile {
    /// Build an unfilled tile for one section of a granule.
    pub fn skeleton(
        dataset_name: &str,
        granule: &str,
        section_spec: TileSpec,
        variables: &[String],
    ) -> Self {
        let id = tile_id(dataset_name, granule, variables, &section_spec);
        Self {
            summary: TileSummary {
                tile_id: id,
                dataset_name: dataset_name.to_string(),
                granule: granule.to_string(),
                section_spec,
                bbox: None,
                stats: None,
            },
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DimSlice;

    fn spec() -> TileSpec {
        TileSpec::new(vec![
            DimSlice::new("lat", 0, 180),
            DimSlice::new("lon", 0, 360),
        ])
    }

    #[test]
    fn test_tile_id_deterministic() {
        let vars = vec!["sst".to_string()];
        let a = tile_id("avhrr_oi", "20260101.json", &vars, &spec());
        let b = tile_id("avhrr_oi", "20260101.json", &vars, &spec());
        assert_eq!(a, b);
    }

    #[test]
    fn test_tile_id_distinguishes_identity_parts() {
        let vars = vec!["sst".to_string()];
        let base = tile_id("avhrr_oi", "20260101.json", &vars, &spec());

        assert_ne!(base, tile_id("mur_sst", "20260101.json", &vars, &spec()));
        assert_ne!(base, tile_id("avhrr_oi", "20260102.json", &vars, &spec()));
        assert_ne!(
            base,
            tile_id("avhrr_oi", "20260101.json", &["ice".to_string()], &spec())
        );
    }

    #[test]
    fn test_payload_empty_detection() {
        let empty = TilePayload::Grid(GridPayload {
            variable: "sst".to_string(),
            latitudes: vec![0.0, 1.0],
            longitudes: vec![0.0],
            time: None,
            values: NumericBlock::new(vec![2, 1], vec![f32::NAN, f32::NAN]),
        });
        assert!(empty.is_empty());

        let full = TilePayload::Grid(GridPayload {
            variable: "sst".to_string(),
            latitudes: vec![0.0, 1.0],
            longitudes: vec![0.0],
            time: None,
            values: NumericBlock::new(vec![2, 1], vec![f32::NAN, 281.5]),
        });
        assert!(!full.is_empty());
    }

    #[test]
    fn test_native_grid_payload_bounds_and_blocks() {
        let payload = TilePayload::NativeGrid(NativeGridPayload {
            variable: "theta".to_string(),
            face: 3,
            latitudes: CoordBlock::new(vec![2, 2], vec![60.0, 60.5, 61.0, 61.5]),
            longitudes: CoordBlock::new(vec![2, 2], vec![-40.0, -39.5, -40.0, -39.5]),
            time: Some(1_767_225_600),
            values: NumericBlock::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]),
        });

        let bbox = payload.bbox().unwrap();
        assert_eq!(bbox.min_lat, 60.0);
        assert_eq!(bbox.max_lat, 61.5);
        assert_eq!(bbox.min_lon, -40.0);
        assert_eq!(bbox.max_lon, -39.5);
        assert_eq!(payload.blocks().len(), 1);
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_time_series_payload_bounds() {
        let payload = TilePayload::TimeSeries(TimeSeriesPayload {
            variable: "ssh".to_string(),
            times: vec![0, 3600, 7200],
            latitudes: vec![12.5],
            longitudes: vec![130.0],
            values: NumericBlock::new(vec![3, 1, 1], vec![0.1, 0.2, 0.3]),
        });

        let bbox = payload.bbox().unwrap();
        assert_eq!(bbox.min_lat, 12.5);
        assert_eq!(bbox.max_lon, 130.0);
    }

    #[test]
    fn test_bbox_ignores_non_finite_coords() {
        let bbox = BoundingBox::from_coords(&[f64::NAN, -10.0, 40.0], &[5.0, 15.0]).unwrap();
        assert_eq!(bbox.min_lat, -10.0);
        assert_eq!(bbox.max_lat, 40.0);
        assert_eq!(bbox.min_lon, 5.0);
        assert_eq!(bbox.max_lon, 15.0);
    }
}
