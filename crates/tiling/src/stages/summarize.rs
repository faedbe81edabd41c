//! Computes the searchable summary of a tile: value stats and bounds.

use ingest_common::{Dataset, IngestResult, Tile, TileStats};

use crate::chain::TileStage;

/// Fills `summary.stats` (finite min/max/mean/count) and `summary.bbox`
/// from the tile payload. Runs late in the chain so it sees converted
/// values.
pub struct Summarize;

impl TileStage for Summarize {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn apply(&self, mut tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
        let Some(payload) = tile.payload.as_ref() else {
            return Ok(Some(tile));
        };

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut count = 0u64;

        for block in payload.blocks() {
            for &v in block.values.iter().filter(|v| v.is_finite()) {
                let v = v as f64;
                min = min.min(v);
                max = max.max(v);
                sum += v;
                count += 1;
            }
        }

        tile.summary.stats = (count > 0).then(|| TileStats {
            min,
            max,
            mean: sum / count as f64,
            count,
        });
        tile.summary.bbox = payload.bbox();

        Ok(Some(tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::{
        ArrayDataset, DimSlice, GridPayload, NumericBlock, TilePayload, TileSpec,
    };

    fn dataset() -> ArrayDataset {
        ArrayDataset::new(vec![("lat".to_string(), 3)])
    }

    fn grid_tile(values: Vec<f32>) -> Tile {
        let mut tile = Tile::skeleton(
            "ds",
            "g.json",
            TileSpec::new(vec![DimSlice::new("lat", 0, 3)]),
            &["sst".to_string()],
        );
        tile.payload = Some(TilePayload::Grid(GridPayload {
            variable: "sst".to_string(),
            latitudes: vec![-10.0, 0.0, 10.0],
            longitudes: vec![45.0],
            time: Some(1_767_225_600),
            values: NumericBlock::new(vec![values.len()], values),
        }));
        tile
    }

    #[test]
    fn test_stats_skip_non_finite_values() {
        let tile = Summarize
            .apply(grid_tile(vec![1.0, f32::NAN, 3.0]), &dataset())
            .unwrap()
            .unwrap();

        let stats = tile.summary.stats.unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn test_bbox_from_coords() {
        let tile = Summarize
            .apply(grid_tile(vec![1.0, 2.0, 3.0]), &dataset())
            .unwrap()
            .unwrap();

        let bbox = tile.summary.bbox.unwrap();
        assert_eq!(bbox.min_lat, -10.0);
        assert_eq!(bbox.max_lat, 10.0);
        assert_eq!(bbox.min_lon, 45.0);
        assert_eq!(bbox.max_lon, 45.0);
    }

    #[test]
    fn test_all_nan_leaves_no_stats() {
        let tile = Summarize
            .apply(grid_tile(vec![f32::NAN, f32::NAN, f32::NAN]), &dataset())
            .unwrap()
            .unwrap();
        assert!(tile.summary.stats.is_none());
    }
}
