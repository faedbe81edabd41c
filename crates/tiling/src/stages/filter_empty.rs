//! Drops tiles with no usable data.

use ingest_common::{Dataset, IngestResult, Tile};

use crate::chain::TileStage;

/// Drops any tile whose payload holds no finite value (or no payload at
/// all). Ocean-masked and fill-only sections never reach the stores.
pub struct FilterEmpty;

impl TileStage for FilterEmpty {
    fn name(&self) -> &'static str {
        "filter_empty"
    }

    fn apply(&self, tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
        let empty = tile.payload.as_ref().map_or(true, |p| p.is_empty());
        if empty {
            Ok(None)
        } else {
            Ok(Some(tile))
        }
    }
}
