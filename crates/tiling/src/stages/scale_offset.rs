//! Linear unit conversion over tile values.

use serde::Deserialize;

use ingest_common::{Dataset, IngestResult, Tile, TilePayload};

use crate::chain::TileStage;
use crate::stages::parse_params;

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct ScaleOffsetParams {
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    offset: f64,
    /// Restrict the conversion to one variable; all values otherwise.
    #[serde(default)]
    variable: Option<String>,
}

/// Applies `v * scale + offset` to measurement values
/// (e.g. Kelvin to Celsius with `offset: -273.15`).
pub struct ScaleOffset {
    scale: f32,
    offset: f32,
    variable: Option<String>,
}

impl ScaleOffset {
    pub fn from_params(params: &serde_json::Value) -> IngestResult<Self> {
        let p: ScaleOffsetParams = parse_params("scale_offset", params)?;
        Ok(Self {
            scale: p.scale as f32,
            offset: p.offset as f32,
            variable: p.variable,
        })
    }

    fn matches(&self, variable: &str) -> bool {
        self.variable.as_deref().map_or(true, |v| v == variable)
    }

    fn convert(&self, values: &mut [f32]) {
        for v in values.iter_mut() {
            *v = *v * self.scale + self.offset;
        }
    }
}

impl TileStage for ScaleOffset {
    fn name(&self) -> &'static str {
        "scale_offset"
    }

    fn apply(&self, mut tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
        if let Some(payload) = tile.payload.as_mut() {
            match payload {
                TilePayload::Grid(p) if self.matches(&p.variable) => {
                    self.convert(&mut p.values.values)
                }
                TilePayload::Swath(p) if self.matches(&p.variable) => {
                    self.convert(&mut p.values.values)
                }
                TilePayload::NativeGrid(p) if self.matches(&p.variable) => {
                    self.convert(&mut p.values.values)
                }
                TilePayload::TimeSeries(p) if self.matches(&p.variable) => {
                    self.convert(&mut p.values.values)
                }
                TilePayload::MultiVariable(vars) => {
                    for var in vars.iter_mut().filter(|v| self.matches(&v.variable)) {
                        self.convert(&mut var.values.values);
                    }
                }
                _ => {}
            }
        }
        Ok(Some(tile))
    }
}
