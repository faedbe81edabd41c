//! The read stage: fills a skeleton tile from the dataset.

use serde::Deserialize;

use ingest_common::{
    Dataset, Geometry, GridPayload, IngestError, IngestResult, SwathPayload, Tile, TilePayload,
    TimeSeriesPayload, VariablePayload,
};

use crate::chain::TileStage;
use crate::stages::parse_params;

fn default_latitude() -> String {
    "lat".to_string()
}

fn default_longitude() -> String {
    "lon".to_string()
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    #[serde(default)]
    variable: Option<String>,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    geometry: Geometry,
    #[serde(default = "default_latitude")]
    latitude: String,
    #[serde(default = "default_longitude")]
    longitude: String,
    #[serde(default)]
    time: Option<String>,
}

/// Reads the tile's section of one or more variables out of the opened
/// dataset. One variable produces the geometry-specific payload; several
/// produce a multi-variable payload.
pub struct ReadVariables {
    variables: Vec<String>,
    geometry: Geometry,
    latitude: String,
    longitude: String,
    time: Option<String>,
}

impl ReadVariables {
    pub fn from_params(params: &serde_json::Value) -> IngestResult<Self> {
        let p: ReadParams = parse_params("read", params)?;

        let mut variables = p.variables;
        if let Some(single) = p.variable {
            variables.insert(0, single);
        }
        if variables.is_empty() {
            return Err(IngestError::Config(
                "read stage requires 'variable' or 'variables'".to_string(),
            ));
        }

        Ok(Self {
            variables,
            geometry: p.geometry,
            latitude: p.latitude,
            longitude: p.longitude,
            time: p.time,
        })
    }

    fn read_time_scalar(&self, tile: &Tile, dataset: &dyn Dataset) -> IngestResult<Option<i64>> {
        let Some(time_var) = &self.time else {
            return Ok(None);
        };
        let coords = dataset.read_coords(time_var, tile.summary.section_spec.slices())?;
        Ok(coords.values.first().map(|v| *v as i64))
    }

    fn read_times(&self, tile: &Tile, dataset: &dyn Dataset) -> IngestResult<Vec<i64>> {
        let Some(time_var) = &self.time else {
            return Ok(Vec::new());
        };
        let coords = dataset.read_coords(time_var, tile.summary.section_spec.slices())?;
        Ok(coords.values.iter().map(|v| *v as i64).collect())
    }
}

impl TileStage for ReadVariables {
    fn name(&self) -> &'static str {
        "read"
    }

    fn variables(&self) -> Vec<String> {
        self.variables.clone()
    }

    fn apply(&self, mut tile: Tile, dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
        let section = tile.summary.section_spec.slices();

        let payload = if self.variables.len() > 1 {
            let mut vars = Vec::with_capacity(self.variables.len());
            for name in &self.variables {
                vars.push(VariablePayload {
                    variable: name.clone(),
                    values: dataset.read_block(name, section)?,
                });
            }
            TilePayload::MultiVariable(vars)
        } else {
            let variable = self.variables[0].clone();
            let values = dataset.read_block(&variable, section)?;

            match self.geometry {
                Geometry::Grid => TilePayload::Grid(GridPayload {
                    time: self.read_time_scalar(&tile, dataset)?,
                    latitudes: dataset.read_coords(&self.latitude, section)?.values,
                    longitudes: dataset.read_coords(&self.longitude, section)?.values,
                    variable,
                    values,
                }),
                Geometry::Swath => TilePayload::Swath(SwathPayload {
                    times: self.read_times(&tile, dataset)?,
                    latitudes: dataset.read_coords(&self.latitude, section)?,
                    longitudes: dataset.read_coords(&self.longitude, section)?,
                    variable,
                    values,
                }),
                Geometry::TimeSeries => TilePayload::TimeSeries(TimeSeriesPayload {
                    times: self.read_times(&tile, dataset)?,
                    latitudes: dataset.read_coords(&self.latitude, section)?.values,
                    longitudes: dataset.read_coords(&self.longitude, section)?.values,
                    variable,
                    values,
                }),
            }
        };

        tile.payload = Some(payload);
        Ok(Some(tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::{ArrayDataset, DimSlice, TileSpec};

    fn dataset() -> ArrayDataset {
        ArrayDataset::new(vec![("lat".to_string(), 4), ("lon".to_string(), 2)])
            .with_variable("lat", &["lat"], vec![-30.0, -10.0, 10.0, 30.0])
            .unwrap()
            .with_variable("lon", &["lon"], vec![0.0, 90.0])
            .unwrap()
            .with_variable(
                "sst",
                &["lat", "lon"],
                vec![280.0, 281.0, 282.0, 283.0, 284.0, 285.0, 286.0, 287.0],
            )
            .unwrap()
            .with_variable(
                "ice",
                &["lat", "lon"],
                vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7],
            )
            .unwrap()
    }

    fn skeleton(vars: &[String]) -> Tile {
        let spec = TileSpec::new(vec![DimSlice::new("lat", 1, 3), DimSlice::new("lon", 0, 2)]);
        Tile::skeleton("sst_daily", "g.json", spec, vars)
    }

    #[test]
    fn test_grid_read_fills_section() {
        let stage = ReadVariables::from_params(&serde_json::json!({"variable": "sst"})).unwrap();
        let tile = stage
            .apply(skeleton(&stage.variables()), &dataset())
            .unwrap()
            .unwrap();

        let Some(TilePayload::Grid(grid)) = tile.payload else {
            panic!("expected grid payload");
        };
        assert_eq!(grid.variable, "sst");
        assert_eq!(grid.values.shape, vec![2, 2]);
        assert_eq!(grid.values.values, vec![282.0, 283.0, 284.0, 285.0]);
        assert_eq!(grid.latitudes, vec![-10.0, 10.0]);
        assert_eq!(grid.longitudes, vec![0.0, 90.0]);
    }

    #[test]
    fn test_multi_variable_read() {
        let stage =
            ReadVariables::from_params(&serde_json::json!({"variables": ["sst", "ice"]})).unwrap();
        let tile = stage
            .apply(skeleton(&stage.variables()), &dataset())
            .unwrap()
            .unwrap();

        let Some(TilePayload::MultiVariable(vars)) = tile.payload else {
            panic!("expected multi-variable payload");
        };
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].variable, "sst");
        assert_eq!(vars[1].variable, "ice");
        assert_eq!(vars[1].values.values, vec![0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_missing_variable_is_execution_error() {
        let stage =
            ReadVariables::from_params(&serde_json::json!({"variable": "salinity"})).unwrap();
        let err = stage
            .apply(skeleton(&stage.variables()), &dataset())
            .unwrap_err();
        assert!(err.is_execution());
    }

    #[test]
    fn test_requires_a_variable() {
        assert!(ReadVariables::from_params(&serde_json::json!({})).is_err());
    }
}
