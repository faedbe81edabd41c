//! The read-only dataset interface granule readers expose.
//!
//! Format-specific readers (NetCDF, HDF) live outside this workspace; they
//! plug in by producing a `Dataset`. The in-memory `ArrayDataset` backs the
//! built-in JSON granule reader and the test fixtures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::spec::DimSlice;
use crate::tile::{CoordBlock, NumericBlock};

/// A read-only handle on one opened granule.
///
/// Shared by every worker of a run; implementations must be cheap to read
/// concurrently and must not expose interior mutation.
pub trait Dataset: Send + Sync {
    /// Named dimensions in the granule's declaration order.
    fn dimensions(&self) -> Vec<(String, u64)>;

    /// Names of all variables.
    fn variables(&self) -> Vec<String>;

    /// The dimensions a variable is laid out over, or `None` if unknown.
    fn variable_dims(&self, name: &str) -> Option<Vec<String>>;

    /// Read a measurement hyperslab. Dimensions not named in `section`
    /// are read whole.
    fn read_block(&self, variable: &str, section: &[DimSlice]) -> IngestResult<NumericBlock>;

    /// Read a coordinate hyperslab at full precision.
    fn read_coords(&self, variable: &str, section: &[DimSlice]) -> IngestResult<CoordBlock>;
}

#[derive(Debug, Clone)]
struct Variable {
    dims: Vec<String>,
    values: Vec<f64>,
}

/// An in-memory dataset: named dimensions plus row-major variables.
#[derive(Debug, Clone, Default)]
pub struct ArrayDataset {
    dims: Vec<(String, u64)>,
    variables: HashMap<String, Variable>,
    attributes: HashMap<String, String>,
}

impl ArrayDataset {
    pub fn new(dims: Vec<(String, u64)>) -> Self {
        Self {
            dims,
            variables: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Add a variable laid out over the named dimensions.
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        dims: &[&str],
        values: Vec<f64>,
    ) -> IngestResult<Self> {
        let name = name.into();
        let mut expected: usize = 1;
        for d in dims {
            let len = self
                .dim_len(d)
                .ok_or_else(|| IngestError::Granule(format!("unknown dimension '{}'", d)))?;
            expected *= len as usize;
        }
        if expected != values.len() {
            return Err(IngestError::Granule(format!(
                "variable '{}' has {} values, dimensions imply {}",
                name,
                values.len(),
                expected
            )));
        }

        self.variables.insert(
            name,
            Variable {
                dims: dims.iter().map(|d| d.to_string()).collect(),
                values,
            },
        );
        Ok(self)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    fn dim_len(&self, name: &str) -> Option<u64> {
        self.dims.iter().find(|(d, _)| d == name).map(|(_, l)| *l)
    }

    /// Gather a hyperslab of a variable as f64, with the output shape.
    fn gather(&self, variable: &str, section: &[DimSlice]) -> IngestResult<(Vec<usize>, Vec<f64>)> {
        let var = self
            .variables
            .get(variable)
            .ok_or_else(|| IngestError::Granule(format!("no variable '{}' in granule", variable)))?;

        let mut full_shape = Vec::with_capacity(var.dims.len());
        let mut ranges = Vec::with_capacity(var.dims.len());
        for dim in &var.dims {
            let len = self.dim_len(dim).ok_or_else(|| {
                IngestError::Granule(format!("variable '{}' uses unknown dimension '{}'", variable, dim))
            })? as usize;

            let (start, end) = match section.iter().find(|s| &s.dim == dim) {
                Some(s) => (s.start as usize, s.end as usize),
                None => (0, len),
            };
            if start >= end || end > len {
                return Err(IngestError::Granule(format!(
                    "section {}:{}:{} out of bounds for '{}' (length {})",
                    dim, start, end, variable, len
                )));
            }
            full_shape.push(len);
            ranges.push((start, end));
        }

        // Scalar variable: single value, empty shape.
        if var.dims.is_empty() {
            return Ok((Vec::new(), var.values.clone()));
        }

        let rank = full_shape.len();
        let mut strides = vec![1usize; rank];
        for i in (0..rank - 1).rev() {
            strides[i] = strides[i + 1] * full_shape[i + 1];
        }

        let out_shape: Vec<usize> = ranges.iter().map(|(s, e)| e - s).collect();
        let mut out = Vec::with_capacity(out_shape.iter().product());

        // Row-major odometer over the output shape.
        let mut index: Vec<usize> = ranges.iter().map(|(s, _)| *s).collect();
        'outer: loop {
            let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
            out.push(var.values[offset]);

            for axis in (0..rank).rev() {
                index[axis] += 1;
                if index[axis] < ranges[axis].1 {
                    continue 'outer;
                }
                index[axis] = ranges[axis].0;
            }
            break;
        }

        Ok((out_shape, out))
    }
}

impl Dataset for ArrayDataset {
    fn dimensions(&self) -> Vec<(String, u64)> {
        self.dims.clone()
    }

    fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    fn variable_dims(&self, name: &str) -> Option<Vec<String>> {
        self.variables.get(name).map(|v| v.dims.clone())
    }

    fn read_block(&self, variable: &str, section: &[DimSlice]) -> IngestResult<NumericBlock> {
        let (shape, values) = self.gather(variable, section)?;
        Ok(NumericBlock::new(
            shape,
            values.into_iter().map(|v| v as f32).collect(),
        ))
    }

    fn read_coords(&self, variable: &str, section: &[DimSlice]) -> IngestResult<CoordBlock> {
        let (shape, values) = self.gather(variable, section)?;
        Ok(CoordBlock::new(shape, values))
    }
}

/// Fill value written for non-finite cells; JSON has no NaN literal.
const DOCUMENT_FILL_VALUE: f64 = -9999.0;

/// One variable in the granule document form. Cells equal to
/// `fill_value` decode to NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDocument {
    pub dims: Vec<String>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub fill_value: Option<f64>,
}

/// The self-describing JSON granule format accepted by the built-in
/// loader: `{dimensions, variables, attributes?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranuleDocument {
    pub dimensions: Vec<(String, u64)>,
    pub variables: HashMap<String, VariableDocument>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl GranuleDocument {
    /// Validate and convert into an in-memory dataset. Fill-valued cells
    /// become NaN.
    pub fn into_dataset(self) -> IngestResult<ArrayDataset> {
        let mut dataset = ArrayDataset::new(self.dimensions);
        dataset.attributes = self.attributes;
        for (name, var) in self.variables {
            let values = match var.fill_value {
                Some(fill) => var
                    .values
                    .into_iter()
                    .map(|v| if v == fill { f64::NAN } else { v })
                    .collect(),
                None => var.values,
            };
            let dims: Vec<&str> = var.dims.iter().map(|d| d.as_str()).collect();
            dataset = dataset.with_variable(name, &dims, values)?;
        }
        Ok(dataset)
    }

    /// Capture an in-memory dataset as a document (fixture writers).
    /// Non-finite cells are written as the fill value.
    pub fn from_dataset(dataset: &ArrayDataset) -> Self {
        let variables = dataset
            .variables
            .iter()
            .map(|(name, var)| {
                let has_gaps = var.values.iter().any(|v| !v.is_finite());
                let values = if has_gaps {
                    var.values
                        .iter()
                        .map(|v| if v.is_finite() { *v } else { DOCUMENT_FILL_VALUE })
                        .collect()
                } else {
                    var.values.clone()
                };
                (
                    name.clone(),
                    VariableDocument {
                        dims: var.dims.clone(),
                        values,
                        fill_value: has_gaps.then_some(DOCUMENT_FILL_VALUE),
                    },
                )
            })
            .collect();

        Self {
            dimensions: dataset.dims.clone(),
            variables,
            attributes: dataset.attributes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> ArrayDataset {
        // 2x3 grid, values 0..6 row-major.
        ArrayDataset::new(vec![("lat".to_string(), 2), ("lon".to_string(), 3)])
            .with_variable("lat", &["lat"], vec![-10.0, 10.0])
            .unwrap()
            .with_variable("lon", &["lon"], vec![0.0, 120.0, 240.0])
            .unwrap()
            .with_variable("sst", &["lat", "lon"], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap()
    }

    #[test]
    fn test_read_full_block() {
        let block = dataset().read_block("sst", &[]).unwrap();
        assert_eq!(block.shape, vec![2, 3]);
        assert_eq!(block.values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_read_section() {
        let section = [DimSlice::new("lat", 1, 2), DimSlice::new("lon", 1, 3)];
        let block = dataset().read_block("sst", &section).unwrap();
        assert_eq!(block.shape, vec![1, 2]);
        assert_eq!(block.values, vec![4.0, 5.0]);
    }

    #[test]
    fn test_unnamed_dimension_read_whole() {
        let section = [DimSlice::new("lat", 0, 1)];
        let block = dataset().read_block("sst", &section).unwrap();
        assert_eq!(block.shape, vec![1, 3]);
        assert_eq!(block.values, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_out_of_bounds_section() {
        let section = [DimSlice::new("lat", 0, 5)];
        assert!(dataset().read_block("sst", &section).is_err());
    }

    #[test]
    fn test_missing_variable() {
        assert!(dataset().read_block("chlorophyll", &[]).is_err());
    }

    #[test]
    fn test_document_round_trip() {
        let doc = GranuleDocument::from_dataset(&dataset());
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: GranuleDocument = serde_json::from_str(&json).unwrap();
        let restored = parsed.into_dataset().unwrap();

        assert_eq!(restored.dimensions(), dataset().dimensions());
        let block = restored.read_block("sst", &[]).unwrap();
        assert_eq!(block.values.len(), 6);
    }

    #[test]
    fn test_document_rejects_shape_mismatch() {
        let mut doc = GranuleDocument::from_dataset(&dataset());
        doc.variables.get_mut("sst").unwrap().values.pop();
        assert!(doc.into_dataset().is_err());
    }

    #[test]
    fn test_attributes_round_trip() {
        let annotated = dataset().with_attribute("source", "avhrr_oi_v2.1");
        assert_eq!(annotated.attribute("source"), Some("avhrr_oi_v2.1"));
        assert_eq!(annotated.attribute("missing"), None);

        let doc = GranuleDocument::from_dataset(&annotated);
        let restored = doc.into_dataset().unwrap();
        assert_eq!(restored.attribute("source"), Some("avhrr_oi_v2.1"));
    }

    #[test]
    fn test_fill_value_round_trips_as_nan() {
        let gapped = ArrayDataset::new(vec![("lat".to_string(), 3)])
            .with_variable("sst", &["lat"], vec![281.0, f64::NAN, 283.0])
            .unwrap();

        let doc = GranuleDocument::from_dataset(&gapped);
        let json = serde_json::to_vec(&doc).unwrap();
        let restored: GranuleDocument = serde_json::from_slice(&json).unwrap();
        let block = restored
            .into_dataset()
            .unwrap()
            .read_block("sst", &[])
            .unwrap();

        assert_eq!(block.values[0], 281.0);
        assert!(block.values[1].is_nan());
        assert_eq!(block.values[2], 283.0);
    }
}
