//! Tile section specs: which sub-block of a granule a tile covers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// A half-open index range `[start, end)` along one named dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimSlice {
    pub dim: String,
    pub start: u64,
    pub end: u64,
}

impl DimSlice {
    pub fn new(dim: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            dim: dim.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// An ordered list of dimension slices identifying one tile.
///
/// The canonical text form is `dim:start:end,dim:start:end,...`,
/// order-preserving; it doubles as the seed for stable tile ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TileSpec {
    slices: Vec<DimSlice>,
}

impl TileSpec {
    pub fn new(slices: Vec<DimSlice>) -> Self {
        Self { slices }
    }

    pub fn slices(&self) -> &[DimSlice] {
        &self.slices
    }

    /// Look up the slice for a dimension, if the spec constrains it.
    pub fn slice_for(&self, dim: &str) -> Option<&DimSlice> {
        self.slices.iter().find(|s| s.dim == dim)
    }

    /// Parse the canonical text form.
    pub fn parse(text: &str) -> IngestResult<Self> {
        if text.is_empty() {
            return Err(IngestError::Config("empty tile spec".to_string()));
        }

        let mut slices = Vec::new();
        for part in text.split(',') {
            let fields: Vec<&str> = part.split(':').collect();
            if fields.len() != 3 {
                return Err(IngestError::Config(format!(
                    "malformed tile spec segment '{}' in '{}'",
                    part, text
                )));
            }
            let start: u64 = fields[1].parse().map_err(|_| {
                IngestError::Config(format!("bad start index in tile spec '{}'", text))
            })?;
            let end: u64 = fields[2].parse().map_err(|_| {
                IngestError::Config(format!("bad end index in tile spec '{}'", text))
            })?;
            slices.push(DimSlice::new(fields[0], start, end));
        }

        Ok(Self { slices })
    }
}

impl fmt::Display for TileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.slices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}:{}", s.dim, s.start, s.end)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TileSpec {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TileSpec::parse(&value)
    }
}

impl From<TileSpec> for String {
    fn from(spec: TileSpec) -> Self {
        spec.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let spec = TileSpec::new(vec![
            DimSlice::new("lat", 0, 180),
            DimSlice::new("lon", 360, 720),
        ]);

        let text = spec.to_string();
        assert_eq!(text, "lat:0:180,lon:360:720");
        assert_eq!(TileSpec::parse(&text).unwrap(), spec);
    }

    #[test]
    fn test_parse_preserves_order() {
        let spec = TileSpec::parse("time:0:1,lat:10:20,lon:30:40").unwrap();
        let dims: Vec<&str> = spec.slices().iter().map(|s| s.dim.as_str()).collect();
        assert_eq!(dims, vec!["time", "lat", "lon"]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TileSpec::parse("").is_err());
        assert!(TileSpec::parse("lat:0").is_err());
        assert!(TileSpec::parse("lat:zero:10").is_err());
        assert!(TileSpec::parse("lat:0:10,").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let spec = TileSpec::new(vec![DimSlice::new("lat", 0, 90)]);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "\"lat:0:90\"");

        let parsed: TileSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }
}
