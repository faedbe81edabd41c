//! The ordered, short-circuiting transform chain over tiles.

use serde::{Deserialize, Serialize};

use ingest_common::{Dataset, IngestResult, Tile};

use crate::stages;

/// One transform stage. Consumes a tile and either passes it on
/// (possibly rewritten) or drops it from the run's output.
pub trait TileStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` drops the tile; remaining stages do not run on it.
    fn apply(&self, tile: Tile, dataset: &dyn Dataset) -> IngestResult<Option<Tile>>;

    /// Variables this stage declares an interest in. Contributes to the
    /// tile identity seed so ids stay stable per variable set.
    fn variables(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Declarative stage descriptor: a registry name plus free-form params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, serde_json::json!({}))
    }
}

/// Resolve a stage descriptor against the static registry. Unknown names
/// and bad params are build errors, never run-time errors.
pub fn build_stage(spec: &StageSpec) -> IngestResult<Box<dyn TileStage>> {
    stages::build(spec)
}

/// An ordered chain of stages, built once per pipeline.
pub struct ProcessorChain {
    stages: Vec<Box<dyn TileStage>>,
}

impl ProcessorChain {
    pub fn build(specs: &[StageSpec]) -> IngestResult<Self> {
        let stages = specs.iter().map(build_stage).collect::<IngestResult<_>>()?;
        Ok(Self { stages })
    }

    /// Run every stage in order. A dropped tile short-circuits.
    pub fn apply(&self, tile: Tile, dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
        let mut current = tile;
        for stage in &self.stages {
            match stage.apply(current, dataset)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Union of the variables the stages declare, in stage order.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for stage in &self.stages {
            for v in stage.variables() {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::{ArrayDataset, DimSlice, IngestError, TileSpec};

    struct Tag(&'static str);

    impl TileStage for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn apply(&self, mut tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
            tile.summary.granule.push_str(self.0);
            Ok(Some(tile))
        }
    }

    struct Discard;

    impl TileStage for Discard {
        fn name(&self) -> &'static str {
            "discard"
        }

        fn apply(&self, _tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
            Ok(None)
        }
    }

    struct Fail;

    impl TileStage for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn apply(&self, _tile: Tile, _dataset: &dyn Dataset) -> IngestResult<Option<Tile>> {
            Err(IngestError::Processing("boom".to_string()))
        }
    }

    fn tile() -> Tile {
        Tile::skeleton(
            "ds",
            "-",
            TileSpec::new(vec![DimSlice::new("lat", 0, 1)]),
            &[],
        )
    }

    fn dataset() -> ArrayDataset {
        ArrayDataset::new(vec![("lat".to_string(), 1)])
    }

    #[test]
    fn test_stages_run_in_order() {
        let chain = ProcessorChain {
            stages: vec![Box::new(Tag("a")), Box::new(Tag("b"))],
        };
        let out = chain.apply(tile(), &dataset()).unwrap().unwrap();
        assert_eq!(out.summary.granule, "-ab");
    }

    #[test]
    fn test_drop_short_circuits() {
        let chain = ProcessorChain {
            stages: vec![Box::new(Tag("a")), Box::new(Discard), Box::new(Fail)],
        };
        // Fail never runs: the drop stage short-circuits first.
        assert!(chain.apply(tile(), &dataset()).unwrap().is_none());
    }

    #[test]
    fn test_stage_error_propagates() {
        let chain = ProcessorChain {
            stages: vec![Box::new(Fail)],
        };
        let err = chain.apply(tile(), &dataset()).unwrap_err();
        assert!(err.is_execution());
    }

    #[test]
    fn test_build_rejects_unknown_stage() {
        let err = ProcessorChain::build(&[StageSpec::bare("reticulate")]).err().unwrap();
        assert!(err.is_build());
    }
}
