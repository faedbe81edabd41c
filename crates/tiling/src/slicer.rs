//! Deterministic tile partitioning over named dimensions.

use std::collections::HashMap;

use ingest_common::{DimSlice, IngestError, IngestResult, TileSpec};

/// Partitions a dataset's dimensions into an ordered tile-spec list.
pub trait TileSlicer: Send + Sync {
    /// Generate tile specs covering every dimension's `[0, length)`
    /// exactly and without overlap. Deterministic for fixed input.
    fn generate(&self, dims: &[(String, u64)]) -> IngestResult<Vec<TileSpec>>;
}

/// Fixed-step slicing: each listed dimension is cut into `step`-sized
/// ranges (the last may be shorter); unlisted dimensions are kept whole.
/// The output is the Cartesian product in dimension order, first
/// dimension outermost.
pub struct StepSlicer {
    steps: HashMap<String, u64>,
}

impl StepSlicer {
    pub fn new(steps: HashMap<String, u64>) -> Self {
        Self { steps }
    }
}

impl TileSlicer for StepSlicer {
    fn generate(&self, dims: &[(String, u64)]) -> IngestResult<Vec<TileSpec>> {
        for name in self.steps.keys() {
            if !dims.iter().any(|(d, _)| d == name) {
                return Err(IngestError::Config(format!(
                    "step size declared for unknown dimension '{}'",
                    name
                )));
            }
        }

        let mut per_dim: Vec<(String, Vec<(u64, u64)>)> = Vec::with_capacity(dims.len());
        for (name, length) in dims {
            let step = self.steps.get(name).copied().unwrap_or(*length);
            if step == 0 {
                return Err(IngestError::Config(format!(
                    "zero step size for dimension '{}'",
                    name
                )));
            }

            let mut bounds = Vec::new();
            let mut start = 0;
            while start < *length {
                bounds.push((start, (start + step).min(*length)));
                start += step;
            }
            per_dim.push((name.clone(), bounds));
        }

        // Cartesian product, first dimension outermost.
        let mut specs = vec![Vec::new()];
        for (name, bounds) in &per_dim {
            let mut next = Vec::with_capacity(specs.len() * bounds.len());
            for prefix in &specs {
                for &(start, end) in bounds {
                    let mut slices: Vec<DimSlice> = prefix.clone();
                    slices.push(DimSlice::new(name.clone(), start, end));
                    next.push(slices);
                }
            }
            specs = next;
        }

        Ok(specs.into_iter().map(TileSpec::new).collect())
    }
}

/// Resolve a slicer name against the registry. Unknown names are build
/// errors, never run-time errors.
pub fn build_slicer(name: &str, steps: HashMap<String, u64>) -> IngestResult<Box<dyn TileSlicer>> {
    match name {
        "by_step" => Ok(Box::new(StepSlicer::new(steps))),
        other => Err(IngestError::Config(format!("unknown slicer '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(n, l)| (n.to_string(), *l)).collect()
    }

    fn steps(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    #[test]
    fn test_global_grid_four_tiles() {
        let slicer = StepSlicer::new(steps(&[("lat", 180), ("lon", 360)]));
        let specs = slicer
            .generate(&dims(&[("lat", 360), ("lon", 720)]))
            .unwrap();

        let texts: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            texts,
            vec![
                "lat:0:180,lon:0:360",
                "lat:0:180,lon:360:720",
                "lat:180:360,lon:0:360",
                "lat:180:360,lon:360:720",
            ]
        );
    }

    #[test]
    fn test_final_tile_may_be_shorter() {
        let slicer = StepSlicer::new(steps(&[("lon", 300)]));
        let specs = slicer.generate(&dims(&[("lon", 720)])).unwrap();

        let texts: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        assert_eq!(texts, vec!["lon:0:300", "lon:300:600", "lon:600:720"]);
    }

    #[test]
    fn test_unlisted_dimension_kept_whole() {
        let slicer = StepSlicer::new(steps(&[("lat", 100)]));
        let specs = slicer
            .generate(&dims(&[("time", 4), ("lat", 100), ("lon", 200)]))
            .unwrap();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].to_string(), "time:0:4,lat:0:100,lon:0:200");
    }

    #[test]
    fn test_exhaustive_non_overlapping_cover() {
        let slicer = StepSlicer::new(steps(&[("lat", 7), ("lon", 11)]));
        let d = dims(&[("lat", 23), ("lon", 31)]);
        let specs = slicer.generate(&d).unwrap();

        // Tile count per dimension is ceil(length/step).
        assert_eq!(specs.len(), 4 * 3);

        // Every cell covered exactly once.
        let mut covered = vec![0u32; 23 * 31];
        for spec in &specs {
            let lat = spec.slice_for("lat").unwrap();
            let lon = spec.slice_for("lon").unwrap();
            for i in lat.start..lat.end {
                for j in lon.start..lon.end {
                    covered[(i * 31 + j) as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_reproducible_order() {
        let slicer = StepSlicer::new(steps(&[("lat", 100), ("lon", 100)]));
        let d = dims(&[("lat", 250), ("lon", 150)]);
        assert_eq!(slicer.generate(&d).unwrap(), slicer.generate(&d).unwrap());
    }

    #[test]
    fn test_unknown_step_dimension_is_config_error() {
        let slicer = StepSlicer::new(steps(&[("depth", 10)]));
        let err = slicer.generate(&dims(&[("lat", 100)])).unwrap_err();
        assert!(err.is_build());
    }

    #[test]
    fn test_zero_step_is_config_error() {
        let slicer = StepSlicer::new(steps(&[("lat", 0)]));
        assert!(slicer.generate(&dims(&[("lat", 100)])).is_err());
    }

    #[test]
    fn test_registry_rejects_unknown_name() {
        assert!(build_slicer("by_step", HashMap::new()).is_ok());
        assert!(build_slicer("spiral", HashMap::new()).is_err());
    }
}
