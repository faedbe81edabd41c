//! Built-in tile stages and the name → constructor registry.
//!
//! Format-specific science transforms live outside this workspace; the
//! stages here are the generic ones every pipeline composes from.

mod filter_empty;
mod read;
mod scale_offset;
mod summarize;

pub use filter_empty::FilterEmpty;
pub use read::ReadVariables;
pub use scale_offset::ScaleOffset;
pub use summarize::Summarize;

use ingest_common::{IngestError, IngestResult};

use crate::chain::{StageSpec, TileStage};

/// Resolve a stage descriptor. Bad names and bad params fail here, at
/// pipeline build time.
pub fn build(spec: &StageSpec) -> IngestResult<Box<dyn TileStage>> {
    match spec.name.as_str() {
        "read" => Ok(Box::new(ReadVariables::from_params(&spec.params)?)),
        "scale_offset" => Ok(Box::new(ScaleOffset::from_params(&spec.params)?)),
        "filter_empty" => Ok(Box::new(FilterEmpty)),
        "summarize" => Ok(Box::new(Summarize)),
        other => Err(IngestError::Config(format!(
            "unknown processor stage '{}'",
            other
        ))),
    }
}

pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    stage: &str,
    params: &serde_json::Value,
) -> IngestResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| IngestError::Config(format!("bad params for stage '{}': {}", stage, e)))
}
