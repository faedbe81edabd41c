//! Loading and reloading the collections declaration document.

use std::path::Path;

use tracing::warn;

use ingest_common::{Collection, CollectionSet, IngestError, IngestResult};

/// Parse and validate the collections YAML document. Invalid entries and
/// granule-directory conflicts are logged and skipped (first-seen-wins);
/// the returned set replaces the previous one wholesale.
pub fn load_declarations(path: &Path) -> IngestResult<CollectionSet> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::Collection(format!("unreadable collections document {:?}: {}", path, e))
    })?;

    let declared: Vec<Collection> = serde_yaml::from_str(&content).map_err(|e| {
        IngestError::Collection(format!("malformed collections document {:?}: {}", path, e))
    })?;

    let declarations_dir = path.parent().unwrap_or_else(|| Path::new("/"));
    let (set, rejected) = CollectionSet::from_declarations(declared, declarations_dir);

    for (collection, reason) in rejected {
        warn!(
            dataset = %collection.dataset_id,
            reason = %reason,
            "Skipping invalid collection declaration"
        );
    }

    Ok(set)
}
