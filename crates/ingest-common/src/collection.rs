//! Collection declarations: which granules to watch and how to tile them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// How a dataset's measurements are laid out geographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    #[default]
    Grid,
    Swath,
    TimeSeries,
}

/// Mapping from the standard axes to this dataset's dimension names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionNames {
    pub latitude: String,
    pub longitude: String,
    pub time: Option<String>,
}

impl Default for DimensionNames {
    fn default() -> Self {
        Self {
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
            time: None,
        }
    }
}

/// Declarative binding of a dataset id to a granule location, slicing,
/// and queue priorities. Parsed from the collections YAML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub dataset_id: String,

    /// Absolute granule directory, or an absolute glob over granule files.
    pub path: String,

    /// Variables to ingest from each granule.
    pub variables: Vec<String>,

    #[serde(default)]
    pub geometry: Geometry,

    #[serde(default)]
    pub dimensions: DimensionNames,

    /// Per-dimension tile step sizes. Dimensions not listed are kept whole.
    pub slices: HashMap<String, u64>,

    pub historical_priority: u8,

    #[serde(default)]
    pub forward_processing_priority: Option<u8>,

    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,

    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

impl Collection {
    /// The canonical directory granules of this collection live in: the
    /// longest path prefix before any glob metacharacter.
    pub fn granule_directory(&self) -> PathBuf {
        let path = Path::new(&self.path);
        if !self.path.contains(['*', '?', '[']) {
            return path.to_path_buf();
        }

        let mut dir = PathBuf::new();
        for comp in path.components() {
            let text = comp.as_os_str().to_string_lossy();
            if text.contains(['*', '?', '[']) {
                break;
            }
            dir.push(comp);
        }
        dir
    }

    /// Validate the declaration against the directory that holds the
    /// collections document.
    pub fn validate(&self, declarations_dir: &Path) -> IngestResult<()> {
        if self.dataset_id.is_empty() {
            return Err(IngestError::Collection("empty dataset_id".to_string()));
        }
        if !Path::new(&self.path).is_absolute() {
            return Err(IngestError::Collection(format!(
                "{}: granule path '{}' is not absolute",
                self.dataset_id, self.path
            )));
        }
        if self.variables.is_empty() {
            return Err(IngestError::Collection(format!(
                "{}: no variables declared",
                self.dataset_id
            )));
        }
        if self.granule_directory() == declarations_dir {
            return Err(IngestError::Collection(format!(
                "{}: granule directory matches the collections document directory",
                self.dataset_id
            )));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from >= to {
                return Err(IngestError::Collection(format!(
                    "{}: date_from is not before date_to",
                    self.dataset_id
                )));
            }
        }
        Ok(())
    }

    /// Queue priority for a forward-processing ingestion. Falls back to
    /// the historical priority when no forward priority is declared.
    pub fn forward_priority(&self) -> u8 {
        self.forward_processing_priority
            .unwrap_or(self.historical_priority)
    }
}

/// The active set of collections, replaced wholesale on each reload.
#[derive(Debug, Clone, Default)]
pub struct CollectionSet {
    collections: Vec<Collection>,
}

impl CollectionSet {
    /// Parse a collections YAML/JSON document body (a list of
    /// collections), validate each entry, and resolve granule-directory
    /// conflicts first-seen-wins. Returns the active set plus the
    /// rejected declarations with reasons, for the caller to log.
    pub fn from_declarations(
        declared: Vec<Collection>,
        declarations_dir: &Path,
    ) -> (Self, Vec<(Collection, String)>) {
        let mut active: Vec<Collection> = Vec::new();
        let mut rejected = Vec::new();

        for collection in declared {
            if let Err(e) = collection.validate(declarations_dir) {
                rejected.push((collection, e.to_string()));
                continue;
            }

            let dir = collection.granule_directory();
            if let Some(existing) = active.iter().find(|c| c.granule_directory() == dir) {
                rejected.push((
                    collection,
                    format!(
                        "granule directory {:?} already claimed by '{}'",
                        dir, existing.dataset_id
                    ),
                ));
                continue;
            }

            active.push(collection);
        }

        (Self { collections: active }, rejected)
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Collections present here but absent (or changed) in the previous
    /// set. A newly valid collection starts being watched only after it
    /// appears in the diff.
    pub fn added_since<'a>(&'a self, previous: &CollectionSet) -> Vec<&'a Collection> {
        self.collections
            .iter()
            .filter(|c| {
                !previous
                    .collections
                    .iter()
                    .any(|p| p.dataset_id == c.dataset_id && p == *c)
            })
            .collect()
    }
}
