//! Enumerating candidate granules for a collection.

use std::path::PathBuf;

use walkdir::WalkDir;

use ingest_common::{Collection, IngestError, IngestResult};

/// List the collection's current granule files: a glob expansion when
/// the path carries wildcards, otherwise the files directly under the
/// granule directory. Sorted, so repeated scans diff deterministically.
pub fn scan_granules(collection: &Collection) -> IngestResult<Vec<PathBuf>> {
    let mut files = if collection.path.contains(['*', '?', '[']) {
        let pattern = glob::glob(&collection.path).map_err(|e| {
            IngestError::Collection(format!(
                "{}: bad granule glob '{}': {}",
                collection.dataset_id, collection.path, e
            ))
        })?;

        pattern
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect::<Vec<_>>()
    } else {
        WalkDir::new(&collection.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    };

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    use ingest_common::{DimensionNames, Geometry};

    fn collection(path: &str) -> Collection {
        Collection {
            dataset_id: "ds".to_string(),
            path: path.to_string(),
            variables: vec!["sst".to_string()],
            geometry: Geometry::Grid,
            dimensions: DimensionNames::default(),
            slices: HashMap::new(),
            historical_priority: 1,
            forward_processing_priority: None,
            date_from: None,
            date_to: None,
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"granule").unwrap();
    }

    #[test]
    fn test_scan_directory_lists_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.json");
        touch(dir.path(), "a.json");
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let files = scan_granules(&collection(&dir.path().to_string_lossy())).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_scan_glob_filters_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "g1.json");
        touch(dir.path(), "g2.json");
        touch(dir.path(), "readme.txt");

        let pattern = format!("{}/*.json", dir.path().display());
        let files = scan_granules(&collection(&pattern)).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let files = scan_granules(&collection("/nonexistent/granules")).unwrap();
        assert!(files.is_empty());
    }
}
