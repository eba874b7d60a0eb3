//! Dataset discovery over an input directory tree.
//!
//! Every immediate subdirectory of the root is one dataset. Its files are
//! collected recursively, hidden entries skipped, and sorted so runs are
//! deterministic. An optional `dataset.yaml` supplies metadata.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use obs_common::{Dataset, Namespace};

use crate::error::{IngestionError, Result};

/// Per-dataset metadata file name.
pub const MANIFEST_FILE: &str = "dataset.yaml";

/// Contents of `dataset.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetManifest {
    pub external_id: Option<String>,
    /// Raw parameter name for files without a parameter column.
    pub parameter: Option<String>,
    pub namespace_hint: Option<String>,
}

impl DatasetManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| {
            IngestionError::InvalidInput(format!("{}: {}", path.display(), e))
        })
    }

    fn apply(self, dataset: &mut Dataset) {
        dataset.external_id = self.external_id;
        dataset.default_parameter = self.parameter.filter(|p| !p.trim().is_empty());
        dataset.namespace_hint = self.namespace_hint.and_then(|hint| {
            hint.parse::<Namespace>()
                .map_err(|e| warn!(dataset = %dataset.name, error = %e, "Ignoring namespace hint"))
                .ok()
        });
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Source files below `dir`, sorted, without hidden entries or the manifest.
pub fn collect_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !(e.depth() == 1 && e.file_name() == MANIFEST_FILE))
        .map(DirEntry::into_path)
        .collect()
}

/// Discover datasets under `root`, keeping those whose name matches `filter`.
pub fn discover_datasets(root: &Path, filter: Option<&str>) -> Result<Vec<Dataset>> {
    if !root.is_dir() {
        return Err(IngestionError::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    let mut datasets = Vec::new();
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut dataset = Dataset::new(name, &dir);
        if !dataset.matches_filter(filter) {
            debug!(dataset = %dataset.name, "Dataset excluded by filter");
            continue;
        }

        let manifest = dir.join(MANIFEST_FILE);
        if manifest.is_file() {
            match DatasetManifest::load(&manifest) {
                Ok(m) => m.apply(&mut dataset),
                Err(e) => warn!(dataset = %dataset.name, error = %e, "Ignoring invalid manifest"),
            }
        }

        dataset.files = collect_files(&dir);
        debug!(dataset = %dataset.name, files = dataset.files.len(), "Discovered dataset");
        datasets.push(dataset);
    }

    Ok(datasets)
}
