//! Temporary input trees laid out the way discovery expects them:
//! `<root>/<dataset>/<files...>`, with an optional `dataset.yaml`.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An input root in a temporary directory, removed on drop.
pub struct DatasetTree {
    root: TempDir,
}

impl DatasetTree {
    pub fn new() -> Self {
        Self {
            root: tempfile::Builder::new()
                .prefix("obs_ingest_test")
                .tempdir()
                .expect("Failed to create temporary dataset tree"),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create (if needed) and return a dataset directory.
    pub fn dataset(&self, name: &str) -> PathBuf {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).expect("Failed to create dataset directory");
        dir
    }

    /// Write a file into a dataset. `file` may contain subdirectories.
    pub fn write(&self, dataset: &str, file: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.dataset(dataset).join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write fixture file");
        path
    }

    /// Write the dataset's `dataset.yaml`.
    pub fn manifest(&self, dataset: &str, yaml: &str) -> PathBuf {
        self.write(dataset, "dataset.yaml", yaml)
    }
}

impl Default for DatasetTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_layout() {
        let tree = DatasetTree::new();
        let file = tree.write("ctd", "raw/2021/TEMP.csv", "date,value\n");
        assert_eq!(file, tree.root().join("ctd/raw/2021/TEMP.csv"));
        assert!(file.exists());

        let manifest = tree.manifest("ctd", "parameter: TEMP\n");
        assert_eq!(fs::read_to_string(manifest).unwrap(), "parameter: TEMP\n");
    }

    #[test]
    fn test_removed_on_drop() {
        let root = {
            let tree = DatasetTree::new();
            tree.dataset("x");
            tree.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
