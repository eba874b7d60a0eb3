//! Datasets: named collections of source files under one provenance.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::mapping::Namespace;

/// Identifier assigned by the dataset registry.
pub type DatasetId = Uuid;

/// A discovered dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Directory name; unique key in the registry.
    pub name: String,
    /// Dataset directory.
    pub path: PathBuf,
    /// Stable external identifier (e.g. a DOI or catalogue id).
    pub external_id: Option<String>,
    /// Raw parameter name for tabular files without a parameter column.
    pub default_parameter: Option<String>,
    /// Vocabulary hint passed to the standardizer.
    pub namespace_hint: Option<Namespace>,
    /// Source files, sorted.
    pub files: Vec<PathBuf>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            external_id: None,
            default_parameter: None,
            namespace_hint: None,
            files: Vec::new(),
        }
    }

    /// Case-insensitive partial-name match used by the dataset filter.
    pub fn matches_filter(&self, filter: Option<&str>) -> bool {
        match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(f) => self.name.to_lowercase().contains(&f.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_filter() {
        let ds = Dataset::new("North_Sea_CTD_2021", "/data/North_Sea_CTD_2021");
        assert!(ds.matches_filter(None));
        assert!(ds.matches_filter(Some("")));
        assert!(ds.matches_filter(Some("north_sea")));
        assert!(ds.matches_filter(Some("CTD")));
        assert!(!ds.matches_filter(Some("baltic")));
    }
}
