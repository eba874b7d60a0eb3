//! Record extraction, one strategy per supported file kind.
//!
//! Extractors are synchronous and run on the blocking pool. They locate the
//! time and value fields through the alias table, normalize time per row
//! and return raw observations plus per-file counters. Standardization and
//! quality filtering happen afterwards in the pipeline.

mod array;
mod tabular;

pub use array::{extract_array_file, ArrayExtractor};
pub use tabular::{sniff_delimiter, TabularExtractor};
pub(crate) use tabular::{header_line, split_header, Columns};

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;

use obs_common::{LocationRef, QualityFlag, RawValue};

use crate::issue::FileIssue;
use crate::time::TimeNormalizer;

/// File extensions handled by the tabular extractor.
pub const TABULAR_EXTENSIONS: &[&str] = &["csv", "tsv", "tab", "txt", "dat"];

/// File extensions handled by the array extractor.
pub const ARRAY_EXTENSIONS: &[&str] = &["nc", "nc4", "cdf", "netcdf", "h5", "hdf5"];

/// Spatial-feature files; recognized but not extracted here.
pub const SPATIAL_EXTENSIONS: &[&str] = &["shp", "geojson", "gpkg", "kml", "gml"];

/// Extraction path a file is expected to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPath {
    Tabular,
    Array,
    Spatial,
    Biological,
    None,
}

impl ExtractionPath {
    /// Path implied by the file extension alone.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if TABULAR_EXTENSIONS.contains(&ext.as_str()) {
            ExtractionPath::Tabular
        } else if ARRAY_EXTENSIONS.contains(&ext.as_str()) {
            ExtractionPath::Array
        } else if SPATIAL_EXTENSIONS.contains(&ext.as_str()) {
            ExtractionPath::Spatial
        } else {
            ExtractionPath::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionPath::Tabular => "tabular",
            ExtractionPath::Array => "array",
            ExtractionPath::Spatial => "spatial",
            ExtractionPath::Biological => "biological",
            ExtractionPath::None => "none",
        }
    }
}

/// One value read from a source, with its time already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Parameter name as it appears in the source.
    pub raw_parameter: String,
    /// Unit declared by the source, if any.
    pub declared_unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub value: RawValue,
    /// Source flag; `None` when the source carries none.
    pub quality_flag: Option<QualityFlag>,
    pub location: Option<LocationRef>,
}

/// Result of extracting one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtraction {
    pub observations: Vec<Observation>,
    /// Rows (tabular) or cells (array) visited.
    pub rows_read: usize,
    /// Rows rejected with `TimeFormatUnknown`.
    pub time_rejections: usize,
    /// Structurally broken rows.
    pub row_errors: usize,
    /// Empty or fill-value cells.
    pub missing_values: usize,
    /// Encoding that decoded the file, for text formats.
    pub encoding: Option<&'static str>,
    /// Extraction stopped at the row limit.
    pub truncated: bool,
}

impl FileExtraction {
    /// Whether the row limit has been reached.
    fn at_limit(&self, limit: Option<usize>) -> bool {
        limit.is_some_and(|l| self.observations.len() >= l)
    }
}

/// Everything an extractor needs besides the file. Owned, so it can move
/// onto the blocking pool.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub time: TimeNormalizer,
    pub fallback_encodings: Vec<&'static Encoding>,
    /// Raw parameter name for tabular files without a parameter column.
    pub default_parameter: Option<String>,
    pub row_limit: Option<usize>,
}

impl ExtractContext {
    pub fn new(time: TimeNormalizer) -> Self {
        Self {
            time,
            fallback_encodings: Vec::new(),
            default_parameter: None,
            row_limit: None,
        }
    }
}

/// Extraction strategy for one file kind.
pub trait Extractor: Send + Sync {
    fn path(&self) -> ExtractionPath;

    fn extract(&self, file: &Path, ctx: &ExtractContext) -> Result<FileExtraction, FileIssue>;
}

/// Extractor for a file, chosen by extension.
pub fn extractor_for(file: &Path) -> Option<Box<dyn Extractor>> {
    match ExtractionPath::from_extension(file) {
        ExtractionPath::Tabular => Some(Box::new(TabularExtractor)),
        ExtractionPath::Array => Some(Box::new(ArrayExtractor)),
        _ => None,
    }
}

/// Read a file, mapping I/O failures and zero-byte files to file issues.
fn read_non_empty(file: &Path) -> Result<Vec<u8>, FileIssue> {
    let bytes = std::fs::read(file).map_err(|e| FileIssue::Unreadable(e.to_string()))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(FileIssue::EmptyFile);
    }
    Ok(bytes)
}
