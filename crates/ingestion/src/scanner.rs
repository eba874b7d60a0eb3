//! Read-only diagnostic scan of a dataset collection.
//!
//! Predicts which extractor each file would take and flags likely failure
//! modes from extensions, sizes and headers. It never runs extraction and
//! never touches storage.

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use netcdf_parser::ArrayFormat;
use obs_common::Dataset;

use crate::aliases::is_known;
use crate::config::IngestConfig;
use crate::decode::decode;
use crate::error::Result;
use crate::extract::{header_line, split_header, Columns, ExtractionPath};
use crate::issue::FileIssue;

/// Bytes read from a text file to sniff its header.
const SNIFF_BYTES: u64 = 64 * 1024;

/// Header columns that mark a biological occurrence table.
const BIOLOGICAL_COLUMNS: &[&str] = &["scientificname", "occurrenceid", "taxonid", "aphiaid"];

/// Why a file or dataset is expected to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EmptyFile,
    MissingRequiredColumns,
    EncodingError,
    /// None of the header columns is a known alias.
    UnrecognizedHeader,
    UnsupportedFormat,
    NoFiles,
    Unreadable,
}

impl From<&FileIssue> for FailureReason {
    fn from(issue: &FileIssue) -> Self {
        match issue {
            FileIssue::EncodingError(_) => FailureReason::EncodingError,
            FileIssue::MissingRequiredColumns(_) => FailureReason::MissingRequiredColumns,
            FileIssue::EmptyFile => FailureReason::EmptyFile,
            FileIssue::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            FileIssue::Unreadable(_) | FileIssue::Timeout(_) | FileIssue::MappingUnavailable(_) => {
                FailureReason::Unreadable
            }
        }
    }
}

/// Prediction for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiagnostic {
    pub path: PathBuf,
    pub extraction_path: ExtractionPath,
    pub failure_reason: Option<FailureReason>,
    pub size_bytes: u64,
}

/// Prediction for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub dataset: String,
    /// Most common path among the dataset's files.
    pub extraction_path: ExtractionPath,
    /// `None` when at least one file is expected to extract.
    pub failure_reason: Option<FailureReason>,
    pub total_files: usize,
    pub extractable_files: usize,
    pub files: Vec<FileDiagnostic>,
}

/// Aggregate scan report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub datasets: Vec<DiagnosticResult>,
    /// Datasets per failure reason.
    pub by_failure_reason: BTreeMap<FailureReason, usize>,
    /// Datasets per predicted extraction path.
    pub by_extraction_path: BTreeMap<ExtractionPath, usize>,
    pub total_datasets: usize,
    pub total_files: usize,
}

/// Predicts extraction outcomes without extracting.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticScanner {
    fallback_encodings: Vec<&'static Encoding>,
}

impl DiagnosticScanner {
    pub fn new(fallback_encodings: Vec<&'static Encoding>) -> Self {
        Self { fallback_encodings }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(config.encodings()?))
    }

    pub fn scan(&self, datasets: &[Dataset]) -> ScanReport {
        let mut report = ScanReport::default();
        for dataset in datasets {
            let result = self.scan_dataset(dataset);
            if let Some(reason) = result.failure_reason {
                *report.by_failure_reason.entry(reason).or_default() += 1;
            }
            *report.by_extraction_path.entry(result.extraction_path).or_default() += 1;
            report.total_files += result.total_files;
            report.datasets.push(result);
        }
        report.total_datasets = report.datasets.len();

        info!(
            datasets = report.total_datasets,
            files = report.total_files,
            failing = report.by_failure_reason.values().sum::<usize>(),
            "Scan complete"
        );
        report
    }

    pub fn scan_dataset(&self, dataset: &Dataset) -> DiagnosticResult {
        let files: Vec<FileDiagnostic> = dataset.files.iter().map(|f| self.scan_file(f)).collect();

        let mut paths: BTreeMap<ExtractionPath, usize> = BTreeMap::new();
        let mut failures: BTreeMap<FailureReason, usize> = BTreeMap::new();
        let mut extractable = 0;
        for file in &files {
            if file.extraction_path != ExtractionPath::None {
                *paths.entry(file.extraction_path).or_default() += 1;
            }
            match file.failure_reason {
                Some(reason) => *failures.entry(reason).or_default() += 1,
                None => extractable += 1,
            }
        }

        let failure_reason = if files.is_empty() {
            Some(FailureReason::NoFiles)
        } else if extractable > 0 {
            None
        } else {
            most_frequent(&failures)
        };

        let result = DiagnosticResult {
            dataset: dataset.name.clone(),
            extraction_path: most_frequent(&paths).unwrap_or(ExtractionPath::None),
            failure_reason,
            total_files: files.len(),
            extractable_files: extractable,
            files,
        };
        debug!(
            dataset = %result.dataset,
            path = result.extraction_path.as_str(),
            failure = ?result.failure_reason,
            "Scanned dataset"
        );
        result
    }

    pub fn scan_file(&self, path: &Path) -> FileDiagnostic {
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let by_extension = ExtractionPath::from_extension(path);
        let (extraction_path, failure_reason) = match std::fs::metadata(path) {
            Err(_) => (by_extension, Some(FailureReason::Unreadable)),
            Ok(m) if m.len() == 0 => (by_extension, Some(FailureReason::EmptyFile)),
            Ok(_) => match by_extension {
                ExtractionPath::Tabular => self.sniff_tabular(path),
                ExtractionPath::Array => sniff_array(path),
                ExtractionPath::None => (ExtractionPath::None, Some(FailureReason::UnsupportedFormat)),
                other => (other, None),
            },
        };

        FileDiagnostic {
            path: path.to_path_buf(),
            extraction_path,
            failure_reason,
            size_bytes,
        }
    }

    fn sniff_tabular(&self, path: &Path) -> (ExtractionPath, Option<FailureReason>) {
        let bytes = match read_head(path) {
            Ok(bytes) => bytes,
            Err(_) => return (ExtractionPath::Tabular, Some(FailureReason::Unreadable)),
        };
        let text = match decode(&bytes, &self.fallback_encodings) {
            Ok(decoded) => decoded.text,
            Err(issue) => return (ExtractionPath::Tabular, Some(FailureReason::from(&issue))),
        };
        let Some(line) = header_line(&text) else {
            return (ExtractionPath::Tabular, Some(FailureReason::EmptyFile));
        };
        let headers = split_header(line);

        if headers
            .iter()
            .any(|h| BIOLOGICAL_COLUMNS.contains(&h.trim().to_lowercase().as_str()))
        {
            return (ExtractionPath::Biological, None);
        }

        let failure = match Columns::resolve(&headers) {
            Ok(_) if !has_data_row(&text) => Some(FailureReason::EmptyFile),
            Ok(_) => None,
            Err(_) if !headers.iter().any(|h| is_known(h)) => Some(FailureReason::UnrecognizedHeader),
            Err(issue) => Some(FailureReason::from(&issue)),
        };
        (ExtractionPath::Tabular, failure)
    }
}

fn sniff_array(path: &Path) -> (ExtractionPath, Option<FailureReason>) {
    match netcdf_parser::sniff_format(path) {
        Ok(ArrayFormat::Unknown) => (ExtractionPath::Array, Some(FailureReason::UnsupportedFormat)),
        Ok(_) => (ExtractionPath::Array, None),
        Err(_) => (ExtractionPath::Array, Some(FailureReason::Unreadable)),
    }
}

/// First bytes of a file, cut back to the last full line when truncated.
fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?
        .take(SNIFF_BYTES)
        .read_to_end(&mut bytes)?;
    if bytes.len() as u64 == SNIFF_BYTES {
        match bytes.iter().rposition(|b| *b == b'\n') {
            Some(end) => bytes.truncate(end + 1),
            None => trim_split_utf8(&mut bytes),
        }
    }
    Ok(bytes)
}

/// Drop a multi-byte UTF-8 sequence cut off by the read limit. Invalid
/// bytes elsewhere are left for the decoder to reject.
fn trim_split_utf8(bytes: &mut Vec<u8>) {
    if let Err(e) = std::str::from_utf8(bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
}

/// Whether a non-comment line follows the header.
fn has_data_row(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .nth(1)
        .is_some()
}

/// Key with the highest count; ties go to the smallest key.
fn most_frequent<K: Copy + Ord>(counts: &BTreeMap<K, usize>) -> Option<K> {
    counts
        .iter()
        .fold(None, |best: Option<(K, usize)>, (k, n)| match best {
            Some((_, m)) if m >= *n => best,
            _ => Some((*k, *n)),
        })
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dataset(dir: &Path, files: &[(&str, &[u8])]) -> Dataset {
        fs::create_dir_all(dir).unwrap();
        let mut ds = Dataset::new(dir.file_name().unwrap().to_string_lossy(), dir);
        for (name, content) in files {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            ds.files.push(path);
        }
        ds
    }

    fn reason_of(scanner: &DiagnosticScanner, dir: &Path, name: &str, content: &[u8]) -> Option<FailureReason> {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        scanner.scan_file(&path).failure_reason
    }

    #[test]
    fn test_file_classification() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DiagnosticScanner::default();
        let d = dir.path();

        assert_eq!(reason_of(&scanner, d, "ok.csv", b"date,value\n2021-01-01,1\n"), None);
        assert_eq!(reason_of(&scanner, d, "empty.csv", b""), Some(FailureReason::EmptyFile));
        assert_eq!(
            reason_of(&scanner, d, "header_only.csv", b"date,value\n"),
            Some(FailureReason::EmptyFile)
        );
        assert_eq!(
            reason_of(&scanner, d, "no_value.csv", b"date,station\n2021-01-01,A\n"),
            Some(FailureReason::MissingRequiredColumns)
        );
        assert_eq!(
            reason_of(&scanner, d, "junk.csv", b"foo,bar\n1,2\n"),
            Some(FailureReason::UnrecognizedHeader)
        );
        assert_eq!(
            reason_of(&scanner, d, "latin1.csv", b"date,valeur\xE9\n2021-01-01,1\n"),
            Some(FailureReason::EncodingError)
        );
        assert_eq!(reason_of(&scanner, d, "ok.nc", b"CDF\x01\x00\x00\x00\x00"), None);
        assert_eq!(
            reason_of(&scanner, d, "fake.nc", b"date,value\n"),
            Some(FailureReason::UnsupportedFormat)
        );
        assert_eq!(
            reason_of(&scanner, d, "notes.docx", b"PK"),
            Some(FailureReason::UnsupportedFormat)
        );
    }

    #[test]
    fn test_fallback_encoding_makes_file_readable() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DiagnosticScanner::new(vec![encoding_rs::WINDOWS_1252]);
        assert_eq!(
            reason_of(&scanner, dir.path(), "latin1.csv", b"date,value,remarque\n2021-01-01,1,d\xE9rive\n"),
            None
        );
    }

    #[test]
    fn test_read_limit_inside_multibyte_char() {
        let dir = tempfile::tempdir().unwrap();
        // 13 ASCII bytes then two-byte chars, so the read limit lands mid-char.
        let mut content = b"date,value,xy".to_vec();
        for _ in 0..40_000 {
            content.extend_from_slice("é".as_bytes());
        }
        let path = dir.path().join("wide.csv");
        fs::write(&path, &content).unwrap();

        let head = read_head(&path).unwrap();
        assert_eq!(head.len() as u64, SNIFF_BYTES - 1);
        assert!(std::str::from_utf8(&head).is_ok());

        let scanner = DiagnosticScanner::new(Vec::new());
        assert_eq!(scanner.scan_file(&path).failure_reason, Some(FailureReason::EmptyFile));
    }

    #[test]
    fn test_trim_keeps_invalid_bytes_for_decoder() {
        let mut split = b"date,valu\xC3".to_vec();
        trim_split_utf8(&mut split);
        assert_eq!(split, b"date,valu");

        let mut invalid = b"date,valeur\xE9,x".to_vec();
        trim_split_utf8(&mut invalid);
        assert_eq!(invalid, b"date,valeur\xE9,x");
    }

    #[test]
    fn test_biological_and_spatial_paths() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DiagnosticScanner::default();
        let ds = dataset(
            &dir.path().join("benthos"),
            &[
                ("occurrences.csv", b"occurrenceID,scientificName,eventDate\n1,Abra alba,2021-01-01\n"),
                ("stations.geojson", b"{}"),
                ("more.tsv", b"scientificName\teventDate\nAbra alba\t2021\n"),
            ],
        );
        let result = scanner.scan_dataset(&ds);
        assert_eq!(result.extraction_path, ExtractionPath::Biological);
        assert_eq!(result.failure_reason, None);
        assert_eq!(result.files[1].extraction_path, ExtractionPath::Spatial);
    }

    #[test]
    fn test_report_aggregates_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DiagnosticScanner::default();
        let good = dataset(
            &dir.path().join("good"),
            &[("TEMP.csv", b"date,value\n2021-01-01,1\n"), ("empty.csv", b"")],
        );
        let empty = dataset(&dir.path().join("empty"), &[("a.csv", b""), ("b.csv", b"")]);
        let none = dataset(&dir.path().join("none"), &[]);
        let array = dataset(&dir.path().join("array"), &[("x.nc", b"\x89HDF\r\n\x1a\n")]);

        let report = scanner.scan(&[good, empty, none, array]);
        assert_eq!(report.total_datasets, 4);
        assert_eq!(report.total_files, 5);
        assert_eq!(report.datasets[0].failure_reason, None);
        assert_eq!(report.datasets[0].extractable_files, 1);
        assert_eq!(report.datasets[1].failure_reason, Some(FailureReason::EmptyFile));
        assert_eq!(report.datasets[2].failure_reason, Some(FailureReason::NoFiles));
        assert_eq!(report.by_failure_reason.get(&FailureReason::EmptyFile), Some(&1));
        assert_eq!(report.by_failure_reason.get(&FailureReason::NoFiles), Some(&1));
        assert_eq!(report.by_extraction_path.get(&ExtractionPath::Tabular), Some(&2));
        assert_eq!(report.by_extraction_path.get(&ExtractionPath::Array), Some(&1));
        assert_eq!(report.by_extraction_path.get(&ExtractionPath::None), Some(&1));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["by_failure_reason"]["no_files"], 1);
    }

    #[test]
    fn test_most_frequent_ties_pick_smallest() {
        let mut counts = BTreeMap::new();
        counts.insert(ExtractionPath::Array, 2);
        counts.insert(ExtractionPath::Tabular, 2);
        assert_eq!(most_frequent(&counts), Some(ExtractionPath::Tabular));
    }
}
