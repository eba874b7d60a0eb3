//! Per-file, per-dataset and per-run outcome reports.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extract::ExtractionPath;
use crate::issue::FileIssue;
use crate::loader::LoadSummary;
use crate::quality::QualityCounts;

/// Outcome of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub extraction_path: ExtractionPath,
    /// Why the file was skipped, if it was.
    pub issue: Option<FileIssue>,
    pub rows_read: usize,
    pub time_rejections: usize,
    /// Structurally broken rows.
    pub row_errors: usize,
    pub missing_values: usize,
    pub kept: usize,
    pub dropped: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub conversion_errors: usize,
    pub encoding: Option<String>,
    pub truncated: bool,
}

impl FileSummary {
    pub fn new(path: impl Into<PathBuf>, extraction_path: ExtractionPath) -> Self {
        Self {
            path: path.into(),
            extraction_path,
            issue: None,
            rows_read: 0,
            time_rejections: 0,
            row_errors: 0,
            missing_values: 0,
            kept: 0,
            dropped: 0,
            inserted: 0,
            duplicates: 0,
            failed: 0,
            conversion_errors: 0,
            encoding: None,
            truncated: false,
        }
    }

    pub fn skipped(path: impl Into<PathBuf>, extraction_path: ExtractionPath, issue: FileIssue) -> Self {
        Self {
            issue: Some(issue),
            ..Self::new(path, extraction_path)
        }
    }

    pub fn record_quality(&mut self, counts: QualityCounts) {
        self.kept += counts.kept;
        self.dropped += counts.dropped;
    }

    pub fn record_load(&mut self, load: &LoadSummary) {
        self.inserted += load.inserted;
        self.duplicates += load.duplicates;
        self.failed += load.failed;
        self.conversion_errors += load.conversion_errors;
    }

    /// Skipped for a reason other than an expected no-op.
    pub fn is_failed(&self) -> bool {
        self.issue.as_ref().is_some_and(|i| !i.is_benign())
    }
}

/// Counters summed over files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub files: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_read: usize,
    pub time_rejections: usize,
    pub row_errors: usize,
    pub kept: usize,
    pub dropped: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl Totals {
    pub fn add_file(&mut self, file: &FileSummary) {
        self.files += 1;
        if file.issue.is_some() {
            self.files_skipped += 1;
        }
        if file.is_failed() {
            self.files_failed += 1;
        }
        self.rows_read += file.rows_read;
        self.time_rejections += file.time_rejections;
        self.row_errors += file.row_errors;
        self.kept += file.kept;
        self.dropped += file.dropped;
        self.inserted += file.inserted;
        self.duplicates += file.duplicates;
        self.failed += file.failed;
    }

    pub fn merge(&mut self, other: &Totals) {
        self.files += other.files;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.rows_read += other.rows_read;
        self.time_rejections += other.time_rejections;
        self.row_errors += other.row_errors;
        self.kept += other.kept;
        self.dropped += other.dropped;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

/// Outcome of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset: String,
    pub files: Vec<FileSummary>,
    pub totals: Totals,
    /// Measurements removed by a reload before loading.
    pub cleared: u64,
    /// Stopped early on a cancellation request.
    pub cancelled: bool,
}

impl DatasetSummary {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            files: Vec::new(),
            totals: Totals::default(),
            cleared: 0,
            cancelled: false,
        }
    }

    pub fn push(&mut self, file: FileSummary) {
        self.totals.add_file(&file);
        self.files.push(file);
    }
}

/// Outcome of a whole run. Always produced, even when files failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub datasets: Vec<DatasetSummary>,
    pub totals: Totals,
    pub mappings_created: u64,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn push(&mut self, dataset: DatasetSummary) {
        self.totals.merge(&dataset.totals);
        self.cancelled |= dataset.cancelled;
        self.datasets.push(dataset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_roll_up() {
        let mut ok = FileSummary::new("a.csv", ExtractionPath::Tabular);
        ok.rows_read = 10;
        ok.record_quality(QualityCounts { kept: 8, dropped: 2 });
        ok.record_load(&LoadSummary {
            inserted: 7,
            failed: 1,
            conversion_errors: 1,
            ..Default::default()
        });

        let empty = FileSummary::skipped("b.csv", ExtractionPath::Tabular, FileIssue::EmptyFile);
        let broken = FileSummary::skipped(
            "c.csv",
            ExtractionPath::Tabular,
            FileIssue::MissingRequiredColumns(vec!["time".into()]),
        );
        assert!(!empty.is_failed());
        assert!(broken.is_failed());

        let mut dataset = DatasetSummary::new("ds");
        dataset.push(ok);
        dataset.push(empty);
        dataset.push(broken);

        let mut run = RunSummary::default();
        run.push(dataset);
        let t = run.totals;
        assert_eq!((t.files, t.files_skipped, t.files_failed), (3, 2, 1));
        assert_eq!((t.kept, t.dropped, t.inserted, t.failed), (8, 2, 7, 1));
    }

    #[test]
    fn test_serializes_issue_with_kind() {
        let file = FileSummary::skipped("x.csv", ExtractionPath::Tabular, FileIssue::EmptyFile);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["issue"]["kind"], "empty_file");
        assert_eq!(json["extraction_path"], "tabular");
    }
}
