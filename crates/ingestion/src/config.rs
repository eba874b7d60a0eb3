//! Ingestion configuration.
//!
//! Every knob has a default so a partial YAML `ingestion:` section (or none
//! at all) is valid. Call [`IngestConfig::validate`] before building an
//! [`crate::Ingester`].

use chrono::NaiveDate;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use obs_common::QualityFlag;

use crate::error::{IngestionError, Result};

/// Inclusive year bounds used to pick between candidate epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self { min: 1950, max: 2035 }
    }
}

/// Operational knobs of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Measurements per batch write.
    pub batch_size: usize,
    /// Quality flags that are kept; everything else is dropped.
    pub accepted_quality_flags: Vec<u8>,
    /// Epochs tried for unitless day-count time values (`YYYY-MM-DD`).
    pub candidate_epochs: Vec<String>,
    /// Years considered plausible when disambiguating epochs.
    pub plausible_years: YearRange,
    /// Case-insensitive partial dataset name.
    pub dataset_filter: Option<String>,
    /// Per-file cap on extracted rows.
    pub row_limit: Option<usize>,
    /// Extract, filter and look up mappings without writing anything.
    pub dry_run: bool,
    pub file_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Encoding labels tried, in order, after UTF-8 fails.
    pub fallback_encodings: Vec<String>,
    pub max_concurrent_datasets: usize,
    /// Delete a dataset's measurements before loading it again.
    pub reload: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            accepted_quality_flags: vec![QualityFlag::GOOD.0, QualityFlag::PROBABLY_GOOD.0],
            candidate_epochs: vec!["1900-01-01".to_string(), "1970-01-01".to_string()],
            plausible_years: YearRange::default(),
            dataset_filter: None,
            row_limit: None,
            dry_run: false,
            file_timeout_secs: 300,
            batch_timeout_secs: 60,
            fallback_encodings: vec!["windows-1252".to_string()],
            max_concurrent_datasets: 1,
            reload: false,
        }
    }
}

impl IngestConfig {
    /// Check every knob, reporting the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size > storage::MAX_BATCH_ROWS {
            return Err(IngestionError::InvalidConfig(format!(
                "batch_size {} exceeds the maximum of {}",
                self.batch_size,
                storage::MAX_BATCH_ROWS
            )));
        }
        if self.plausible_years.min > self.plausible_years.max {
            return Err(IngestionError::InvalidConfig(format!(
                "plausible_years.min ({}) is after plausible_years.max ({})",
                self.plausible_years.min, self.plausible_years.max
            )));
        }
        if self.max_concurrent_datasets == 0 {
            return Err(IngestionError::InvalidConfig(
                "max_concurrent_datasets must be at least 1".to_string(),
            ));
        }
        if self.file_timeout_secs == 0 || self.batch_timeout_secs == 0 {
            return Err(IngestionError::InvalidConfig(
                "timeouts must be at least one second".to_string(),
            ));
        }
        self.epochs()?;
        self.encodings()?;
        Ok(())
    }

    /// Candidate epochs, parsed.
    pub fn epochs(&self) -> Result<Vec<NaiveDate>> {
        self.candidate_epochs
            .iter()
            .map(|s| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                    IngestionError::InvalidConfig(format!("candidate epoch '{}': {}", s, e))
                })
            })
            .collect()
    }

    /// Fallback encodings, resolved from their WHATWG labels.
    pub fn encodings(&self) -> Result<Vec<&'static Encoding>> {
        self.fallback_encodings
            .iter()
            .map(|label| {
                Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                    IngestionError::InvalidConfig(format!("unknown encoding label '{}'", label))
                })
            })
            .collect()
    }

    pub fn accepted_flags(&self) -> BTreeSet<QualityFlag> {
        self.accepted_quality_flags
            .iter()
            .copied()
            .map(QualityFlag)
            .collect()
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.epochs().unwrap().len(), 2);
        assert_eq!(config.encodings().unwrap()[0], encoding_rs::WINDOWS_1252);
        assert!(config.accepted_flags().contains(&QualityFlag::GOOD));
        assert!(!config.accepted_flags().contains(&QualityFlag::BAD));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: IngestConfig = serde_yaml::from_str("batch_size: 250\ndry_run: true\n").unwrap();
        assert_eq!(config.batch_size, 250);
        assert!(config.dry_run);
        assert_eq!(config.plausible_years, YearRange { min: 1950, max: 2035 });
        assert_eq!(config.file_timeout_secs, 300);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = IngestConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.batch_size = 10;
        config.plausible_years = YearRange { min: 2030, max: 1990 };
        assert!(config.validate().is_err());

        config.plausible_years = YearRange::default();
        config.candidate_epochs = vec!["1900/01/01x".into()];
        assert!(config.validate().is_err());

        config.candidate_epochs = vec!["1970-01-01".into()];
        config.fallback_encodings = vec!["klingon".into()];
        assert!(config.validate().is_err());

        config.fallback_encodings = vec!["latin1".into()];
        config.max_concurrent_datasets = 0;
        assert!(config.validate().is_err());

        config.max_concurrent_datasets = 4;
        config.validate().unwrap();
    }
}
