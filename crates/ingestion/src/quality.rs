//! Quality filtering of extracted observations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use obs_common::QualityFlag;

use crate::config::IngestConfig;

/// Outcome of classifying one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep, carrying the resolved flag.
    Keep(QualityFlag),
    Drop,
}

/// Kept/dropped tallies for one unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCounts {
    pub kept: usize,
    pub dropped: usize,
}

/// Keep-or-drop policy over quality flags.
///
/// Flags in the accepted set are kept. Records without a flag, or flagged
/// "no QC performed", are kept with the neutral flag. Every other flag,
/// including explicit bad and missing, is dropped.
#[derive(Debug, Clone)]
pub struct QualityFilter {
    accepted: BTreeSet<QualityFlag>,
}

impl QualityFilter {
    pub fn new(accepted: impl IntoIterator<Item = QualityFlag>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.accepted_flags())
    }

    pub fn classify(&self, flag: Option<QualityFlag>) -> Verdict {
        match flag {
            None | Some(QualityFlag::NO_QC) => Verdict::Keep(QualityFlag::NEUTRAL),
            Some(flag) if self.accepted.contains(&flag) => Verdict::Keep(flag),
            Some(_) => Verdict::Drop,
        }
    }

    /// Partition `items` by the flag `flag_of` reads from each one. Kept
    /// items are returned with their resolved flag.
    pub fn apply<T>(
        &self,
        items: Vec<T>,
        flag_of: impl Fn(&T) -> Option<QualityFlag>,
    ) -> (Vec<(T, QualityFlag)>, QualityCounts) {
        let mut counts = QualityCounts::default();
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            match self.classify(flag_of(&item)) {
                Verdict::Keep(flag) => {
                    counts.kept += 1;
                    kept.push((item, flag));
                }
                Verdict::Drop => counts.dropped += 1,
            }
        }
        (kept, counts)
    }
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new([QualityFlag::GOOD, QualityFlag::PROBABLY_GOOD])
    }
}
