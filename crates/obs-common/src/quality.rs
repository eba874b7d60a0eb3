//! Quality flags attached to source measurements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Analyst-assessed reliability code (SeaDataNet-style scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityFlag(pub u8);

impl QualityFlag {
    /// No quality control performed; assigned to records without a source flag.
    pub const NO_QC: QualityFlag = QualityFlag(0);
    pub const GOOD: QualityFlag = QualityFlag(1);
    pub const PROBABLY_GOOD: QualityFlag = QualityFlag(2);
    pub const PROBABLY_BAD: QualityFlag = QualityFlag(3);
    pub const BAD: QualityFlag = QualityFlag(4);
    pub const MISSING: QualityFlag = QualityFlag(9);

    /// Neutral value given to records whose source carries no flag.
    pub const NEUTRAL: QualityFlag = QualityFlag::NO_QC;

    /// Parse a flag cell. Accepts small integers (also written as `1.0`) and
    /// the textual names of the scale. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<QualityFlag> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(n) = trimmed.parse::<u8>() {
            return Some(QualityFlag(n));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.fract() == 0.0 && (0.0..=255.0).contains(&f) {
                return Some(QualityFlag(f as u8));
            }
            return None;
        }

        let words = trimmed
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match words.as_str() {
            "no qc" | "no quality control" | "unknown" => Some(QualityFlag::NO_QC),
            "good" => Some(QualityFlag::GOOD),
            "probably good" => Some(QualityFlag::PROBABLY_GOOD),
            "probably bad" => Some(QualityFlag::PROBABLY_BAD),
            "bad" => Some(QualityFlag::BAD),
            "missing" => Some(QualityFlag::MISSING),
            _ => None,
        }
    }

    /// Flag from a numeric array cell; non-integral or out-of-range values are absent.
    pub fn from_number(value: f64) -> Option<QualityFlag> {
        if value.is_finite() && value.fract() == 0.0 && (0.0..=255.0).contains(&value) {
            Some(QualityFlag(value as u8))
        } else {
            None
        }
    }
}

impl Default for QualityFlag {
    fn default() -> Self {
        QualityFlag::NEUTRAL
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
