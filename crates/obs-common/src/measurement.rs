//! Canonical measurement records and their dedup key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::DatasetId;
use crate::mapping::Namespace;
use crate::quality::QualityFlag;

/// A value as read from the source, before numeric conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Finite numeric interpretation, if any.
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Optional spatial reference of a measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRef {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub depth: Option<f64>,
}

impl LocationRef {
    pub fn depth(depth: f64) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_none() && self.longitude.is_none() && self.depth.is_none()
    }

    /// Stable textual key used in the dedup tuple. Empty when no component is set.
    ///
    /// Coordinates are rounded to 1e-6 degrees and depth to millimetres so the
    /// same position read from two files yields the same key.
    pub fn key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(lat) = self.latitude {
            parts.push(format!("lat={:.6}", lat));
        }
        if let Some(lon) = self.longitude {
            parts.push(format!("lon={:.6}", lon));
        }
        if let Some(depth) = self.depth {
            parts.push(format!("depth={:.3}", depth));
        }
        parts.join(";")
    }
}

/// Standardized record awaiting numeric conversion and loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub timestamp: DateTime<Utc>,
    pub dataset_id: DatasetId,
    pub standard_code: String,
    pub namespace: Namespace,
    pub value: RawValue,
    pub unit: String,
    pub quality_flag: QualityFlag,
    pub location: Option<LocationRef>,
}

impl CandidateRecord {
    /// Convert to a canonical measurement. `None` when the value is
    /// non-numeric or non-finite.
    pub fn to_measurement(&self) -> Option<Measurement> {
        let value = self.value.to_f64()?;
        Some(Measurement {
            timestamp: self.timestamp,
            dataset_id: self.dataset_id,
            standard_code: self.standard_code.clone(),
            namespace: self.namespace,
            value,
            unit: self.unit.clone(),
            quality_flag: self.quality_flag,
            location: self.location.clone().filter(|l| !l.is_empty()),
        })
    }
}

/// Canonical time-series record. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub dataset_id: DatasetId,
    pub standard_code: String,
    pub namespace: Namespace,
    pub value: f64,
    pub unit: String,
    pub quality_flag: QualityFlag,
    pub location: Option<LocationRef>,
}

impl Measurement {
    pub fn location_key(&self) -> String {
        self.location.as_ref().map(LocationRef::key).unwrap_or_default()
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            timestamp: self.timestamp,
            standard_code: self.standard_code.clone(),
            namespace: self.namespace,
            dataset_id: self.dataset_id,
            location_key: self.location_key(),
        }
    }
}

/// Tuple whose uniqueness defines "the same measurement".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub timestamp: DateTime<Utc>,
    pub standard_code: String,
    pub namespace: Namespace,
    pub dataset_id: Uuid,
    pub location_key: String,
}
