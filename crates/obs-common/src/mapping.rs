//! Parameter mappings: raw source names to standard vocabulary codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// Controlled vocabulary a standard parameter code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// BODC / SeaDataNet parameter vocabulary (P01, P02).
    Bodc,
    /// CF standard names.
    Cf,
    /// Locally defined codes, including auto-created fallbacks.
    Custom,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Bodc => "bodc",
            Namespace::Cf => "cf",
            Namespace::Custom => "custom",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bodc" | "p01" | "p02" | "seadatanet" => Ok(Namespace::Bodc),
            "cf" | "cf-standard-name" | "cf_standard_name" => Ok(Namespace::Cf),
            "custom" | "local" => Ok(Namespace::Custom),
            other => Err(CommonError::UnknownNamespace(other.to_string())),
        }
    }
}

/// Where a mapping row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingProvenance {
    /// Loaded from the externally supplied seed list.
    #[default]
    Seed,
    /// Created on the first unresolved lookup during ingestion.
    Auto,
    /// Corrected by a curator after creation.
    Curated,
}

impl MappingProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingProvenance::Seed => "seed",
            MappingProvenance::Auto => "auto",
            MappingProvenance::Curated => "curated",
        }
    }

    /// Lenient parse used when reading rows back from storage.
    pub fn from_db(s: &str) -> Self {
        match s {
            "auto" => MappingProvenance::Auto,
            "curated" => MappingProvenance::Curated,
            _ => MappingProvenance::Seed,
        }
    }
}

/// Unit recorded when neither the store nor the source knows one.
pub const UNKNOWN_UNIT: &str = "unknown";

/// A raw-name to standard-code association.
///
/// `raw_name` is always stored normalized (see [`normalize_raw_name`]) and is
/// unique across the mapping store. Several raw names may share one
/// `standard_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub raw_name: String,
    pub standard_code: String,
    pub namespace: Namespace,
    pub unit: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provenance: MappingProvenance,
}

impl Mapping {
    pub fn new(
        raw_name: &str,
        standard_code: impl Into<String>,
        namespace: Namespace,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            raw_name: normalize_raw_name(raw_name),
            standard_code: standard_code.into(),
            namespace,
            unit: unit.into(),
            description: None,
            provenance: MappingProvenance::Seed,
        }
    }

    /// Fallback mapping for a raw name with no stored association.
    ///
    /// The code is derived deterministically, the namespace is always
    /// `custom`, and the unit is the file-declared one or `"unknown"`.
    pub fn fallback(raw_name: &str, declared_unit: Option<&str>) -> Self {
        let unit = declared_unit
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_UNIT);
        Self {
            raw_name: normalize_raw_name(raw_name),
            standard_code: derive_standard_code(raw_name),
            namespace: Namespace::Custom,
            unit: unit.to_string(),
            description: None,
            provenance: MappingProvenance::Auto,
        }
    }

    /// Re-normalize the raw name, e.g. after deserializing a seed entry.
    pub fn normalized(mut self) -> Self {
        self.raw_name = normalize_raw_name(&self.raw_name);
        self
    }
}

/// Trim, case-fold and collapse internal whitespace.
pub fn normalize_raw_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic code for an unmapped raw name: upper-case, spaces to underscores.
pub fn derive_standard_code(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}
