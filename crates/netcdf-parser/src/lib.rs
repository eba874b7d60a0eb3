//! Reader for self-describing array files (NetCDF classic and NetCDF-4).
//!
//! Files are loaded into an in-memory [`ArrayFile`]: dimensions, variables
//! with their numeric values flattened in row-major order, and attributes.
//! Extraction logic works against this model only, so it can be exercised
//! with hand-built files in tests.
//!
//! # Implementation Notes
//!
//! Reading real files uses the `netcdf` crate (libnetcdf + HDF5) behind the
//! default `native` feature. Without it, [`open`] returns
//! [`NetCdfError::Unsupported`] while header sniffing keeps working.

mod error;
#[cfg(feature = "native")]
mod native;

pub use error::{NetCdfError, NetCdfResult};
#[cfg(feature = "native")]
pub use native::silence_hdf5_errors;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Attribute value, reduced to the shapes ingestion cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Numbers(v) if v.len() == 1 => Some(v[0]),
            AttrValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A named dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// A variable with its values flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub values: Vec<f64>,
}

impl Variable {
    pub fn new(name: impl Into<String>, dimensions: &[&str], values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            attributes: BTreeMap::new(),
            values,
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn text_attr(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttrValue::as_str)
    }

    pub fn f64_attr(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(AttrValue::as_f64)
    }

    /// Packed-value unpacking: `raw * scale_factor + add_offset`, with
    /// `_FillValue` / `missing_value` cells mapped to `None`.
    pub fn unpacked(&self, index: usize) -> Option<f64> {
        let raw = *self.values.get(index)?;
        if !raw.is_finite() {
            return None;
        }
        for fill_attr in ["_FillValue", "missing_value"] {
            if let Some(fill) = self.f64_attr(fill_attr) {
                if raw == fill {
                    return None;
                }
            }
        }
        let scale = self.f64_attr("scale_factor").unwrap_or(1.0);
        let offset = self.f64_attr("add_offset").unwrap_or(0.0);
        Some(raw * scale + offset)
    }
}

/// In-memory view of one array file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayFile {
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<Variable>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl ArrayFile {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().find(|d| d.name == name).map(|d| d.len)
    }

    /// Global (file-level) attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn text_attr(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttrValue::as_str)
    }

    /// Shape of a variable, resolved through the dimension table.
    pub fn shape(&self, var: &Variable) -> Vec<usize> {
        var.dimensions
            .iter()
            .map(|d| self.dimension_len(d).unwrap_or(0))
            .collect()
    }
}

/// On-disk container detected from the leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayFormat {
    /// NetCDF classic (CDF-1)
    Classic,
    /// NetCDF 64-bit offset (CDF-2)
    Offset64,
    /// NetCDF 64-bit data (CDF-5)
    Cdf5,
    /// NetCDF-4 / HDF5
    Hdf5,
    Unknown,
}

const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Detect the container format from leading bytes.
pub fn detect_format(header: &[u8]) -> ArrayFormat {
    match header {
        [b'C', b'D', b'F', 1, ..] => ArrayFormat::Classic,
        [b'C', b'D', b'F', 2, ..] => ArrayFormat::Offset64,
        [b'C', b'D', b'F', 5, ..] => ArrayFormat::Cdf5,
        h if h.starts_with(HDF5_MAGIC) => ArrayFormat::Hdf5,
        _ => ArrayFormat::Unknown,
    }
}

/// Sniff the format of a file on disk by reading its first bytes.
pub fn sniff_format<P: AsRef<Path>>(path: P) -> NetCdfResult<ArrayFormat> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut header = [0u8; 8];
    let mut read = 0;
    while read < header.len() {
        let n = file.read(&mut header[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(detect_format(&header[..read]))
}

/// Load an array file into memory.
pub fn open<P: AsRef<Path>>(path: P) -> NetCdfResult<ArrayFile> {
    #[cfg(feature = "native")]
    {
        native::read_array_file(path.as_ref())
    }

    #[cfg(not(feature = "native"))]
    {
        Err(NetCdfError::Unsupported(format!(
            "{} (built without the `native` feature)",
            path.as_ref().display()
        )))
    }
}
