//! Native NetCDF reading using the netcdf library.
//!
//! Variables are read whole and widened to `f64`. Packing attributes
//! (`scale_factor`, `add_offset`, `_FillValue`) are kept as attributes and
//! applied later by [`crate::Variable::unpacked`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;

use tracing::{debug, warn};

use crate::error::{NetCdfError, NetCdfResult};
use crate::{ArrayFile, AttrValue, Dimension, Variable};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when probing optional
/// attributes). Safe to call multiple times; only the first call has effect.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read every dimension, variable and attribute of a file.
pub(crate) fn read_array_file(path: &Path) -> NetCdfResult<ArrayFile> {
    silence_hdf5_errors();

    let nc_file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

    let dimensions = nc_file
        .dimensions()
        .map(|d| Dimension {
            name: d.name(),
            len: d.len(),
        })
        .collect();

    let attributes = read_attributes(nc_file.attributes());

    let mut variables = Vec::new();
    for var in nc_file.variables() {
        let name = var.name();
        let Some(values) = read_values(&var) else {
            warn!(variable = %name, file = %path.display(), "Skipping non-numeric variable");
            continue;
        };
        variables.push(Variable {
            dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
            attributes: read_attributes(var.attributes()),
            name,
            values,
        });
    }

    debug!(
        file = %path.display(),
        variables = variables.len(),
        "Loaded array file"
    );

    Ok(ArrayFile {
        dimensions,
        variables,
        attributes,
    })
}

fn read_attributes<'a>(
    attrs: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> BTreeMap<String, AttrValue> {
    attrs
        .filter_map(|attr| {
            let value = attr.value().ok().and_then(convert_attr)?;
            Some((attr.name().to_string(), value))
        })
        .collect()
}

fn convert_attr(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as V;

    match value {
        V::Str(s) => Some(AttrValue::Text(s)),
        V::Strs(v) => Some(AttrValue::Text(v.join(" "))),
        V::Doubles(v) => Some(AttrValue::Numbers(v)),
        V::Floats(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        V::Ints(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        V::Shorts(v) => Some(AttrValue::Numbers(v.into_iter().map(f64::from).collect())),
        other => f64::try_from(other).ok().map(AttrValue::Number),
    }
}

/// Read all values of a variable, widening whichever numeric type it holds.
fn read_values(var: &netcdf::Variable) -> Option<Vec<f64>> {
    if let Ok(v) = var.get_values::<f64, _>(..) {
        return Some(v);
    }
    if let Ok(v) = var.get_values::<f32, _>(..) {
        return Some(v.into_iter().map(f64::from).collect());
    }
    if let Ok(v) = var.get_values::<i32, _>(..) {
        return Some(v.into_iter().map(f64::from).collect());
    }
    if let Ok(v) = var.get_values::<i16, _>(..) {
        return Some(v.into_iter().map(f64::from).collect());
    }
    if let Ok(v) = var.get_values::<i8, _>(..) {
        return Some(v.into_iter().map(f64::from).collect());
    }
    if let Ok(v) = var.get_values::<u8, _>(..) {
        return Some(v.into_iter().map(f64::from).collect());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_text_attr() {
        let v = convert_attr(netcdf::AttributeValue::Str("days since 1900-01-01".into()));
        assert_eq!(v, Some(AttrValue::Text("days since 1900-01-01".into())));
    }

    #[test]
    fn test_convert_numeric_attr() {
        assert_eq!(
            convert_attr(netcdf::AttributeValue::Double(-999.0)),
            Some(AttrValue::Number(-999.0))
        );
        assert_eq!(
            convert_attr(netcdf::AttributeValue::Shorts(vec![1, 2])),
            Some(AttrValue::Numbers(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_open_garbage_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_really.nc");
        std::fs::write(&path, b"this is not netcdf").unwrap();
        assert!(matches!(
            read_array_file(&path),
            Err(NetCdfError::InvalidFormat(_))
        ));
    }
}
