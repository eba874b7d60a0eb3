//! Self-describing array files (NetCDF).

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use netcdf_parser::{ArrayFile, NetCdfError, Variable};
use obs_common::{LocationRef, QualityFlag, RawValue};

use super::{ExtractContext, ExtractionPath, Extractor, FileExtraction, Observation};
use crate::aliases::{is_quality_name, Field};
use crate::issue::{FileIssue, RowIssue};
use crate::time::DeclaredOffset;

/// Global attribute some producers use instead of a `units` on the time variable.
const GLOBAL_TIME_UNITS: &str = "time_units";

/// Extractor for NetCDF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayExtractor;

impl Extractor for ArrayExtractor {
    fn path(&self) -> ExtractionPath {
        ExtractionPath::Array
    }

    fn extract(&self, file: &Path, ctx: &ExtractContext) -> Result<FileExtraction, FileIssue> {
        let len = std::fs::metadata(file)
            .map_err(|e| FileIssue::Unreadable(e.to_string()))?
            .len();
        if len == 0 {
            return Err(FileIssue::EmptyFile);
        }

        let array = netcdf_parser::open(file).map_err(|e| match e {
            NetCdfError::Unsupported(msg) => FileIssue::UnsupportedFormat(msg),
            other => FileIssue::Unreadable(other.to_string()),
        })?;
        extract_array_file(&array, ctx)
    }
}

/// A coordinate that is either constant for the file or varies along time.
enum Coord<'a> {
    Scalar(f64),
    Series(&'a Variable),
}

impl Coord<'_> {
    fn at(&self, index: usize) -> Option<f64> {
        match self {
            Coord::Scalar(v) => Some(*v),
            Coord::Series(var) => var.unpacked(index),
        }
    }
}

/// Extract observations from an in-memory array file.
pub fn extract_array_file(
    file: &ArrayFile,
    ctx: &ExtractContext,
) -> Result<FileExtraction, FileIssue> {
    let time_var = find_time_variable(file)
        .ok_or_else(|| FileIssue::MissingRequiredColumns(vec![Field::Time.name().to_string()]))?;
    let time_dim = time_var
        .dimensions
        .first()
        .cloned()
        .unwrap_or_else(|| time_var.name.clone());
    let declared = time_var
        .text_attr("units")
        .and_then(DeclaredOffset::parse)
        .or_else(|| file.text_attr(GLOBAL_TIME_UNITS).and_then(DeclaredOffset::parse));

    let flag_names = flag_variable_names(file);
    let value_vars: Vec<&Variable> = file
        .variables
        .iter()
        .filter(|v| is_value_variable(file, v, time_var, &time_dim, &flag_names))
        .collect();
    if value_vars.is_empty() {
        return Err(FileIssue::MissingRequiredColumns(vec![
            Field::Value.name().to_string(),
        ]));
    }

    let n_time = file
        .dimension_len(&time_dim)
        .unwrap_or(time_var.values.len());
    let timestamps: Vec<Result<DateTime<Utc>, RowIssue>> = (0..n_time)
        .map(|i| match time_var.unpacked(i) {
            Some(t) => ctx
                .time
                .normalize(&time_var.name, &RawValue::Number(t), declared.as_ref()),
            None => Err(RowIssue::TimeFormatUnknown),
        })
        .collect();

    let latitude = coordinate(file, Field::Latitude, &time_dim);
    let longitude = coordinate(file, Field::Longitude, &time_dim);
    let series_depth = coordinate(file, Field::Depth, &time_dim);

    let mut extraction = FileExtraction::default();
    'vars: for var in value_vars {
        let shape = file.shape(var);
        let (levels, level_axis) = match shape.as_slice() {
            [_] => (1, None),
            [_, levels] => (*levels, depth_axis(file, &var.dimensions[1])),
            _ => {
                warn!(
                    variable = %var.name,
                    dimensions = ?var.dimensions,
                    "Skipping variable with more than two dimensions"
                );
                continue;
            }
        };
        let unit = var.text_attr("units").map(String::from);
        let flags = flag_variable(file, var);
        debug!(variable = %var.name, levels, has_flags = flags.is_some(), "Extracting variable");

        for (i, timestamp) in timestamps.iter().enumerate() {
            for j in 0..levels {
                if extraction.at_limit(ctx.row_limit) {
                    extraction.truncated = true;
                    break 'vars;
                }
                extraction.rows_read += 1;

                let timestamp = match timestamp {
                    Ok(ts) => *ts,
                    Err(_) => {
                        extraction.time_rejections += 1;
                        continue;
                    }
                };
                let index = i * levels + j;
                let value = match var.unpacked(index) {
                    Some(v) => v,
                    None => {
                        extraction.missing_values += 1;
                        continue;
                    }
                };
                let quality_flag = flags
                    .and_then(|f| f.unpacked(index))
                    .and_then(QualityFlag::from_number);

                let depth = match &level_axis {
                    Some(axis) => axis.unpacked(j),
                    None => series_depth.as_ref().and_then(|d| d.at(i)),
                };
                let location = LocationRef {
                    latitude: latitude.as_ref().and_then(|c| c.at(i)),
                    longitude: longitude.as_ref().and_then(|c| c.at(i)),
                    depth,
                };

                extraction.observations.push(Observation {
                    raw_parameter: var.name.clone(),
                    declared_unit: unit.clone(),
                    timestamp,
                    value: RawValue::Number(value),
                    quality_flag,
                    location: (!location.is_empty()).then_some(location),
                });
            }
        }
    }

    if extraction.rows_read == 0 {
        return Err(FileIssue::EmptyFile);
    }
    Ok(extraction)
}

/// Time variable: alias match first, then CF `standard_name`/`axis` markers.
fn find_time_variable(file: &ArrayFile) -> Option<&Variable> {
    Field::Time
        .aliases()
        .iter()
        .find_map(|alias| file.variables.iter().find(|v| v.name.eq_ignore_ascii_case(alias)))
        .or_else(|| {
            file.variables.iter().find(|v| {
                v.text_attr("standard_name") == Some("time") || v.text_attr("axis") == Some("T")
            })
        })
}

/// Names referenced as quality variables by some other variable.
fn flag_variable_names(file: &ArrayFile) -> HashSet<String> {
    let mut names = HashSet::new();
    for var in &file.variables {
        if let Some(ancillary) = var.text_attr("ancillary_variables") {
            names.extend(ancillary.split_whitespace().map(String::from));
        }
        names.insert(format!("{}_qc", var.name));
        names.insert(format!("{}_QC", var.name));
    }
    names
}

/// Quality variable of `var`: `<var>_qc` or the first existing ancillary variable.
fn flag_variable<'a>(file: &'a ArrayFile, var: &Variable) -> Option<&'a Variable> {
    let suffixed = [format!("{}_QC", var.name), format!("{}_qc", var.name)];
    suffixed
        .iter()
        .find_map(|name| file.variable(name))
        .or_else(|| {
            var.text_attr("ancillary_variables")?
                .split_whitespace()
                .find_map(|name| file.variable(name))
        })
}

fn is_spatial(var: &Variable) -> bool {
    [Field::Latitude, Field::Longitude, Field::Depth]
        .iter()
        .any(|f| f.matches(&var.name))
        || matches!(
            var.text_attr("standard_name"),
            Some("latitude" | "longitude" | "depth")
        )
}

fn is_value_variable(
    file: &ArrayFile,
    var: &Variable,
    time_var: &Variable,
    time_dim: &str,
    flag_names: &HashSet<String>,
) -> bool {
    var.name != time_var.name
        && var.dimensions.first().map(String::as_str) == Some(time_dim)
        && !file.dimensions.iter().any(|d| d.name == var.name)
        && !flag_names.contains(&var.name)
        && !is_quality_name(&var.name)
        && var.attribute("flag_values").is_none()
        && var.attribute("flag_meanings").is_none()
        && !is_spatial(var)
}

/// Latitude/longitude/depth constant for the file or along the time axis.
fn coordinate<'a>(file: &'a ArrayFile, field: Field, time_dim: &str) -> Option<Coord<'a>> {
    let var = file.variables.iter().find(|v| field.matches(&v.name))?;
    match var.dimensions.as_slice() {
        [] => var.unpacked(0).map(Coord::Scalar),
        [d] if d == time_dim => Some(Coord::Series(var)),
        [_] if var.values.len() == 1 => var.unpacked(0).map(Coord::Scalar),
        _ => None,
    }
}

/// Depth coordinate for the second axis of a 2-D variable.
fn depth_axis<'a>(file: &'a ArrayFile, dim: &str) -> Option<&'a Variable> {
    file.variable(dim).or_else(|| {
        file.variables
            .iter()
            .find(|v| Field::Depth.matches(&v.name) && v.dimensions.len() == 1 && v.dimensions[0] == dim)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::time::TimeNormalizer;
    use chrono::TimeZone;
    use netcdf_parser::{AttrValue, Dimension};
    use std::collections::BTreeMap;

    fn ctx() -> ExtractContext {
        ExtractContext::new(TimeNormalizer::from_config(&IngestConfig::default()).unwrap())
    }

    fn dims(list: &[(&str, usize)]) -> Vec<Dimension> {
        list.iter()
            .map(|(name, len)| Dimension {
                name: name.to_string(),
                len: *len,
            })
            .collect()
    }

    fn text(s: &str) -> AttrValue {
        AttrValue::Text(s.to_string())
    }

    fn time_var(values: Vec<f64>) -> Variable {
        Variable::new("time", &["time"], values).with_attr("units", text("days since 1900-01-01"))
    }

    #[test]
    fn test_one_dimensional_series() {
        let file = ArrayFile {
            dimensions: dims(&[("time", 3)]),
            variables: vec![
                time_var(vec![44250.0, 44251.0, 44252.0]),
                Variable::new("TEMP", &["time"], vec![12.0, -999.0, 13.0])
                    .with_attr("units", text("degrees_C"))
                    .with_attr("_FillValue", AttrValue::Number(-999.0)),
                Variable::new("TEMP_QC", &["time"], vec![1.0, 1.0, 4.0]),
                Variable::new("LATITUDE", &[], vec![54.5]),
                Variable::new("LONGITUDE", &[], vec![7.25]),
            ],
            attributes: BTreeMap::new(),
        };

        let ex = extract_array_file(&file, &ctx()).unwrap();
        assert_eq!(ex.rows_read, 3);
        assert_eq!(ex.missing_values, 1);
        assert_eq!(ex.observations.len(), 2);

        let first = &ex.observations[0];
        assert_eq!(first.raw_parameter, "TEMP");
        assert_eq!(first.declared_unit.as_deref(), Some("degrees_C"));
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2021, 2, 25, 0, 0, 0).unwrap());
        assert_eq!(first.quality_flag, Some(QualityFlag::GOOD));
        let loc = first.location.clone().unwrap();
        assert_eq!((loc.latitude, loc.longitude, loc.depth), (Some(54.5), Some(7.25), None));

        assert_eq!(ex.observations[1].quality_flag, Some(QualityFlag::BAD));
    }

    #[test]
    fn test_time_by_depth_produces_record_per_level() {
        let file = ArrayFile {
            dimensions: dims(&[("time", 2), ("depth", 3)]),
            variables: vec![
                time_var(vec![44250.0, 44251.0]),
                Variable::new("depth", &["depth"], vec![0.0, 10.0, 20.0]),
                Variable::new("PSAL", &["time", "depth"], vec![35.0, 35.1, 35.2, 34.9, 35.0, 35.3]),
            ],
            attributes: BTreeMap::new(),
        };

        let ex = extract_array_file(&file, &ctx()).unwrap();
        assert_eq!(ex.observations.len(), 6);
        let depths: Vec<_> = ex
            .observations
            .iter()
            .map(|o| o.location.as_ref().and_then(|l| l.depth))
            .collect();
        assert_eq!(
            depths,
            vec![Some(0.0), Some(10.0), Some(20.0), Some(0.0), Some(10.0), Some(20.0)]
        );
        assert_eq!(ex.observations[5].value, RawValue::Number(35.3));
        assert_eq!(ex.observations[3].timestamp.date_naive().to_string(), "2021-02-26");
    }

    #[test]
    fn test_global_time_units_and_packing() {
        let mut attributes = BTreeMap::new();
        attributes.insert(GLOBAL_TIME_UNITS.to_string(), text("hours since 2021-03-19 00:00:00"));
        let file = ArrayFile {
            dimensions: dims(&[("TIME", 2)]),
            variables: vec![
                Variable::new("TIME", &["TIME"], vec![0.0, 6.0]),
                Variable::new("DOX", &["TIME"], vec![100.0, 200.0])
                    .with_attr("scale_factor", AttrValue::Number(0.01))
                    .with_attr("add_offset", AttrValue::Number(5.0))
                    .with_attr("ancillary_variables", text("DOX_FLAGS")),
                Variable::new("DOX_FLAGS", &["TIME"], vec![2.0, 3.0])
                    .with_attr("flag_values", AttrValue::Numbers(vec![1.0, 2.0, 3.0, 4.0])),
            ],
            attributes,
        };

        let ex = extract_array_file(&file, &ctx()).unwrap();
        assert_eq!(ex.observations.len(), 2);
        assert_eq!(ex.observations[0].value, RawValue::Number(6.0));
        assert_eq!(ex.observations[0].quality_flag, Some(QualityFlag::PROBABLY_GOOD));
        assert_eq!(
            ex.observations[1].timestamp,
            Utc.with_ymd_and_hms(2021, 3, 19, 6, 0, 0).unwrap()
        );
        assert_eq!(ex.observations[1].quality_flag, Some(QualityFlag::PROBABLY_BAD));
    }

    #[test]
    fn test_fill_time_is_rejected() {
        let file = ArrayFile {
            dimensions: dims(&[("time", 2)]),
            variables: vec![
                time_var(vec![44250.0, -1.0]).with_attr("_FillValue", AttrValue::Number(-1.0)),
                Variable::new("TEMP", &["time"], vec![1.0, 2.0]),
            ],
            attributes: BTreeMap::new(),
        };
        let ex = extract_array_file(&file, &ctx()).unwrap();
        assert_eq!(ex.time_rejections, 1);
        assert_eq!(ex.observations.len(), 1);
    }

    #[test]
    fn test_missing_time_or_values() {
        let no_time = ArrayFile {
            dimensions: dims(&[("obs", 1)]),
            variables: vec![Variable::new("TEMP", &["obs"], vec![1.0])],
            attributes: BTreeMap::new(),
        };
        assert_eq!(
            extract_array_file(&no_time, &ctx()).unwrap_err(),
            FileIssue::MissingRequiredColumns(vec!["time".into()])
        );

        let only_coords = ArrayFile {
            dimensions: dims(&[("time", 1)]),
            variables: vec![
                time_var(vec![44250.0]),
                Variable::new("latitude", &["time"], vec![54.0]),
                Variable::new("flag", &["time"], vec![1.0]),
            ],
            attributes: BTreeMap::new(),
        };
        assert_eq!(
            extract_array_file(&only_coords, &ctx()).unwrap_err(),
            FileIssue::MissingRequiredColumns(vec!["value".into()])
        );
    }

    #[test]
    fn test_time_found_by_standard_name() {
        let file = ArrayFile {
            dimensions: dims(&[("n", 1)]),
            variables: vec![
                Variable::new("juld", &["n"], vec![44250.0])
                    .with_attr("standard_name", text("time"))
                    .with_attr("units", text("days since 1900-01-01")),
                Variable::new("CHL", &["n"], vec![0.4]),
            ],
            attributes: BTreeMap::new(),
        };
        let ex = extract_array_file(&file, &ctx()).unwrap();
        assert_eq!(ex.observations[0].raw_parameter, "CHL");
    }

    #[test]
    fn test_row_limit_stops_across_variables() {
        let mut ctx = ctx();
        ctx.row_limit = Some(3);
        let file = ArrayFile {
            dimensions: dims(&[("time", 2)]),
            variables: vec![
                time_var(vec![44250.0, 44251.0]),
                Variable::new("A", &["time"], vec![1.0, 2.0]),
                Variable::new("B", &["time"], vec![3.0, 4.0]),
            ],
            attributes: BTreeMap::new(),
        };
        let ex = extract_array_file(&file, &ctx).unwrap();
        assert_eq!(ex.observations.len(), 3);
        assert!(ex.truncated);
    }

    #[test]
    fn test_extractor_rejects_empty_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.nc");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(ArrayExtractor.extract(&empty, &ctx()).unwrap_err(), FileIssue::EmptyFile);

        let fake = dir.path().join("fake.nc");
        std::fs::write(&fake, b"date,value\n2021-03-19,1\n").unwrap();
        let err = ArrayExtractor.extract(&fake, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            FileIssue::Unreadable(_) | FileIssue::UnsupportedFormat(_)
        ));
    }
}
