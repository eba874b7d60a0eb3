//! Generators for synthetic observation files.
//!
//! Values follow simple patterns so assertions can recompute them.

use netcdf_parser::{ArrayFile, AttrValue, Dimension, Variable};
use std::collections::BTreeMap;

/// Delimited text from a header and rows, newline-terminated.
///
/// ```
/// use test_utils::delimited;
///
/// let text = delimited(',', &["date", "value"], &[&["2021-01-01", "1.5"]]);
/// assert_eq!(text, "date,value\n2021-01-01,1.5\n");
/// ```
pub fn delimited(delimiter: char, header: &[&str], rows: &[&[&str]]) -> String {
    let sep = delimiter.to_string();
    let mut out = header.join(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(&sep));
        out.push('\n');
    }
    out
}

/// `date,value` CSV with one row per day of January 2021, starting at
/// `first_day`. The value of day `d` is `d as f64 / 10.0`.
pub fn january_series(first_day: u32, days: u32) -> String {
    let mut out = String::from("date,value\n");
    for day in first_day..first_day + days {
        out.push_str(&format!("2021-01-{:02},{}\n", day, day as f64 / 10.0));
    }
    out
}

/// `date,value,value_qc` CSV where every row carries `flag`.
pub fn flagged_series(days: u32, flag: u8) -> String {
    let mut out = String::from("date,value,value_qc\n");
    for day in 1..=days {
        out.push_str(&format!("2021-01-{:02},{},{}\n", day, day, flag));
    }
    out
}

/// One-dimensional time series in an array file.
///
/// `time` carries `units = time_units`; the value variable is named `name`.
pub fn time_series_array(name: &str, time_units: &str, times: Vec<f64>, values: Vec<f64>) -> ArrayFile {
    let n = times.len();
    ArrayFile {
        dimensions: vec![Dimension {
            name: "time".to_string(),
            len: n,
        }],
        variables: vec![
            Variable::new("time", &["time"], times)
                .with_attr("units", AttrValue::Text(time_units.to_string())),
            Variable::new(name, &["time"], values),
        ],
        attributes: BTreeMap::new(),
    }
}

/// `(time, depth)` profile array. `values` is row-major: all depths of the
/// first time step, then the next.
pub fn profile_array(
    name: &str,
    time_units: &str,
    times: Vec<f64>,
    depths: Vec<f64>,
    values: Vec<f64>,
) -> ArrayFile {
    let mut file = time_series_array(name, time_units, times, Vec::new());
    file.dimensions.push(Dimension {
        name: "depth".to_string(),
        len: depths.len(),
    });
    file.variables[1] = Variable::new(name, &["time", "depth"], values);
    file.variables.push(Variable::new("depth", &["depth"], depths));
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_january_series() {
        let text = january_series(30, 2);
        assert_eq!(text, "date,value\n2021-01-30,3\n2021-01-31,3.1\n");
    }

    #[test]
    fn test_flagged_series() {
        assert_eq!(flagged_series(1, 4), "date,value,value_qc\n2021-01-01,1,4\n");
    }

    #[test]
    fn test_profile_shape() {
        let file = profile_array("PSAL", "days since 1900-01-01", vec![1.0, 2.0], vec![0.0, 5.0, 10.0], vec![0.0; 6]);
        let var = file.variable("PSAL").unwrap();
        assert_eq!(file.shape(var), vec![2, 3]);
        assert_eq!(file.variable("depth").unwrap().values, vec![0.0, 5.0, 10.0]);
    }
}
